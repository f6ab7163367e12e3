//! Resource reconciliation engine
//!
//! Maps partially specified desired documents onto Leostream objects and
//! back, and drives their create/read/update/delete/import lifecycle.
//!
//! # Architecture
//!
//! - [`schema`] - Per-kind attribute declarations (shape, defaults, replace policy)
//! - [`defaults`] - Materializes schema-complete default documents
//! - [`translate`] - Desired document → remote payload
//! - [`mapper`] - Remote record → local state
//! - [`replace`] - Decides update-in-place vs replacement per attribute path
//! - [`reconciler`] - Generic lifecycle orchestrator
//! - [`kinds`] - The Gateway, Center, Pool and AwsPool schemas
//!
//! # Example
//!
//! ```ignore
//! use leosync::resource::{registry, Instance, Reconciler, ResourceKind};
//!
//! async fn create_gateway(client: Arc<LeostreamClient>) -> leosync::error::Result<()> {
//!     let reconciler = Reconciler::new(client, registry().get(ResourceKind::Gateway));
//!     let mut instance = Instance::absent();
//!     reconciler.create(&mut instance, &json!({"name": "gw-1"})).await?;
//!     Ok(())
//! }
//! ```

pub mod defaults;
pub mod kinds;
pub mod mapper;
pub mod reconciler;
pub mod remote;
pub mod replace;
pub mod schema;
pub mod translate;

pub use defaults::{fill_defaults, materialize_defaults};
pub use kinds::{init_registry, registry, ResourceDef, ResourceKind, Schemas};
pub use mapper::{materialize, materialize_with};
pub use reconciler::{Instance, Phase, ReadOutcome, Reconciler, UpdateOutcome};
pub use remote::RemoteClient;
pub use replace::{diff, requires_replace, Change};
pub use schema::{AttributePath, AttributeSchema, AttributeSpec, ReplacePolicy, Shape, ValueType};
pub use translate::{redact, translate, Mode};
