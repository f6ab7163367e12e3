//! Leostream API interaction module
//!
//! The concrete remote client the reconciliation engine runs against:
//! session authentication, HTTP plumbing and the per-kind REST endpoints.
//!
//! # Module Structure
//!
//! - [`auth`] - Session login and session ID caching
//! - [`client`] - Main Leostream client, implements [`RemoteClient`](crate::resource::RemoteClient)
//! - [`http`] - HTTP utilities for REST API calls
//!
//! # Example
//!
//! ```ignore
//! use leosync::leostream::client::LeostreamClient;
//!
//! async fn example(settings: &ConnectionSettings) -> anyhow::Result<()> {
//!     let client = LeostreamClient::new(settings)?;
//!     let gateways = client.get(&client.collection_url(ResourceKind::Gateway)?).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
