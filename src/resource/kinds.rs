//! Resource kinds and their schemas
//!
//! Declares the four Leostream object kinds the engine reconciles and builds
//! an immutable registry of their schemas. Bootstrap values from process-wide
//! configuration are baked in once, when the registry is built.

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use super::mapper::materialize_with;
use super::replace::gpu_match_changed;
use super::schema::{AttributeSchema, AttributeSpec, ReplacePolicy};
use super::translate::{translate, Mode};
use crate::config::Bootstrap;
use crate::error::Result;

/// Kind of remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Gateway,
    Center,
    Pool,
    AwsPool,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Gateway,
        ResourceKind::Center,
        ResourceKind::Pool,
        ResourceKind::AwsPool,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Gateway => "gateway",
            ResourceKind::Center => "center",
            ResourceKind::Pool => "pool",
            ResourceKind::AwsPool => "aws_pool",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "gateway" | "gateways" => Ok(ResourceKind::Gateway),
            "center" | "centers" => Ok(ResourceKind::Center),
            "pool" | "pools" => Ok(ResourceKind::Pool),
            "aws_pool" | "awspool" | "aws_pools" => Ok(ResourceKind::AwsPool),
            other => Err(format!(
                "unknown resource kind '{}' (expected gateway, center, pool or aws_pool)",
                other
            )),
        }
    }
}

/// Desired→Remote translation step
pub type TranslateFn = fn(&Value, &AttributeSchema, Mode) -> Result<Value>;

/// Remote→Local mapping step; the last argument carries sensitive values
pub type MaterializeFn = fn(&Value, &AttributeSchema, Option<&Value>) -> Result<Value>;

/// Everything the reconciler needs to know about one kind
#[derive(Debug, Clone)]
pub struct ResourceDef {
    pub kind: ResourceKind,
    pub schema: AttributeSchema,
    /// Projection used for bulk listing
    pub summary: AttributeSchema,
    pub translate: TranslateFn,
    pub materialize: MaterializeFn,
}

impl ResourceDef {
    fn new(kind: ResourceKind, schema: AttributeSchema, summary: AttributeSchema) -> Self {
        Self {
            kind,
            schema,
            summary,
            translate,
            materialize: materialize_with,
        }
    }
}

/// Immutable registry of all kinds, safe to share across reconciliations
#[derive(Debug, Clone)]
pub struct Schemas {
    gateway: Arc<ResourceDef>,
    center: Arc<ResourceDef>,
    pool: Arc<ResourceDef>,
    aws_pool: Arc<ResourceDef>,
}

impl Schemas {
    /// Build every schema, resolving bootstrap defaults now
    pub fn build(bootstrap: &Bootstrap) -> Self {
        Self {
            gateway: Arc::new(ResourceDef::new(
                ResourceKind::Gateway,
                gateway_schema(),
                gateway_summary(),
            )),
            center: Arc::new(ResourceDef::new(
                ResourceKind::Center,
                center_schema(),
                center_summary(),
            )),
            pool: Arc::new(ResourceDef::new(
                ResourceKind::Pool,
                pool_schema(),
                pool_summary(),
            )),
            aws_pool: Arc::new(ResourceDef::new(
                ResourceKind::AwsPool,
                aws_pool_schema(bootstrap),
                pool_summary(),
            )),
        }
    }

    pub fn get(&self, kind: ResourceKind) -> Arc<ResourceDef> {
        match kind {
            ResourceKind::Gateway => Arc::clone(&self.gateway),
            ResourceKind::Center => Arc::clone(&self.center),
            ResourceKind::Pool => Arc::clone(&self.pool),
            ResourceKind::AwsPool => Arc::clone(&self.aws_pool),
        }
    }
}

/// Global registry
static REGISTRY: OnceLock<Schemas> = OnceLock::new();

/// Build the global registry from bootstrap configuration.
///
/// Only the first call has an effect; later calls return the registry that
/// already exists.
pub fn init_registry(bootstrap: &Bootstrap) -> &'static Schemas {
    REGISTRY.get_or_init(|| Schemas::build(bootstrap))
}

/// Get the global registry (built with default bootstrap values if it was
/// never initialized)
pub fn registry() -> &'static Schemas {
    REGISTRY.get_or_init(|| Schemas::build(&Bootstrap::default()))
}

// =============================================================================
// Gateway
// =============================================================================

fn gateway_schema() -> AttributeSchema {
    AttributeSchema::new(vec![
        AttributeSpec::id(),
        AttributeSpec::string("name")
            .with_default(json!(""))
            .describe("Display name of the gateway."),
        AttributeSpec::string("address")
            .with_default(json!(""))
            .describe("Public IP address of the gateway."),
        AttributeSpec::string("address_private")
            .with_default(json!(""))
            .describe("Private IP address of the gateway."),
        AttributeSpec::int("load_balancer_id")
            .with_default(json!(0))
            .describe("ID of the cluster associated with the gateway."),
        AttributeSpec::int("use_src_ip")
            .with_default(json!(0))
            .describe("Source IP filtering: 0 random port, 1 same port, 2 random port on gateway."),
        AttributeSpec::string("notes").with_default(json!("")),
    ])
}

fn gateway_summary() -> AttributeSchema {
    AttributeSchema::new(vec![
        AttributeSpec::id(),
        AttributeSpec::string("name").with_default(json!("")),
    ])
}

// =============================================================================
// Center
// =============================================================================

fn center_schema() -> AttributeSchema {
    let definition = AttributeSchema::new(vec![
        AttributeSpec::string("name")
            .required()
            .describe("Name of the center."),
        AttributeSpec::int("allow_rogue").with_default(json!(0)),
        AttributeSpec::int("allow_rogue_policy_id").with_default(json!(0)),
        AttributeSpec::int("continuous_autotag").with_default(json!(0)),
        AttributeSpec::int("init_unavailable").with_default(json!(0)),
        AttributeSpec::int("new_as_deletable").with_default(json!(0)),
        AttributeSpec::string("notes").with_default(json!("")),
        AttributeSpec::int("offer_vms").with_default(json!(0)),
        AttributeSpec::int("poll_interval")
            .with_default(json!(0))
            .describe("Interval in minutes to poll the center, 0 is don't poll."),
        AttributeSpec::string("proxy_address").with_default(json!("")),
        AttributeSpec::string("type")
            .with_default(json!("amazon"))
            .replace(ReplacePolicy::Always)
            .describe("Type of the center. Currently only 'amazon' is supported."),
        AttributeSpec::string("vc_auth_method")
            .with_default(json!(""))
            .describe("Amazon authorization method: 'access_key' or 'attached_role'."),
        AttributeSpec::string("vc_datacenter")
            .with_default(json!(""))
            .describe("AWS region, or _custom for a custom region."),
        AttributeSpec::string("vc_name")
            .with_default(json!(""))
            .describe("Access Key ID for a user with permission to access EC2."),
        AttributeSpec::string("vc_password")
            .sensitive()
            .describe("Secret Access Key for the user."),
        AttributeSpec::int("wait_inst_status").with_default(json!(0)),
        AttributeSpec::int("wait_sys_status").with_default(json!(0)),
    ]);

    AttributeSchema::new(vec![
        AttributeSpec::id(),
        AttributeSpec::object("center_definition", definition).describe("Center definition."),
    ])
}

fn center_summary() -> AttributeSchema {
    AttributeSchema::new(vec![
        AttributeSpec::id(),
        AttributeSpec::string("name").with_default(json!("")),
        AttributeSpec::string("os").with_default(json!("")),
        AttributeSpec::string("flavor").with_default(json!("")),
        AttributeSpec::int("online").with_default(json!(0)),
        AttributeSpec::int("status").with_default(json!(0)),
        AttributeSpec::string("status_label").with_default(json!("")),
        AttributeSpec::string("center_type").with_default(json!("")),
        AttributeSpec::string("type_label").with_default(json!("")),
    ])
}

// =============================================================================
// Pools
// =============================================================================

/// Match rules of a pool definition (restrict_by A or Z)
fn pool_attributes() -> AttributeSpec {
    AttributeSpec::list_of(
        "attributes",
        AttributeSchema::new(vec![
            AttributeSpec::string("vm_table_field")
                .with_default(json!(""))
                .describe("Machine attribute to search; a column of the vm table."),
            AttributeSpec::string("ad_attribute_field")
                .with_default(json!(""))
                .describe("LDAP attribute of the desktop."),
            AttributeSpec::string("vm_gpu_field")
                .with_default(json!(""))
                .replace(ReplacePolicy::When(gpu_match_changed))
                .describe("GPU field to search; a column of the vm_gpu table."),
            AttributeSpec::string("text_to_match").with_default(json!("")),
            AttributeSpec::string("condition_type")
                .with_default(json!(""))
                .describe("Search conditional: ip, np, eq, ne, gt, lt, ct, nc, bw or ew."),
        ]),
    )
    .describe("Pool attributes (restrict_by A) or LDAP attributes (restrict_by Z).")
}

fn provision_center(required: bool) -> AttributeSpec {
    let spec = AttributeSpec::object(
        "center",
        AttributeSchema::new(vec![
            AttributeSpec::int("id").with_default(json!(0)),
            AttributeSpec::string("name").with_default(json!("")),
            AttributeSpec::string("type").with_default(json!("")),
            AttributeSpec::string("provision_method").with_default(json!("image")),
            AttributeSpec::string("aws_size").with_default(json!("")),
            AttributeSpec::string("aws_iam_name").with_default(json!("")),
            AttributeSpec::string("aws_sub_net").with_default(json!("")),
            AttributeSpec::string("aws_sec_group").with_default(json!("")),
            AttributeSpec::string("aws_vpc_id").with_default(json!("")),
        ]),
    )
    .describe("Center that provisions new desktops for this pool.");
    if required {
        spec.required()
    } else {
        spec
    }
}

fn pool_common() -> Vec<AttributeSpec> {
    vec![
        AttributeSpec::id(),
        AttributeSpec::string("name")
            .with_default(json!(""))
            .describe("Name of the pool."),
        AttributeSpec::string("display_name").with_default(json!("")),
        AttributeSpec::string("notes").with_default(json!("")),
        AttributeSpec::int("running_desktops_threshold").with_default(json!(0)),
    ]
}

fn pool_schema() -> AttributeSchema {
    let definition = AttributeSchema::new(vec![
        AttributeSpec::string("restrict_by").with_default(json!("C")),
        AttributeSpec::int_list("server_ids").with_default(json!([])),
        AttributeSpec::int("never_rogue").with_default(json!(0)),
        AttributeSpec::int("use_vmotion").with_default(json!(0)),
        AttributeSpec::int("parent_pool_id").with_default(json!(1)),
        AttributeSpec::string("pool_attribute_join").with_default(json!("A")),
        pool_attributes(),
    ]);

    let provision = AttributeSchema::new(vec![
        AttributeSpec::int("provision_on_off").with_default(json!(0)),
        AttributeSpec::int("provision_max").with_default(json!(0)),
        AttributeSpec::int("provision_vm_id").with_default(json!(0)),
        AttributeSpec::int("provision_server_id").with_default(json!(0)),
        AttributeSpec::int("provision_threshold").with_default(json!(0)),
        AttributeSpec::int("provision_tenant_id").with_default(json!(0)),
        AttributeSpec::int("provision_vm_name_next_value").with_default(json!(0)),
        AttributeSpec::int("provision_limits_enforce").with_default(json!(0)),
        AttributeSpec::int("mark_deletable").with_default(json!(0)),
        AttributeSpec::string("provision_url").with_default(json!("")),
        AttributeSpec::string("provision_vm_display_name").with_default(json!("")),
        AttributeSpec::string("provision_vm_name").with_default(json!("")),
        provision_center(false),
    ]);

    let mut attributes = pool_common();
    attributes.push(AttributeSpec::object("pool_definition", definition));
    attributes.push(
        AttributeSpec::object("provision", provision)
            .flatten()
            .describe("Provisioning parameters, sent as top-level pool fields."),
    );
    AttributeSchema::new(attributes)
}

fn aws_pool_schema(bootstrap: &Bootstrap) -> AttributeSchema {
    let definition = AttributeSchema::new(vec![
        AttributeSpec::string("restrict_by")
            .with_default(json!(bootstrap.restrict_by))
            .describe("Restrict by: A attribute, T tag, C centers, E/L/V vSphere, Z LDAP, H ad hoc."),
        AttributeSpec::int_list("server_ids")
            .with_default(json!(bootstrap.server_ids))
            .describe("IDs defining this pool."),
        AttributeSpec::int("never_rogue").with_default(json!(0)),
        AttributeSpec::int("use_vmotion").with_default(json!(0)),
        AttributeSpec::int("parent_pool_id").with_default(json!(1)),
        AttributeSpec::string("pool_attribute_join")
            .with_default(json!(bootstrap.pool_attribute_join))
            .describe("A (and) or O (or)."),
        pool_attributes(),
    ]);

    let provision = AttributeSchema::new(vec![
        AttributeSpec::int("provision_on_off").with_default(json!(bootstrap.provision_on_off)),
        AttributeSpec::int("provision_max").with_default(json!(bootstrap.provision_max)),
        AttributeSpec::int("provision_vm_id").with_default(json!(bootstrap.provision_vm_id)),
        AttributeSpec::int("provision_server_id").with_default(json!(bootstrap.provision_server_id)),
        AttributeSpec::string("provision_vm_name").with_default(json!("")),
        AttributeSpec::int("provision_threshold").with_default(json!(bootstrap.provision_threshold)),
        AttributeSpec::int("provision_tenant_id").with_default(json!(bootstrap.provision_tenant_id)),
        AttributeSpec::string("provision_vm_display_name").with_default(json!("")),
        AttributeSpec::string("provision_url").with_default(json!("")),
        AttributeSpec::int("provision_limits_enforce")
            .with_default(json!(bootstrap.provision_limits_enforce)),
        AttributeSpec::int("mark_deletable").with_default(json!(bootstrap.mark_deletable)),
        provision_center(true),
    ]);

    let mut attributes = pool_common();
    attributes.push(AttributeSpec::object("pool_definition", definition));
    attributes.push(AttributeSpec::object("provision", provision));
    AttributeSchema::new(attributes)
}

fn pool_summary() -> AttributeSchema {
    AttributeSchema::new(vec![
        AttributeSpec::id(),
        AttributeSpec::string("name").with_default(json!("")),
        AttributeSpec::string("display_name").with_default(json!("")),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::defaults::{fill_defaults, materialize_defaults};
    use crate::resource::schema::Shape;

    #[test]
    fn test_all_schemas_are_well_formed() {
        let schemas = Schemas::build(&Bootstrap::default());
        for kind in ResourceKind::ALL {
            let def = schemas.get(kind);
            assert_eq!(def.kind, kind);
            assert!(def.schema.check().is_empty(), "{}: {:?}", kind, def.schema.check());
            assert!(def.summary.check().is_empty(), "{} summary", kind);
        }
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("aws-pool".parse::<ResourceKind>(), Ok(ResourceKind::AwsPool));
        assert_eq!("Gateways".parse::<ResourceKind>(), Ok(ResourceKind::Gateway));
        assert!("desk".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_bootstrap_seeds_aws_pool_defaults() {
        let bootstrap = Bootstrap {
            restrict_by: "A".to_string(),
            server_ids: vec![11, 12],
            provision_max: 5,
            ..Bootstrap::default()
        };
        let schemas = Schemas::build(&bootstrap);
        let defaults = materialize_defaults(&schemas.get(ResourceKind::AwsPool).schema);
        assert_eq!(defaults["pool_definition"]["restrict_by"], json!("A"));
        assert_eq!(defaults["pool_definition"]["server_ids"], json!([11, 12]));
        assert_eq!(defaults["provision"]["provision_max"], json!(5));

        // The generic pool keeps its static defaults
        let defaults = materialize_defaults(&schemas.get(ResourceKind::Pool).schema);
        assert_eq!(defaults["pool_definition"]["server_ids"], json!([]));
    }

    #[test]
    fn test_aws_pool_requires_center_when_provision_given() {
        let schemas = Schemas::build(&Bootstrap::default());
        let schema = &schemas.get(ResourceKind::AwsPool).schema;
        let err = fill_defaults(&json!({"provision": {"provision_max": 2}}), schema).unwrap_err();
        assert_eq!(err.path(), Some("provision.center"));

        // Wholly absent provision falls back to the materialized default
        assert!(fill_defaults(&json!({}), schema).is_ok());
    }

    #[test]
    fn test_generic_pool_provision_is_flattened() {
        let schemas = Schemas::build(&Bootstrap::default());
        let spec = schemas.get(ResourceKind::Pool).schema.get("provision").cloned().unwrap();
        assert!(spec.flatten);
        assert_eq!(spec.shape, Shape::Object);
    }
}
