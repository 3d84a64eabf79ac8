//! EC2 networking resources

use std::sync::Arc;
use std::time::Duration;

use stratus_core::provider::Diagnostic;
use stratus_core::registry::ServicePackage;
use stratus_core::resource::{Resource, Value};
use stratus_core::schema::{AttributeSchema, AttributeType, types};
use stratus_core::timeouts::Timeouts;

use super::{Handler, LookupDataSource};
use crate::cc_resource::ResourceDefinition;

pub struct Ec2;

impl ServicePackage<Handler> for Ec2 {
    fn name(&self) -> &'static str {
        "ec2"
    }

    fn resources(&self) -> Vec<Handler> {
        vec![
            Arc::new(vpc()),
            Arc::new(subnet()),
            Arc::new(internet_gateway()),
            Arc::new(route_table()),
            Arc::new(route()),
            Arc::new(security_group()),
            Arc::new(security_group_ingress()),
            Arc::new(eip()),
            Arc::new(nat_gateway()),
            Arc::new(vpc_endpoint()),
        ]
    }

    fn data_sources(&self) -> Vec<Handler> {
        vec![Arc::new(LookupDataSource::new(Arc::new(vpc()), "id"))]
    }
}

fn string_set() -> AttributeType {
    AttributeType::Set(Box::new(AttributeType::String))
}

fn enum_of(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

fn vpc() -> ResourceDefinition {
    ResourceDefinition::new("ec2_vpc", "AWS::EC2::VPC")
        .with_description("A virtual private cloud")
        .attribute(
            AttributeSchema::new("cidr_block", types::cidr())
                .required()
                .force_new()
                .with_description("The IPv4 network range for the VPC, in CIDR notation."),
        )
        .attribute(
            AttributeSchema::new("enable_dns_hostnames", AttributeType::Bool)
                .optional_computed()
                .with_description("Whether instances launched in the VPC get DNS hostnames."),
        )
        .attribute(
            AttributeSchema::new("enable_dns_support", AttributeType::Bool).optional_computed(),
        )
        .attribute(
            AttributeSchema::new("instance_tenancy", enum_of(&["default", "dedicated"]))
                .optional_computed(),
        )
        .attribute(AttributeSchema::new("vpc_id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("default_security_group", AttributeType::String).computed())
        .attribute(AttributeSchema::new("default_network_acl", AttributeType::String).computed())
        .with_tags()
}

fn subnet() -> ResourceDefinition {
    ResourceDefinition::new("ec2_subnet", "AWS::EC2::Subnet")
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("cidr_block", types::cidr())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("availability_zone", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("map_public_ip_on_launch", AttributeType::Bool)
                .optional_computed()
                .with_description("Whether instances launched in the subnet get a public IPv4 address."),
        )
        .attribute(AttributeSchema::new("subnet_id", AttributeType::String).computed())
        .with_tags()
}

fn internet_gateway() -> ResourceDefinition {
    ResourceDefinition::new("ec2_internet_gateway", "AWS::EC2::InternetGateway")
        .attribute(AttributeSchema::new("internet_gateway_id", AttributeType::String).computed())
        .with_tags()
}

fn route_table() -> ResourceDefinition {
    ResourceDefinition::new("ec2_route_table", "AWS::EC2::RouteTable")
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("route_table_id", AttributeType::String).computed())
        .with_tags()
}

const ROUTE_TARGETS: &[&str] = &[
    "gateway_id",
    "nat_gateway_id",
    "vpc_endpoint_id",
    "network_interface_id",
];

fn route() -> ResourceDefinition {
    let mut def = ResourceDefinition::new("ec2_route", "AWS::EC2::Route")
        .attribute(
            AttributeSchema::new("route_table_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("destination_cidr_block", types::cidr())
                .required()
                .force_new(),
        );
    for target in ROUTE_TARGETS {
        def = def.attribute(AttributeSchema::new(*target, AttributeType::String));
    }
    def.with_composite_identifier(&["route_table_id", "destination_cidr_block"])
        .with_validator(validate_route)
}

fn validate_route(resource: &Resource) -> Vec<Diagnostic> {
    exactly_one_of(resource, ROUTE_TARGETS)
}

/// A diagnostic unless exactly one of `names` is set
fn exactly_one_of(resource: &Resource, names: &[&str]) -> Vec<Diagnostic> {
    let set: Vec<&str> = names
        .iter()
        .copied()
        .filter(|n| resource.attributes.contains_key(*n))
        .collect();
    if set.len() == 1 {
        return Vec::new();
    }
    let detail = if set.is_empty() {
        "none is set".to_string()
    } else {
        format!("{} are set", set.join(", "))
    };
    vec![
        Diagnostic::error(format!(
            "{}: exactly one of {} must be set",
            resource.id,
            names.join(", ")
        ))
        .with_detail(detail),
    ]
}

fn rule_block() -> AttributeType {
    AttributeType::Block(vec![
        AttributeSchema::new("ip_protocol", AttributeType::String).required(),
        AttributeSchema::new("from_port", types::port()),
        AttributeSchema::new("to_port", types::port()),
        AttributeSchema::new("cidr_ip", types::cidr()),
        AttributeSchema::new("description", AttributeType::String),
    ])
}

fn security_group() -> ResourceDefinition {
    ResourceDefinition::new("ec2_security_group", "AWS::EC2::SecurityGroup")
        .attribute(
            AttributeSchema::new("group_description", types::string_len_between(0, 255))
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("group_name", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("security_group_ingress", AttributeType::List(Box::new(rule_block())))
                .optional_computed(),
        )
        .attribute(
            AttributeSchema::new("security_group_egress", AttributeType::List(Box::new(rule_block())))
                .optional_computed()
                .with_description("Outbound rules. The cloud adds an allow-all rule when unset."),
        )
        .attribute(AttributeSchema::new("group_id", AttributeType::String).computed())
        .with_tags()
}

fn security_group_ingress() -> ResourceDefinition {
    ResourceDefinition::new("ec2_security_group_ingress", "AWS::EC2::SecurityGroupIngress")
        .attribute(
            AttributeSchema::new("group_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("ip_protocol", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("from_port", types::port()).force_new())
        .attribute(AttributeSchema::new("to_port", types::port()).force_new())
        .attribute(AttributeSchema::new("cidr_ip", types::cidr()).force_new())
        .attribute(AttributeSchema::new("source_security_group_id", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .with_validator(validate_ingress)
}

fn validate_ingress(resource: &Resource) -> Vec<Diagnostic> {
    let mut diagnostics = exactly_one_of(resource, &["cidr_ip", "source_security_group_id"]);
    let port = |name: &str| resource.attributes.get(name).and_then(Value::as_int);
    if let (Some(from), Some(to)) = (port("from_port"), port("to_port"))
        && from > to
    {
        diagnostics.push(
            Diagnostic::error(format!(
                "{}: from_port ({}) must not be greater than to_port ({})",
                resource.id, from, to
            ))
            .with_attribute("from_port"),
        );
    }
    diagnostics
}

fn eip() -> ResourceDefinition {
    ResourceDefinition::new("ec2_eip", "AWS::EC2::EIP")
        .attribute(
            AttributeSchema::new("domain", enum_of(&["vpc", "standard"]))
                .with_default(Value::String("vpc".to_string()))
                .force_new(),
        )
        .attribute(AttributeSchema::new("instance_id", AttributeType::String))
        .attribute(
            AttributeSchema::new("network_border_group", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("public_ip", AttributeType::String).computed())
        .attribute(AttributeSchema::new("allocation_id", AttributeType::String).computed())
        .with_composite_identifier(&["public_ip", "allocation_id"])
        .with_tags()
}

fn nat_gateway() -> ResourceDefinition {
    ResourceDefinition::new("ec2_nat_gateway", "AWS::EC2::NatGateway")
        .attribute(
            AttributeSchema::new("subnet_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("allocation_id", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("connectivity_type", enum_of(&["public", "private"]))
                .with_default(Value::String("public".to_string()))
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("private_ip_address", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("nat_gateway_id", AttributeType::String).computed())
        .with_tags()
        .with_timeouts(
            Timeouts::default()
                .with_create(Duration::from_secs(10 * 60))
                .with_delete(Duration::from_secs(30 * 60)),
        )
        .with_validator(validate_nat_gateway)
}

fn validate_nat_gateway(resource: &Resource) -> Vec<Diagnostic> {
    let public = resource
        .get_str("connectivity_type")
        .is_none_or(|t| t.ends_with("public"));
    if public && !resource.attributes.contains_key("allocation_id") {
        return vec![
            Diagnostic::error(format!(
                "{}: a public NAT gateway needs an allocation_id",
                resource.id
            ))
            .with_attribute("allocation_id"),
        ];
    }
    Vec::new()
}

fn vpc_endpoint() -> ResourceDefinition {
    ResourceDefinition::new("ec2_vpc_endpoint", "AWS::EC2::VPCEndpoint")
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("service_name", AttributeType::String)
                .required()
                .force_new()
                .with_description("e.g. com.amazonaws.us-east-1.s3"),
        )
        .attribute(
            AttributeSchema::new(
                "vpc_endpoint_type",
                enum_of(&["Gateway", "Interface", "GatewayLoadBalancer"]),
            )
            .with_default(Value::String("Gateway".to_string()))
            .force_new(),
        )
        .attribute(AttributeSchema::new("route_table_ids", string_set()))
        .attribute(AttributeSchema::new("subnet_ids", string_set()))
        .attribute(AttributeSchema::new("security_group_ids", string_set()))
        .attribute(AttributeSchema::new("private_dns_enabled", AttributeType::Bool))
        .attribute(AttributeSchema::new("policy_document", types::json_document()).optional_computed())
        .attribute(
            AttributeSchema::new(
                "dns_entries",
                AttributeType::List(Box::new(AttributeType::String)),
            )
            .computed(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ResourceHandler;
    use crate::testing::{FakeCloudControl, FakeS3, client_with};
    use serde_json::json;
    use stratus_core::resource::ResourceId;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn route_needs_exactly_one_target() {
        let base = Resource::new("ec2_route", "default")
            .with_attribute("route_table_id", s("rtb-1"))
            .with_attribute("destination_cidr_block", s("0.0.0.0/0"));
        let def = route();

        assert_eq!(def.validate_config(&base).len(), 1);
        let ok = base.clone().with_attribute("gateway_id", s("igw-1"));
        assert!(def.validate_config(&ok).is_empty());
        let both = ok.with_attribute("nat_gateway_id", s("nat-1"));
        let diagnostics = def.validate_config(&both);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("gateway_id, nat_gateway_id are set")
        );
    }

    #[test]
    fn ingress_port_range_is_ordered() {
        let rule = Resource::new("ec2_security_group_ingress", "https")
            .with_attribute("group_id", s("sg-1"))
            .with_attribute("ip_protocol", s("tcp"))
            .with_attribute("from_port", Value::Int(443))
            .with_attribute("to_port", Value::Int(80))
            .with_attribute("cidr_ip", s("0.0.0.0/0"));
        let diagnostics = security_group_ingress().validate_config(&rule);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("from_port"));
    }

    #[test]
    fn public_nat_gateway_needs_an_allocation() {
        let nat = Resource::new("ec2_nat_gateway", "main").with_attribute("subnet_id", s("subnet-1"));
        assert_eq!(nat_gateway().validate_config(&nat).len(), 1);
        let private = nat.with_attribute("connectivity_type", s("private"));
        assert!(nat_gateway().validate_config(&private).is_empty());
    }

    #[test]
    fn nat_gateway_has_long_timeouts() {
        let schema = nat_gateway().schema;
        assert_eq!(schema.timeouts.create, Duration::from_secs(600));
        assert_eq!(schema.timeouts.delete, Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn eip_defaults_to_vpc_domain() {
        let cc = Arc::new(FakeCloudControl::default());
        cc.identify_by("AWS::EC2::EIP", &["PublicIp", "AllocationId"]);
        cc.compute(
            "AWS::EC2::EIP",
            json!({"PublicIp": "203.0.113.10", "AllocationId": "eipalloc-1"}),
        );
        let client = client_with(cc.clone(), Arc::new(FakeS3::default()));

        let state = eip()
            .create(&client, &Resource::new("ec2_eip", "nat"))
            .await
            .unwrap();

        assert_eq!(state.identifier.as_deref(), Some("203.0.113.10|eipalloc-1"));
        assert_eq!(state.attributes.get("domain"), Some(&s("vpc")));
        assert_eq!(state.attributes.get("allocation_id"), Some(&s("eipalloc-1")));
        let stored = cc.get("AWS::EC2::EIP", "203.0.113.10|eipalloc-1").unwrap();
        assert_eq!(stored["Domain"], json!("vpc"));
    }

    #[tokio::test]
    async fn vpc_data_source_looks_up_by_id() {
        let cc = Arc::new(FakeCloudControl::default());
        cc.insert(
            "AWS::EC2::VPC",
            "vpc-123",
            json!({"CidrBlock": "172.31.0.0/16", "VpcId": "vpc-123"}),
        );
        let client = client_with(cc, Arc::new(FakeS3::default()));
        let ds = LookupDataSource::new(Arc::new(vpc()), "id");

        let lookup = Resource::new("ec2_vpc", "default")
            .with_attribute("id", s("vpc-123"))
            .with_read_only(true);
        let state = ds.read_data_source(&client, &lookup).await.unwrap();
        assert_eq!(state.attributes.get("cidr_block"), Some(&s("172.31.0.0/16")));
        assert_eq!(state.id, ResourceId::new("ec2_vpc", "default"));

        let missing = lookup.with_attribute("id", s("vpc-404"));
        let err = ds.read_data_source(&client, &missing).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.message.contains("vpc-404"));
    }
}
