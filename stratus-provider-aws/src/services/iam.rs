//! IAM resources

use std::sync::Arc;

use stratus_core::registry::ServicePackage;
use stratus_core::resource::Value;
use stratus_core::schema::{AttributeSchema, AttributeType, types};

use super::Handler;
use crate::cc_resource::ResourceDefinition;

pub struct Iam;

impl ServicePackage<Handler> for Iam {
    fn name(&self) -> &'static str {
        "iam"
    }

    fn resources(&self) -> Vec<Handler> {
        vec![Arc::new(role())]
    }
}

fn role() -> ResourceDefinition {
    ResourceDefinition::new("iam_role", "AWS::IAM::Role")
        .with_description("An IAM role assumable by the principals its trust policy names")
        .attribute(
            AttributeSchema::new("role_name", types::string_len_between(1, 64))
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("assume_role_policy_document", types::json_document())
                .required()
                .with_description("Trust policy as a JSON document"),
        )
        .attribute(
            AttributeSchema::new("path", types::string_matches(
                "IamPath",
                r"^/([\x21-\x7E]{0,510}/)?$",
                "must begin and end with '/'",
            ))
            .with_default(Value::String("/".to_string()))
            .force_new(),
        )
        .attribute(AttributeSchema::new("description", types::string_len_between(0, 1000)))
        .attribute(
            AttributeSchema::new("max_session_duration", types::int_between(3600, 43200))
                .optional_computed()
                .with_description("Maximum session duration in seconds"),
        )
        .attribute(AttributeSchema::new(
            "managed_policy_arns",
            AttributeType::Set(Box::new(types::arn())),
        ))
        .attribute(AttributeSchema::new("permissions_boundary", types::arn()))
        .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
        .attribute(AttributeSchema::new("role_id", AttributeType::String).computed())
        .with_tags()
}
