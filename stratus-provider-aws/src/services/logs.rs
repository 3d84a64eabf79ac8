//! CloudWatch Logs resources

use std::sync::Arc;

use stratus_core::registry::ServicePackage;
use stratus_core::schema::{AttributeSchema, AttributeType, types};

use super::Handler;
use crate::cc_resource::ResourceDefinition;

pub struct Logs;

impl ServicePackage<Handler> for Logs {
    fn name(&self) -> &'static str {
        "logs"
    }

    fn resources(&self) -> Vec<Handler> {
        vec![Arc::new(log_group())]
    }
}

/// Retention periods CloudWatch Logs accepts, in days
const RETENTION_DAYS: &[i64] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

fn log_group() -> ResourceDefinition {
    ResourceDefinition::new("logs_log_group", "AWS::Logs::LogGroup")
        .attribute(
            AttributeSchema::new(
                "log_group_name",
                types::string_matches(
                    "LogGroupName",
                    r"^[.\-_/#A-Za-z0-9]{1,512}$",
                    "may only contain letters, digits and . - _ / #",
                ),
            )
            .optional_computed()
            .force_new(),
        )
        .attribute(
            AttributeSchema::new("retention_in_days", types::int_in_slice(RETENTION_DAYS))
                .with_description("Days to keep log events. Unset keeps them forever."),
        )
        .attribute(AttributeSchema::new("kms_key_id", types::arn()))
        .attribute(
            AttributeSchema::new(
                "log_group_class",
                AttributeType::Enum(vec!["STANDARD".to_string(), "INFREQUENT_ACCESS".to_string()]),
            )
            .optional_computed()
            .force_new(),
        )
        .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
        .with_tags()
}
