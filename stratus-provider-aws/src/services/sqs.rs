//! SQS resources

use std::sync::Arc;

use stratus_core::provider::Diagnostic;
use stratus_core::registry::ServicePackage;
use stratus_core::resource::{Resource, Value};
use stratus_core::schema::{AttributeSchema, AttributeType, types};

use super::Handler;
use crate::cc_resource::ResourceDefinition;

pub struct Sqs;

impl ServicePackage<Handler> for Sqs {
    fn name(&self) -> &'static str {
        "sqs"
    }

    fn resources(&self) -> Vec<Handler> {
        vec![Arc::new(queue())]
    }
}

const FIFO_SUFFIX: &str = ".fifo";

fn queue() -> ResourceDefinition {
    ResourceDefinition::new("sqs_queue", "AWS::SQS::Queue")
        .attribute(
            AttributeSchema::new("queue_name", types::string_len_between(1, 80))
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("fifo_queue", AttributeType::Bool)
                .optional_computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("content_based_deduplication", AttributeType::Bool))
        .attribute(
            AttributeSchema::new("visibility_timeout", types::int_between(0, 43200))
                .optional_computed()
                .with_description("Seconds a received message stays hidden"),
        )
        .attribute(
            AttributeSchema::new("message_retention_period", types::int_between(60, 1_209_600))
                .optional_computed(),
        )
        .attribute(
            AttributeSchema::new("delay_seconds", types::int_between(0, 900)).optional_computed(),
        )
        .attribute(AttributeSchema::new("redrive_policy", types::json_document()))
        .attribute(AttributeSchema::new("queue_url", AttributeType::String).computed())
        .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
        .with_tags()
        .with_validator(validate_queue)
}

/// FIFO queues need the `.fifo` suffix; standard queues must not carry it
fn validate_queue(resource: &Resource) -> Vec<Diagnostic> {
    let fifo = resource
        .attributes
        .get("fifo_queue")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mut diagnostics = Vec::new();
    if let Some(name) = resource.get_str("queue_name") {
        if fifo && !name.ends_with(FIFO_SUFFIX) {
            diagnostics.push(
                Diagnostic::error(format!(
                    "{}: FIFO queue name must end with '{}'",
                    resource.id, FIFO_SUFFIX
                ))
                .with_attribute("queue_name"),
            );
        } else if !fifo && name.ends_with(FIFO_SUFFIX) {
            diagnostics.push(
                Diagnostic::error(format!(
                    "{}: only FIFO queues may end with '{}'",
                    resource.id, FIFO_SUFFIX
                ))
                .with_attribute("queue_name")
                .with_detail("set fifo_queue = true"),
            );
        }
    }
    if !fifo && resource.attributes.contains_key("content_based_deduplication") {
        diagnostics.push(
            Diagnostic::error(format!(
                "{}: content_based_deduplication requires a FIFO queue",
                resource.id
            ))
            .with_attribute("content_based_deduplication"),
        );
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::services::ResourceHandler;
    use crate::testing::{FakeCloudControl, FakeS3, client_with};

    fn named(name: &str) -> Resource {
        Resource::new("sqs_queue", "jobs").with_attribute("queue_name", Value::String(name.to_string()))
    }

    #[test]
    fn fifo_names_need_the_suffix() {
        let def = queue();
        let fifo = named("jobs").with_attribute("fifo_queue", Value::Bool(true));
        assert_eq!(def.validate_config(&fifo).len(), 1);

        let fifo = named("jobs.fifo").with_attribute("fifo_queue", Value::Bool(true));
        assert!(def.validate_config(&fifo).is_empty());

        let standard = named("jobs.fifo");
        let diagnostics = def.validate_config(&standard);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].detail.as_deref(), Some("set fifo_queue = true"));
    }

    #[tokio::test]
    async fn standard_queue_omits_fifo_queue() {
        let cc = Arc::new(FakeCloudControl::default());
        let client = client_with(cc.clone(), Arc::new(FakeS3::default()));
        let def = queue();

        let state = def.create(&client, &named("jobs")).await.unwrap();
        let identifier = state.identifier.unwrap();
        let sent = cc.get("AWS::SQS::Queue", &identifier).unwrap();
        assert_eq!(sent["QueueName"], "jobs");
        assert!(sent.get("FifoQueue").is_none());

        let fifo = named("jobs.fifo").with_attribute("fifo_queue", Value::Bool(true));
        let state = def.create(&client, &fifo).await.unwrap();
        let sent = cc.get("AWS::SQS::Queue", &state.identifier.unwrap()).unwrap();
        assert_eq!(sent["FifoQueue"], true);
    }

    #[test]
    fn visibility_timeout_range() {
        let schema = queue().schema;
        let mut attrs = std::collections::HashMap::new();
        attrs.insert("visibility_timeout".to_string(), Value::Int(43201));
        assert!(schema.validate(&attrs).is_err());
        attrs.insert("visibility_timeout".to_string(), Value::Int(0));
        assert!(schema.validate(&attrs).is_ok());
    }
}
