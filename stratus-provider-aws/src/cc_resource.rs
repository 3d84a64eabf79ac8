//! Generic Cloud Control resource
//!
//! A [`ResourceDefinition`] describes one resource type: its CloudFormation
//! type name, schema and identifier shape. Every definition shares the same
//! CRUD-L implementation below.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde_json::{Value as Json, json};
use stratus_core::finder::ignore_not_found;
use stratus_core::id::parse_resource_id;
use stratus_core::paginate::collect_pages;
use stratus_core::provider::{Diagnostic, ProviderError, ProviderResult};
use stratus_core::registry::Registered;
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_core::retry::{retry_transient, retry_when_not_found};
use stratus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use stratus_core::tags::{KeyValueTags, merge_default_tags};
use stratus_core::timeouts::Timeouts;
use uuid::Uuid;

use crate::cloudcontrol::{ResourceDescription, wait_for_request};
use crate::conns::AwsClient;
use crate::convert::{self, ID, TAGS, TAGS_ALL, TAGS_PROPERTY};
use crate::services::ResourceHandler;

/// Separator of composite Cloud Control identifiers
pub const IDENTIFIER_SEPARATOR: &str = "|";

/// Interval between reads while a new object becomes visible
const VISIBILITY_INTERVAL: Duration = Duration::from_secs(2);

pub type ConfigValidator = fn(&Resource) -> Vec<Diagnostic>;

pub struct ResourceDefinition {
    pub type_name: &'static str,
    pub cfn_type: &'static str,
    pub schema: ResourceSchema,
    pub has_tags: bool,
    /// Attributes whose values, joined by `|`, form the identifier
    pub identifier_parts: Vec<&'static str>,
    validator: Option<ConfigValidator>,
}

impl ResourceDefinition {
    pub fn new(type_name: &'static str, cfn_type: &'static str) -> Self {
        let schema = ResourceSchema::new(type_name).attribute(
            AttributeSchema::new(ID, AttributeType::String)
                .computed()
                .with_description("Cloud Control identifier"),
        );
        Self {
            type_name,
            cfn_type,
            schema,
            has_tags: false,
            identifier_parts: Vec::new(),
            validator: None,
        }
    }

    pub fn attribute(mut self, attr: AttributeSchema) -> Self {
        self.schema = self.schema.attribute(attr);
        self
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.schema = self.schema.with_description(desc);
        self
    }

    pub fn with_tags(mut self) -> Self {
        self.has_tags = true;
        self.schema = self
            .schema
            .attribute(AttributeSchema::new(TAGS, types::tags()))
            .attribute(
                AttributeSchema::new(TAGS_ALL, types::tags())
                    .computed()
                    .with_description("Tags on the object, provider default tags included"),
            );
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.schema = self.schema.with_timeouts(timeouts);
        self
    }

    pub fn with_composite_identifier(mut self, parts: &[&'static str]) -> Self {
        self.identifier_parts = parts.to_vec();
        self
    }

    pub fn with_validator(mut self, validator: ConfigValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    fn identifier_values(&self, identifier: &str) -> ProviderResult<Vec<(&'static str, String)>> {
        if self.identifier_parts.is_empty() {
            return Ok(Vec::new());
        }
        let values = parse_resource_id(
            identifier,
            self.identifier_parts.len(),
            IDENTIFIER_SEPARATOR,
        )
        .map_err(|e| ProviderError::validation(e.to_string()))?;
        Ok(self.identifier_parts.iter().copied().zip(values).collect())
    }

    /// Desired-state document for CreateResource
    fn desired_state(&self, client: &AwsClient, attributes: &HashMap<String, Value>) -> ProviderResult<String> {
        let mut props = convert::to_properties(&self.schema, attributes);
        if self.has_tags {
            let tags = self.desired_tags(client, attributes);
            if !tags.is_empty() {
                props.insert(TAGS_PROPERTY.to_string(), Json::Array(tags.to_aws_list()));
            }
        }
        serde_json::to_string(&Json::Object(props))
            .map_err(|e| ProviderError::new(format!("failed to encode desired state: {}", e)))
    }

    fn desired_tags(&self, client: &AwsClient, attributes: &HashMap<String, Value>) -> KeyValueTags {
        let own = attributes
            .get(TAGS)
            .map(KeyValueTags::from_value)
            .unwrap_or_default();
        merge_default_tags(&client.default_tags(), &own)
    }

    fn state_from(
        &self,
        client: &AwsClient,
        id: &ResourceId,
        desc: &ResourceDescription,
    ) -> ProviderResult<State> {
        let mut attributes = convert::from_properties(&self.schema, &desc.properties);
        for (name, value) in self.identifier_values(&desc.identifier)? {
            attributes
                .entry(name.to_string())
                .or_insert(Value::String(value));
        }
        attributes.insert(ID.to_string(), Value::String(desc.identifier.clone()));

        if self.has_tags {
            let all = live_tags(desc)
                .ignore_aws()
                .ignore_config(client.ignore_tags());
            let own = convert::resource_tags(&all, &client.default_tags(), &KeyValueTags::new());
            attributes.insert(TAGS.to_string(), own.to_value());
            attributes.insert(TAGS_ALL.to_string(), all.to_value());
        }

        Ok(State::existing(id.clone(), attributes).with_identifier(&desc.identifier))
    }

    /// True when the desired tags differ from the tags recorded in `current`
    fn tags_changed(
        &self,
        client: &AwsClient,
        current: &HashMap<String, Value>,
        desired: &HashMap<String, Value>,
    ) -> bool {
        let have = current
            .get(TAGS_ALL)
            .map(KeyValueTags::from_value)
            .unwrap_or_default();
        self.has_tags && self.desired_tags(client, desired) != have
    }

    /// Live tags this provider leaves alone: `aws:` system tags and the keys
    /// matched by `ignore_tags`
    async fn unmanaged_tags(
        &self,
        client: &AwsClient,
        identifier: &str,
    ) -> ProviderResult<KeyValueTags> {
        let policy = client.retry_policy();
        let api = client.cloudcontrol.as_ref();
        let cfn_type = self.cfn_type;
        let desc = retry_transient(&policy, move || async move {
            api.get_resource(cfn_type, identifier)
                .await
                .map_err(ProviderError::from)
        })
        .await?;
        Ok(live_tags(&desc).unmanaged(client.ignore_tags()))
    }

    /// JSON Patch operations turning the current object into the desired one.
    /// A tag change sends the desired tags together with `unmanaged`.
    ///
    /// Fails when a create-only attribute would change.
    fn patch_operations(
        &self,
        client: &AwsClient,
        current: &HashMap<String, Value>,
        desired: &HashMap<String, Value>,
        unmanaged: &KeyValueTags,
    ) -> ProviderResult<Vec<Json>> {
        let mut attrs: Vec<&AttributeSchema> = self.schema.attributes.values().collect();
        attrs.sort_by(|a, b| a.name.cmp(&b.name));

        let mut ops = Vec::new();
        for attr in attrs {
            if attr.is_computed_only() || matches!(attr.name.as_str(), ID | TAGS | TAGS_ALL) {
                continue;
            }
            let path = format!("/{}", convert::wire_name(attr));
            let want = desired
                .get(&attr.name)
                .and_then(|v| convert::value_to_json(v, &attr.attr_type));
            let have = current
                .get(&attr.name)
                .and_then(|v| convert::value_to_json(v, &attr.attr_type));
            let op = match (want, have) {
                (Some(want), Some(have)) if want == have => continue,
                (Some(want), Some(_)) => json!({"op": "replace", "path": path, "value": want}),
                (Some(want), None) => json!({"op": "add", "path": path, "value": want}),
                (None, Some(_)) if !attr.computed => json!({"op": "remove", "path": path}),
                (None, _) => continue,
            };
            if attr.force_new {
                return Err(ProviderError::unsupported(format!(
                    "attribute '{}' cannot be updated in place and requires replacement",
                    attr.name
                )));
            }
            ops.push(op);
        }

        if self.tags_changed(client, current, desired) {
            let have = current
                .get(TAGS_ALL)
                .map(KeyValueTags::from_value)
                .unwrap_or_default();
            let mut sent = unmanaged.clone();
            sent.extend(&self.desired_tags(client, desired));
            let op = if sent.is_empty() {
                json!({"op": "remove", "path": "/Tags"})
            } else if have.is_empty() && unmanaged.is_empty() {
                json!({"op": "add", "path": "/Tags", "value": sent.to_aws_list()})
            } else {
                json!({"op": "replace", "path": "/Tags", "value": sent.to_aws_list()})
            };
            ops.push(op);
        }
        Ok(ops)
    }

    /// Read a just-mutated object, waiting for it to become visible
    async fn read_back(
        &self,
        client: &AwsClient,
        id: &ResourceId,
        identifier: &str,
        timeout: Duration,
        configured: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let interval = client.poll_interval().unwrap_or(VISIBILITY_INTERVAL);
        let state = retry_when_not_found(timeout, interval, move || async move {
            self.read(client, id, identifier).await
        })
        .await?;
        let mut state = convert::settle(&self.schema, &client.default_tags(), state, configured);
        // Settings the handler does not report back keep their configured value
        for (name, value) in configured {
            state
                .attributes
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        Ok(state)
    }
}

/// Every tag in a Cloud Control description
fn live_tags(desc: &ResourceDescription) -> KeyValueTags {
    desc.properties
        .get(TAGS_PROPERTY)
        .and_then(Json::as_array)
        .map(|list| KeyValueTags::from_aws_list(list))
        .unwrap_or_default()
}

impl Registered for ResourceDefinition {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }
}

#[async_trait]
impl ResourceHandler for ResourceDefinition {
    async fn read(
        &self,
        client: &AwsClient,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        self.identifier_values(identifier)?;
        let policy = client.retry_policy();
        let api = client.cloudcontrol.as_ref();
        let cfn_type = self.cfn_type;
        debug!("reading {} {} ({})", cfn_type, identifier, id);
        let desc = retry_transient(&policy, move || async move {
            api.get_resource(cfn_type, identifier)
                .await
                .map_err(ProviderError::from)
        })
        .await?;
        self.state_from(client, id, &desc)
    }

    async fn create(&self, client: &AwsClient, resource: &Resource) -> ProviderResult<State> {
        let mut attributes = resource.attributes.clone();
        self.schema.apply_defaults(&mut attributes);
        let timeouts = self.schema.timeouts.resolve(&attributes);
        let desired = self.desired_state(client, &attributes)?;

        let policy = client.retry_policy();
        let api = client.cloudcontrol.as_ref();
        let cfn_type = self.cfn_type;
        let desired = desired.as_str();
        let client_token = Uuid::new_v4().to_string();
        let token = client_token.as_str();
        debug!("creating {} for {}", cfn_type, resource.id);
        let request = retry_transient(&policy, move || async move {
            api.create_resource(cfn_type, desired, token)
                .await
                .map_err(ProviderError::from)
        })
        .await?;
        let event = wait_for_request(client, &request.request_token, timeouts.create).await?;

        let identifier = event.identifier.ok_or_else(|| {
            ProviderError::new(format!(
                "create request {} finished without an identifier",
                event.request_token
            ))
        })?;
        info!("created {} ({})", resource.id, identifier);
        self.read_back(client, &resource.id, &identifier, timeouts.read, &attributes)
            .await
    }

    async fn update(
        &self,
        client: &AwsClient,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let mut desired = to.attributes.clone();
        self.schema.apply_defaults(&mut desired);
        let timeouts = self.schema.timeouts.resolve(&desired);

        let unmanaged = if self.tags_changed(client, &from.attributes, &desired) {
            self.unmanaged_tags(client, identifier).await?
        } else {
            KeyValueTags::new()
        };
        let ops = self.patch_operations(client, &from.attributes, &desired, &unmanaged)?;
        if ops.is_empty() {
            debug!("{} is up to date, skipping update", id);
            return Ok(convert::settle(
                &self.schema,
                &client.default_tags(),
                from.clone(),
                &desired,
            ));
        }
        let patch = serde_json::to_string(&ops)
            .map_err(|e| ProviderError::new(format!("failed to encode patch: {}", e)))?;

        let policy = client.retry_policy();
        let api = client.cloudcontrol.as_ref();
        let cfn_type = self.cfn_type;
        let patch = patch.as_str();
        let client_token = Uuid::new_v4().to_string();
        let token = client_token.as_str();
        debug!("updating {} {} with {}", cfn_type, identifier, patch);
        let request = retry_transient(&policy, move || async move {
            api.update_resource(cfn_type, identifier, patch, token)
                .await
                .map_err(ProviderError::from)
        })
        .await?;
        wait_for_request(client, &request.request_token, timeouts.update).await?;

        info!("updated {} ({})", id, identifier);
        self.read_back(client, id, identifier, timeouts.read, &desired)
            .await
    }

    async fn delete(
        &self,
        client: &AwsClient,
        id: &ResourceId,
        identifier: &str,
        attributes: &HashMap<String, Value>,
    ) -> ProviderResult<()> {
        let timeouts = self.schema.timeouts.resolve(attributes);
        let policy = client.retry_policy();
        let api = client.cloudcontrol.as_ref();
        let cfn_type = self.cfn_type;
        let client_token = Uuid::new_v4().to_string();
        let token = client_token.as_str();
        debug!("deleting {} {}", cfn_type, identifier);
        let result = async {
            let request = retry_transient(&policy, move || async move {
                api.delete_resource(cfn_type, identifier, token)
                    .await
                    .map_err(ProviderError::from)
            })
            .await?;
            wait_for_request(client, &request.request_token, timeouts.delete).await
        }
        .await;
        ignore_not_found(result.map(|_| ()))?;
        info!("deleted {} ({})", id, identifier);
        Ok(())
    }

    async fn list(&self, client: &AwsClient) -> ProviderResult<Vec<State>> {
        let policy = client.retry_policy();
        let policy = &policy;
        let api = client.cloudcontrol.as_ref();
        let cfn_type = self.cfn_type;
        let descriptions = collect_pages(move |token: Option<String>| async move {
            retry_transient(policy, || {
                let token = token.clone();
                async move { api.list_resources(cfn_type, token).await.map_err(ProviderError::from) }
            })
            .await
        })
        .await?;

        let mut states = Vec::with_capacity(descriptions.len());
        for desc in descriptions {
            let id = ResourceId::new(self.type_name, &desc.identifier);
            match self.read(client, &id, &desc.identifier).await {
                Ok(state) => states.push(state),
                // Deleted between the list and the read
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(states)
    }

    fn validate_config(&self, resource: &Resource) -> Vec<Diagnostic> {
        self.validator
            .map(|validate| validate(resource))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCloudControl, FakeS3, client_with, client_with_config};
    use std::sync::Arc;
    use stratus_core::config::ProviderConfig;
    use stratus_core::provider::ErrorKind;

    const VPC: &str = "AWS::EC2::VPC";

    fn vpc() -> ResourceDefinition {
        ResourceDefinition::new("ec2_vpc", VPC)
            .attribute(AttributeSchema::new("cidr_block", types::cidr()).force_new())
            .attribute(AttributeSchema::new("enable_dns_hostnames", AttributeType::Bool))
            .attribute(
                AttributeSchema::new("instance_tenancy", AttributeType::String)
                    .optional_computed(),
            )
            .with_tags()
    }

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn tags(pairs: &[(&str, &str)]) -> Value {
        Value::Map(pairs.iter().map(|(k, v)| (k.to_string(), s(v))).collect())
    }

    fn desired() -> Resource {
        Resource::new("ec2_vpc", "main")
            .with_attribute("cidr_block", s("10.0.0.0/16"))
            .with_attribute("tags", tags(&[("Name", "main")]))
    }

    #[tokio::test]
    async fn create_reads_back_the_new_object() {
        let cc = Arc::new(FakeCloudControl::default());
        cc.compute(VPC, json!({"InstanceTenancy": "default"}));
        let client = client_with(cc.clone(), Arc::new(FakeS3::default()));

        let state = vpc().create(&client, &desired()).await.unwrap();

        assert!(state.exists);
        let identifier = state.identifier.clone().unwrap();
        assert_eq!(state.attributes.get("id"), Some(&s(&identifier)));
        assert_eq!(state.attributes.get("instance_tenancy"), Some(&s("default")));
        assert_eq!(state.attributes.get("tags"), Some(&tags(&[("Name", "main")])));
        let stored = cc.get(VPC, &identifier).unwrap();
        assert_eq!(stored["Tags"], json!([{"Key": "Name", "Value": "main"}]));
    }

    #[tokio::test]
    async fn create_waits_for_eventual_consistency() {
        let cc = Arc::new(FakeCloudControl::default());
        cc.hide_next_reads(2);
        let client = client_with(cc.clone(), Arc::new(FakeS3::default()));

        let state = vpc().create(&client, &desired()).await.unwrap();

        assert!(state.exists);
        let gets = cc.calls().iter().filter(|c| c.starts_with("get")).count();
        assert_eq!(gets, 3);
    }

    #[tokio::test]
    async fn default_tags_are_merged_and_split_back_out() {
        let cc = Arc::new(FakeCloudControl::default());
        let mut config = ProviderConfig::new("us-east-1");
        config.default_tags.insert("Env".to_string(), "dev".to_string());
        let client = client_with_config(config, cc.clone(), Arc::new(FakeS3::default()));

        let state = vpc().create(&client, &desired()).await.unwrap();

        assert_eq!(state.attributes.get("tags"), Some(&tags(&[("Name", "main")])));
        assert_eq!(
            state.attributes.get("tags_all"),
            Some(&tags(&[("Env", "dev"), ("Name", "main")]))
        );
    }

    #[tokio::test]
    async fn failed_create_surfaces_handler_message() {
        let cc = Arc::new(FakeCloudControl::default());
        cc.fail_next(VPC, "InvalidRequest", "The CIDR '10.0.0.0/16' conflicts");
        let client = client_with(cc, Arc::new(FakeS3::default()));

        let err = vpc().create(&client, &desired()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Api);
        assert!(err.message.contains("conflicts"));
    }

    #[tokio::test]
    async fn create_is_sent_once_when_the_request_fails() {
        let cc = Arc::new(FakeCloudControl::default());
        cc.fail_next(VPC, "Throttling", "Rate exceeded");
        let client = client_with(cc.clone(), Arc::new(FakeS3::default()));

        let err = vpc().create(&client, &desired()).await.unwrap_err();
        assert!(err.is_retryable());
        let creates = cc.calls().iter().filter(|c| c.starts_with("create")).count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn throttled_create_is_resent_with_the_same_client_token() {
        let cc = Arc::new(FakeCloudControl::default());
        cc.throttle_next_calls(1);
        let client = client_with(cc.clone(), Arc::new(FakeS3::default()));

        let state = vpc().create(&client, &desired()).await.unwrap();
        assert!(state.exists);

        let tokens = cc.client_tokens.lock().unwrap().clone();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0], tokens[1]);
        let creates = cc.calls().iter().filter(|c| c.starts_with("create")).count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn declared_default_tag_stays_in_tags() {
        let cc = Arc::new(FakeCloudControl::default());
        let mut config = ProviderConfig::new("us-east-1");
        config.default_tags.insert("Env".to_string(), "dev".to_string());
        let client = client_with_config(config, cc.clone(), Arc::new(FakeS3::default()));
        let def = vpc();
        let wanted = desired().with_attribute("tags", tags(&[("Env", "dev"), ("Name", "main")]));

        let state = def.create(&client, &wanted).await.unwrap();
        assert_eq!(
            state.attributes.get("tags"),
            Some(&tags(&[("Env", "dev"), ("Name", "main")]))
        );

        let identifier = state.identifier.clone().unwrap();
        let refreshed = def.refresh(&client, &state, &identifier).await.unwrap();
        assert_eq!(refreshed.attributes.get("tags"), state.attributes.get("tags"));
        assert!(!stratus_core::differ::diff(&wanted, &refreshed, Some(&def.schema)).is_change());
    }

    #[tokio::test]
    async fn tag_update_keeps_ignored_and_system_tags() {
        let cc = Arc::new(FakeCloudControl::default());
        let mut config = ProviderConfig::new("us-east-1");
        config.ignore_tags.keys.push("Owner".to_string());
        let client = client_with_config(config, cc.clone(), Arc::new(FakeS3::default()));
        let def = vpc();
        let from = def.create(&client, &desired()).await.unwrap();
        let identifier = from.identifier.clone().unwrap();

        let mut live = cc.get(VPC, &identifier).unwrap();
        live["Tags"] = json!([
            {"Key": "Name", "Value": "main"},
            {"Key": "Owner", "Value": "alice"},
            {"Key": "aws:cloudformation:stack-name", "Value": "net"}
        ]);
        cc.insert(VPC, &identifier, live);

        let to = desired().with_attribute("tags", tags(&[("Team", "data")]));
        let state = def
            .update(&client, &from.id, &identifier, &from, &to)
            .await
            .unwrap();

        assert_eq!(state.attributes.get("tags"), Some(&tags(&[("Team", "data")])));
        let stored = KeyValueTags::from_aws_list(cc.get(VPC, &identifier).unwrap()["Tags"].as_array().unwrap());
        assert_eq!(stored.get("Owner"), Some("alice"));
        assert_eq!(stored.get("aws:cloudformation:stack-name"), Some("net"));
        assert_eq!(stored.get("Team"), Some("data"));
        assert_eq!(stored.get("Name"), None);
    }

    #[tokio::test]
    async fn read_of_missing_object_is_not_found() {
        let client = client_with(
            Arc::new(FakeCloudControl::default()),
            Arc::new(FakeS3::default()),
        );
        let err = vpc()
            .read(&client, &ResourceId::new("ec2_vpc", "main"), "vpc-404")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn update_sends_json_patch() {
        let cc = Arc::new(FakeCloudControl::default());
        let client = client_with(cc.clone(), Arc::new(FakeS3::default()));
        let def = vpc();
        let from = def.create(&client, &desired()).await.unwrap();
        let identifier = from.identifier.clone().unwrap();

        let to = Resource::new("ec2_vpc", "main")
            .with_attribute("cidr_block", s("10.0.0.0/16"))
            .with_attribute("enable_dns_hostnames", Value::Bool(true))
            .with_attribute("tags", tags(&[("Name", "primary")]));
        let state = def
            .update(&client, &from.id, &identifier, &from, &to)
            .await
            .unwrap();

        assert_eq!(state.attributes.get("enable_dns_hostnames"), Some(&Value::Bool(true)));
        let patches = cc.patches.lock().unwrap().clone();
        assert_eq!(
            patches,
            vec![json!([
                {"op": "add", "path": "/EnableDnsHostnames", "value": true},
                {"op": "replace", "path": "/Tags", "value": [{"Key": "Name", "Value": "primary"}]}
            ])]
        );
    }

    #[tokio::test]
    async fn update_without_changes_makes_no_call() {
        let cc = Arc::new(FakeCloudControl::default());
        let client = client_with(cc.clone(), Arc::new(FakeS3::default()));
        let def = vpc();
        let from = def.create(&client, &desired()).await.unwrap();
        let identifier = from.identifier.clone().unwrap();

        let state = def
            .update(&client, &from.id, &identifier, &from, &desired())
            .await
            .unwrap();

        assert_eq!(state, from);
        assert!(!cc.calls().iter().any(|c| c.starts_with("update")));
    }

    #[tokio::test]
    async fn update_of_create_only_attribute_is_refused() {
        let cc = Arc::new(FakeCloudControl::default());
        let client = client_with(cc, Arc::new(FakeS3::default()));
        let def = vpc();
        let from = def.create(&client, &desired()).await.unwrap();
        let identifier = from.identifier.clone().unwrap();
        let to = desired().with_attribute("cidr_block", s("10.1.0.0/16"));

        let err = def
            .update(&client, &from.id, &identifier, &from, &to)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unsupported);
        assert!(err.message.contains("requires replacement"));
    }

    #[tokio::test]
    async fn delete_of_missing_object_succeeds() {
        let cc = Arc::new(FakeCloudControl::default());
        let client = client_with(cc.clone(), Arc::new(FakeS3::default()));

        vpc()
            .delete(
                &client,
                &ResourceId::new("ec2_vpc", "main"),
                "vpc-gone",
                &HashMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(cc.calls(), vec!["delete AWS::EC2::VPC vpc-gone"]);
    }

    #[tokio::test]
    async fn list_pages_through_every_object() {
        let cc = Arc::new(FakeCloudControl::default());
        for i in 0..5 {
            cc.insert(VPC, &format!("vpc-{}", i), json!({"CidrBlock": "10.0.0.0/16"}));
        }
        let client = client_with(cc, Arc::new(FakeS3::default()));

        let states = vpc().list(&client).await.unwrap();

        assert_eq!(states.len(), 5);
        assert_eq!(states[0].id, ResourceId::new("ec2_vpc", "vpc-0"));
        assert_eq!(states[4].attributes.get("cidr_block"), Some(&s("10.0.0.0/16")));
    }

    #[tokio::test]
    async fn composite_identifiers_fill_their_parts() {
        let cc = Arc::new(FakeCloudControl::default());
        cc.insert("AWS::EC2::Route", "rtb-1|0.0.0.0/0", json!({"GatewayId": "igw-1"}));
        let client = client_with(cc, Arc::new(FakeS3::default()));
        let route = ResourceDefinition::new("ec2_route", "AWS::EC2::Route")
            .attribute(AttributeSchema::new("route_table_id", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("destination_cidr_block", types::cidr()).force_new())
            .attribute(AttributeSchema::new("gateway_id", AttributeType::String))
            .with_composite_identifier(&["route_table_id", "destination_cidr_block"]);
        let id = ResourceId::new("ec2_route", "default");

        let state = route.read(&client, &id, "rtb-1|0.0.0.0/0").await.unwrap();
        assert_eq!(state.attributes.get("route_table_id"), Some(&s("rtb-1")));
        assert_eq!(
            state.attributes.get("destination_cidr_block"),
            Some(&s("0.0.0.0/0"))
        );

        let err = route.read(&client, &id, "rtb-1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
