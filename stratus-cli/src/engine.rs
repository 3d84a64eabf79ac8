//! Plan and apply against a Provider
//!
//! Recorded state is refreshed through the provider, references are resolved
//! from what is known so far, and each effect is re-resolved right before it
//! runs so that it sees identifiers assigned earlier in the same apply.

use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;

use colored::Colorize;
use log::warn;
use stratus_core::differ::create_plan;
use stratus_core::effect::Effect;
use stratus_core::interpreter::{ApplyHooks, ApplyResult, EffectOutcome, Interpreter};
use stratus_core::plan::Plan;
use stratus_core::provider::{Provider, ProviderError, ProviderResult};
use stratus_core::resource::{ResourceId, State};
use stratus_core::schema::ResourceSchema;

use crate::config::{Bindings, Configuration, unresolved};
use crate::display::format_effect;
use crate::state::{LocalState, StateFile};

/// Current state of every resource recorded in `state`. Objects that no
/// longer exist are left out.
pub async fn refresh<P: Provider>(
    provider: &P,
    state: &StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current = HashMap::new();
    for entry in &state.resources {
        let id = entry.id();
        let found = provider
            .refresh(&entry.to_state())
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;
        if found.exists {
            current.insert(id, found);
        } else {
            warn!("{} ({}) no longer exists", id, entry.identifier);
        }
    }
    Ok(current)
}

/// Bring recorded state in line with a refresh
pub fn sync_state(state: &mut StateFile, current: &HashMap<ResourceId, State>) {
    let gone: Vec<ResourceId> = state
        .resources
        .iter()
        .map(|r| r.id())
        .filter(|id| !current.contains_key(id))
        .collect();
    for id in gone {
        state.remove(&id);
    }
    let mut ids: Vec<&ResourceId> = current.keys().collect();
    ids.sort();
    for id in ids {
        state.upsert(&current[id]);
    }
}

pub fn schemas<'a, P: Provider>(
    provider: &P,
    types: impl IntoIterator<Item = &'a str>,
) -> HashMap<String, ResourceSchema> {
    types
        .into_iter()
        .filter_map(|t| provider.schema(t).map(|s| (t.to_string(), s)))
        .collect()
}

pub struct Prepared {
    pub plan: Plan,
    pub bindings: Bindings,
    pub current: HashMap<ResourceId, State>,
    pub schemas: HashMap<String, ResourceSchema>,
}

/// Refresh, read data sources and compute the plan
pub async fn prepare<P: Provider>(
    interpreter: &Interpreter<P>,
    config: &Configuration,
    state: &StateFile,
) -> Result<Prepared, String> {
    let current = refresh(interpreter.provider(), state).await?;

    let mut bindings = Bindings::default();
    for resource in config.managed() {
        bindings.record(&resource.id.name, &resource.attributes, false);
        if let Some(found) = current.get(&resource.id) {
            bindings.record(&resource.id.name, &found.attributes, false);
        }
    }

    for data in config.data_sources() {
        let resolved = bindings.resolve_resource(data);
        if let Some(reference) = unresolved(&resolved) {
            return Err(format!(
                "{}: cannot be read before {} is known",
                data.id, reference
            ));
        }
        match interpreter.execute(&Effect::Read(resolved)).await {
            Ok(EffectOutcome::Read { state }) => {
                bindings.record(&data.id.name, &state.attributes, true)
            }
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }

    let desired: Vec<_> = config
        .managed()
        .map(|r| bindings.resolve_resource(r))
        .collect();
    let types: BTreeSet<&str> = desired
        .iter()
        .map(|r| r.id.resource_type.as_str())
        .chain(state.resources.iter().map(|r| r.resource_type.as_str()))
        .collect();
    let schemas = schemas(interpreter.provider(), types);
    let plan = create_plan(&desired, &current, &schemas);

    Ok(Prepared {
        plan,
        bindings,
        current,
        schemas,
    })
}

/// Deletion of every recorded resource: those missing from the
/// configuration first, then the configured ones in reverse dependency order
pub fn destroy_plan(config: &Configuration, current: &HashMap<ResourceId, State>) -> Plan {
    let mut plan = Plan::new();
    let configured: Vec<&ResourceId> = config.managed().map(|r| &r.id).collect();

    let mut orphans: Vec<&State> = current
        .values()
        .filter(|s| !configured.contains(&&s.id))
        .collect();
    orphans.sort_by(|a, b| a.id.cmp(&b.id));
    for state in orphans {
        plan.add(Effect::delete_state(state));
    }

    for id in configured.into_iter().rev() {
        if let Some(state) = current.get(id) {
            plan.add(Effect::delete_state(state));
        }
    }
    plan
}

fn resolve_effect(effect: &Effect, bindings: &Bindings) -> Effect {
    match effect {
        Effect::Create(r) => Effect::Create(bindings.resolve_resource(r)),
        Effect::Update {
            id,
            from,
            to,
            changed_attributes,
        } => Effect::Update {
            id: id.clone(),
            from: from.clone(),
            to: bindings.resolve_resource(to),
            changed_attributes: changed_attributes.clone(),
        },
        Effect::Replace {
            id,
            from,
            to,
            changed_attributes,
        } => Effect::Replace {
            id: id.clone(),
            from: from.clone(),
            to: bindings.resolve_resource(to),
            changed_attributes: changed_attributes.clone(),
        },
        other => other.clone(),
    }
}

fn unresolved_reference(effect: &Effect) -> Option<String> {
    match effect {
        Effect::Create(r) | Effect::Update { to: r, .. } | Effect::Replace { to: r, .. } => {
            unresolved(r)
        }
        _ => None,
    }
}

/// Resolves effects right before they run and records each success
struct StateRecorder<'a> {
    bindings: &'a mut Bindings,
    state: &'a mut StateFile,
    store: &'a LocalState,
    /// References to resources not created yet stay unresolved in a dry run
    dry_run: bool,
    save_error: Option<String>,
}

impl ApplyHooks for StateRecorder<'_> {
    fn prepare(&mut self, effect: &Effect) -> ProviderResult<Effect> {
        let effect = resolve_effect(effect, self.bindings);
        match unresolved_reference(&effect) {
            Some(reference) if !self.dry_run => Err(ProviderError::validation(format!(
                "unresolved reference {}",
                reference
            ))),
            _ => Ok(effect),
        }
    }

    fn finished(
        &mut self,
        effect: &Effect,
        result: &ProviderResult<EffectOutcome>,
    ) -> ControlFlow<()> {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), format_effect(effect), e);
                return ControlFlow::Continue(());
            }
        };
        if let EffectOutcome::Skipped { reason } = outcome {
            println!(
                "  {} {} ({})",
                "-".dimmed(),
                format_effect(effect),
                reason.dimmed()
            );
            return ControlFlow::Continue(());
        }

        println!("  {} {}", "✓".green(), format_effect(effect));
        record(outcome, effect.resource_id(), self.bindings, self.state);
        match self.store.save(self.state) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => {
                self.save_error = Some(e.to_string());
                ControlFlow::Break(())
            }
        }
    }
}

/// Execute the mutating effects of `plan` in order, saving state after each
/// success. Whether later effects run after a failure is up to the
/// interpreter's configuration; anything that depended on the failed
/// resource fails on its unresolved reference.
pub async fn apply<P: Provider>(
    interpreter: &Interpreter<P>,
    plan: &Plan,
    bindings: &mut Bindings,
    state: &mut StateFile,
    store: &LocalState,
) -> Result<ApplyResult, String> {
    let mut pending = Plan::new();
    for effect in plan.effects().iter().filter(|e| e.is_mutating()) {
        pending.add(effect.clone());
    }

    let mut recorder = StateRecorder {
        bindings,
        state,
        store,
        dry_run: interpreter.config().dry_run,
        save_error: None,
    };
    let result = interpreter.apply_with(&pending, &mut recorder).await;
    match recorder.save_error {
        Some(e) => Err(e),
        None => Ok(result),
    }
}

fn record(outcome: &EffectOutcome, id: &ResourceId, bindings: &mut Bindings, state: &mut StateFile) {
    match outcome {
        EffectOutcome::Created { state: s }
        | EffectOutcome::Updated { state: s }
        | EffectOutcome::Replaced { state: s } => {
            state.upsert(s);
            bindings.record(&id.name, &s.attributes, true);
        }
        EffectOutcome::Deleted => {
            state.remove(id);
        }
        EffectOutcome::Read { .. } | EffectOutcome::Skipped { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use stratus_core::interpreter::InterpreterConfig;
    use stratus_core::provider::BoxFuture;
    use stratus_core::resource::{Resource, Value};
    use stratus_provider_aws::AwsProvider;
    use stratus_provider_aws::testing::{FakeCloudControl, FakeS3, client_with_config};
    use tempfile::TempDir;

    use crate::config::parse;

    /// Provider backed by a map of identifier to attributes
    #[derive(Default)]
    struct FakeProvider {
        objects: Mutex<HashMap<String, HashMap<String, Value>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Provider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn resource_types(&self) -> Vec<String> {
            vec!["ec2_vpc".to_string(), "ec2_subnet".to_string()]
        }

        fn data_source_types(&self) -> Vec<String> {
            vec!["ec2_vpc".to_string()]
        }

        fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
            Some(ResourceSchema::new(resource_type))
        }

        fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            let identifier = identifier.to_string();
            Box::pin(async move {
                Ok(match self.objects.lock().unwrap().get(&identifier) {
                    Some(attrs) => State::existing(id, attrs.clone()).with_identifier(identifier),
                    None => State::not_found(id),
                })
            })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let resource = resource.clone();
            Box::pin(async move {
                self.log(format!("create {}", resource.id));
                let mut objects = self.objects.lock().unwrap();
                let identifier = format!("{}-{}", resource.id.resource_type, objects.len() + 1);
                let mut attrs = resource.attributes.clone();
                attrs.insert("id".to_string(), Value::String(identifier.clone()));
                objects.insert(identifier.clone(), attrs.clone());
                Ok(State::existing(resource.id, attrs).with_identifier(identifier))
            })
        }

        fn update(
            &self,
            id: &ResourceId,
            identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            let identifier = identifier.to_string();
            let to = to.clone();
            Box::pin(async move {
                self.log(format!("update {}", id));
                let mut attrs = to.attributes.clone();
                attrs.insert("id".to_string(), Value::String(identifier.clone()));
                self.objects
                    .lock()
                    .unwrap()
                    .insert(identifier.clone(), attrs.clone());
                Ok(State::existing(id, attrs).with_identifier(identifier))
            })
        }

        fn delete(
            &self,
            id: &ResourceId,
            identifier: &str,
            _attributes: &HashMap<String, Value>,
        ) -> BoxFuture<'_, ProviderResult<()>> {
            let id = id.clone();
            let identifier = identifier.to_string();
            Box::pin(async move {
                self.log(format!("delete {}", id));
                self.objects.lock().unwrap().remove(&identifier);
                Ok(())
            })
        }

        fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let resource = resource.clone();
            Box::pin(async move {
                let mut attrs = resource.attributes.clone();
                attrs.insert(
                    "cidr_block".to_string(),
                    Value::String("172.31.0.0/16".to_string()),
                );
                Ok(State::existing(resource.id, attrs))
            })
        }

        fn list(&self, _resource_type: &str) -> BoxFuture<'_, ProviderResult<Vec<State>>> {
            Box::pin(async move { Ok(Vec::new()) })
        }
    }

    const CONFIG: &str = r#"{
        "resources": [
            {"type": "ec2_subnet", "name": "a", "attributes": {
                "vpc_id": "${main.id}", "cidr_block": "10.0.1.0/24"}},
            {"type": "ec2_vpc", "name": "main", "attributes": {"cidr_block": "10.0.0.0/16"}}
        ],
        "data": [{"type": "ec2_vpc", "name": "default", "attributes": {"id": "vpc-123"}}]
    }"#;

    struct Harness {
        _dir: TempDir,
        store: LocalState,
        interpreter: Interpreter<FakeProvider>,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = LocalState::new(dir.path().join("stratus.state.json"));
        Harness {
            _dir: dir,
            store,
            interpreter: Interpreter::new(FakeProvider::default()).with_config(
                InterpreterConfig {
                    dry_run: false,
                    continue_on_error: true,
                },
            ),
        }
    }

    async fn apply_config<P: Provider>(
        interpreter: &Interpreter<P>,
        store: &LocalState,
        config: &Configuration,
    ) -> ApplyResult {
        let mut state = store.load().unwrap();
        let mut prepared = prepare(interpreter, config, &state).await.unwrap();
        sync_state(&mut state, &prepared.current);
        apply(
            interpreter,
            &prepared.plan,
            &mut prepared.bindings,
            &mut state,
            store,
        )
        .await
        .unwrap()
    }

    async fn run(h: &Harness, config: &Configuration) -> ApplyResult {
        apply_config(&h.interpreter, &h.store, config).await
    }

    #[tokio::test]
    async fn apply_resolves_references_in_dependency_order() {
        let h = harness();
        let config = parse(CONFIG).unwrap();

        let result = run(&h, &config).await;
        assert!(result.is_success());
        assert_eq!(
            h.interpreter.provider().calls(),
            vec!["create ec2_vpc.main", "create ec2_subnet.a"]
        );

        let state = h.store.load().unwrap();
        let subnet = state
            .find_resource(&ResourceId::new("ec2_subnet", "a"))
            .unwrap();
        assert_eq!(
            subnet.attributes.get("vpc_id"),
            Some(&serde_json::json!("ec2_vpc-1"))
        );
    }

    #[tokio::test]
    async fn second_apply_has_nothing_to_do() {
        let h = harness();
        let config = parse(CONFIG).unwrap();
        run(&h, &config).await;

        let state = h.store.load().unwrap();
        let prepared = prepare(&h.interpreter, &config, &state).await.unwrap();
        assert_eq!(prepared.plan.mutation_count(), 0);
    }

    #[tokio::test]
    async fn changed_and_removed_resources_are_planned() {
        let h = harness();
        run(&h, &parse(CONFIG).unwrap()).await;

        let config = parse(
            r#"{"resources": [
                {"type": "ec2_vpc", "name": "main", "attributes": {"cidr_block": "10.1.0.0/16"}}
            ]}"#,
        )
        .unwrap();
        let state = h.store.load().unwrap();
        let prepared = prepare(&h.interpreter, &config, &state).await.unwrap();
        let summary = prepared.plan.summary();
        assert_eq!(summary.update, 1);
        assert_eq!(summary.delete, 1);

        let result = run(&h, &config).await;
        assert!(result.is_success());
        assert_eq!(h.store.load().unwrap().resources.len(), 1);
    }

    #[tokio::test]
    async fn destroy_runs_in_reverse_dependency_order() {
        let h = harness();
        let config = parse(CONFIG).unwrap();
        run(&h, &config).await;

        let mut state = h.store.load().unwrap();
        let current = refresh(h.interpreter.provider(), &state).await.unwrap();
        let plan = destroy_plan(&config, &current);
        let mut bindings = Bindings::default();
        let result = apply(&h.interpreter, &plan, &mut bindings, &mut state, &h.store)
            .await
            .unwrap();

        assert_eq!(result.success_count, 2);
        let calls = h.interpreter.provider().calls();
        assert_eq!(
            &calls[2..],
            &["delete ec2_subnet.a".to_string(), "delete ec2_vpc.main".to_string()]
        );
        assert!(h.store.load().unwrap().resources.is_empty());
    }

    #[tokio::test]
    async fn unresolved_reference_fails_without_a_call() {
        let h = harness();
        let config = parse(
            r#"{"resources": [
                {"type": "ec2_vpc", "name": "main", "attributes": {"cidr_block": "10.0.0.0/16"}},
                {"type": "ec2_subnet", "name": "a", "attributes": {"vpc_id": "${main.owner_id}"}}
            ]}"#,
        )
        .unwrap();

        let result = run(&h, &config).await;
        assert_eq!(result.failure_count, 1);
        assert_eq!(h.interpreter.provider().calls(), vec!["create ec2_vpc.main"]);
        let (id, outcome) = &result.outcomes[1];
        assert_eq!(id, &ResourceId::new("ec2_subnet", "a"));
        let err = outcome.as_ref().unwrap_err();
        assert!(err.message.contains("${main.owner_id}"));
    }

    #[tokio::test]
    async fn data_sources_feed_references() {
        let h = harness();
        let config = parse(
            r#"{"resources": [
                {"type": "ec2_subnet", "name": "a", "attributes": {
                    "vpc_id": "${default.id}", "cidr_block": "${default.cidr_block}"}}
               ],
               "data": [{"type": "ec2_vpc", "name": "default", "attributes": {"id": "vpc-123"}}]}"#,
        )
        .unwrap();

        let state = h.store.load().unwrap();
        let prepared = prepare(&h.interpreter, &config, &state).await.unwrap();
        match &prepared.plan.effects()[0] {
            Effect::Create(r) => {
                assert_eq!(r.get_str("vpc_id"), Some("vpc-123"));
                assert_eq!(r.get_str("cidr_block"), Some("172.31.0.0/16"));
            }
            other => panic!("expected create, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dry_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = LocalState::new(dir.path().join("stratus.state.json"));
        let interpreter = Interpreter::new(FakeProvider::default()).with_config(InterpreterConfig {
            dry_run: true,
            continue_on_error: true,
        });
        let config = parse(CONFIG).unwrap();

        let mut state = store.load().unwrap();
        let mut prepared = prepare(&interpreter, &config, &state).await.unwrap();
        let result = apply(
            &interpreter,
            &prepared.plan,
            &mut prepared.bindings,
            &mut state,
            &store,
        )
        .await
        .unwrap();

        assert!(result.is_success());
        assert!(interpreter.provider().calls().is_empty());
        assert!(state.resources.is_empty());
        assert!(!dir.path().join("stratus.state.json").exists());
    }

    #[tokio::test]
    async fn failed_save_stops_the_apply() {
        let h = harness();
        let config = parse(CONFIG).unwrap();
        let mut state = h.store.load().unwrap();
        let mut prepared = prepare(&h.interpreter, &config, &state).await.unwrap();

        // A state file from another lineage makes every save fail
        h.store.save(&mut StateFile::new()).unwrap();
        let err = apply(
            &h.interpreter,
            &prepared.plan,
            &mut prepared.bindings,
            &mut state,
            &h.store,
        )
        .await
        .unwrap_err();

        assert!(err.contains("lineage"));
        assert_eq!(h.interpreter.provider().calls(), vec!["create ec2_vpc.main"]);
    }

    /// The AWS provider over in-memory S3 and Cloud Control
    struct AwsHarness {
        _dir: TempDir,
        store: LocalState,
        s3: Arc<FakeS3>,
        interpreter: Interpreter<AwsProvider>,
    }

    fn aws_harness(config: &Configuration) -> AwsHarness {
        let dir = TempDir::new().unwrap();
        let s3 = Arc::new(FakeS3::default());
        let client = client_with_config(
            config.provider.clone(),
            Arc::new(FakeCloudControl::default()),
            s3.clone(),
        );
        AwsHarness {
            store: LocalState::new(dir.path().join("stratus.state.json")),
            _dir: dir,
            s3,
            interpreter: Interpreter::new(AwsProvider::with_client(client).unwrap()).with_config(
                InterpreterConfig {
                    dry_run: false,
                    continue_on_error: true,
                },
            ),
        }
    }

    fn bucket_config(provider: &str, attributes: &str) -> Configuration {
        parse(&format!(
            r#"{{"provider": {},
                "resources": [{{"type": "s3_bucket", "name": "logs", "attributes": {}}}]}}"#,
            provider, attributes
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn force_destroy_survives_refresh_into_destroy() {
        let config = bucket_config(
            r#"{"region": "us-east-1"}"#,
            r#"{"bucket": "acme-logs", "force_destroy": true}"#,
        );
        let h = aws_harness(&config);
        assert!(apply_config(&h.interpreter, &h.store, &config).await.is_success());
        h.s3.put_objects("acme-logs", 3);

        let mut state = h.store.load().unwrap();
        let current = refresh(h.interpreter.provider(), &state).await.unwrap();
        sync_state(&mut state, &current);
        h.store.save(&mut state).unwrap();
        let entry = state
            .find_resource(&ResourceId::new("s3_bucket", "logs"))
            .unwrap();
        assert_eq!(
            entry.attributes.get("force_destroy"),
            Some(&serde_json::json!(true))
        );

        let current = refresh(h.interpreter.provider(), &state).await.unwrap();
        let plan = destroy_plan(&config, &current);
        let result = apply(
            &h.interpreter,
            &plan,
            &mut Bindings::default(),
            &mut state,
            &h.store,
        )
        .await
        .unwrap();

        assert!(result.is_success());
        assert!(h.s3.bucket("acme-logs").is_none());
        assert!(h.store.load().unwrap().resources.is_empty());
    }

    #[tokio::test]
    async fn tag_equal_to_a_default_tag_plans_nothing_the_second_time() {
        let config = bucket_config(
            r#"{"region": "us-east-1", "default_tags": {"Env": "dev"}}"#,
            r#"{"bucket": "acme-logs", "tags": {"Env": "dev", "Team": "core"}}"#,
        );
        let h = aws_harness(&config);
        assert!(apply_config(&h.interpreter, &h.store, &config).await.is_success());

        let state = h.store.load().unwrap();
        let prepared = prepare(&h.interpreter, &config, &state).await.unwrap();
        assert_eq!(prepared.plan.mutation_count(), 0);
    }

    #[tokio::test]
    async fn ignored_tags_survive_a_tag_update() {
        let provider = r#"{"region": "us-east-1", "ignore_tags": {"keys": ["Owner"]}}"#;
        let config = bucket_config(provider, r#"{"bucket": "acme-logs", "tags": {"Team": "core"}}"#);
        let h = aws_harness(&config);
        assert!(apply_config(&h.interpreter, &h.store, &config).await.is_success());
        h.s3.buckets
            .lock()
            .unwrap()
            .get_mut("acme-logs")
            .unwrap()
            .tags
            .insert("Owner", "alice");

        let config = bucket_config(provider, r#"{"bucket": "acme-logs", "tags": {"Team": "data"}}"#);
        let result = apply_config(&h.interpreter, &h.store, &config).await;
        assert!(result.is_success());
        assert_eq!(result.success_count, 1);

        let tags = h.s3.bucket("acme-logs").unwrap().tags;
        assert_eq!(tags.get("Owner"), Some("alice"));
        assert_eq!(tags.get("Team"), Some("data"));
    }
}
