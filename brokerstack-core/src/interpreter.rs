//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order, resolving
//! each descriptor's references against what earlier Effects produced. This
//! is where side effects actually occur.

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resolve::{BindingMap, unresolved_references};
use crate::resource::{Resource, State};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Data source lookup succeeded
    Read { resource: Resource, state: State },
    /// Create succeeded; `resource` is the descriptor with references resolved
    Created { resource: Resource, state: State },
    /// Update succeeded
    Updated { resource: Resource, state: State },
    /// Replacement succeeded; `state` describes the new resource
    Replaced { resource: Resource, state: State },
    /// Delete succeeded
    Deleted { binding: String },
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

/// Result of executing the entire Plan
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// (index into the plan's effects, outcome)
    pub outcomes: Vec<(usize, Result<EffectOutcome, ProviderError>)>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    /// First failure, if any
    pub fn first_error(&self) -> Option<&ProviderError> {
        self.outcomes.iter().find_map(|(_, r)| r.as_ref().err())
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a Plan, interpreting all Effects and causing side effects.
    ///
    /// `bindings` must already hold every resource the plan does not touch
    /// but references (unchanged resources from a previous run).
    pub async fn apply(&self, plan: &Plan, bindings: &mut BindingMap) -> ApplyResult {
        let mut result = ApplyResult::default();

        for (idx, effect) in plan.effects().iter().enumerate() {
            let outcome = self.execute_effect(effect, bindings).await;

            match &outcome {
                Ok(_) => result.success_count += 1,
                Err(e) => {
                    log::error!("{} failed: {}", effect, e);
                    result.failure_count += 1;
                    if !self.config.continue_on_error {
                        result.outcomes.push((idx, outcome));
                        break;
                    }
                }
            }

            result.outcomes.push((idx, outcome));
        }

        result
    }

    /// Resolve references and check that explicit dependencies are in place
    fn prepare(&self, resource: &Resource, bindings: &BindingMap) -> ProviderResult<Resource> {
        if let Some(missing) = resource.depends_on.iter().find(|b| !bindings.contains(b)) {
            return Err(ProviderError::new(format!(
                "dependency '{}' has not been provisioned",
                missing
            ))
            .for_resource(resource.id.clone()));
        }

        let resolved = bindings.resolve_resource(resource);
        let unresolved = unresolved_references(&resolved);
        if !unresolved.is_empty() {
            return Err(ProviderError::new(format!(
                "unresolved reference(s): {}",
                unresolved.join(", ")
            ))
            .for_resource(resource.id.clone()));
        }
        Ok(resolved)
    }

    /// Execute a single Effect
    async fn execute_effect(
        &self,
        effect: &Effect,
        bindings: &mut BindingMap,
    ) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        log::info!("{}", effect);

        match effect {
            Effect::Read(resource) => {
                let resolved = self.prepare(resource, bindings)?;
                let state = self.provider.lookup(&resolved).await?;
                bindings.bind(&resolved, &state);
                Ok(EffectOutcome::Read {
                    resource: resolved,
                    state,
                })
            }
            Effect::Create(resource) => {
                let resolved = self.prepare(resource, bindings)?;
                let state = self.provider.create(&resolved).await?;
                bindings.bind(&resolved, &state);
                Ok(EffectOutcome::Created {
                    resource: resolved,
                    state,
                })
            }
            Effect::Update { id, from, to } => {
                let resolved = self.prepare(to, bindings)?;
                let identifier = from.identifier.as_deref().ok_or_else(|| {
                    ProviderError::new("no identifier recorded").for_resource(id.clone())
                })?;
                let state = self
                    .provider
                    .update(id, identifier, from, &resolved)
                    .await?;
                bindings.bind(&resolved, &state);
                Ok(EffectOutcome::Updated {
                    resource: resolved,
                    state,
                })
            }
            Effect::Replace { to, .. } => {
                let resolved = self.prepare(to, bindings)?;
                let state = self.provider.create(&resolved).await?;
                bindings.bind(&resolved, &state);
                Ok(EffectOutcome::Replaced {
                    resource: resolved,
                    state,
                })
            }
            Effect::Delete {
                id,
                binding,
                identifier,
            } => {
                self.provider.delete(id, identifier).await?;
                Ok(EffectOutcome::Deleted {
                    binding: binding.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::ReplaceOrder;
    use crate::provider::BoxFuture;
    use crate::resource::{ResourceId, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestProvider {
        created: Mutex<Vec<Resource>>,
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn resource_types(&self) -> Vec<Box<dyn crate::provider::ResourceType>> {
            vec![]
        }

        fn lookup(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let state = State::existing(
                resource.id.clone(),
                [("id".to_string(), Value::from("vpc-1"))].into(),
            )
            .with_identifier("vpc-1");
            Box::pin(async move { Ok(state) })
        }

        fn read(&self, id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let result = if self.fail_on == Some(resource.binding.as_str()) {
                Err(ProviderError::new("boom").for_resource(resource.id.clone()))
            } else {
                self.created.lock().unwrap().push(resource.clone());
                self.calls.lock().unwrap().push(format!("create {}", resource.id));
                let mut attrs = resource.attributes.clone();
                attrs.insert(
                    "arn".to_string(),
                    Value::from(format!("arn:{}", resource.binding)),
                );
                Ok(State::existing(resource.id.clone(), attrs).with_identifier("test-id"))
            };
            Box::pin(async move { result })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let state = State::existing(id.clone(), to.attributes.clone());
            Box::pin(async move { Ok(state) })
        }

        fn delete(&self, _id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            self.calls.lock().unwrap().push(format!("delete {}", identifier));
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn replacement_creates_the_successor_after_retiring_the_old_copy() {
        let interpreter = Interpreter::new(TestProvider::default());
        let id = ResourceId::new("ec2.security_group", "edge");
        let mut plan = Plan::new();
        plan.add(Effect::Delete {
            id: id.clone(),
            binding: "edge".to_string(),
            identifier: "sg-old".to_string(),
        });
        plan.add(Effect::Read(
            Resource::new("ec2.vpc", "selected").with_read_only(true),
        ));
        plan.add(Effect::Replace {
            id: id.clone(),
            from: State::existing(id, [("vpc_id".to_string(), Value::from("vpc-0"))].into())
                .with_identifier("sg-old"),
            to: Resource::new("ec2.security_group", "edge")
                .with_attribute("vpc_id", Value::reference("selected", "id")),
            forced_by: vec!["vpc_id".to_string()],
            order: ReplaceOrder::DeleteFirst,
        });

        let mut bindings = BindingMap::new();
        let result = interpreter.apply(&plan, &mut bindings).await;

        assert!(result.is_success());
        assert_eq!(
            *interpreter.provider().calls.lock().unwrap(),
            vec!["delete sg-old", "create ec2.security_group.edge"]
        );
        match &result.outcomes[2].1 {
            Ok(EffectOutcome::Replaced { resource, .. }) => {
                assert_eq!(resource.attributes["vpc_id"], Value::from("vpc-1"))
            }
            other => panic!("Expected Replaced, got {:?}", other),
        }
        assert_eq!(bindings.get("edge", "arn"), Some(&Value::from("arn:edge")));
    }

    #[tokio::test]
    async fn apply_empty_plan() {
        let interpreter = Interpreter::new(TestProvider::default());
        let plan = Plan::new();
        let result = interpreter.apply(&plan, &mut BindingMap::new()).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 0);
    }

    #[tokio::test]
    async fn apply_resolves_references_from_earlier_effects() {
        let interpreter = Interpreter::new(TestProvider::default());
        let mut plan = Plan::new();
        plan.add(Effect::Read(
            Resource::new("ec2.vpc", "selected").with_read_only(true),
        ));
        plan.add(Effect::Create(
            Resource::new("elbv2.target_group", "tg")
                .with_attribute("vpc_id", Value::reference("selected", "id")),
        ));
        plan.add(Effect::Create(
            Resource::new("elbv2.listener", "lnr")
                .with_attribute("default_target_group_arn", Value::reference("tg", "arn")),
        ));

        let mut bindings = BindingMap::new();
        let result = interpreter.apply(&plan, &mut bindings).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 3);
        let created = interpreter.provider().created.lock().unwrap();
        assert_eq!(created[0].attributes["vpc_id"], Value::from("vpc-1"));
        assert_eq!(
            created[1].attributes["default_target_group_arn"],
            Value::from("arn:tg")
        );
        assert_eq!(bindings.get("lnr", "arn"), Some(&Value::from("arn:lnr")));
    }

    #[tokio::test]
    async fn apply_stops_at_first_failure() {
        let provider = TestProvider {
            fail_on: Some("b"),
            ..Default::default()
        };
        let interpreter = Interpreter::new(provider);
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("test", "a")));
        plan.add(Effect::Create(Resource::new("test", "b")));
        plan.add(Effect::Create(Resource::new("test", "c")));

        let result = interpreter.apply(&plan, &mut BindingMap::new()).await;

        assert!(!result.is_success());
        assert_eq!(result.success_count, 1);
        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.outcomes[1].0, 1);
        assert_eq!(
            result.first_error().map(|e| e.to_string()),
            Some("[test.b] boom".to_string())
        );
    }

    #[tokio::test]
    async fn missing_explicit_dependency_is_an_error() {
        let interpreter = Interpreter::new(TestProvider::default());
        let mut plan = Plan::new();
        plan.add(Effect::Create(
            Resource::new("ecs.service", "svc").depends_on("client_listener"),
        ));

        let result = interpreter.apply(&plan, &mut BindingMap::new()).await;

        let err = result.first_error().unwrap();
        assert!(err.message.contains("client_listener"));
        assert!(interpreter.provider().created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unresolved_reference_is_an_error() {
        let interpreter = Interpreter::new(TestProvider::default());
        let mut plan = Plan::new();
        plan.add(Effect::Create(
            Resource::new("ecs.service", "svc")
                .with_attribute("cluster", Value::reference("cluster", "arn")),
        ));

        let result = interpreter.apply(&plan, &mut BindingMap::new()).await;

        let err = result.first_error().unwrap();
        assert_eq!(err.message, "unresolved reference(s): cluster.arn");
    }

    #[tokio::test]
    async fn dry_run_skips_effects() {
        let config = InterpreterConfig {
            dry_run: true,
            ..Default::default()
        };
        let interpreter = Interpreter::new(TestProvider::default()).with_config(config);
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("test", "example")));

        let result = interpreter.apply(&plan, &mut BindingMap::new()).await;

        assert!(result.is_success());
        assert!(matches!(
            result.outcomes[0].1,
            Ok(EffectOutcome::Skipped { .. })
        ));
    }
}
