//! Drive a composed deployment through plan and apply against a recording provider

use std::collections::HashMap;
use std::sync::Mutex;

use brokerstack_core::differ::create_plan;
use brokerstack_core::interpreter::Interpreter;
use brokerstack_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use brokerstack_core::providers::{all_schemas, aws};
use brokerstack_core::resolve::BindingMap;
use brokerstack_core::resource::{Resource, ResourceId, State, Value};
use brokerstack_topology::{Config, compose};

#[derive(Default)]
struct RecordingProvider {
    applied: Mutex<Vec<Resource>>,
    missing_zone: bool,
}

impl Provider for RecordingProvider {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![]
    }

    fn lookup(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let result = match resource.id.resource_type.as_str() {
            aws::HOSTED_ZONE if self.missing_zone => Err(ProviderError::new(
                "no hosted zone found",
            )
            .for_resource(resource.id.clone())),
            _ => Ok(State::existing(
                resource.id.clone(),
                HashMap::from([("id".to_string(), Value::from("lookup-id"))]),
            )
            .with_identifier("lookup-id")),
        };
        Box::pin(async move { result })
    }

    fn read(&self, id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        Box::pin(async move { Ok(State::not_found(id)) })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        self.applied.lock().unwrap().push(resource.clone());
        let mut attrs = resource.attributes.clone();
        attrs.insert("arn".to_string(), Value::from(format!("arn:{}", resource.id.name)));
        attrs.insert("id".to_string(), Value::from(format!("id-{}", resource.id.name)));
        if resource.id.resource_type == aws::LOAD_BALANCER {
            attrs.insert(
                "dns_name".to_string(),
                Value::from(format!("{}.elb.amazonaws.com", resource.id.name)),
            );
        }
        let state = State::existing(resource.id.clone(), attrs).with_identifier(&resource.id.name);
        Box::pin(async move { Ok(state) })
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

    fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

fn config(pairs: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("SLSDEBUG_LICENSE_KEY".to_string(), "x".to_string()),
        ("SUBNET_IDS".to_string(), "subnet-a,subnet-b".to_string()),
    ]);
    for (k, v) in pairs {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_env(&vars).unwrap()
}

#[tokio::test]
async fn apply_resolves_every_reference_and_endpoint() {
    let config = config(&[]);
    let deployment = compose(&config).unwrap();
    let plan = create_plan(
        &deployment.resources,
        &HashMap::new(),
        BindingMap::new(),
        &all_schemas(),
    );

    let interpreter = Interpreter::new(RecordingProvider::default());
    let mut bindings = BindingMap::new();
    let result = interpreter.apply(&plan, &mut bindings).await;
    assert!(result.is_success(), "{:?}", result.first_error());

    let applied = interpreter.provider().applied.lock().unwrap();
    for resource in applied.iter() {
        assert!(
            resource.references().is_empty(),
            "{} still has references",
            resource.id
        );
    }
    let service = applied.iter().find(|r| r.binding == "service").unwrap();
    assert_eq!(
        service.attributes["cluster"],
        Value::from("arn:slsd-ecs-cluster-dev")
    );

    assert_eq!(
        deployment.external_endpoint.resolve(&bindings),
        Some("http://slsd-ex-elb-dev.elb.amazonaws.com".to_string())
    );
    let outputs = deployment.outputs(&config);
    assert_eq!(outputs[2].value.resolve(&bindings), Some("80".to_string()));
}

#[tokio::test]
async fn unresolvable_hosted_zone_stops_the_run() {
    let config = config(&[
        ("CREATE_DNS_MAPPING", "true"),
        ("HOSTED_ZONE_NAME", "missing.example"),
        ("BROKER_PUBLIC_SUBDOMAIN", "broker"),
        ("BROKER_PRIVATE_SUBDOMAIN", "broker-internal"),
    ]);
    let deployment = compose(&config).unwrap();
    let plan = create_plan(
        &deployment.resources,
        &HashMap::new(),
        BindingMap::new(),
        &all_schemas(),
    );

    let provider = RecordingProvider {
        missing_zone: true,
        ..Default::default()
    };
    let interpreter = Interpreter::new(provider);
    let result = interpreter.apply(&plan, &mut BindingMap::new()).await;

    assert!(!result.is_success());
    let err = result.first_error().unwrap();
    assert_eq!(
        err.to_string(),
        "[route53.hosted_zone.missing.example] no hosted zone found"
    );
    let applied = interpreter.provider().applied.lock().unwrap();
    assert!(
        applied
            .iter()
            .all(|r| r.id.resource_type != aws::CNAME_RECORD)
    );
}
