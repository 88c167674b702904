//! Service - Cluster, single-container task definition and Fargate service
//!
//! The service binds to all four target groups and is ordered after all four
//! listeners; a target group without a listener is rejected at bind time.

use std::collections::HashMap;

use brokerstack_core::providers::aws;
use brokerstack_core::resource::{Resource, Value};

use crate::channel::{Channel, Tier};
use crate::config::Config;
use crate::load_balancer::LoadBalancerTopology;
use crate::naming::Component;
use crate::security::{NetworkContext, TrustBoundary};
use crate::stage::{self, Handle, Stage, StageBuilder};

/// Environment variable the broker reads its license key from
pub const LICENSE_ENV_VAR: &str = "THUNDRA_LICENSE_KEY";

pub const TASK_CPU: i64 = 256;
pub const TASK_MEMORY_MIB: i64 = 512;
pub const DESIRED_COUNT: i64 = 1;
pub const HEALTH_CHECK_GRACE_PERIOD_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTopology {
    pub cluster: Handle,
    pub task_definition: Handle,
    pub service: Handle,
}

fn task_definition(config: &Config, trust: &TrustBoundary) -> Resource {
    let family = config.naming.name(Component::TaskDefinition);
    Resource::new(aws::TASK_DEFINITION, family.as_str())
        .with_binding("task_definition")
        .with_attribute("family", family)
        .with_attribute("cpu", TASK_CPU)
        .with_attribute("memory", TASK_MEMORY_MIB)
        .with_attribute("network_mode", "awsvpc")
        .with_attribute("requires_compatibilities", vec!["FARGATE"])
        .with_attribute("execution_role_arn", trust.execution_role.attr("arn"))
        .with_attribute("task_role_arn", trust.task_role.attr("arn"))
        .with_attribute("container_name", config.container_name.as_str())
        .with_attribute("image", config.image.as_str())
        .with_attribute(
            "container_ports",
            vec![
                Channel::Application.container_port(),
                Channel::Client.container_port(),
            ],
        )
        .with_attribute(
            "environment",
            Value::Map(HashMap::from([(
                LICENSE_ENV_VAR.to_string(),
                Value::Secret(config.license_key.clone()),
            )])),
        )
}

fn load_balancer_binding(config: &Config, channel: Channel, target_group: &Handle) -> Value {
    Value::Map(HashMap::from([
        (
            "container_name".to_string(),
            Value::from(config.container_name.as_str()),
        ),
        (
            "container_port".to_string(),
            Value::from(channel.container_port()),
        ),
        ("target_group_arn".to_string(), target_group.attr("arn")),
    ]))
}

/// Build the service stage from both load balancer tiers
pub fn service_topology(
    config: &Config,
    network: &NetworkContext,
    trust: &TrustBoundary,
    internal: &LoadBalancerTopology,
    external: &LoadBalancerTopology,
) -> Stage<ServiceTopology> {
    debug_assert_eq!(internal.tier, Tier::Internal);
    debug_assert_eq!(external.tier, Tier::External);

    let mut stage = StageBuilder::new(config, stage::SERVICE);

    let cluster_name = config.naming.name(Component::Cluster);
    let cluster = stage.add(
        Resource::new(aws::ECS_CLUSTER, cluster_name.as_str())
            .with_binding("cluster")
            .with_attribute("cluster_name", cluster_name),
    );

    let task_definition = stage.add(task_definition(config, trust));

    let mut load_balancers = Vec::new();
    for channel in Channel::ALL {
        for tier in [internal, external] {
            load_balancers.push(load_balancer_binding(
                config,
                channel,
                &tier.channel(channel).target_group,
            ));
        }
    }

    let service_name = config.naming.name(Component::Service);
    let mut service = Resource::new(aws::ECS_SERVICE, service_name.as_str())
        .with_binding("service")
        .with_attribute("service_name", service_name)
        .with_attribute("cluster", cluster.attr("arn"))
        .with_attribute("task_definition", task_definition.attr("arn"))
        .with_attribute("desired_count", DESIRED_COUNT)
        .with_attribute(
            "health_check_grace_period_seconds",
            HEALTH_CHECK_GRACE_PERIOD_SECONDS,
        )
        .with_attribute("launch_type", "FARGATE")
        .with_attribute("assign_public_ip", true)
        .with_attribute("subnets", network.subnets.clone())
        .with_attribute(
            "security_groups",
            Value::List(vec![trust.service_security_group.attr("id")]),
        )
        .with_attribute("load_balancers", Value::List(load_balancers));
    for listener in internal.listeners().into_iter().chain(external.listeners()) {
        service = service.depends_on(listener.binding.as_str());
    }
    let service = stage.add(service);

    stage.finish(ServiceTopology {
        cluster,
        task_definition,
        service,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Transport, VpcSelection};
    use crate::load_balancer::load_balancer_topology;
    use crate::naming::Naming;
    use crate::security::security_topology;

    fn config() -> Config {
        Config {
            license_key: "license-123".to_string(),
            subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            public_subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            vpc: VpcSelection::Default,
            transport: Transport::Plain,
            dns: None,
            naming: Naming::default(),
            container_name: "sls-debugger-broker-container".to_string(),
            image: "public.ecr.aws/broker:latest".to_string(),
            apply_tags: true,
            region: "us-east-1".to_string(),
        }
    }

    fn build(config: &Config) -> Stage<ServiceTopology> {
        let security = security_topology(config);
        let network = &security.output.network;
        let trust = &security.output.trust;
        let internal =
            load_balancer_topology(config, Tier::Internal, network, trust, &network.subnets);
        let external =
            load_balancer_topology(config, Tier::External, network, trust, &network.public_subnets);
        service_topology(config, network, trust, &internal.output, &external.output)
    }

    #[test]
    fn service_waits_for_all_four_listeners() {
        let stage = build(&config());
        let service = stage.resource("service").unwrap();
        let mut deps = service.depends_on.clone();
        deps.sort();
        assert_eq!(
            deps,
            vec![
                "external_application_listener",
                "external_client_listener",
                "internal_application_listener",
                "internal_client_listener",
            ]
        );
    }

    #[test]
    fn service_binds_every_target_group_to_its_container_port() {
        let stage = build(&config());
        let service = stage.resource("service").unwrap();
        let bindings: Vec<(Value, Value)> = service.attributes["load_balancers"]
            .as_list()
            .unwrap()
            .iter()
            .map(|b| {
                let b = b.as_map().unwrap();
                (b["target_group_arn"].clone(), b["container_port"].clone())
            })
            .collect();
        assert_eq!(
            bindings,
            vec![
                (Value::reference("internal_client_tg", "arn"), Value::Int(5555)),
                (Value::reference("external_client_tg", "arn"), Value::Int(5555)),
                (Value::reference("internal_application_tg", "arn"), Value::Int(4444)),
                (Value::reference("external_application_tg", "arn"), Value::Int(4444)),
            ]
        );
    }

    #[test]
    fn task_uses_roles_from_the_trust_boundary() {
        let stage = build(&config());
        let task = stage.resource("task_definition").unwrap();
        assert_eq!(
            task.attributes["task_role_arn"],
            Value::reference("task_role", "arn")
        );
        assert_eq!(
            task.attributes["execution_role_arn"],
            Value::reference("execution_role", "arn")
        );
        assert_eq!(task.attributes["container_ports"], Value::from(vec![4444u16, 5555]));
    }

    #[test]
    fn license_key_is_injected_as_secret() {
        let stage = build(&config());
        let task = stage.resource("task_definition").unwrap();
        let env = task.attributes["environment"].as_map().unwrap();
        assert_eq!(
            env[LICENSE_ENV_VAR],
            Value::Secret("license-123".to_string())
        );
    }

    #[test]
    fn service_runs_in_service_group_with_fixed_sizing() {
        let stage = build(&config());
        let service = stage.resource("service").unwrap();
        assert_eq!(
            service.attributes["security_groups"],
            Value::List(vec![Value::reference("service_sg", "id")])
        );
        assert_eq!(service.attributes["desired_count"], Value::Int(1));
        assert_eq!(
            service.attributes["health_check_grace_period_seconds"],
            Value::Int(60)
        );
        assert_eq!(service.attributes["assign_public_ip"], Value::Bool(true));
        assert!(service.attributes.contains_key("tags"));
    }
}
