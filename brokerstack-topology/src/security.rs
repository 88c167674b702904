//! Security - VPC selection, IAM roles and the two security groups
//!
//! The edge group admits the public listener ports from anywhere. The service
//! group admits the container ports only from the edge group, so the service
//! tier has no direct public ingress.

use std::collections::HashMap;

use brokerstack_core::providers::aws;
use brokerstack_core::resource::{Resource, Value};

use crate::channel::{APPLICATION_LISTENER_PORT, Channel};
use crate::config::{Config, VpcSelection};
use crate::naming::Component;
use crate::stage::{self, Handle, Stage, StageBuilder};

pub const ECS_TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";
pub const EXECUTION_ROLE_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";
pub const ANY_IPV4: &str = "0.0.0.0/0";

const EDGE_SG_DESCRIPTION: &str = "ServerlessDebugger Broker External ELB Security Group";
const SERVICE_SG_DESCRIPTION: &str = "Thundra Lambda Debug Broker Service ELB Security Group";

/// Where the topology lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    pub vpc: Handle,
    /// Subnets of the service and the internal tier; never empty
    pub subnets: Vec<String>,
    /// Subnets of the external tier; never empty
    pub public_subnets: Vec<String>,
}

/// Security groups and roles every later stage builds on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustBoundary {
    pub edge_security_group: Handle,
    pub service_security_group: Handle,
    pub execution_role: Handle,
    pub task_role: Handle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityTopology {
    pub network: NetworkContext,
    pub trust: TrustBoundary,
}

/// One inbound rule as the `ingress` attribute carries it
pub fn ingress_rule(port: u16, source: IngressSource) -> Value {
    let mut rule = HashMap::from([
        ("ip_protocol".to_string(), Value::from("tcp")),
        ("from_port".to_string(), Value::from(port)),
        ("to_port".to_string(), Value::from(port)),
    ]);
    match source {
        IngressSource::Cidr(cidr) => {
            rule.insert("cidr_ip".to_string(), Value::from(cidr));
        }
        IngressSource::Group(group) => {
            rule.insert("source_security_group_id".to_string(), group.attr("id"));
        }
    }
    Value::Map(rule)
}

pub enum IngressSource<'a> {
    Cidr(&'a str),
    Group(&'a Handle),
}

fn vpc_lookup(selection: &VpcSelection) -> Resource {
    let resource = match selection {
        VpcSelection::Explicit(id) => {
            Resource::new(aws::VPC, id.as_str()).with_attribute("vpc_id", id.as_str())
        }
        VpcSelection::Default => Resource::new(aws::VPC, "default").with_attribute("is_default", true),
    };
    resource.with_binding("vpc").with_read_only(true)
}

fn role(config: &Config, component: Component, binding: &str) -> Resource {
    let name = config.naming.name(component);
    Resource::new(aws::IAM_ROLE, name.as_str())
        .with_binding(binding)
        .with_attribute("role_name", name)
        .with_attribute("assumed_by", ECS_TASKS_PRINCIPAL)
}

fn security_group(
    config: &Config,
    component: Component,
    binding: &str,
    description: &str,
    vpc: &Handle,
    ingress: Vec<Value>,
) -> Resource {
    let name = config.naming.name(component);
    Resource::new(aws::SECURITY_GROUP, name.as_str())
        .with_binding(binding)
        .with_attribute("group_name", name)
        .with_attribute("description", description)
        .with_attribute("vpc_id", vpc.attr("id"))
        .with_attribute("ingress", Value::List(ingress))
        .with_attribute("allow_all_outbound", true)
}

/// Build the security stage
pub fn security_topology(config: &Config) -> Stage<SecurityTopology> {
    let mut stage = StageBuilder::new(config, stage::SECURITY);

    let vpc = stage.add(vpc_lookup(&config.vpc));
    let network = NetworkContext {
        vpc: vpc.clone(),
        subnets: config.subnets.clone(),
        public_subnets: config.public_subnets.clone(),
    };

    let execution_role = stage.add(
        role(config, Component::ExecutionRole, "execution_role").with_attribute(
            "managed_policy_arns",
            Value::from(vec![EXECUTION_ROLE_POLICY_ARN]),
        ),
    );
    // Policies for the task role are attached by operators
    let task_role = stage.add(role(config, Component::TaskRole, "task_role"));

    let edge_ingress = vec![
        ingress_rule(
            Channel::Client.listener_port(&config.transport),
            IngressSource::Cidr(ANY_IPV4),
        ),
        ingress_rule(APPLICATION_LISTENER_PORT, IngressSource::Cidr(ANY_IPV4)),
    ];
    let edge_security_group = stage.add(security_group(
        config,
        Component::EdgeSecurityGroup,
        "edge_sg",
        EDGE_SG_DESCRIPTION,
        &vpc,
        edge_ingress,
    ));

    let service_ingress = [Channel::Application, Channel::Client]
        .into_iter()
        .map(|c| ingress_rule(c.container_port(), IngressSource::Group(&edge_security_group)))
        .collect();
    let service_security_group = stage.add(security_group(
        config,
        Component::ServiceSecurityGroup,
        "service_sg",
        SERVICE_SG_DESCRIPTION,
        &vpc,
        service_ingress,
    ));

    stage.finish(SecurityTopology {
        network,
        trust: TrustBoundary {
            edge_security_group,
            service_security_group,
            execution_role,
            task_role,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Transport;
    use crate::naming::Naming;

    fn config(transport: Transport, vpc: VpcSelection) -> Config {
        Config {
            license_key: "x".to_string(),
            subnets: vec!["subnet-a".to_string()],
            public_subnets: vec!["subnet-a".to_string()],
            vpc,
            transport,
            dns: None,
            naming: Naming::default(),
            container_name: "broker".to_string(),
            image: "image".to_string(),
            apply_tags: true,
            region: "us-east-1".to_string(),
        }
    }

    fn ports(resource: &Resource) -> Vec<i64> {
        resource.attributes["ingress"]
            .as_list()
            .unwrap()
            .iter()
            .map(|r| r.as_map().unwrap()["from_port"].as_int().unwrap())
            .collect()
    }

    #[test]
    fn default_vpc_lookup() {
        let stage = security_topology(&config(Transport::Plain, VpcSelection::Default));
        let vpc = stage.resource("vpc").unwrap();
        assert!(vpc.is_data_source());
        assert_eq!(vpc.attributes.get("is_default"), Some(&Value::Bool(true)));
        assert!(!vpc.attributes.contains_key("vpc_id"));
    }

    #[test]
    fn explicit_vpc_lookup() {
        let stage = security_topology(&config(
            Transport::Plain,
            VpcSelection::Explicit("vpc-9".to_string()),
        ));
        let vpc = stage.resource("vpc").unwrap();
        assert_eq!(vpc.attributes.get("vpc_id"), Some(&Value::from("vpc-9")));
        assert!(!vpc.attributes.contains_key("is_default"));
    }

    #[test]
    fn edge_group_opens_listener_ports_to_anywhere() {
        let tls = Transport::Tls {
            certificate_arn: "arn:aws:acm:us-east-1:1:certificate/c".to_string(),
        };
        let stage = security_topology(&config(tls, VpcSelection::Default));
        let edge = stage.resource("edge_sg").unwrap();
        assert_eq!(ports(edge), vec![443, 444]);

        let stage = security_topology(&config(Transport::Plain, VpcSelection::Default));
        assert_eq!(ports(stage.resource("edge_sg").unwrap()), vec![80, 444]);
    }

    #[test]
    fn service_group_only_admits_the_edge_group() {
        let stage = security_topology(&config(Transport::Plain, VpcSelection::Default));
        let service = stage.resource("service_sg").unwrap();
        assert_eq!(ports(service), vec![4444, 5555]);
        for rule in service.attributes["ingress"].as_list().unwrap() {
            let rule = rule.as_map().unwrap();
            assert!(!rule.contains_key("cidr_ip"));
            assert_eq!(
                rule["source_security_group_id"],
                Value::reference("edge_sg", "id")
            );
        }
    }

    #[test]
    fn roles_are_assumed_by_ecs_tasks() {
        let stage = security_topology(&config(Transport::Plain, VpcSelection::Default));
        let exec = stage.resource("execution_role").unwrap();
        assert_eq!(exec.id.name, "slsd-task-exec-role-dev");
        assert_eq!(
            exec.attributes["managed_policy_arns"],
            Value::from(vec![EXECUTION_ROLE_POLICY_ARN])
        );
        let task = stage.resource("task_role").unwrap();
        assert_eq!(task.attributes["assumed_by"], Value::from(ECS_TASKS_PRINCIPAL));
        assert!(!task.attributes.contains_key("managed_policy_arns"));
        assert_eq!(stage.output.trust.task_role.binding, "task_role");
    }
}
