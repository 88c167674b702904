//! Orchestrator - Compose every stage in dependency order and derive endpoints
//!
//! Stage order:
//! security -> {internal-elb, external-elb} -> service, and
//! {internal-elb, external-elb} -> dns when DNS mapping is enabled.

use std::collections::HashMap;
use std::fmt;

use brokerstack_core::graph::{self, GraphError};
use brokerstack_core::resolve::BindingMap;
use brokerstack_core::resource::{Resource, Value};

use crate::channel::Tier;
use crate::config::Config;
use crate::dns::{DnsTopology, dns_topology};
use crate::load_balancer::{LoadBalancerTopology, load_balancer_topology};
use crate::security::{SecurityTopology, security_topology};
use crate::service::{ServiceTopology, service_topology};
use crate::stage::{self, Stage};

/// Stages each stage may depend on
pub const STAGE_DEPENDENCIES: &[(&str, &[&str])] = &[
    (stage::SECURITY, &[]),
    (stage::INTERNAL_ELB, &[stage::SECURITY]),
    (stage::EXTERNAL_ELB, &[stage::SECURITY]),
    (
        stage::SERVICE,
        &[stage::SECURITY, stage::INTERNAL_ELB, stage::EXTERNAL_ELB],
    ),
    (stage::DNS, &[stage::INTERNAL_ELB, stage::EXTERNAL_ELB]),
];

const INTERNAL_URL_DESCRIPTION: &str = "Set this value as `thundra_agent_lambda_debugger_broker_host` in your lambda \
to use the internal load balancer for communication. You can also set this as the broker host in \
Thundra debug client configuration if you want to use the internal endpoint. Beware that you would \
need to connect to your VPC in order to access this endpoint.";

const EXTERNAL_URL_DESCRIPTION: &str = "Set this value as `thundra_agent_lambda_debugger_broker_host` in your lambda \
to use the external load balancer for communication. Beware that your lambda should have access to \
the internet. You can also set this as the broker host in Thundra debug client configuration if you \
want to use the external endpoint.";

const PORT_DESCRIPTION: &str =
    "Set this as the broker port in Thundra debug client configuration.";

/// A user-facing URL: scheme plus a host that may only be known after apply
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub scheme: &'static str,
    pub host: Value,
}

impl Endpoint {
    /// Render with live values; `None` while the host is still unknown
    pub fn resolve(&self, bindings: &BindingMap) -> Option<String> {
        let host = bindings.resolve_value(&self.host);
        host.as_str().map(|h| format!("{}{}", self.scheme, h))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Value::ResourceRef(binding, attr) => {
                write!(f, "{}${{{}.{}}}", self.scheme, binding, attr)
            }
            other => write!(f, "{}{}", self.scheme, other.as_str().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    Endpoint(Endpoint),
    Port(u16),
}

impl OutputValue {
    pub fn resolve(&self, bindings: &BindingMap) -> Option<String> {
        match self {
            OutputValue::Endpoint(endpoint) => endpoint.resolve(bindings),
            OutputValue::Port(port) => Some(port.to_string()),
        }
    }
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputValue::Endpoint(endpoint) => endpoint.fmt(f),
            OutputValue::Port(port) => write!(f, "{}", port),
        }
    }
}

/// Named value surfaced to whatever invoked the deployment
#[derive(Debug, Clone, PartialEq)]
pub struct StackOutput {
    pub name: String,
    pub description: &'static str,
    pub value: OutputValue,
}

/// The composed topology
#[derive(Debug, Clone)]
pub struct Deployment {
    pub security: Stage<SecurityTopology>,
    pub internal: Stage<LoadBalancerTopology>,
    pub external: Stage<LoadBalancerTopology>,
    pub service: Stage<ServiceTopology>,
    pub dns: Option<Stage<DnsTopology>>,
    /// Every descriptor, dependencies first
    pub resources: Vec<Resource>,
    pub internal_endpoint: Endpoint,
    pub external_endpoint: Endpoint,
    pub client_port: u16,
}

impl Deployment {
    /// Names of the instantiated stages, in order
    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut names = vec![
            self.security.name,
            self.internal.name,
            self.external.name,
            self.service.name,
        ];
        if let Some(dns) = &self.dns {
            names.push(dns.name);
        }
        names
    }

    /// Bindings of one stage
    pub fn stage_bindings(&self, name: &str) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|r| r.stage.as_deref() == Some(name))
            .map(|r| r.binding.as_str())
            .collect()
    }

    pub fn outputs(&self, config: &Config) -> Vec<StackOutput> {
        let naming = &config.naming;
        vec![
            StackOutput {
                name: naming.qualify("broker-internal-url"),
                description: INTERNAL_URL_DESCRIPTION,
                value: OutputValue::Endpoint(self.internal_endpoint.clone()),
            },
            StackOutput {
                name: naming.qualify("broker-external-url"),
                description: EXTERNAL_URL_DESCRIPTION,
                value: OutputValue::Endpoint(self.external_endpoint.clone()),
            },
            StackOutput {
                name: naming.qualify("broker-port"),
                description: PORT_DESCRIPTION,
                value: OutputValue::Port(self.client_port),
            },
        ]
    }
}

/// Pick the two endpoints: DNS record names when mapped, else raw load balancer addresses
fn resolve_endpoints(
    config: &Config,
    internal: &LoadBalancerTopology,
    external: &LoadBalancerTopology,
    dns: Option<&DnsTopology>,
) -> (Endpoint, Endpoint) {
    let transport = &config.transport;
    match dns {
        Some(dns) => (
            Endpoint {
                scheme: transport.websocket_scheme(),
                host: Value::from(dns.internal.record_name.as_str()),
            },
            Endpoint {
                scheme: transport.websocket_scheme(),
                host: Value::from(dns.external.record_name.as_str()),
            },
        ),
        None => (
            Endpoint {
                scheme: transport.http_scheme(),
                host: internal.load_balancer.attr("dns_name"),
            },
            Endpoint {
                scheme: transport.http_scheme(),
                host: external.load_balancer.attr("dns_name"),
            },
        ),
    }
}

/// Check that every edge crossing stages follows `STAGE_DEPENDENCIES`
pub fn verify_stage_order(resources: &[Resource]) -> Result<(), GraphError> {
    let stage_of: HashMap<&str, Option<&str>> = resources
        .iter()
        .map(|r| (r.binding.as_str(), r.stage.as_deref()))
        .collect();
    let allowed: HashMap<&str, &[&str]> = STAGE_DEPENDENCIES.iter().copied().collect();

    for resource in resources {
        let Some(from_stage) = resource.stage.as_deref() else {
            continue;
        };
        for target in resource.dependencies() {
            let Some(Some(target_stage)) = stage_of.get(target.as_str()) else {
                continue;
            };
            let permitted = *target_stage == from_stage
                || allowed
                    .get(from_stage)
                    .is_some_and(|deps| deps.contains(target_stage));
            if !permitted {
                return Err(GraphError::OrderViolation {
                    from: resource.binding.clone(),
                    target,
                });
            }
        }
    }
    Ok(())
}

/// Compose the whole topology from a validated configuration
pub fn compose(config: &Config) -> Result<Deployment, GraphError> {
    let security = security_topology(config);
    let network = &security.output.network;
    let trust = &security.output.trust;

    let internal =
        load_balancer_topology(config, Tier::Internal, network, trust, &network.subnets);
    let external = load_balancer_topology(
        config,
        Tier::External,
        network,
        trust,
        &network.public_subnets,
    );

    let service = service_topology(config, network, trust, &internal.output, &external.output);

    let dns = config
        .dns
        .as_ref()
        .map(|settings| dns_topology(config, settings, &internal.output, &external.output));

    let (internal_endpoint, external_endpoint) = resolve_endpoints(
        config,
        &internal.output,
        &external.output,
        dns.as_ref().map(|s| &s.output),
    );

    let mut emitted: Vec<Resource> = Vec::new();
    emitted.extend(security.resources.iter().cloned());
    emitted.extend(internal.resources.iter().cloned());
    emitted.extend(external.resources.iter().cloned());
    emitted.extend(service.resources.iter().cloned());
    if let Some(dns) = &dns {
        emitted.extend(dns.resources.iter().cloned());
    }

    let resources = graph::topological_order(&emitted)?;
    graph::verify_order(&resources)?;
    verify_stage_order(&resources)?;
    log::info!(
        "composed {} resources across {} stages",
        resources.len(),
        if dns.is_some() { 5 } else { 4 }
    );

    Ok(Deployment {
        client_port: config.transport.client_port(),
        security,
        internal,
        external,
        service,
        dns,
        resources,
        internal_endpoint,
        external_endpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_rejects_backward_edge() {
        let resources = vec![
            Resource::new("ecs.cluster", "c").with_stage(stage::SERVICE),
            Resource::new("ec2.security_group", "sg")
                .with_stage(stage::SECURITY)
                .depends_on("c"),
        ];
        assert_eq!(
            verify_stage_order(&resources),
            Err(GraphError::OrderViolation {
                from: "sg".to_string(),
                target: "c".to_string()
            })
        );
    }

    #[test]
    fn dns_may_not_depend_on_service() {
        let resources = vec![
            Resource::new("ecs.service", "svc").with_stage(stage::SERVICE),
            Resource::new("route53.cname_record", "r")
                .with_stage(stage::DNS)
                .with_attribute("target", Value::reference("svc", "arn")),
        ];
        assert!(verify_stage_order(&resources).is_err());
    }

    #[test]
    fn endpoint_display_shows_pending_reference() {
        let endpoint = Endpoint {
            scheme: "http://",
            host: Value::reference("external_lb", "dns_name"),
        };
        assert_eq!(endpoint.to_string(), "http://${external_lb.dns_name}");
        assert_eq!(endpoint.resolve(&BindingMap::new()), None);
    }
}
