//! Load balancer - One tier: a load balancer with a client and an application channel
//!
//! Internal and external tiers share this builder; they differ only in
//! `scheme` and in the subnets the caller passes.

use brokerstack_core::providers::aws;
use brokerstack_core::resource::{Resource, Value};

use crate::channel::{Channel, Tier};
use crate::config::{Config, Transport};
use crate::naming::Component;
use crate::security::{NetworkContext, TrustBoundary};
use crate::stage::{self, Handle, Stage, StageBuilder};

pub const HEALTH_CHECK_PATH: &str = "/ping";
pub const HEALTH_CHECK_INTERVAL_SECONDS: i64 = 30;

/// Target group and listener serving one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTopology {
    pub channel: Channel,
    pub target_group: Handle,
    pub listener: Handle,
    /// Upstream port
    pub listener_port: u16,
    /// Downstream port on the container
    pub container_port: u16,
    pub protocol: &'static str,
    pub certificate_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerTopology {
    pub tier: Tier,
    pub load_balancer: Handle,
    pub client: ChannelTopology,
    pub application: ChannelTopology,
}

impl LoadBalancerTopology {
    pub fn channel(&self, channel: Channel) -> &ChannelTopology {
        match channel {
            Channel::Client => &self.client,
            Channel::Application => &self.application,
        }
    }

    pub fn listeners(&self) -> [&Handle; 2] {
        [&self.client.listener, &self.application.listener]
    }

    pub fn target_groups(&self) -> [&Handle; 2] {
        [&self.client.target_group, &self.application.target_group]
    }
}

fn stage_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Internal => stage::INTERNAL_ELB,
        Tier::External => stage::EXTERNAL_ELB,
    }
}

fn target_group(config: &Config, tier: Tier, channel: Channel, vpc: &Handle) -> Resource {
    let name = config.naming.name(Component::TargetGroup(tier, channel));
    let port = channel.container_port();
    Resource::new(aws::TARGET_GROUP, name.as_str())
        .with_binding(format!("{}_{}_tg", tier.as_str(), channel.as_str()))
        .with_attribute("name", name)
        .with_attribute("port", port)
        .with_attribute("protocol", "HTTP")
        .with_attribute("target_type", "ip")
        .with_attribute("vpc_id", vpc.attr("id"))
        .with_attribute("health_check_enabled", true)
        .with_attribute("health_check_path", HEALTH_CHECK_PATH)
        .with_attribute("health_check_port", port)
        .with_attribute("health_check_protocol", "HTTP")
        .with_attribute("health_check_interval_seconds", HEALTH_CHECK_INTERVAL_SECONDS)
}

fn listener(
    config: &Config,
    tier: Tier,
    channel: Channel,
    load_balancer: &Handle,
    target_group: &Handle,
) -> Resource {
    let transport = &config.transport;
    let mut resource = Resource::new(
        aws::LISTENER,
        config.naming.name(Component::Listener(tier, channel)),
    )
    .with_binding(format!("{}_{}_listener", tier.as_str(), channel.as_str()))
    .with_attribute("load_balancer_arn", load_balancer.attr("arn"))
    .with_attribute("port", channel.listener_port(transport))
    .with_attribute("protocol", transport.listener_protocol())
    .with_attribute("default_target_group_arn", target_group.attr("arn"));

    if let Transport::Tls { certificate_arn } = transport {
        resource = resource.with_attribute("certificate_arns", vec![certificate_arn.as_str()]);
    }
    resource
}

/// Build one tier.
///
/// `subnets` is the caller's subnet-tier choice for this load balancer.
pub fn load_balancer_topology(
    config: &Config,
    tier: Tier,
    network: &NetworkContext,
    trust: &TrustBoundary,
    subnets: &[String],
) -> Stage<LoadBalancerTopology> {
    let mut stage = StageBuilder::new(config, stage_name(tier));

    let name = config.naming.name(Component::LoadBalancer(tier));
    let load_balancer = stage.add(
        Resource::new(aws::LOAD_BALANCER, name.as_str())
            .with_binding(format!("{}_lb", tier.as_str()))
            .with_attribute("name", name)
            .with_attribute("scheme", tier.scheme())
            .with_attribute("load_balancer_type", "application")
            .with_attribute(
                "security_groups",
                Value::List(vec![trust.edge_security_group.attr("id")]),
            )
            .with_attribute("subnets", subnets.to_vec()),
    );

    let mut channel_topology = |channel: Channel| {
        let target_group = stage.add(target_group(config, tier, channel, &network.vpc));
        let listener = stage.add(listener(config, tier, channel, &load_balancer, &target_group));
        ChannelTopology {
            channel,
            target_group,
            listener,
            listener_port: channel.listener_port(&config.transport),
            container_port: channel.container_port(),
            protocol: config.transport.listener_protocol(),
            certificate_arn: config.transport.certificate_arn().map(str::to_string),
        }
    };
    let application = channel_topology(Channel::Application);
    let client = channel_topology(Channel::Client);

    stage.finish(LoadBalancerTopology {
        tier,
        load_balancer,
        client,
        application,
    })
}
