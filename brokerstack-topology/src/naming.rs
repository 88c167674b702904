//! Naming - `<prefix>-<shortname>-<stage>` for every provisioned resource

use std::fmt;
use std::str::FromStr;

use crate::channel::{Channel, Tier};

pub const DEFAULT_PREFIX: &str = "slsd";
pub const DEFAULT_STAGE: &str = "dev";

/// Which short-name convention to apply across one deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingStyle {
    /// `internal-elb-client-target-group`
    Full,
    /// `in-elb-clt-tg`; fits the 32-character limit on load balancer names
    #[default]
    Abbreviated,
}

impl FromStr for NamingStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(NamingStyle::Full),
            "abbreviated" | "abbr" => Ok(NamingStyle::Abbreviated),
            other => Err(format!(
                "NAMING_STYLE must be 'full' or 'abbreviated', got '{}'",
                other
            )),
        }
    }
}

/// Every named thing the topology creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    ExecutionRole,
    TaskRole,
    EdgeSecurityGroup,
    ServiceSecurityGroup,
    LoadBalancer(Tier),
    TargetGroup(Tier, Channel),
    Listener(Tier, Channel),
    Cluster,
    TaskDefinition,
    Service,
}

impl Component {
    /// Components whose names are capped at 32 characters by the platform
    pub fn length_limited() -> Vec<Component> {
        let mut components = Vec::new();
        for tier in Tier::ALL {
            components.push(Component::LoadBalancer(tier));
            for channel in Channel::ALL {
                components.push(Component::TargetGroup(tier, channel));
            }
        }
        components
    }

    /// Short name under `style`
    pub fn short_name(self, style: NamingStyle) -> String {
        let abbreviated = style == NamingStyle::Abbreviated;
        match self {
            Component::ExecutionRole if abbreviated => "task-exec-role".to_string(),
            Component::ExecutionRole => "task-execution-role".to_string(),
            Component::TaskRole => "task-role".to_string(),
            Component::EdgeSecurityGroup if abbreviated => "ex-elb-sg".to_string(),
            Component::EdgeSecurityGroup => "external-elb-security-group".to_string(),
            Component::ServiceSecurityGroup if abbreviated => "svc-sg".to_string(),
            Component::ServiceSecurityGroup => "service-security-group".to_string(),
            Component::LoadBalancer(tier) if abbreviated => format!("{}-elb", tier.abbreviation()),
            Component::LoadBalancer(tier) => format!("{}-elb", tier.as_str()),
            Component::TargetGroup(tier, channel) if abbreviated => {
                format!("{}-elb-{}-tg", tier.abbreviation(), channel.abbreviation())
            }
            Component::TargetGroup(tier, channel) => {
                format!("{}-elb-{}-target-group", tier.as_str(), channel.as_str())
            }
            Component::Listener(tier, channel) if abbreviated => {
                format!("{}-elb-{}-lnr", tier.abbreviation(), channel.abbreviation())
            }
            Component::Listener(tier, channel) => {
                format!("{}-elb-{}-listener", tier.as_str(), channel.as_str())
            }
            Component::Cluster => "ecs-cluster".to_string(),
            Component::TaskDefinition if abbreviated => "ecs-task-def".to_string(),
            Component::TaskDefinition => "ecs-task-definition".to_string(),
            Component::Service if abbreviated => "fargate-svc".to_string(),
            Component::Service => "fargate-service".to_string(),
        }
    }

    /// Human-readable description used in error messages
    pub fn describe(self) -> String {
        match self {
            Component::ExecutionRole => "task execution role".to_string(),
            Component::TaskRole => "task role".to_string(),
            Component::EdgeSecurityGroup => "edge security group".to_string(),
            Component::ServiceSecurityGroup => "service security group".to_string(),
            Component::LoadBalancer(tier) => format!("{} load balancer", tier.as_str()),
            Component::TargetGroup(tier, channel) => {
                format!("{} {} target group", tier.as_str(), channel.as_str())
            }
            Component::Listener(tier, channel) => {
                format!("{} {} listener", tier.as_str(), channel.as_str())
            }
            Component::Cluster => "cluster".to_string(),
            Component::TaskDefinition => "task definition".to_string(),
            Component::Service => "service".to_string(),
        }
    }
}

/// Prefix, stage and style, fixed once at startup and passed to every stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    prefix: String,
    stage: String,
    style: NamingStyle,
}

impl Default for Naming {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, DEFAULT_STAGE, NamingStyle::default())
    }
}

impl Naming {
    pub fn new(prefix: impl Into<String>, stage: impl Into<String>, style: NamingStyle) -> Self {
        Self {
            prefix: prefix.into(),
            stage: stage.into(),
            style,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn style(&self) -> NamingStyle {
        self.style
    }

    /// `<prefix>-<short>-<stage>`
    pub fn qualify(&self, short: &str) -> String {
        format!("{}-{}-{}", self.prefix, short, self.stage)
    }

    pub fn name(&self, component: Component) -> String {
        self.qualify(&component.short_name(self.style))
    }
}

impl fmt::Display for Naming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-*-{}", self.prefix, self.stage)
    }
}
