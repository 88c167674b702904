//! Traffic classes and load-balancer tiers

use crate::config::Transport;

/// Port the broker container serves debug clients on
pub const CLIENT_CONTAINER_PORT: u16 = 5555;
/// Port the broker container serves instrumented applications on
pub const APPLICATION_CONTAINER_PORT: u16 = 4444;
/// Upstream port of the application listener, whatever the transport
pub const APPLICATION_LISTENER_PORT: u16 = 444;
pub const HTTPS_PORT: u16 = 443;
pub const HTTP_PORT: u16 = 80;

/// One of the two logical traffic classes served by every load balancer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Client,
    Application,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Client, Channel::Application];

    /// Downstream port on the container; independent of the listener port
    pub fn container_port(self) -> u16 {
        match self {
            Channel::Client => CLIENT_CONTAINER_PORT,
            Channel::Application => APPLICATION_CONTAINER_PORT,
        }
    }

    /// Upstream port the listener accepts connections on
    pub fn listener_port(self, transport: &Transport) -> u16 {
        match self {
            Channel::Client => transport.client_port(),
            Channel::Application => APPLICATION_LISTENER_PORT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Client => "client",
            Channel::Application => "application",
        }
    }

    pub(crate) fn abbreviation(self) -> &'static str {
        match self {
            Channel::Client => "clt",
            Channel::Application => "app",
        }
    }
}

/// Load-balancer deployment tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Reachable only from inside the VPC
    Internal,
    /// Internet-facing
    External,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::Internal, Tier::External];

    pub fn internet_facing(self) -> bool {
        matches!(self, Tier::External)
    }

    /// Value of the load balancer's `scheme` attribute
    pub fn scheme(self) -> &'static str {
        if self.internet_facing() {
            "internet-facing"
        } else {
            "internal"
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Internal => "internal",
            Tier::External => "external",
        }
    }

    pub(crate) fn abbreviation(self) -> &'static str {
        match self {
            Tier::Internal => "in",
            Tier::External => "ex",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_listener_port_follows_transport() {
        let tls = Transport::Tls {
            certificate_arn: "arn:aws:acm:us-east-1:1:certificate/x".to_string(),
        };
        assert_eq!(Channel::Client.listener_port(&tls), 443);
        assert_eq!(Channel::Client.listener_port(&Transport::Plain), 80);
        assert_eq!(Channel::Application.listener_port(&tls), 444);
        assert_eq!(Channel::Application.listener_port(&Transport::Plain), 444);
    }

    #[test]
    fn container_ports_are_fixed() {
        assert_eq!(Channel::Client.container_port(), 5555);
        assert_eq!(Channel::Application.container_port(), 4444);
    }

    #[test]
    fn only_external_tier_is_internet_facing() {
        assert!(!Tier::Internal.internet_facing());
        assert!(Tier::External.internet_facing());
        assert_eq!(Tier::Internal.scheme(), "internal");
        assert_eq!(Tier::External.scheme(), "internet-facing");
    }
}
