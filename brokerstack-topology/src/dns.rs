//! DNS - CNAME records pointing subdomains at the two load balancers

use brokerstack_core::providers::aws;
use brokerstack_core::resource::Resource;

use crate::config::{Config, DnsSettings};
use crate::load_balancer::LoadBalancerTopology;
use crate::stage::{self, Handle, Stage, StageBuilder};

pub const RECORD_TTL_SECONDS: i64 = 300;

const PRIVATE_COMMENT: &str = "Creating records for private elb of ServerlessDebugger broker";
const PUBLIC_COMMENT: &str = "Creating records for public elb of ServerlessDebugger broker";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub handle: Handle,
    /// Fully qualified record name, known before provisioning
    pub record_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsTopology {
    pub hosted_zone: Handle,
    pub internal: DnsRecord,
    pub external: DnsRecord,
}

fn cname(
    binding: &str,
    record_name: &str,
    zone: &Handle,
    load_balancer: &Handle,
    comment: &str,
) -> Resource {
    Resource::new(aws::CNAME_RECORD, record_name)
        .with_binding(binding)
        .with_attribute("hosted_zone_id", zone.attr("id"))
        .with_attribute("record_name", record_name)
        .with_attribute("target", load_balancer.attr("dns_name"))
        .with_attribute("ttl", RECORD_TTL_SECONDS)
        .with_attribute("comment", comment)
}

/// Build the DNS stage.
///
/// The hosted zone is a lookup; a zone that cannot be found fails the apply.
pub fn dns_topology(
    config: &Config,
    settings: &DnsSettings,
    internal: &LoadBalancerTopology,
    external: &LoadBalancerTopology,
) -> Stage<DnsTopology> {
    let mut stage = StageBuilder::new(config, stage::DNS);

    let hosted_zone = stage.add(
        Resource::new(aws::HOSTED_ZONE, settings.hosted_zone_name.as_str())
            .with_binding("hosted_zone")
            .with_attribute("domain_name", settings.hosted_zone_name.as_str())
            .with_read_only(true),
    );

    let private_name = settings.private_record_name();
    let internal_record = stage.add(cname(
        "internal_record",
        &private_name,
        &hosted_zone,
        &internal.load_balancer,
        PRIVATE_COMMENT,
    ));

    let public_name = settings.public_record_name();
    let external_record = stage.add(cname(
        "external_record",
        &public_name,
        &hosted_zone,
        &external.load_balancer,
        PUBLIC_COMMENT,
    ));

    stage.finish(DnsTopology {
        hosted_zone,
        internal: DnsRecord {
            handle: internal_record,
            record_name: private_name,
        },
        external: DnsRecord {
            handle: external_record,
            record_name: public_name,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokerstack_core::resource::Value;

    use crate::channel::Tier;
    use crate::config::{Transport, VpcSelection};
    use crate::load_balancer::load_balancer_topology;
    use crate::naming::Naming;
    use crate::security::security_topology;

    fn settings() -> DnsSettings {
        DnsSettings {
            hosted_zone_name: "example.com".to_string(),
            public_subdomain: "broker".to_string(),
            private_subdomain: "broker-internal".to_string(),
        }
    }

    fn build() -> Stage<DnsTopology> {
        let config = Config {
            license_key: "x".to_string(),
            subnets: vec!["subnet-private".to_string()],
            public_subnets: vec!["subnet-public".to_string()],
            vpc: VpcSelection::Default,
            transport: Transport::Plain,
            dns: Some(settings()),
            naming: Naming::default(),
            container_name: "broker".to_string(),
            image: "image".to_string(),
            apply_tags: true,
            region: "us-east-1".to_string(),
        };
        let security = security_topology(&config);
        let network = &security.output.network;
        let trust = &security.output.trust;
        let internal = load_balancer_topology(&config, Tier::Internal, network, trust, &network.subnets);
        let external =
            load_balancer_topology(&config, Tier::External, network, trust, &network.public_subnets);
        dns_topology(&config, &settings(), &internal.output, &external.output)
    }

    #[test]
    fn records_point_at_their_own_tier() {
        let stage = build();

        let internal = stage.resource("internal_record").unwrap();
        assert_eq!(internal.id.name, "broker-internal.example.com");
        assert_eq!(internal.attributes["target"], Value::reference("internal_lb", "dns_name"));
        assert_eq!(internal.attributes["comment"], Value::from(PRIVATE_COMMENT));

        let external = stage.resource("external_record").unwrap();
        assert_eq!(external.id.name, "broker.example.com");
        assert_eq!(external.attributes["target"], Value::reference("external_lb", "dns_name"));
        assert_eq!(external.attributes["comment"], Value::from(PUBLIC_COMMENT));

        assert_eq!(stage.output.internal.record_name, "broker-internal.example.com");
        assert_eq!(stage.output.external.record_name, "broker.example.com");
    }

    #[test]
    fn records_share_the_zone_and_ttl() {
        let stage = build();
        for binding in ["internal_record", "external_record"] {
            let record = stage.resource(binding).unwrap();
            assert_eq!(record.attributes["ttl"], Value::Int(RECORD_TTL_SECONDS));
            assert_eq!(
                record.attributes["hosted_zone_id"],
                Value::reference("hosted_zone", "id")
            );
            assert_eq!(record.stage.as_deref(), Some(stage::DNS));
            assert!(!record.attributes.contains_key("tags"));
        }
    }

    #[test]
    fn hosted_zone_is_only_looked_up() {
        let stage = build();
        let zone = stage.resource("hosted_zone").unwrap();
        assert!(zone.is_data_source());
        assert_eq!(zone.id.resource_type, aws::HOSTED_ZONE);
        assert_eq!(zone.attributes["domain_name"], Value::from("example.com"));
        assert_eq!(stage.output.hosted_zone.binding, "hosted_zone");
        assert_eq!(
            stage.bindings(),
            vec!["hosted_zone", "internal_record", "external_record"]
        );
    }
}
