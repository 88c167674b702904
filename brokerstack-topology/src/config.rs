//! Config - Validated deployment settings built from a flat environment
//!
//! Every rule is evaluated; all violations are reported together and no
//! partially valid `Config` is ever produced.

use std::collections::HashMap;

use brokerstack_core::schema::validate_elb_name;

use crate::error::ConfigError;
use crate::naming::{Component, DEFAULT_PREFIX, DEFAULT_STAGE, Naming, NamingStyle};

pub const LICENSE_KEY: &str = "SLSDEBUG_LICENSE_KEY";
/// Accepted when `SLSDEBUG_LICENSE_KEY` is unset or blank
pub const LICENSE_KEY_ALIAS: &str = "LICENSE_KEY";
pub const SUBNET_IDS: &str = "SUBNET_IDS";
pub const PUBLIC_SUBNET_IDS: &str = "PUBLIC_SUBNET_IDS";
pub const VPC_ID: &str = "VPC_ID";
pub const USE_HTTPS: &str = "USE_HTTPS";
pub const SSL_CERTIFICATE_ARN: &str = "SSL_CERTIFICATE_ARN";
pub const CREATE_DNS_MAPPING: &str = "CREATE_DNS_MAPPING";
pub const HOSTED_ZONE_NAME: &str = "HOSTED_ZONE_NAME";
pub const BROKER_PUBLIC_SUBDOMAIN: &str = "BROKER_PUBLIC_SUBDOMAIN";
pub const BROKER_PRIVATE_SUBDOMAIN: &str = "BROKER_PRIVATE_SUBDOMAIN";
pub const ENTITY_PREFIX: &str = "ENTITY_PREFIX";
pub const STAGE: &str = "STAGE";
pub const BROKER_CONTAINER_NAME: &str = "BROKER_CONTAINER_NAME";
pub const BROKER_IMAGE_URI: &str = "BROKER_IMAGE_URI";
pub const APPLY_TAGS: &str = "APPLY_TAGS";
pub const NAMING_STYLE: &str = "NAMING_STYLE";
pub const REGION_KEYS: [&str; 3] = ["AWS_REGION", "AWS_DEFAULT_REGION", "CDK_DEFAULT_REGION"];

pub const DEFAULT_CONTAINER_NAME: &str = "sls-debugger-broker-container";
pub const DEFAULT_IMAGE_URI: &str =
    "public.ecr.aws/i9q5q2b9/thundra-self-hosted-lambda-debug-broker:latest";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Parse a truth value.
///
/// Accepts `y yes t true on 1` and `n no f false off 0`, case-insensitively.
/// Absent input is the caller's business; an empty string is rejected here.
pub fn parse_bool(input: &str) -> Result<bool, ConfigError> {
    match input.to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidTruthValue(input.to_string())),
    }
}

/// Listener transport; protocol and certificate come from the same variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Plain,
    Tls { certificate_arn: String },
}

impl Transport {
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls { .. })
    }

    pub fn listener_protocol(&self) -> &'static str {
        if self.is_tls() { "HTTPS" } else { "HTTP" }
    }

    pub fn certificate_arn(&self) -> Option<&str> {
        match self {
            Transport::Plain => None,
            Transport::Tls { certificate_arn } => Some(certificate_arn),
        }
    }

    /// Port of the client listener: 443 over TLS, 80 otherwise
    pub fn client_port(&self) -> u16 {
        if self.is_tls() {
            crate::channel::HTTPS_PORT
        } else {
            crate::channel::HTTP_PORT
        }
    }

    /// Scheme for endpoints published under DNS record names
    pub fn websocket_scheme(&self) -> &'static str {
        if self.is_tls() { "wss://" } else { "ws://" }
    }

    /// Scheme for endpoints published as raw load balancer addresses
    pub fn http_scheme(&self) -> &'static str {
        if self.is_tls() { "https://" } else { "http://" }
    }
}

/// How the VPC is resolved; exactly one path is taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VpcSelection {
    Explicit(String),
    Default,
}

/// DNS mapping settings, present only when mapping is enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSettings {
    pub hosted_zone_name: String,
    pub public_subdomain: String,
    pub private_subdomain: String,
}

impl DnsSettings {
    /// Record name of the internal load balancer
    pub fn private_record_name(&self) -> String {
        format!("{}.{}", self.private_subdomain, self.hosted_zone_name)
    }

    /// Record name of the external load balancer
    pub fn public_record_name(&self) -> String {
        format!("{}.{}", self.public_subdomain, self.hosted_zone_name)
    }
}

/// Validated configuration, built once and threaded through every stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub license_key: String,
    /// Subnets for the service and the internal tier
    pub subnets: Vec<String>,
    /// Subnets for the external tier
    pub public_subnets: Vec<String>,
    pub vpc: VpcSelection,
    pub transport: Transport,
    pub dns: Option<DnsSettings>,
    pub naming: Naming,
    pub container_name: String,
    pub image: String,
    pub apply_tags: bool,
    pub region: String,
}

/// Lookup over the raw environment where blank values count as unset
struct Env<'a>(&'a HashMap<String, String>);

impl<'a> Env<'a> {
    fn get(&self, key: &str) -> Option<&'a str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn flag(&self, key: &str, default: bool, violations: &mut Vec<String>) -> bool {
        match self.get(key).map(parse_bool) {
            None => default,
            Some(Ok(b)) => b,
            Some(Err(e)) => {
                violations.push(format!("{}: {}", key, e));
                default
            }
        }
    }
}

/// Split a comma-separated id list, trimming items and dropping empty ones
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Build and validate a configuration from environment key/values
    pub fn from_env(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let env = Env(vars);
        let mut violations = Vec::new();

        let use_https = env.flag(USE_HTTPS, false, &mut violations);
        let create_dns = env.flag(CREATE_DNS_MAPPING, false, &mut violations);
        let apply_tags = env.flag(APPLY_TAGS, true, &mut violations);

        let style = match env.get(NAMING_STYLE).map(str::parse::<NamingStyle>) {
            None => NamingStyle::default(),
            Some(Ok(style)) => style,
            Some(Err(msg)) => {
                violations.push(msg);
                NamingStyle::default()
            }
        };

        let transport = match (use_https, env.get(SSL_CERTIFICATE_ARN)) {
            (false, _) => Transport::Plain,
            (true, Some(arn)) => Transport::Tls {
                certificate_arn: arn.to_string(),
            },
            (true, None) => {
                violations.push(format!(
                    "Make sure to set {} in .env or set {} to false.",
                    SSL_CERTIFICATE_ARN, USE_HTTPS
                ));
                Transport::Plain
            }
        };

        let license_key = env
            .get(LICENSE_KEY)
            .or_else(|| env.get(LICENSE_KEY_ALIAS))
            .unwrap_or_default()
            .to_string();
        if license_key.is_empty() {
            violations.push(format!("Make sure to set {} in .env", LICENSE_KEY));
        }

        let subnets = env.get(SUBNET_IDS).map(parse_id_list).unwrap_or_default();
        if subnets.is_empty() {
            violations.push(format!("Make sure to set {} in .env", SUBNET_IDS));
        }
        let public_subnets = env
            .get(PUBLIC_SUBNET_IDS)
            .map(parse_id_list)
            .filter(|ids| !ids.is_empty())
            .unwrap_or_else(|| subnets.clone());

        let dns = if create_dns {
            let mut required = |key: &str| match env.get(key) {
                Some(v) => v.to_string(),
                None => {
                    violations.push(format!(
                        "Make sure to set {} in .env or set {} to false",
                        key, CREATE_DNS_MAPPING
                    ));
                    String::new()
                }
            };
            let settings = DnsSettings {
                hosted_zone_name: required(HOSTED_ZONE_NAME),
                public_subdomain: required(BROKER_PUBLIC_SUBDOMAIN),
                private_subdomain: required(BROKER_PRIVATE_SUBDOMAIN),
            };
            if !settings.public_subdomain.is_empty()
                && settings.public_subdomain.eq_ignore_ascii_case(&settings.private_subdomain)
            {
                violations.push(format!(
                    "{} and {} must be different",
                    BROKER_PUBLIC_SUBDOMAIN, BROKER_PRIVATE_SUBDOMAIN
                ));
            }
            Some(settings)
        } else {
            None
        };

        let naming = Naming::new(
            env.get(ENTITY_PREFIX).unwrap_or(DEFAULT_PREFIX),
            env.get(STAGE).unwrap_or(DEFAULT_STAGE),
            style,
        );
        for component in Component::length_limited() {
            let name = naming.name(component);
            if let Err(msg) = validate_elb_name(&name) {
                violations.push(format!(
                    "Name of the {} is invalid: {}; adjust {} or {}",
                    component.describe(),
                    msg,
                    ENTITY_PREFIX,
                    STAGE
                ));
            }
        }

        if !violations.is_empty() {
            return Err(ConfigError::Invalid(violations));
        }

        let vpc = match env.get(VPC_ID) {
            Some(id) => VpcSelection::Explicit(id.to_string()),
            None => VpcSelection::Default,
        };

        let region = REGION_KEYS
            .iter()
            .find_map(|k| env.get(k))
            .unwrap_or(DEFAULT_REGION)
            .to_string();

        let config = Config {
            license_key,
            subnets,
            public_subnets,
            vpc,
            transport,
            dns,
            naming,
            container_name: env
                .get(BROKER_CONTAINER_NAME)
                .unwrap_or(DEFAULT_CONTAINER_NAME)
                .to_string(),
            image: env.get(BROKER_IMAGE_URI).unwrap_or(DEFAULT_IMAGE_URI).to_string(),
            apply_tags,
            region,
        };
        log::debug!(
            "configuration: naming {}, tls {}, dns {}",
            config.naming,
            config.transport.is_tls(),
            config.dns.is_some()
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![(LICENSE_KEY, "x"), (SUBNET_IDS, "subnet-a,subnet-b")]
    }

    #[test]
    fn parse_bool_accepts_known_literals() {
        for t in ["y", "YES", "t", "True", "on", "1"] {
            assert_eq!(parse_bool(t), Ok(true), "{}", t);
        }
        for f in ["n", "No", "F", "false", "OFF", "0"] {
            assert_eq!(parse_bool(f), Ok(false), "{}", f);
        }
    }

    #[test]
    fn parse_bool_rejects_anything_else() {
        let err = parse_bool("maybe").unwrap_err();
        assert_eq!(err.to_string(), "Invalid truth value maybe");
        assert!(parse_bool("").is_err());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_env(&env(&minimal())).unwrap();
        assert_eq!(config.subnets, vec!["subnet-a", "subnet-b"]);
        assert_eq!(config.public_subnets, config.subnets);
        assert_eq!(config.vpc, VpcSelection::Default);
        assert_eq!(config.transport, Transport::Plain);
        assert_eq!(config.transport.client_port(), 80);
        assert!(config.dns.is_none());
        assert_eq!(config.naming, Naming::default());
        assert_eq!(config.container_name, DEFAULT_CONTAINER_NAME);
        assert_eq!(config.image, DEFAULT_IMAGE_URI);
        assert!(config.apply_tags);
        assert_eq!(config.region, DEFAULT_REGION);
    }

    #[test]
    fn short_license_key_name_is_accepted() {
        let pairs = [
            (USE_HTTPS, "false"),
            (CREATE_DNS_MAPPING, "false"),
            (SUBNET_IDS, "subnet-a,subnet-b"),
            (LICENSE_KEY_ALIAS, "x"),
        ];
        let config = Config::from_env(&env(&pairs)).unwrap();
        assert_eq!(config.license_key, "x");
        assert_eq!(config.transport.client_port(), 80);
        assert!(config.dns.is_none());
    }

    #[test]
    fn full_license_key_name_wins_over_the_short_one() {
        let config = Config::from_env(&env(&[
            (LICENSE_KEY, "full"),
            (LICENSE_KEY_ALIAS, "short"),
            (SUBNET_IDS, "subnet-a"),
        ]))
        .unwrap();
        assert_eq!(config.license_key, "full");

        let blank = Config::from_env(&env(&[
            (LICENSE_KEY, " "),
            (LICENSE_KEY_ALIAS, "short"),
            (SUBNET_IDS, "subnet-a"),
        ]))
        .unwrap();
        assert_eq!(blank.license_key, "short");
    }

    #[test]
    fn https_without_certificate_is_rejected() {
        let mut pairs = minimal();
        pairs.push((USE_HTTPS, "true"));
        let err = Config::from_env(&env(&pairs)).unwrap_err();
        assert_eq!(
            err.violations(),
            vec!["Make sure to set SSL_CERTIFICATE_ARN in .env or set USE_HTTPS to false."]
        );
    }

    #[test]
    fn https_with_certificate_selects_tls() {
        let mut pairs = minimal();
        pairs.push((USE_HTTPS, "yes"));
        pairs.push((SSL_CERTIFICATE_ARN, "arn:aws:acm:us-east-1:1:certificate/c"));
        let config = Config::from_env(&env(&pairs)).unwrap();
        assert_eq!(config.transport.listener_protocol(), "HTTPS");
        assert_eq!(config.transport.client_port(), 443);
        assert_eq!(
            config.transport.certificate_arn(),
            Some("arn:aws:acm:us-east-1:1:certificate/c")
        );
    }

    #[test]
    fn certificate_without_https_is_ignored() {
        let mut pairs = minimal();
        pairs.push((SSL_CERTIFICATE_ARN, "arn:aws:acm:us-east-1:1:certificate/c"));
        let config = Config::from_env(&env(&pairs)).unwrap();
        assert_eq!(config.transport.certificate_arn(), None);
    }

    #[test]
    fn all_violations_are_collected() {
        let pairs = [
            (USE_HTTPS, "1"),
            (CREATE_DNS_MAPPING, "on"),
            (BROKER_PUBLIC_SUBDOMAIN, "broker"),
        ];
        let err = Config::from_env(&env(&pairs)).unwrap_err();
        assert_eq!(
            err.violations(),
            vec![
                "Make sure to set SSL_CERTIFICATE_ARN in .env or set USE_HTTPS to false.",
                "Make sure to set SLSDEBUG_LICENSE_KEY in .env",
                "Make sure to set SUBNET_IDS in .env",
                "Make sure to set HOSTED_ZONE_NAME in .env or set CREATE_DNS_MAPPING to false",
                "Make sure to set BROKER_PRIVATE_SUBDOMAIN in .env or set CREATE_DNS_MAPPING to false",
            ]
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let pairs = [(LICENSE_KEY, "  "), (SUBNET_IDS, " , "), (STAGE, "")];
        let err = Config::from_env(&env(&pairs)).unwrap_err();
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn invalid_truth_value_is_reported_with_key() {
        let mut pairs = minimal();
        pairs.push((USE_HTTPS, "maybe"));
        let err = Config::from_env(&env(&pairs)).unwrap_err();
        assert_eq!(err.violations(), vec!["USE_HTTPS: Invalid truth value maybe"]);
    }

    #[test]
    fn dns_subdomains_must_differ() {
        let mut pairs = minimal();
        pairs.extend([
            (CREATE_DNS_MAPPING, "true"),
            (HOSTED_ZONE_NAME, "example.com"),
            (BROKER_PUBLIC_SUBDOMAIN, "broker"),
            (BROKER_PRIVATE_SUBDOMAIN, "Broker"),
        ]);
        let err = Config::from_env(&env(&pairs)).unwrap_err();
        assert_eq!(
            err.violations(),
            vec!["BROKER_PUBLIC_SUBDOMAIN and BROKER_PRIVATE_SUBDOMAIN must be different"]
        );
    }

    #[test]
    fn dns_settings_build_record_names() {
        let mut pairs = minimal();
        pairs.extend([
            (CREATE_DNS_MAPPING, "true"),
            (HOSTED_ZONE_NAME, "example.com"),
            (BROKER_PUBLIC_SUBDOMAIN, "broker"),
            (BROKER_PRIVATE_SUBDOMAIN, "broker-internal"),
        ]);
        let dns = Config::from_env(&env(&pairs)).unwrap().dns.unwrap();
        assert_eq!(dns.public_record_name(), "broker.example.com");
        assert_eq!(dns.private_record_name(), "broker-internal.example.com");
    }

    #[test]
    fn full_naming_with_default_prefix_overflows_target_group_names() {
        let mut pairs = minimal();
        pairs.push((NAMING_STYLE, "full"));
        let err = Config::from_env(&env(&pairs)).unwrap_err();
        // both tiers' application and client target groups
        assert_eq!(err.violations().len(), 4);
        assert!(err.violations()[0].contains("target group"));
    }

    #[test]
    fn unknown_naming_style_is_rejected() {
        let mut pairs = minimal();
        pairs.push((NAMING_STYLE, "tiny"));
        let err = Config::from_env(&env(&pairs)).unwrap_err();
        assert_eq!(
            err.violations(),
            vec!["NAMING_STYLE must be 'full' or 'abbreviated', got 'tiny'"]
        );
    }

    #[test]
    fn explicit_vpc_and_public_subnets() {
        let mut pairs = minimal();
        pairs.extend([
            (VPC_ID, "vpc-123"),
            (PUBLIC_SUBNET_IDS, "subnet-p1, subnet-p2"),
            ("AWS_DEFAULT_REGION", "eu-west-1"),
        ]);
        let config = Config::from_env(&env(&pairs)).unwrap();
        assert_eq!(config.vpc, VpcSelection::Explicit("vpc-123".to_string()));
        assert_eq!(config.public_subnets, vec!["subnet-p1", "subnet-p2"]);
        assert_eq!(config.region, "eu-west-1");
    }
}
