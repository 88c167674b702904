//! AWS resource schema definitions
//!
//! One schema per resource kind the broker topology emits. `provider_name`
//! carries the Cloud Control property name for attributes that map 1:1.

use crate::resource::Value;
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

pub const VPC: &str = "ec2.vpc";
pub const SECURITY_GROUP: &str = "ec2.security_group";
pub const IAM_ROLE: &str = "iam.role";
pub const TARGET_GROUP: &str = "elbv2.target_group";
pub const LOAD_BALANCER: &str = "elbv2.load_balancer";
pub const LISTENER: &str = "elbv2.listener";
pub const ECS_CLUSTER: &str = "ecs.cluster";
pub const TASK_DEFINITION: &str = "ecs.task_definition";
pub const ECS_SERVICE: &str = "ecs.service";
pub const HOSTED_ZONE: &str = "route53.hosted_zone";
pub const CNAME_RECORD: &str = "route53.cname_record";

/// Resource types that are looked up, never created
pub const DATA_SOURCES: &[&str] = &[VPC, HOSTED_ZONE];

fn string_list() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::String))
}

fn tags() -> AttributeSchema {
    AttributeSchema::new("tags", AttributeType::Map(Box::new(AttributeType::String)))
        .with_provider_name("Tags")
        .with_description("Resource tags")
}

/// Listener and target group protocol
pub fn protocol() -> AttributeType {
    AttributeType::Enum(vec!["HTTP".to_string(), "HTTPS".to_string()])
}

fn check_map_keys(
    map: &std::collections::HashMap<String, Value>,
    required: &[&str],
    allowed: &[&str],
) -> Result<(), String> {
    for key in required {
        if !map.contains_key(*key) {
            return Err(format!("missing key '{}'", key));
        }
    }
    for key in map.keys() {
        if !required.contains(&key.as_str()) && !allowed.contains(&key.as_str()) {
            return Err(format!("unknown key '{}'", key));
        }
    }
    Ok(())
}

/// Security group ingress rule: protocol, port range and exactly one source
pub fn ingress_rule() -> AttributeType {
    AttributeType::Custom {
        name: "IngressRule".to_string(),
        base: Box::new(AttributeType::Map(Box::new(AttributeType::String))),
        validate: |value| {
            let Value::Map(map) = value else {
                return Err("Expected map".to_string());
            };
            check_map_keys(
                map,
                &["ip_protocol", "from_port", "to_port"],
                &["cidr_ip", "source_security_group_id", "description"],
            )?;
            for port in ["from_port", "to_port"] {
                types::port_number()
                    .validate(&map[port])
                    .map_err(|e| format!("{}: {}", port, e))?;
            }
            match (
                map.contains_key("cidr_ip"),
                map.contains_key("source_security_group_id"),
            ) {
                (true, false) => types::cidr()
                    .validate(&map["cidr_ip"])
                    .map_err(|e| e.to_string()),
                (false, true) => Ok(()),
                _ => Err(
                    "exactly one of 'cidr_ip' or 'source_security_group_id' is required"
                        .to_string(),
                ),
            }
        },
    }
}

/// Service-to-target-group binding: container name, container port, target group
pub fn load_balancer_binding() -> AttributeType {
    AttributeType::Custom {
        name: "LoadBalancerBinding".to_string(),
        base: Box::new(AttributeType::Map(Box::new(AttributeType::String))),
        validate: |value| {
            let Value::Map(map) = value else {
                return Err("Expected map".to_string());
            };
            check_map_keys(
                map,
                &["container_name", "container_port", "target_group_arn"],
                &[],
            )?;
            types::port_number()
                .validate(&map["container_port"])
                .map_err(|e| format!("container_port: {}", e))
        },
    }
}

/// Returns the schema for the VPC data source
pub fn vpc_schema() -> ResourceSchema {
    ResourceSchema::new(VPC)
        .with_description("Existing VPC, looked up by id or as the region's default VPC")
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .with_description("Explicit VPC id to look up"),
        )
        .attribute(
            AttributeSchema::new("is_default", AttributeType::Bool)
                .with_description("Resolve the account's default VPC"),
        )
        .output("id")
}

/// Returns the schema for IAM Role
pub fn iam_role_schema() -> ResourceSchema {
    ResourceSchema::new(IAM_ROLE)
        .with_description("An IAM role assumable by a service principal")
        .attribute(
            AttributeSchema::new("role_name", AttributeType::String)
                .required()
                .with_provider_name("RoleName")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("assumed_by", AttributeType::String)
                .required()
                .with_description("Service principal in the trust policy"),
        )
        .attribute(
            AttributeSchema::new("managed_policy_arns", AttributeType::List(Box::new(types::arn())))
                .with_provider_name("ManagedPolicyArns"),
        )
        .attribute(tags())
        .output("arn")
}

/// Returns the schema for Security Group
pub fn security_group_schema() -> ResourceSchema {
    ResourceSchema::new(SECURITY_GROUP)
        .with_description("An AWS VPC Security Group")
        .attribute(
            AttributeSchema::new("group_name", AttributeType::String)
                .required()
                .with_provider_name("GroupName")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("description", AttributeType::String)
                .required()
                .with_provider_name("GroupDescription")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .with_provider_name("VpcId")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("ingress", AttributeType::List(Box::new(ingress_rule())))
                .with_description("Inbound rules"),
        )
        .attribute(
            AttributeSchema::new("allow_all_outbound", AttributeType::Bool)
                .with_description("Permit all outbound traffic"),
        )
        .attribute(tags())
        .output("id")
}

/// Returns the schema for Target Group
pub fn target_group_schema() -> ResourceSchema {
    ResourceSchema::new(TARGET_GROUP)
        .with_description("An Elastic Load Balancing v2 target group")
        .attribute(
            AttributeSchema::new("name", types::elb_name())
                .required()
                .with_provider_name("Name")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("port", types::port_number())
                .required()
                .with_provider_name("Port")
                .create_only()
                .with_description("Downstream container port"),
        )
        .attribute(
            AttributeSchema::new("protocol", protocol())
                .required()
                .with_provider_name("Protocol")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("target_type", AttributeType::Enum(vec!["ip".to_string()]))
                .required()
                .with_provider_name("TargetType")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .with_provider_name("VpcId")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("health_check_enabled", AttributeType::Bool)
                .with_provider_name("HealthCheckEnabled"),
        )
        .attribute(
            AttributeSchema::new("health_check_path", AttributeType::String)
                .with_provider_name("HealthCheckPath"),
        )
        .attribute(AttributeSchema::new("health_check_port", types::port_number()))
        .attribute(
            AttributeSchema::new("health_check_protocol", protocol())
                .with_provider_name("HealthCheckProtocol"),
        )
        .attribute(
            AttributeSchema::new("health_check_interval_seconds", types::positive_int())
                .with_provider_name("HealthCheckIntervalSeconds"),
        )
        .attribute(tags())
        .output("arn")
}

/// Returns the schema for Load Balancer
pub fn load_balancer_schema() -> ResourceSchema {
    ResourceSchema::new(LOAD_BALANCER)
        .with_description("An application load balancer")
        .attribute(
            AttributeSchema::new("name", types::elb_name())
                .required()
                .with_provider_name("Name")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new(
                "scheme",
                AttributeType::Enum(vec!["internal".to_string(), "internet-facing".to_string()]),
            )
            .required()
            .with_provider_name("Scheme")
            .create_only(),
        )
        .attribute(
            AttributeSchema::new(
                "load_balancer_type",
                AttributeType::Enum(vec!["application".to_string()]),
            )
            .with_provider_name("Type")
            .create_only(),
        )
        .attribute(
            AttributeSchema::new("security_groups", string_list())
                .required()
                .with_provider_name("SecurityGroups"),
        )
        .attribute(
            AttributeSchema::new("subnets", string_list())
                .required()
                .with_provider_name("Subnets"),
        )
        .attribute(tags())
        .output("arn")
        .output("dns_name")
}

/// Returns the schema for Listener
pub fn listener_schema() -> ResourceSchema {
    ResourceSchema::new(LISTENER)
        .with_description("A load balancer listener forwarding to one target group")
        .attribute(
            AttributeSchema::new("load_balancer_arn", AttributeType::String)
                .required()
                .with_provider_name("LoadBalancerArn")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("port", types::port_number())
                .required()
                .with_provider_name("Port")
                .with_description("Upstream port"),
        )
        .attribute(
            AttributeSchema::new("protocol", protocol())
                .required()
                .with_provider_name("Protocol"),
        )
        .attribute(AttributeSchema::new(
            "certificate_arns",
            AttributeType::List(Box::new(types::arn())),
        ))
        .attribute(AttributeSchema::new("default_target_group_arn", AttributeType::String).required())
        .output("arn")
}

/// Returns the schema for ECS Cluster
pub fn cluster_schema() -> ResourceSchema {
    ResourceSchema::new(ECS_CLUSTER)
        .attribute(
            AttributeSchema::new("cluster_name", AttributeType::String)
                .required()
                .with_provider_name("ClusterName")
                .create_only(),
        )
        .attribute(tags())
        .output("arn")
        .output("name")
}

/// Returns the schema for ECS Task Definition (single container)
pub fn task_definition_schema() -> ResourceSchema {
    ResourceSchema::new(TASK_DEFINITION)
        .immutable()
        .attribute(
            AttributeSchema::new("family", AttributeType::String)
                .required()
                .with_provider_name("Family"),
        )
        .attribute(AttributeSchema::new("cpu", types::positive_int()).required())
        .attribute(AttributeSchema::new("memory", types::positive_int()).required())
        .attribute(
            AttributeSchema::new("network_mode", AttributeType::Enum(vec!["awsvpc".to_string()]))
                .required()
                .with_provider_name("NetworkMode"),
        )
        .attribute(
            AttributeSchema::new("requires_compatibilities", string_list())
                .with_provider_name("RequiresCompatibilities"),
        )
        .attribute(
            AttributeSchema::new("execution_role_arn", AttributeType::String)
                .required()
                .with_provider_name("ExecutionRoleArn"),
        )
        .attribute(
            AttributeSchema::new("task_role_arn", AttributeType::String)
                .required()
                .with_provider_name("TaskRoleArn"),
        )
        .attribute(AttributeSchema::new("container_name", AttributeType::String).required())
        .attribute(AttributeSchema::new("image", AttributeType::String).required())
        .attribute(
            AttributeSchema::new(
                "container_ports",
                AttributeType::List(Box::new(types::port_number())),
            )
            .required(),
        )
        .attribute(
            AttributeSchema::new("environment", AttributeType::Map(Box::new(AttributeType::String)))
                .with_description("Container environment; secrets are masked in output"),
        )
        .attribute(tags())
        .output("arn")
}

/// Returns the schema for ECS Service
pub fn service_schema() -> ResourceSchema {
    ResourceSchema::new(ECS_SERVICE)
        .attribute(
            AttributeSchema::new("service_name", AttributeType::String)
                .required()
                .with_provider_name("ServiceName")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("cluster", AttributeType::String)
                .required()
                .with_provider_name("Cluster")
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("task_definition", AttributeType::String)
                .required()
                .with_provider_name("TaskDefinition"),
        )
        .attribute(
            AttributeSchema::new("desired_count", AttributeType::Int)
                .with_provider_name("DesiredCount"),
        )
        .attribute(
            AttributeSchema::new("health_check_grace_period_seconds", AttributeType::Int)
                .with_provider_name("HealthCheckGracePeriodSeconds"),
        )
        .attribute(
            AttributeSchema::new("launch_type", AttributeType::Enum(vec!["FARGATE".to_string()]))
                .with_provider_name("LaunchType")
                .create_only(),
        )
        .attribute(AttributeSchema::new("assign_public_ip", AttributeType::Bool))
        .attribute(AttributeSchema::new("subnets", string_list()).required())
        .attribute(AttributeSchema::new("security_groups", string_list()).required())
        .attribute(AttributeSchema::new(
            "load_balancers",
            AttributeType::List(Box::new(load_balancer_binding())),
        ))
        .attribute(tags())
        .output("arn")
}

/// Returns the schema for the hosted zone data source
pub fn hosted_zone_schema() -> ResourceSchema {
    ResourceSchema::new(HOSTED_ZONE)
        .with_description("Existing Route 53 hosted zone, looked up by name")
        .attribute(AttributeSchema::new("domain_name", AttributeType::String).required())
        .output("id")
}

/// Returns the schema for CNAME record
pub fn cname_record_schema() -> ResourceSchema {
    ResourceSchema::new(CNAME_RECORD)
        .attribute(
            AttributeSchema::new("hosted_zone_id", AttributeType::String)
                .required()
                .create_only(),
        )
        .attribute(
            AttributeSchema::new("record_name", AttributeType::String)
                .required()
                .with_description("Fully qualified record name"),
        )
        .attribute(
            AttributeSchema::new("target", AttributeType::String)
                .required()
                .with_description("Domain name the record points at"),
        )
        .attribute(AttributeSchema::new("ttl", types::positive_int()).required())
        .attribute(AttributeSchema::new("comment", AttributeType::String))
        .output("fqdn")
}

/// Returns all AWS schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        vpc_schema(),
        iam_role_schema(),
        security_group_schema(),
        target_group_schema(),
        load_balancer_schema(),
        listener_schema(),
        cluster_schema(),
        task_definition_schema(),
        service_schema(),
        hosted_zone_schema(),
        cname_record_schema(),
    ]
}
