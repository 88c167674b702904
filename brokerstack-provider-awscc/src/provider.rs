//! AWS Cloud Control Provider implementation
//!
//! Managed resources go through the Cloud Control API. The two lookups
//! (VPC, hosted zone) and the CNAME records talk to EC2 and Route 53
//! directly, since Cloud Control has no read-by-filter.

use std::collections::HashMap;
use std::time::Duration;

use aws_config::Region;
use aws_sdk_cloudcontrol::Client as CloudControlClient;
use aws_sdk_cloudcontrol::types::OperationStatus;
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::types::Filter;
use aws_sdk_route53::Client as Route53Client;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use brokerstack_core::provider::{ProviderError, ProviderResult};
use brokerstack_core::providers::aws;
use brokerstack_core::resource::{Resource, ResourceId, State, Value};

use crate::properties::{
    self, create_only_changes, desired_state, patch_operations, read_attributes,
};
use crate::resources::{ResourceConfig, get_resource_config};

const MAX_POLL_ATTEMPTS: u32 = 120;
const POLL_DELAY: Duration = Duration::from_secs(5);

fn cloud_control_config(id: &ResourceId) -> ProviderResult<&'static ResourceConfig> {
    get_resource_config(&id.resource_type).ok_or_else(|| {
        ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
            .for_resource(id.clone())
    })
}

fn string_attr<'a>(resource: &'a Resource, name: &str) -> ProviderResult<&'a str> {
    resource
        .attributes
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::new(format!("missing attribute '{}'", name))
                .for_resource(resource.id.clone())
        })
}

/// Zone names come back fully qualified with a trailing dot
pub(crate) fn zone_name_matches(zone_name: &str, domain_name: &str) -> bool {
    zone_name.trim_end_matches('.') == domain_name.trim_end_matches('.')
}

/// "/hostedzone/Z123" -> "Z123"
pub(crate) fn bare_zone_id(id: &str) -> &str {
    id.trim_start_matches("/hostedzone/")
}

/// CNAME identifiers carry both the zone and the record name
pub(crate) fn record_identifier(zone_id: &str, record_name: &str) -> String {
    format!("{}|{}", zone_id, record_name)
}

pub(crate) fn split_record_identifier(identifier: &str) -> Option<(&str, &str)> {
    identifier
        .split_once('|')
        .filter(|(zone, name)| !zone.is_empty() && !name.is_empty())
}

/// AWS Cloud Control Provider
pub struct AwsccProvider {
    cloudcontrol_client: CloudControlClient,
    ec2_client: Ec2Client,
    route53_client: Route53Client,
    region: String,
}

impl AwsccProvider {
    /// Create a new AwsccProvider for the specified region
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            cloudcontrol_client: CloudControlClient::new(&config),
            ec2_client: Ec2Client::new(&config),
            route53_client: Route53Client::new(&config),
            region: region.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    // =========================================================================
    // Cloud Control API Methods
    // =========================================================================

    /// Get a resource by identifier using Cloud Control API
    pub async fn cc_get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<Option<serde_json::Value>> {
        let result = self
            .cloudcontrol_client
            .get_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await;

        match result {
            Ok(response) => {
                if let Some(desc) = response.resource_description()
                    && let Some(props_str) = desc.properties()
                {
                    let props: serde_json::Value = serde_json::from_str(props_str)
                        .map_err(|e| ProviderError::new("Malformed resource properties").with_cause(e))?;
                    Ok(Some(props))
                } else {
                    Ok(None)
                }
            }
            Err(e) => {
                let err_str = format!("{:?}", e);
                if err_str.contains("ResourceNotFound") || err_str.contains("NotFound") {
                    Ok(None)
                } else {
                    Err(ProviderError::new(format!("Failed to get resource: {:?}", e)))
                }
            }
        }
    }

    /// Create a resource using Cloud Control API
    pub async fn cc_create_resource(
        &self,
        type_name: &str,
        desired_state: serde_json::Value,
    ) -> ProviderResult<String> {
        let result = self
            .cloudcontrol_client
            .create_resource()
            .type_name(type_name)
            .desired_state(desired_state.to_string())
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to create resource: {:?}", e)))?;

        let request_token = result
            .progress_event()
            .and_then(|p| p.request_token())
            .ok_or_else(|| ProviderError::new("No request token returned"))?;

        self.wait_for_operation(request_token).await
    }

    /// Update a resource using Cloud Control API
    pub async fn cc_update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_ops: Vec<serde_json::Value>,
    ) -> ProviderResult<()> {
        if patch_ops.is_empty() {
            return Ok(());
        }

        let patch_document = serde_json::to_string(&patch_ops)
            .map_err(|e| ProviderError::new(format!("Failed to build patch: {}", e)))?;

        let result = self
            .cloudcontrol_client
            .update_resource()
            .type_name(type_name)
            .identifier(identifier)
            .patch_document(patch_document)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to update resource: {:?}", e)))?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token).await?;
        }

        Ok(())
    }

    /// Delete a resource using Cloud Control API
    pub async fn cc_delete_resource(&self, type_name: &str, identifier: &str) -> ProviderResult<()> {
        let result = self
            .cloudcontrol_client
            .delete_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to delete resource: {:?}", e)))?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token).await?;
        }

        Ok(())
    }

    /// Wait for a Cloud Control operation to complete
    async fn wait_for_operation(&self, request_token: &str) -> ProviderResult<String> {
        for _ in 0..MAX_POLL_ATTEMPTS {
            let status = self
                .cloudcontrol_client
                .get_resource_request_status()
                .request_token(request_token)
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to get operation status: {:?}", e))
                })?;

            if let Some(progress) = status.progress_event() {
                match progress.operation_status() {
                    Some(OperationStatus::Success) => {
                        return Ok(progress.identifier().unwrap_or("").to_string());
                    }
                    Some(OperationStatus::Failed) => {
                        let msg = progress.status_message().unwrap_or("Unknown error");
                        return Err(ProviderError::new(format!("Operation failed: {}", msg)));
                    }
                    Some(OperationStatus::CancelComplete) => {
                        return Err(ProviderError::new("Operation was cancelled"));
                    }
                    _ => {
                        log::debug!("operation {} still in progress", request_token);
                    }
                }
            }
            tokio::time::sleep(POLL_DELAY).await;
        }

        Err(ProviderError::new("Operation timed out"))
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Resolve a data source descriptor
    pub async fn lookup_resource(&self, resource: Resource) -> ProviderResult<State> {
        let result = match resource.id.resource_type.as_str() {
            aws::VPC => self.lookup_vpc(&resource).await,
            aws::HOSTED_ZONE => self.lookup_hosted_zone(&resource).await,
            other => Err(ProviderError::new(format!("{} is not a data source", other))),
        };
        result.map_err(|e| e.for_resource(resource.id.clone()))
    }

    async fn lookup_vpc(&self, resource: &Resource) -> ProviderResult<State> {
        let mut request = self.ec2_client.describe_vpcs();
        let wanted = resource.attributes.get("vpc_id").and_then(Value::as_str);
        request = match wanted {
            Some(vpc_id) => request.vpc_ids(vpc_id),
            None => request.filters(Filter::builder().name("isDefault").values("true").build()),
        };

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to describe VPCs: {:?}", e)))?;

        let vpc_id = response
            .vpcs()
            .iter()
            .find_map(|vpc| vpc.vpc_id())
            .ok_or_else(|| match wanted {
                Some(id) => ProviderError::new(format!("VPC {} not found", id)),
                None => ProviderError::new(format!("no default VPC in {}", self.region)),
            })?;

        log::info!("resolved VPC {}", vpc_id);
        let attributes = HashMap::from([("id".to_string(), Value::from(vpc_id))]);
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(vpc_id))
    }

    async fn lookup_hosted_zone(&self, resource: &Resource) -> ProviderResult<State> {
        let domain_name = string_attr(resource, "domain_name")?;
        let response = self
            .route53_client
            .list_hosted_zones_by_name()
            .dns_name(domain_name)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to list hosted zones: {:?}", e)))?;

        // Results start at the requested name but continue past it
        let zone = response
            .hosted_zones()
            .iter()
            .find(|zone| zone_name_matches(zone.name(), domain_name))
            .ok_or_else(|| {
                ProviderError::new(format!("no hosted zone found for {}", domain_name))
            })?;

        let zone_id = bare_zone_id(zone.id());
        log::info!("resolved hosted zone {} ({})", domain_name, zone_id);
        let attributes = HashMap::from([
            ("id".to_string(), Value::from(zone_id)),
            ("domain_name".to_string(), Value::from(domain_name)),
        ]);
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(zone_id))
    }

    // =========================================================================
    // Route 53 Records
    // =========================================================================

    async fn find_cname(
        &self,
        zone_id: &str,
        record_name: &str,
    ) -> ProviderResult<Option<ResourceRecordSet>> {
        let response = self
            .route53_client
            .list_resource_record_sets()
            .hosted_zone_id(zone_id)
            .start_record_name(record_name)
            .start_record_type(RrType::Cname)
            .max_items(1)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to list records: {:?}", e)))?;

        Ok(response
            .resource_record_sets()
            .iter()
            .find(|set| {
                zone_name_matches(set.name(), record_name) && set.r#type() == &RrType::Cname
            })
            .cloned())
    }

    async fn change_cname(
        &self,
        zone_id: &str,
        action: ChangeAction,
        record_set: ResourceRecordSet,
        comment: Option<&str>,
    ) -> ProviderResult<()> {
        let change = Change::builder()
            .action(action)
            .resource_record_set(record_set)
            .build()
            .map_err(|e| ProviderError::new("Invalid record change").with_cause(e))?;
        let batch = ChangeBatch::builder()
            .set_comment(comment.map(str::to_string))
            .changes(change)
            .build()
            .map_err(|e| ProviderError::new("Invalid change batch").with_cause(e))?;

        self.route53_client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to change records: {:?}", e)))?;
        Ok(())
    }

    async fn upsert_cname(&self, resource: &Resource) -> ProviderResult<State> {
        let zone_id = string_attr(resource, "hosted_zone_id")?;
        let record_name = string_attr(resource, "record_name")?;
        let target = string_attr(resource, "target")?;
        let ttl = resource
            .attributes
            .get("ttl")
            .and_then(Value::as_int)
            .ok_or_else(|| ProviderError::new("missing attribute 'ttl'"))?;
        let comment = resource.attributes.get("comment").and_then(Value::as_str);

        let record = ResourceRecord::builder()
            .value(target)
            .build()
            .map_err(|e| ProviderError::new("Invalid record value").with_cause(e))?;
        let record_set = ResourceRecordSet::builder()
            .name(record_name)
            .r#type(RrType::Cname)
            .ttl(ttl)
            .resource_records(record)
            .build()
            .map_err(|e| ProviderError::new("Invalid record set").with_cause(e))?;

        self.change_cname(zone_id, ChangeAction::Upsert, record_set, comment)
            .await?;
        log::info!("upserted CNAME {} -> {}", record_name, target);

        let mut attributes = resource.attributes.clone();
        attributes.insert("fqdn".to_string(), Value::from(record_name));
        Ok(State::existing(resource.id.clone(), attributes)
            .with_identifier(record_identifier(zone_id, record_name)))
    }

    async fn read_cname(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (zone_id, record_name) = split_record_identifier(identifier).ok_or_else(|| {
            ProviderError::new(format!("malformed record identifier '{}'", identifier))
        })?;
        let Some(set) = self.find_cname(zone_id, record_name).await? else {
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = HashMap::from([
            ("hosted_zone_id".to_string(), Value::from(zone_id)),
            ("record_name".to_string(), Value::from(record_name)),
            ("fqdn".to_string(), Value::from(record_name)),
        ]);
        if let Some(ttl) = set.ttl() {
            attributes.insert("ttl".to_string(), Value::Int(ttl));
        }
        if let Some(record) = set.resource_records().first() {
            attributes.insert("target".to_string(), Value::from(record.value()));
        }
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn delete_cname(&self, identifier: &str) -> ProviderResult<()> {
        let (zone_id, record_name) = split_record_identifier(identifier).ok_or_else(|| {
            ProviderError::new(format!("malformed record identifier '{}'", identifier))
        })?;
        // A DELETE must match the live record exactly
        match self.find_cname(zone_id, record_name).await? {
            Some(set) => {
                self.change_cname(zone_id, ChangeAction::Delete, set, None)
                    .await
            }
            None => {
                log::warn!("CNAME {} already gone", record_name);
                Ok(())
            }
        }
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by its provider identifier
    pub async fn read_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        if id.resource_type == aws::CNAME_RECORD {
            return self
                .read_cname(id, identifier)
                .await
                .map_err(|e| e.for_resource(id.clone()));
        }

        let config = cloud_control_config(id)?;
        let schema = properties::schema_for(&id.resource_type)
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;

        let props = match self
            .cc_get_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))?
        {
            Some(props) => props,
            None => return Ok(State::not_found(id.clone())),
        };

        let attributes = read_attributes(&props, &schema, config);
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    /// Create a resource whose references are all resolved
    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        if resource.id.resource_type == aws::CNAME_RECORD {
            return self
                .upsert_cname(&resource)
                .await
                .map_err(|e| e.for_resource(resource.id.clone()));
        }

        let config = cloud_control_config(&resource.id)?;
        let schema = properties::schema_for(&resource.id.resource_type)
            .map_err(|e| ProviderError::from(e).for_resource(resource.id.clone()))?;
        let desired = desired_state(&resource, &schema, config)
            .map_err(|e| ProviderError::from(e).for_resource(resource.id.clone()))?;

        log::info!("creating {} as {}", resource.id, config.aws_type_name);
        let identifier = self
            .cc_create_resource(config.aws_type_name, serde_json::Value::Object(desired))
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;

        self.read_resource(&resource.id, &identifier).await
    }

    /// Update a resource in place, patching every property Cloud Control allows.
    ///
    /// A change to a create-only property is refused; those need a replacement.
    pub async fn update_resource(
        &self,
        id: ResourceId,
        identifier: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        if id.resource_type == aws::CNAME_RECORD {
            return self
                .upsert_cname(&to)
                .await
                .map_err(|e| e.for_resource(id.clone()));
        }

        let config = cloud_control_config(&id)?;
        let schema = properties::schema_for(&id.resource_type)
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;
        let locked = create_only_changes(from, &to, &schema);
        if !locked.is_empty() {
            return Err(ProviderError::new(format!(
                "{} cannot change in place ({}); it must be replaced",
                id.resource_type,
                locked.join(", ")
            ))
            .for_resource(id));
        }
        let desired = desired_state(&to, &schema, config)
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;

        let patch_ops = patch_operations(&desired, config);
        if patch_ops.is_empty() {
            return Err(ProviderError::new(format!(
                "Update not supported for {}, delete and recreate",
                id.resource_type
            ))
            .for_resource(id));
        }

        log::info!("updating {} ({} properties)", id, patch_ops.len());
        self.cc_update_resource(config.aws_type_name, identifier, patch_ops)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        self.read_resource(&id, identifier).await
    }

    /// Delete a resource
    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        if id.resource_type == aws::CNAME_RECORD {
            return self
                .delete_cname(identifier)
                .await
                .map_err(|e| e.for_resource(id.clone()));
        }

        let config = cloud_control_config(id)?;
        log::info!("deleting {} ({})", id, identifier);
        self.cc_delete_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_names_ignore_trailing_dot() {
        assert!(zone_name_matches("example.com.", "example.com"));
        assert!(zone_name_matches("example.com", "example.com."));
        assert!(!zone_name_matches("sub.example.com.", "example.com"));
    }

    #[test]
    fn zone_id_prefix_is_stripped() {
        assert_eq!(bare_zone_id("/hostedzone/Z0123"), "Z0123");
        assert_eq!(bare_zone_id("Z0123"), "Z0123");
    }

    #[test]
    fn record_identifier_splits_back() {
        let identifier = record_identifier("Z0123", "broker.example.com");
        assert_eq!(identifier, "Z0123|broker.example.com");
        assert_eq!(
            split_record_identifier(&identifier),
            Some(("Z0123", "broker.example.com"))
        );
        assert_eq!(split_record_identifier("Z0123"), None);
        assert_eq!(split_record_identifier("|broker.example.com"), None);
    }

    #[test]
    fn unknown_type_is_reported_for_the_resource() {
        let id = ResourceId::new("ec2.subnet", "a");
        let err = cloud_control_config(&id).err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("[ec2.subnet.a] Unknown resource type: ec2.subnet")
        );
    }
}
