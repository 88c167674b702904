//! Provider - Trait abstracting the provisioning engine
//!
//! A Provider turns resource descriptors into live objects and hands back
//! the identifiers and attributes (ARNs, DNS names, group ids) that later
//! resources consume by reference.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};

type Cause = Box<dyn std::error::Error + Send + Sync>;

/// A failed lookup or provisioning call, tagged with the descriptor it was
/// working on once that is known
#[derive(Debug, thiserror::Error)]
#[error("{}{message}", scope(.resource_id))]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    /// Underlying SDK or translation error
    #[source]
    pub cause: Option<Cause>,
}

fn scope(resource_id: &Option<ResourceId>) -> String {
    resource_id
        .as_ref()
        .map(|id| format!("[{}] ", id))
        .unwrap_or_default()
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    /// Attach the descriptor; the first one attached sticks
    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id.get_or_insert(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Future returned by every provider call
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One kind of broker stack component a provider can provision or look up
pub trait ResourceType: Send + Sync {
    /// Descriptor type, e.g. "elbv2.listener"
    fn name(&self) -> &'static str;

    /// Looked up (VPC, hosted zone), never created
    fn is_data_source(&self) -> bool {
        false
    }
}

/// The engine the interpreter drives: Cloud Control against a real account,
/// or the offline file provider.
///
/// `lookup` and `read` only observe; the rest change infrastructure.
pub trait Provider: Send + Sync {
    /// Value of `--provider` selecting this engine
    fn name(&self) -> &'static str;

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Whether `resource_type` is in `resource_types()`
    fn supports(&self, resource_type: &str) -> bool {
        self.resource_types()
            .iter()
            .any(|t| t.name() == resource_type)
    }

    /// Resolve a data source (VPC, hosted zone) from its descriptor.
    ///
    /// A lookup that matches nothing is an error, not `State::not_found()`.
    fn lookup(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Live state of something an earlier run created, by its identifier.
    ///
    /// `State::not_found()` once it is gone.
    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;

    /// Provision `resource`, whose references are already resolved. The
    /// returned state carries the identifier later updates and deletes use
    /// plus outputs such as ARNs and DNS names.
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Patch mutable attributes in place; create-only changes never get here
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Remove (or, for task definitions, deregister) what `identifier` names
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}

/// `--provider` picks the engine at runtime
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn lookup(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).lookup(resource)
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }
}
