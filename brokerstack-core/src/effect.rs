//! Effect - A single side effect described as a value

use crate::resource::{Resource, ResourceId, State};

/// One step of a Plan
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Look up a data source
    Read(Resource),
    /// Create a resource that does not exist yet
    Create(Resource),
    /// Bring an existing resource in line with its descriptor
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
    },
    /// Create the successor of a resource whose create-only attributes
    /// changed. The old copy is removed by a separate Delete.
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        /// Changed attributes that cannot be updated in place
        forced_by: Vec<String>,
        order: ReplaceOrder,
    },
    /// Remove a resource recorded under `binding`
    Delete {
        id: ResourceId,
        binding: String,
        identifier: String,
    },
}

/// Where a plan retires the old copy of a replaced resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceOrder {
    /// Delete the old copy before anything is created. Used where the
    /// provider enforces unique names.
    #[default]
    DeleteFirst,
    /// Create the successor first and delete the old copy at the end of the
    /// plan, once dependents point elsewhere.
    CreateFirst,
}

impl Effect {
    /// Whether executing this effect changes infrastructure
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read(_))
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(r) | Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } | Effect::Delete { id, .. } => {
                id
            }
        }
    }

    pub fn binding(&self) -> &str {
        match self {
            Effect::Read(r)
            | Effect::Create(r)
            | Effect::Update { to: r, .. }
            | Effect::Replace { to: r, .. } => &r.binding,
            Effect::Delete { binding, .. } => binding,
        }
    }

    /// The descriptor this effect carries, if any
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Effect::Read(r)
            | Effect::Create(r)
            | Effect::Update { to: r, .. }
            | Effect::Replace { to: r, .. } => Some(r),
            Effect::Delete { .. } => None,
        }
    }

    /// Marker used in plan listings
    pub fn symbol(&self) -> &'static str {
        match self {
            Effect::Read(_) => "<=",
            Effect::Create(_) => "+",
            Effect::Update { .. } => "~",
            Effect::Replace {
                order: ReplaceOrder::DeleteFirst,
                ..
            } => "-/+",
            Effect::Replace {
                order: ReplaceOrder::CreateFirst,
                ..
            } => "+/-",
            Effect::Delete { .. } => "-",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.symbol(), self.resource_id())
    }
}
