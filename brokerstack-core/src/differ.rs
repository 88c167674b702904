//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the descriptors produced by the topology with the state recorded
//! from the Provider, and generates the list of required Effects (Plan).

use std::collections::HashMap;

use crate::effect::{Effect, ReplaceOrder};
use crate::plan::Plan;
use crate::resolve::BindingMap;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists but a create-only attribute changed -> needs replacement
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
        forced_by: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Like [`diff`], but an update touching create-only attributes becomes a replacement
pub fn diff_with_schema(
    desired: &Resource,
    current: &State,
    schema: Option<&ResourceSchema>,
) -> Diff {
    let (Some(schema), Diff::Update {
        id,
        from,
        to,
        changed_attributes,
    }) = (schema, diff(desired, current))
    else {
        return diff(desired, current);
    };

    let forced_by: Vec<String> = changed_attributes
        .iter()
        .filter(|name| schema.forces_replacement(name))
        .cloned()
        .collect();

    if forced_by.is_empty() {
        Diff::Update {
            id,
            from,
            to,
            changed_attributes,
        }
    } else {
        Diff::Replace {
            id,
            from,
            to,
            changed_attributes,
            forced_by,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed: Vec<String> = desired
        .iter()
        .filter(|(key, desired_value)| match current.get(key.as_str()) {
            Some(current_value) => !desired_value.same_as(current_value),
            None => true,
        })
        .map(|(key, _)| key.clone())
        .collect();

    changed.sort();
    changed
}

/// Compute Diff for multiple resources and generate a Plan.
///
/// `desired` must already be in dependency order; the plan keeps that order.
/// `known` holds the bindings recorded by earlier runs. References are
/// resolved against it one resource at a time; a binding that is about to be
/// created or replaced is dropped first, so its dependents keep the
/// reference and diff as changed.
///
/// Data sources always produce a Read so their attributes are fresh. Old
/// copies of replaced resources are deleted newest first, either before
/// everything else or after everything else depending on the type's
/// [`ReplaceOrder`].
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    mut known: BindingMap,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut effects = Vec::new();
    let mut retire_first = Vec::new();
    let mut retire_last = Vec::new();

    for resource in desired {
        let resolved = known.resolve_resource(resource);
        let recorded = current_states.get(&resource.id);

        if resource.is_data_source() {
            let settled = recorded.is_some_and(|state| !diff(&resolved, state).is_change());
            if !settled {
                known.remove(&resource.binding);
            }
            effects.push(Effect::Read(resolved));
            continue;
        }

        let current = recorded
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));
        let schema = schemas.get(&resource.id.resource_type);

        match diff_with_schema(&resolved, &current, schema) {
            Diff::NoChange(_) => {}
            Diff::Update { id, from, to, .. } => effects.push(Effect::Update { id, from, to }),
            Diff::Create(r) => {
                known.remove(&r.binding);
                effects.push(Effect::Create(r));
            }
            Diff::Replace {
                id,
                from,
                to,
                forced_by,
                ..
            } => {
                let order = schema.map(|s| s.replace_order).unwrap_or_default();
                if let Some(identifier) = &from.identifier {
                    let retire = Effect::Delete {
                        id: id.clone(),
                        binding: to.binding.clone(),
                        identifier: identifier.clone(),
                    };
                    match order {
                        ReplaceOrder::DeleteFirst => retire_first.push(retire),
                        ReplaceOrder::CreateFirst => retire_last.push(retire),
                    }
                }
                known.remove(&to.binding);
                effects.push(Effect::Replace {
                    id,
                    from,
                    to,
                    forced_by,
                    order,
                });
            }
        }
    }

    let mut plan = Plan::new();
    for effect in retire_first
        .into_iter()
        .rev()
        .chain(effects)
        .chain(retire_last.into_iter().rev())
    {
        plan.add(effect);
    }
    plan
}
