//! Glue between composed descriptors, recorded state and the interpreter

use std::collections::HashSet;

use brokerstack_core::differ::create_plan;
use brokerstack_core::effect::Effect;
use brokerstack_core::interpreter::{ApplyResult, EffectOutcome};
use brokerstack_core::plan::Plan;
use brokerstack_core::providers::all_schemas;
use brokerstack_core::resolve::BindingMap;
use brokerstack_core::resource::Resource;
use brokerstack_state::{ResourceState, StateFile};

/// Bindings for everything a previous run recorded
pub fn bindings_from_state(state: &StateFile) -> BindingMap {
    let mut bindings = BindingMap::new();
    for resource in &state.resources {
        let mut attrs = resource.values();
        if let Some(identifier) = &resource.identifier {
            attrs
                .entry("identifier".to_string())
                .or_insert_with(|| identifier.as_str().into());
        }
        bindings.insert(resource.binding.clone(), attrs);
    }
    bindings
}

/// Plan the changes that bring recorded state in line with `desired`.
///
/// References to recorded resources are resolved so unchanged resources
/// diff clean; create-only changes become replacements. Recorded resources
/// no longer desired are deleted last, newest first.
pub fn plan_changes(desired: &[Resource], state: &StateFile) -> Plan {
    let mut plan = create_plan(
        desired,
        &state.current_states(),
        bindings_from_state(state),
        &all_schemas(),
    );

    let wanted: HashSet<_> = desired.iter().map(|r| r.id.clone()).collect();
    for orphan in state.teardown_order() {
        if wanted.contains(&orphan.id()) {
            continue;
        }
        if let Some(identifier) = &orphan.identifier {
            plan.add(Effect::Delete {
                id: orphan.id(),
                binding: orphan.binding.clone(),
                identifier: identifier.clone(),
            });
        }
    }
    plan
}

/// Delete every managed resource, newest first
pub fn plan_destroy(state: &StateFile) -> Plan {
    let mut plan = Plan::new();
    for resource in state.teardown_order() {
        match &resource.identifier {
            Some(identifier) => plan.add(Effect::Delete {
                id: resource.id(),
                binding: resource.binding.clone(),
                identifier: identifier.clone(),
            }),
            None => log::warn!("{} has no identifier; dropping it", resource.id()),
        }
    }
    plan
}

/// Fold every successful outcome into `state`; failures leave it untouched
pub fn record_outcomes(plan: &Plan, result: &ApplyResult, state: &mut StateFile) {
    for (idx, outcome) in &result.outcomes {
        let Ok(outcome) = outcome else {
            continue;
        };
        match outcome {
            EffectOutcome::Read { resource, state: live }
            | EffectOutcome::Created { resource, state: live }
            | EffectOutcome::Updated { resource, state: live }
            | EffectOutcome::Replaced { resource, state: live } => {
                state.upsert_resource(ResourceState::from_applied(resource, live));
            }
            EffectOutcome::Deleted { .. } => {
                let Effect::Delete { id, identifier, .. } = &plan.effects()[*idx] else {
                    continue;
                };
                // a retired copy whose successor already took over the record
                let superseded = state
                    .find_resource(&id.resource_type, &id.name)
                    .is_some_and(|r| r.identifier.as_deref() != Some(identifier.as_str()));
                if !superseded {
                    state.remove_resource(&id.resource_type, &id.name);
                }
            }
            EffectOutcome::Skipped { .. } => {}
        }
    }
}

/// Drop lookups the configuration no longer asks for
pub fn forget_stale_lookups(desired: &[Resource], state: &mut StateFile) {
    let wanted: HashSet<_> = desired.iter().map(|r| r.id.clone()).collect();
    state
        .resources
        .retain(|r| !r.data_source || wanted.contains(&r.id()));
}

/// Drop records that can never be deleted (lookups, never-finished creates)
pub fn forget_unmanaged(state: &mut StateFile) {
    state
        .resources
        .retain(|r| !r.data_source && r.identifier.is_some());
}
