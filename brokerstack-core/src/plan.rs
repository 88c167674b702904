//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed.
//! No side effects occur until the Plan is applied.

use crate::effect::Effect;

/// Plan containing Effects to be executed
#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Number of mutating Effects
    pub fn mutation_count(&self) -> usize {
        self.effects.iter().filter(|e| e.is_mutating()).count()
    }

    /// True when applying would not change anything
    pub fn has_no_changes(&self) -> bool {
        self.mutation_count() == 0
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Read(_) => summary.read += 1,
                Effect::Create(_) => summary.create += 1,
                Effect::Update { .. } => summary.update += 1,
                Effect::Replace { .. } => summary.replace += 1,
                Effect::Delete { .. } => summary.delete += 1,
            }
        }
        summary
    }

    /// Group effect indices by the stage of their resource, in first-seen order.
    ///
    /// Deletes and stage-less resources land under `None`.
    pub fn group_by_stage(&self) -> Vec<(Option<String>, Vec<usize>)> {
        let mut groups: Vec<(Option<String>, Vec<usize>)> = Vec::new();

        for (idx, effect) in self.effects.iter().enumerate() {
            let stage = effect.resource().and_then(|r| r.stage.clone());
            match groups.iter_mut().find(|(s, _)| *s == stage) {
                Some((_, indices)) => indices.push(idx),
                None => groups.push((stage, vec![idx])),
            }
        }

        groups
    }

    /// Display effects grouped by stage
    pub fn display_by_stage(&self) -> String {
        let mut output = String::new();

        for (stage, indices) in self.group_by_stage() {
            match stage {
                Some(name) => output.push_str(&format!("Stage: {}\n", name)),
                None => output.push_str("Ungrouped:\n"),
            }
            for idx in indices {
                output.push_str(&format!("  {}\n", self.effects[idx]));
            }
            output.push('\n');
        }

        output.push_str(&format!("{}\n", self.summary()));
        output
    }
}

#[derive(Debug, Default)]
pub struct PlanSummary {
    pub read: usize,
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, ",
            self.create, self.update
        )?;
        if self.replace > 0 {
            write!(f, "{} to replace, ", self.replace)?;
        }
        write!(f, "{} to delete", self.delete)
    }
}
