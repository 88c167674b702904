use thiserror::Error;

/// Configuration problems, detected before any resource is described
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid truth value {0}")]
    InvalidTruthValue(String),

    #[error("Invalid configuration:{}", render_violations(.0))]
    Invalid(Vec<String>),
}

impl ConfigError {
    /// Every violated rule, in the order it was checked
    pub fn violations(&self) -> Vec<String> {
        match self {
            ConfigError::InvalidTruthValue(_) => vec![self.to_string()],
            ConfigError::Invalid(v) => v.clone(),
        }
    }
}

fn render_violations(violations: &[String]) -> String {
    violations
        .iter()
        .map(|v| format!("\n\t{}", v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_renders_one_violation_per_line() {
        let err = ConfigError::Invalid(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "Invalid configuration:\n\tfirst\n\tsecond");
        assert_eq!(err.violations().len(), 2);
    }
}
