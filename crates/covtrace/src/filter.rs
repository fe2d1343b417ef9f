//! Prefix-based should-trace rules.

use std::sync::Arc;

use covtrace_core::{DecisionError, ShouldTrace};

/// Traces a unit when it matches an include prefix (or no include prefixes are
/// configured) and matches no omit prefix.
///
/// Units whose id starts with `<` are synthetic (`<string>`, `<frozen ...>`)
/// and never traced.
#[derive(Clone, Debug, Default)]
pub struct PrefixRules {
    include: Vec<String>,
    omit: Vec<String>,
}

impl PrefixRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn include(mut self, prefix: impl Into<String>) -> Self {
        self.include.push(prefix.into());
        self
    }

    #[must_use]
    pub fn omit(mut self, prefix: impl Into<String>) -> Self {
        self.omit.push(prefix.into());
        self
    }

    #[must_use]
    pub fn matches(&self, unit: &str) -> bool {
        if unit.is_empty() || unit.starts_with('<') {
            return false;
        }
        if self.omit.iter().any(|prefix| unit.starts_with(prefix.as_str())) {
            return false;
        }
        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|prefix| unit.starts_with(prefix.as_str()))
    }
}

impl<F> ShouldTrace<F, Arc<str>> for PrefixRules {
    fn should_trace(&mut self, unit: &str, _frame: &F) -> Result<Option<Arc<str>>, DecisionError> {
        Ok(self.matches(unit).then(|| Arc::from(unit)))
    }
}
