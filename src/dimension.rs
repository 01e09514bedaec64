//! Rubric dimensions.
//!
//! A dimension is a named axis of evaluation. Evidence, opinions and
//! criterion results are all keyed by [`DimensionId`].

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a rubric dimension (e.g. `state_management_rigor`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionId(String);

impl DimensionId {
    /// Creates a dimension id from its textual form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders the id for humans: `safe_tool_engineering` -> `Safe Tool Engineering`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.0
            .split(['_', '-'])
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DimensionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DimensionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for DimensionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_title_cases_snake_case() {
        let id = DimensionId::new("safe_tool_engineering");
        assert_eq!(id.display_name(), "Safe Tool Engineering");
    }

    #[test]
    fn display_name_handles_dashes_and_repeats() {
        let id = DimensionId::new("git--forensic_ANALYSIS");
        assert_eq!(id.display_name(), "Git Forensic Analysis");
    }

    #[test]
    fn ids_order_lexically() {
        let mut ids = vec![DimensionId::new("b"), DimensionId::new("a")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
    }
}
