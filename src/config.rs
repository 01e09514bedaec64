//! Run configuration.
//!
//! Configuration is an explicit struct loaded once at process start:
//! defaults, then an optional TOML file, then environment overrides, then
//! validation. Loading never logs; it returns diagnostics for the caller to
//! report through the diagnostic sink.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TribunalError, TribunalResult, ValidationError};
use crate::opinion::{ScoreRange, VoterRole};

/// Environment variable overriding the log filter.
pub const ENV_LOG: &str = "TRIBUNAL_LOG";
/// Environment variable overriding the pass threshold.
pub const ENV_PASS_THRESHOLD: &str = "TRIBUNAL_PASS_THRESHOLD";
/// Environment variable overriding both collector and scorer timeouts.
pub const ENV_NODE_TIMEOUT_MS: &str = "TRIBUNAL_NODE_TIMEOUT_MS";

/// Per-role vote weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoterWeights {
    /// Prosecutor weight.
    pub prosecutor: u32,
    /// Defense weight.
    pub defense: u32,
    /// Tech lead weight.
    pub tech_lead: u32,
}

impl Default for VoterWeights {
    fn default() -> Self {
        Self {
            prosecutor: 1,
            defense: 1,
            tech_lead: 2,
        }
    }
}

impl VoterWeights {
    /// Weight of a role. Zero means the role is not recognized as a voter.
    #[must_use]
    pub const fn weight(&self, role: VoterRole) -> u32 {
        match role {
            VoterRole::Prosecutor => self.prosecutor,
            VoterRole::Defense => self.defense,
            VoterRole::TechLead => self.tech_lead,
        }
    }
}

/// Adjudication rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjudicationConfig {
    /// Fact supremacy ceiling for dimensions whose artifact is missing.
    pub neutral_low: u8,
    /// Rationale keywords that mark a high-severity adversarial finding.
    pub security_keywords: Vec<String>,
    /// Adversarial score at or below which the security override applies.
    pub security_score_max: u8,
    /// Cap applied by the security override.
    pub security_ceiling: u8,
    /// Raw score gap between the dissent roles that produces a dissent note.
    pub dissent_threshold: u8,
    /// Minimum overall score for a passing verdict.
    pub pass_threshold: f64,
    /// Dimensions scoring below this get a remediation item.
    pub remediation_below: u8,
    /// Role whose findings can override the weighted vote.
    pub adversarial_role: VoterRole,
    /// The two opposing roles compared for dissent.
    pub dissent_roles: [VoterRole; 2],
    /// Vote weights.
    pub weights: VoterWeights,
}

impl Default for AdjudicationConfig {
    fn default() -> Self {
        Self {
            neutral_low: 2,
            security_keywords: ["security", "vulnerability", "injection", "unsafe", "exploit"]
                .into_iter()
                .map(String::from)
                .collect(),
            security_score_max: 2,
            security_ceiling: 3,
            dissent_threshold: 2,
            pass_threshold: 3.0,
            remediation_below: 4,
            adversarial_role: VoterRole::Prosecutor,
            dissent_roles: [VoterRole::Prosecutor, VoterRole::Defense],
            weights: VoterWeights::default(),
        }
    }
}

/// Anomaly checker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Opinion scores at or below this count as failing.
    pub failing_score_max: u8,
    /// More failing dimensions than this raise a systemic flag.
    pub systemic_failure_count: usize,
    /// Opinion scores at or above this count as high.
    pub high_score_min: u8,
    /// Case-insensitive substrings signalling absence in evidence content.
    pub absence_markers: Vec<String>,
    /// Largest evidence payload accepted without a complexity flag.
    pub max_evidence_bytes: usize,
    /// Largest total analyzed line count accepted without a complexity flag.
    pub max_total_lines: u64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            failing_score_max: 2,
            systemic_failure_count: 2,
            high_score_min: 4,
            absence_markers: vec!["missing".to_string(), "not found".to_string()],
            max_evidence_bytes: 1000,
            max_total_lines: 20_000,
        }
    }
}

/// Pre-flight input checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// URI schemes accepted for the subject.
    pub allowed_schemes: Vec<String>,
    /// Document extensions accepted (without the dot, case-insensitive).
    pub document_extensions: Vec<String>,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            document_extensions: vec!["pdf".to_string()],
        }
    }
}

/// Node timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Per-collector timeout in milliseconds.
    pub collector_timeout_ms: u64,
    /// Per-scorer timeout in milliseconds.
    pub scorer_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            collector_timeout_ms: 120_000,
            scorer_timeout_ms: 60_000,
        }
    }
}

impl RuntimeConfig {
    /// Collector timeout.
    #[must_use]
    pub const fn collector_timeout(&self) -> Duration {
        Duration::from_millis(self.collector_timeout_ms)
    }

    /// Scorer timeout.
    #[must_use]
    pub const fn scorer_timeout(&self) -> Duration {
        Duration::from_millis(self.scorer_timeout_ms)
    }
}

/// Diagnostic sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing-subscriber` env-filter directive.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "tribunal=info".to_string(),
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TribunalConfig {
    /// Score range.
    pub score: ScoreRange,
    /// Adjudication rules.
    pub adjudication: AdjudicationConfig,
    /// Anomaly checker thresholds.
    pub consistency: ConsistencyConfig,
    /// Pre-flight checks.
    pub preflight: PreflightConfig,
    /// Timeouts.
    pub runtime: RuntimeConfig,
    /// Logging.
    pub logging: LogConfig,
}

/// A loaded configuration plus what happened while loading it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The validated configuration.
    pub config: TribunalConfig,
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
    /// Notes for the diagnostic sink (applied or ignored overrides).
    pub diagnostics: Vec<String>,
}

impl TribunalConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ValidationError> {
        let config: Self = toml::from_str(text).map_err(|e| ValidationError::MalformedConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> TribunalResult<String> {
        toml::to_string(self).map_err(|e| TribunalError::internal(format!("config serialization failed: {e}")))
    }

    /// Loads defaults, the optional file and process environment overrides.
    pub fn load(path: Option<&Path>) -> TribunalResult<LoadedConfig> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Like [`TribunalConfig::load`] with an explicit environment lookup.
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> TribunalResult<LoadedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| TribunalError::io(p.display().to_string(), e))?;
                toml::from_str(&text).map_err(|e| ValidationError::MalformedConfig {
                    reason: format!("{}: {e}", p.display()),
                })?
            }
            None => Self::default(),
        };

        let diagnostics = config.apply_env(env);
        config.validate()?;

        Ok(LoadedConfig {
            config,
            source: path.map(Path::to_path_buf),
            diagnostics,
        })
    }

    /// Applies environment overrides; returns one diagnostic per variable seen.
    pub fn apply_env<F>(&mut self, env: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut notes = Vec::new();

        if let Some(filter) = env(ENV_LOG) {
            notes.push(format!("{ENV_LOG} overrides log filter: {filter}"));
            self.logging.filter = filter;
        }

        if let Some(raw) = env(ENV_PASS_THRESHOLD) {
            match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => {
                    notes.push(format!("{ENV_PASS_THRESHOLD} overrides pass threshold: {value}"));
                    self.adjudication.pass_threshold = value;
                }
                _ => notes.push(format!("{ENV_PASS_THRESHOLD} ignored: '{raw}' is not a number")),
            }
        }

        if let Some(raw) = env(ENV_NODE_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => {
                    notes.push(format!("{ENV_NODE_TIMEOUT_MS} overrides node timeouts: {ms}ms"));
                    self.runtime.collector_timeout_ms = ms;
                    self.runtime.scorer_timeout_ms = ms;
                }
                _ => notes.push(format!("{ENV_NODE_TIMEOUT_MS} ignored: '{raw}' is not a positive integer")),
            }
        }

        notes
    }

    /// Validates ranges and required lists.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let range = ScoreRange::new(self.score.min, self.score.max)?;
        let in_range = |field: &str, value: f64| {
            if range.contains(value) {
                Ok(())
            } else {
                Err(ValidationError::ThresholdOutOfRange {
                    field: field.to_string(),
                    value,
                    min: range.min,
                    max: range.max,
                })
            }
        };

        let adj = &self.adjudication;
        in_range("adjudication.neutral_low", f64::from(adj.neutral_low))?;
        in_range("adjudication.security_score_max", f64::from(adj.security_score_max))?;
        in_range("adjudication.security_ceiling", f64::from(adj.security_ceiling))?;
        in_range("adjudication.pass_threshold", adj.pass_threshold)?;
        in_range("adjudication.remediation_below", f64::from(adj.remediation_below))?;
        in_range("consistency.failing_score_max", f64::from(self.consistency.failing_score_max))?;
        in_range("consistency.high_score_min", f64::from(self.consistency.high_score_min))?;

        if adj.dissent_threshold == 0 {
            return Err(ValidationError::NotPositive {
                field: "adjudication.dissent_threshold".to_string(),
            });
        }
        if VoterRole::ALL.iter().all(|&role| adj.weights.weight(role) == 0) {
            return Err(ValidationError::NoVoterWeights);
        }
        if self.runtime.collector_timeout_ms == 0 {
            return Err(ValidationError::NotPositive {
                field: "runtime.collector_timeout_ms".to_string(),
            });
        }
        if self.runtime.scorer_timeout_ms == 0 {
            return Err(ValidationError::NotPositive {
                field: "runtime.scorer_timeout_ms".to_string(),
            });
        }

        let non_empty = |field: &str, items: &[String]| {
            if items.iter().all(|s| s.trim().is_empty()) {
                Err(ValidationError::EmptyField {
                    field: field.to_string(),
                })
            } else {
                Ok(())
            }
        };
        non_empty("preflight.allowed_schemes", &self.preflight.allowed_schemes)?;
        non_empty("preflight.document_extensions", &self.preflight.document_extensions)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_validate() {
        TribunalConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = TribunalConfig::from_toml_str(
            r#"
            [adjudication]
            dissent_threshold = 3

            [adjudication.weights]
            tech_lead = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.adjudication.dissent_threshold, 3);
        assert_eq!(config.adjudication.weights.tech_lead, 3);
        assert_eq!(config.adjudication.weights.prosecutor, 1);
        assert_eq!(config.score, ScoreRange::default());
    }

    #[test]
    fn malformed_toml_is_a_validation_error() {
        let err = TribunalConfig::from_toml_str("[score\nmin = ").unwrap_err();
        assert!(matches!(err, ValidationError::MalformedConfig { .. }));
    }

    #[test]
    fn thresholds_must_lie_in_range() {
        let err = TribunalConfig::from_toml_str("[adjudication]\nneutral_low = 9").unwrap_err();
        assert!(matches!(err, ValidationError::ThresholdOutOfRange { .. }));
    }

    #[test]
    fn empty_score_range_is_rejected() {
        let err = TribunalConfig::from_toml_str("[score]\nmin = 5\nmax = 5").unwrap_err();
        assert_eq!(err, ValidationError::EmptyScoreRange { min: 5, max: 5 });
    }

    #[test]
    fn all_zero_weights_are_rejected() {
        let err = TribunalConfig::from_toml_str(
            "[adjudication.weights]\nprosecutor = 0\ndefense = 0\ntech_lead = 0",
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::NoVoterWeights);
    }

    #[test]
    fn env_overrides_apply_and_report() {
        let env: HashMap<&str, &str> = [
            (ENV_LOG, "tribunal=debug"),
            (ENV_PASS_THRESHOLD, "3.5"),
            (ENV_NODE_TIMEOUT_MS, "zero"),
        ]
        .into_iter()
        .collect();

        let loaded = TribunalConfig::load_with_env(None, |k| env.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(loaded.config.logging.filter, "tribunal=debug");
        assert!((loaded.config.adjudication.pass_threshold - 3.5).abs() < f64::EPSILON);
        assert_eq!(loaded.config.runtime, RuntimeConfig::default());
        assert_eq!(loaded.diagnostics.len(), 3);
        assert!(loaded.diagnostics[2].contains("ignored"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tribunal.toml");
        std::fs::write(&path, "[runtime]\nscorer_timeout_ms = 5").unwrap();

        let loaded = TribunalConfig::load_with_env(Some(path.as_path()), |_| None).unwrap();
        assert_eq!(loaded.config.runtime.scorer_timeout(), Duration::from_millis(5));
        assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = TribunalConfig::load_with_env(Some(Path::new("/nonexistent/tribunal.toml")), |_| None).unwrap_err();
        assert!(matches!(err, TribunalError::Io { .. }));
    }

    #[test]
    fn toml_rendering_round_trips() {
        let config = TribunalConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(TribunalConfig::from_toml_str(&text).unwrap(), config);
    }
}
