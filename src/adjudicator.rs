//! Conflict resolution: turns the opinions for each dimension into one
//! [`CriterionResult`] and the results into the [`Verdict`].
//!
//! Rules are applied per dimension, in order:
//!
//! 1. Fact supremacy: when the evidence says the artifact is missing, every
//!    opinion above `neutral_low` is replaced by an overruled copy.
//! 2. Weighted mean of the (possibly overruled) scores, rounded half away
//!    from zero.
//! 3. Security override: an adversarial opinion that raises a security
//!    keyword with a low raw score caps the result at `security_ceiling`.
//! 4. Dissent: a raw score gap between the two dissent roles of at least
//!    `dissent_threshold` adds a note without changing the score.
//!
//! Everything here is a pure function of the evidence map, the opinion
//! list and the flags, so identical inputs always yield identical verdicts.

use std::fmt;

use crate::config::AdjudicationConfig;
use crate::error::{NodeError, SynthesisError};
use crate::evidence::Evidence;
use crate::graph::{DeltaSink, Node, NodeId};
use crate::opinion::{Opinion, ScoreRange, VoterRole};
use crate::state::{RunError, RunState};
use crate::verdict::{CriterionResult, RemediationItem, Verdict};

/// Remediation used when a dimension meets the standard.
pub const MAINTAIN: &str = "Maintain current standard.";

/// Remediation used when nobody judged a dimension.
pub const NO_DATA: &str = "No data: no opinions were submitted for this dimension. Collect evidence and re-run the audit.";

/// Output of [`Adjudicator::resolve_dimension`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The synthesized result.
    pub result: CriterionResult,
    /// Set when the result is a degraded default.
    pub anomaly: Option<SynthesisError>,
}

/// Output of [`Adjudicator::synthesize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// The verdict, including every run error.
    pub verdict: Verdict,
    /// Errors raised by synthesis itself (also present in `verdict.errors`).
    pub errors: Vec<RunError>,
}

/// Deterministic multi-voter conflict resolution.
#[derive(Debug, Clone)]
pub struct Adjudicator {
    config: AdjudicationConfig,
    range: ScoreRange,
}

impl Adjudicator {
    /// Creates an adjudicator.
    #[must_use]
    pub fn new(config: AdjudicationConfig, range: ScoreRange) -> Self {
        Self { config, range }
    }

    /// Rules in use.
    #[must_use]
    pub const fn config(&self) -> &AdjudicationConfig {
        &self.config
    }

    /// Resolves one dimension from its canonical evidence and its opinions.
    #[must_use]
    pub fn resolve_dimension(&self, evidence: &Evidence, opinions: &[&Opinion]) -> Resolution {
        let dimension_id = evidence.dimension_id.clone();
        let dimension_name = dimension_id.display_name();

        if opinions.is_empty() {
            return Resolution {
                result: CriterionResult {
                    dimension_id,
                    dimension_name,
                    final_score: self.range.min,
                    contributing_opinions: Vec::new(),
                    dissent_note: None,
                    remediation: NO_DATA.to_string(),
                    notes: Vec::new(),
                    low_confidence: true,
                },
                anomaly: None,
            };
        }

        let mut notes = Vec::new();
        let contributing: Vec<Opinion> = if evidence.artifact_missing() {
            let ceiling = self.config.neutral_low;
            let note = format!("Fact supremacy: evidence reports the artifact as not found; score capped at {ceiling}");
            let copies: Vec<Opinion> = opinions.iter().map(|o| o.overruled(ceiling, note.clone())).collect();
            if copies.iter().any(Opinion::is_overruled) {
                notes.push(note);
            }
            copies
        } else {
            opinions.iter().map(|&o| o.clone()).collect()
        };

        let mut anomaly = None;
        let mut low_confidence = false;
        let mut final_score = if let Some(score) = self.weighted_score(&contributing) {
            score
        } else {
            anomaly = Some(SynthesisError::NoRecognizedVoters {
                dimension: dimension_id.to_string(),
                opinions: contributing.len(),
            });
            low_confidence = true;
            self.range.min
        };

        if let Some(adversary) = self.security_finding(&contributing) {
            let ceiling = self.config.security_ceiling;
            if final_score > ceiling {
                final_score = ceiling;
                notes.push(format!(
                    "Security override: {} raised a security finding with score {}; score capped at {ceiling}",
                    adversary.voter_role,
                    adversary.raw_score()
                ));
            }
        }

        let dissent_note = self.dissent(&contributing);
        let remediation = self.remediation(final_score, &contributing);

        Resolution {
            result: CriterionResult {
                dimension_id,
                dimension_name,
                final_score,
                contributing_opinions: contributing,
                dissent_note,
                remediation,
                notes,
                low_confidence,
            },
            anomaly,
        }
    }

    /// `round(Σ score·w / Σ w)` over recognized voters; `None` when Σ w is zero.
    fn weighted_score(&self, opinions: &[Opinion]) -> Option<u8> {
        let (numerator, denominator) = opinions.iter().fold((0u64, 0u64), |(num, den), o| {
            let weight = u64::from(self.config.weights.weight(o.voter_role));
            (num + u64::from(o.score) * weight, den + weight)
        });
        if denominator == 0 {
            return None;
        }
        // Half away from zero on non-negative operands.
        let rounded = (2 * numerator + denominator) / (2 * denominator);
        Some(self.range.clamp(u8::try_from(rounded).unwrap_or(self.range.max)))
    }

    /// The first adversarial opinion raising a security keyword with a low raw score.
    fn security_finding<'a>(&self, opinions: &'a [Opinion]) -> Option<&'a Opinion> {
        opinions.iter().find(|o| {
            o.voter_role == self.config.adversarial_role
                && o.raw_score() <= self.config.security_score_max
                && {
                    let rationale = o.rationale.to_lowercase();
                    self.config
                        .security_keywords
                        .iter()
                        .any(|k| !k.is_empty() && rationale.contains(&k.to_lowercase()))
                }
        })
    }

    fn raw_mean(opinions: &[Opinion], role: VoterRole) -> Option<(f64, &Opinion)> {
        let mut of_role = opinions.iter().filter(|o| o.voter_role == role);
        let first = of_role.next()?;
        let (sum, count) = of_role.fold((u32::from(first.raw_score()), 1u32), |(s, c), o| {
            (s + u32::from(o.raw_score()), c + 1)
        });
        Some((f64::from(sum) / f64::from(count), first))
    }

    fn dissent(&self, opinions: &[Opinion]) -> Option<String> {
        let [left_role, right_role] = self.config.dissent_roles;
        let (left, left_opinion) = Self::raw_mean(opinions, left_role)?;
        let (right, right_opinion) = Self::raw_mean(opinions, right_role)?;
        if (left - right).abs() < f64::from(self.config.dissent_threshold) {
            return None;
        }
        Some(format!(
            "{left_role} scored {left} ('{}') while {right_role} scored {right} ('{}').",
            left_opinion.rationale, right_opinion.rationale
        ))
    }

    fn remediation(&self, final_score: u8, opinions: &[Opinion]) -> String {
        if final_score >= self.config.remediation_below {
            return MAINTAIN.to_string();
        }
        opinions
            .iter()
            .find(|o| o.voter_role == self.config.adversarial_role)
            .or_else(|| opinions.iter().min_by_key(|o| o.score))
            .map_or_else(|| NO_DATA.to_string(), |o| o.rationale.clone())
    }

    /// Synthesizes the verdict for a run state.
    ///
    /// Only dimensions with canonical evidence are judged, in dimension id
    /// order. Opinions for other dimensions are ignored.
    #[must_use]
    pub fn synthesize(&self, state: &RunState) -> Synthesis {
        let mut errors = Vec::new();
        let mut per_dimension = Vec::with_capacity(state.evidence.len());

        for (dimension, evidence) in &state.evidence {
            let opinions: Vec<&Opinion> = state.opinions_for(dimension.as_str()).collect();
            let resolution = self.resolve_dimension(evidence, &opinions);
            if let Some(anomaly) = resolution.anomaly {
                tracing::warn!(dimension = %dimension, error = %anomaly, "degraded criterion result");
                errors.push(RunError::synthesis(NodeId::ChiefJustice, &anomaly));
            }
            per_dimension.push(resolution.result);
        }

        let overall_score = if per_dimension.is_empty() {
            0.0
        } else {
            let total: u32 = per_dimension.iter().map(|r| u32::from(r.final_score)).sum();
            f64::from(total) / f64::from(u32::try_from(per_dimension.len()).unwrap_or(u32::MAX))
        };

        let blocking = state.flags.iter().any(|f| f.kind.blocks_pass());
        let passed = !per_dimension.is_empty() && overall_score >= self.config.pass_threshold && !blocking;

        let mut remediation_plan: Vec<RemediationItem> = per_dimension
            .iter()
            .filter(|r| r.final_score < self.config.remediation_below)
            .map(|r| RemediationItem {
                dimension_id: r.dimension_id.clone(),
                final_score: r.final_score,
                action: r.remediation.clone(),
            })
            .collect();
        remediation_plan.sort_by(|a, b| {
            a.final_score
                .cmp(&b.final_score)
                .then_with(|| a.dimension_id.cmp(&b.dimension_id))
        });

        let mut all_errors = state.errors.clone();
        all_errors.extend(errors.iter().cloned());

        let summary = ExecutiveSummary {
            subject: &state.input.subject_url,
            overall: overall_score,
            max: self.range.max,
            passed,
            criteria: per_dimension.len(),
            remediations: remediation_plan.len(),
            flags: state.flags.len(),
            errors: all_errors.len(),
        }
        .to_string();

        Synthesis {
            verdict: Verdict {
                subject_url: state.input.subject_url.clone(),
                overall_score,
                passed,
                summary,
                per_dimension,
                flags: state.flags.clone(),
                errors: all_errors,
                remediation_plan,
            },
            errors,
        }
    }
}

/// Deterministic executive summary built from run counts.
struct ExecutiveSummary<'a> {
    subject: &'a str,
    overall: f64,
    max: u8,
    passed: bool,
    criteria: usize,
    remediations: usize,
    flags: usize,
    errors: usize,
}

impl fmt::Display for ExecutiveSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.passed { "PASSED" } else { "FAILED" };
        write!(
            f,
            "Audit of {}: overall score {:.2}/{} across {} criteria. Verdict: {outcome}.",
            self.subject, self.overall, self.max, self.criteria
        )?;
        if self.remediations > 0 {
            write!(f, " {} criteria need remediation.", self.remediations)?;
        }
        if self.flags > 0 {
            write!(f, " {} consistency flag(s) raised.", self.flags)?;
        }
        if self.errors > 0 {
            write!(f, " {} error(s) were recorded during the run.", self.errors)?;
        }
        Ok(())
    }
}

/// Adjudicator node; writes the terminal verdict.
#[derive(Debug, Clone)]
pub struct ChiefJusticeNode {
    adjudicator: Adjudicator,
}

impl ChiefJusticeNode {
    /// Creates the node.
    #[must_use]
    pub fn new(adjudicator: Adjudicator) -> Self {
        Self { adjudicator }
    }
}

impl Node for ChiefJusticeNode {
    fn run(&self, state: &RunState, out: &DeltaSink) -> Result<(), NodeError> {
        let Synthesis { verdict, errors } = self.adjudicator.synthesize(state);
        tracing::info!(
            overall = verdict.overall_score,
            passed = verdict.passed,
            criteria = verdict.per_dimension.len(),
            digest = %verdict.digest(),
            "verdict synthesized"
        );
        for error in errors {
            out.push_error(error);
        }
        out.set_verdict(verdict);
        Ok(())
    }
}
