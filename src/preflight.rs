//! Pre-flight validation and collector routing.
//!
//! Pre-flight is the only node whose errors stop a run: when it records a
//! configuration error the collector route returns [`Target::End`] and no
//! collector executes.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::PreflightConfig;
use crate::error::{NodeError, ValidationError};
use crate::graph::{DeltaSink, Node, NodeId, Target};
use crate::state::{ErrorKind, RunError, RunInput, RunState};

/// Absolute URI: scheme, `://`, a non-empty authority, optional path/query/fragment.
const ABSOLUTE_URI: &str = r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?P<authority>[^\s/?#]+)(?P<rest>[/?#]\S*)?$";

static URI_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn uri_pattern() -> Option<&'static Regex> {
    URI_PATTERN.get_or_init(|| Regex::new(ABSOLUTE_URI).ok()).as_ref()
}

/// Checks that `url` is a well-formed absolute URI with an allowed scheme.
pub fn validate_subject_url(url: &str, config: &PreflightConfig) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidSubjectUrl {
        url: url.to_string(),
        reason,
    };

    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(invalid("URL is empty".to_string()));
    }

    let pattern = uri_pattern().ok_or_else(|| invalid("URI pattern unavailable".to_string()))?;
    let Some(caps) = pattern.captures(trimmed) else {
        return Err(invalid("not an absolute URI".to_string()));
    };

    let scheme = caps.name("scheme").map_or("", |m| m.as_str());
    let allowed = config
        .allowed_schemes
        .iter()
        .any(|s| s.eq_ignore_ascii_case(scheme));
    if !allowed {
        return Err(invalid(format!(
            "scheme '{scheme}' is not one of [{}]",
            config.allowed_schemes.join(", ")
        )));
    }
    Ok(())
}

/// Checks that `path` names a supported document type.
///
/// Only the extension is inspected; whether the file exists is the
/// document collector's concern.
pub fn validate_document(path: &str, config: &PreflightConfig) -> Result<(), ValidationError> {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let supported = config
        .document_extensions
        .iter()
        .any(|ext| ext.trim_start_matches('.').eq_ignore_ascii_case(extension));
    if extension.is_empty() || !supported {
        return Err(ValidationError::UnsupportedDocument {
            path: path.to_string(),
            supported: config.document_extensions.join(", "),
        });
    }
    Ok(())
}

/// Validates a run input, returning every problem found.
#[must_use]
pub fn validate_input(input: &RunInput, config: &PreflightConfig) -> Vec<ValidationError> {
    let mut problems = Vec::new();
    if let Err(err) = validate_subject_url(&input.subject_url, config) {
        problems.push(err);
    }
    for path in &input.document_paths {
        if let Err(err) = validate_document(path, config) {
            problems.push(err);
        }
    }
    problems
}

/// Pre-flight validation node.
#[derive(Debug, Clone)]
pub struct PreflightNode {
    config: PreflightConfig,
}

impl PreflightNode {
    /// Creates the node.
    #[must_use]
    pub fn new(config: PreflightConfig) -> Self {
        Self { config }
    }
}

impl Node for PreflightNode {
    fn run(&self, state: &RunState, out: &DeltaSink) -> Result<(), NodeError> {
        let problems = validate_input(&state.input, &self.config);
        if problems.is_empty() {
            tracing::debug!(
                subject = %state.input.subject_url,
                documents = state.input.document_paths.len(),
                "pre-flight passed"
            );
        }
        for problem in &problems {
            tracing::warn!(error = %problem, "pre-flight rejected input");
            out.push_error(RunError::configuration(NodeId::Preflight, problem));
        }
        Ok(())
    }
}

/// Builds the routing function out of pre-flight.
///
/// `collectors` are the registered collector nodes. The document analyst
/// is only routed when document paths were given. When no collector is
/// routed the run continues at `fallback`.
pub fn collector_route(collectors: Vec<NodeId>, fallback: NodeId) -> impl Fn(&RunState) -> Vec<Target> + Send + Sync + 'static {
    move |state: &RunState| {
        if state
            .errors
            .iter()
            .any(|e| e.kind == ErrorKind::Configuration)
        {
            return vec![Target::End];
        }

        let has_documents = !state.input.document_paths.is_empty();
        let targets: Vec<Target> = collectors
            .iter()
            .copied()
            .filter(|&id| id != NodeId::DocAnalyst || has_documents)
            .map(Target::Node)
            .collect();

        if targets.is_empty() {
            vec![Target::Node(fallback)]
        } else {
            targets
        }
    }
}
