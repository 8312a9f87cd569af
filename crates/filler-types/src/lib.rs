//! Shared types, errors, and execution context for the form filler.
//!
//! This crate provides the foundational types used across all other filler crates:
//! - `FillerError`: unified error taxonomy
//! - `Context`: per-run key-value store for captured values
//! - `InvalidField`: a required field the data source could not supply
//! - `RunStatus`: overall outcome of a fill run or campaign

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Unified error type for all filler subsystems.
#[derive(Debug, thiserror::Error)]
pub enum FillerError {
    // === Configuration Errors ===
    #[error("Node {id} not found in the graph")]
    UnknownNode { id: u32 },

    #[error("Graph validation failed: {0}")]
    InvalidGraph(String),

    #[error("No node named '{name}'")]
    NodeNotFound { name: String },

    #[error("No action named '{target}' to jump to")]
    JumpTargetNotFound { target: String },

    #[error("Missing {0} credentials")]
    MissingCredentials(String),

    // === Data Errors ===
    #[error("Missing or invalid data for {} field(s): {}", .0.len(), join_fields(.0))]
    InvalidFields(Vec<InvalidField>),

    #[error("Failed to fetch '{key}': {message}")]
    FetchFailed { key: String, message: String },

    #[error("Step limit of {limit} reached; the graph or action list may contain a cycle")]
    StepLimitExceeded { limit: usize },

    // === Action Errors ===
    #[error(
        "Error with action ({action}), locator ({selector}), option ({option}), data ({value}), error: {cause}, screenshot: ({})",
        display_path(.screenshot)
    )]
    ActionFailed {
        action: String,
        selector: String,
        option: String,
        value: String,
        cause: Box<FillerError>,
        screenshot: Option<PathBuf>,
    },

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("No element matches {selector}")]
    ElementNotFound { selector: String },

    #[error("Option ({wanted}) not found in {}", .available.join(","))]
    OptionNotFound {
        wanted: String,
        available: Vec<String>,
    },

    #[error("Unsupported value for {action}: {message}")]
    InvalidValue { action: String, message: String },

    // === Campaign Errors ===
    #[error("{0}")]
    Portal(String),

    #[error("Job post {job_id} not found or Job post is pending. Please check it in Job Posts.")]
    JobNotFound { job_id: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

fn join_fields(fields: &[InvalidField]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

/// Message fragments that mark a failure as permanent no matter which
/// variant carries it. Matching is case-insensitive.
const PERMANENT_PATTERNS: &[&str] = &[
    r"password or username is incorrect",
    r"missing .*credentials",
    r"missing .*config",
    r"\b404\b",
    r"not found",
    r"pending review",
    r"job post is pending",
    r"security question",
];

fn permanent_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = PERMANENT_PATTERNS.join("|");
        regex::Regex::new(&format!("(?i){alternation}")).unwrap()
    })
}

impl FillerError {
    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        match self {
            FillerError::UnknownNode { .. }
            | FillerError::InvalidGraph(_)
            | FillerError::NodeNotFound { .. }
            | FillerError::JumpTargetNotFound { .. }
            | FillerError::MissingCredentials(_)
            | FillerError::InvalidFields(_)
            | FillerError::StepLimitExceeded { .. }
            | FillerError::JobNotFound { .. } => true,
            FillerError::ActionFailed { cause, .. } => cause.is_terminal(),
            other => permanent_regex().is_match(&other.to_string()),
        }
    }

    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !self.is_terminal()
    }

    /// Wrap `self` as the cause of a failed browser action.
    pub fn into_action_failure(
        self,
        action: impl Into<String>,
        selector: impl Into<String>,
        option: impl Into<String>,
        value: impl Into<String>,
        screenshot: Option<PathBuf>,
    ) -> FillerError {
        FillerError::ActionFailed {
            action: action.into(),
            selector: selector.into(),
            option: option.into(),
            value: value.into(),
            cause: Box::new(self),
            screenshot,
        }
    }
}

/// A convenience alias for `Result<T, FillerError>`.
pub type Result<T> = std::result::Result<T, FillerError>;

// ---------------------------------------------------------------------------
// InvalidField: a required field the data source could not supply
// ---------------------------------------------------------------------------

/// Serialized as a two-element array `[node_name, data_key]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct InvalidField {
    pub name: String,
    pub key: String,
}

impl InvalidField {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }
}

impl From<(String, String)> for InvalidField {
    fn from((name, key): (String, String)) -> Self {
        Self { name, key }
    }
}

impl From<InvalidField> for (String, String) {
    fn from(field: InvalidField) -> Self {
        (field.name, field.key)
    }
}

impl fmt::Display for InvalidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.key)
    }
}

// ---------------------------------------------------------------------------
// Context: per-run key-value store for captured values
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;

/// Key-value store shared by every action of a single run.
///
/// Cloning a `Context` yields another handle to the **same** inner state.
/// Each run creates its own context, so concurrent runs never share values.
#[derive(Clone)]
pub struct Context {
    inner: Arc<tokio::sync::RwLock<ContextInner>>,
}

#[derive(Debug, Clone, Default)]
struct ContextInner {
    values: HashMap<String, serde_json::Value>,
    logs: Vec<String>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(ContextInner::default())),
        }
    }

    /// Insert or overwrite a key.
    pub async fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.write().await.values.insert(key.into(), value);
    }

    /// Read a value by key (cloned).
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().await.values.get(key).cloned()
    }

    /// Remove a key, returning its previous value.
    pub async fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.write().await.values.remove(key)
    }

    /// Convenience accessor that returns a `String`. Falls back to `default`
    /// when the key is absent or not a JSON string.
    pub async fn get_string(&self, key: &str, default: &str) -> String {
        self.inner
            .read()
            .await
            .values
            .get(key)
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| default.to_owned())
    }

    /// Append a free-form log entry.
    pub async fn append_log(&self, entry: impl Into<String>) {
        self.inner.write().await.logs.push(entry.into());
    }

    /// Ordered log of what was attempted during the run.
    pub async fn logs(&self) -> Vec<String> {
        self.inner.read().await.logs.clone()
    }

    /// Shallow copy of the current values map.
    pub async fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.inner.read().await.values.clone()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// RunStatus: overall outcome of a run or campaign
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl RunStatus {
    /// Derive the status from a count of succeeded and attempted units.
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if total == 0 || succeeded == total {
            RunStatus::Success
        } else if succeeded == 0 {
            RunStatus::Failed
        } else {
            RunStatus::PartialSuccess
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_action_failed() {
        let err = FillerError::ElementNotFound {
            selector: "#name".into(),
        }
        .into_action_failure("fill", "#name", "", "Ada", Some(PathBuf::from("error_fill_1200.png")));
        assert_eq!(
            err.to_string(),
            "Error with action (fill), locator (#name), option (), data (Ada), error: No element matches #name, screenshot: (error_fill_1200.png)"
        );
    }

    #[test]
    fn error_display_action_failed_without_screenshot() {
        let err = FillerError::Driver("closed".into()).into_action_failure("click", "#go", "", "", None);
        assert!(err.to_string().ends_with("screenshot: ()"));
    }

    #[test]
    fn error_display_invalid_fields() {
        let err = FillerError::InvalidFields(vec![
            InvalidField::new("FillName", "name"),
            InvalidField::new("FillAge", "age"),
        ]);
        assert_eq!(
            err.to_string(),
            "Missing or invalid data for 2 field(s): FillName (name), FillAge (age)"
        );
    }

    #[test]
    fn error_display_option_not_found() {
        let err = FillerError::OptionNotFound {
            wanted: "Ontario".into(),
            available: vec!["Alberta".into(), "Quebec".into()],
        };
        assert_eq!(err.to_string(), "Option (Ontario) not found in Alberta,Quebec");
    }

    #[test]
    fn error_display_job_not_found() {
        let err = FillerError::JobNotFound { job_id: "42".into() };
        assert!(err.to_string().starts_with("Job post 42 not found"));
    }

    // --- classification ---

    #[test]
    fn bad_credentials_are_terminal() {
        let err = FillerError::Portal("Password or username is incorrect".into());
        assert!(err.is_terminal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn security_answer_failure_is_terminal() {
        let err = FillerError::Portal(
            "Security question answer is incorrect. Please check your RCIC account in settings.".into(),
        );
        assert!(err.is_terminal());
    }

    #[test]
    fn http_404_message_is_terminal() {
        let err = FillerError::Driver("HTTP Error 404 - page gone".into());
        assert!(err.is_terminal());
    }

    #[test]
    fn missing_credentials_is_terminal() {
        assert!(FillerError::MissingCredentials("jobbank portal".into()).is_terminal());
    }

    #[test]
    fn timeouts_are_retryable() {
        let err = FillerError::Timeout {
            what: "#next".into(),
            timeout_ms: 30_000,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn generic_driver_errors_are_retryable() {
        let err = FillerError::Driver("websocket reset by peer".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn action_failure_inherits_cause_classification() {
        let transient = FillerError::Timeout {
            what: "x".into(),
            timeout_ms: 1,
        }
        .into_action_failure("click", "x", "", "", None);
        assert!(transient.is_retryable());

        let permanent = FillerError::JobNotFound { job_id: "1".into() }
            .into_action_failure("goto", "x", "", "", None);
        assert!(permanent.is_terminal());
    }

    // --- From impls ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FillerError = io_err.into();
        assert!(matches!(err, FillerError::Io(_)));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: FillerError = json_err.into();
        assert!(matches!(err, FillerError::Json(_)));
    }

    // --- InvalidField ---

    #[test]
    fn invalid_field_serializes_as_pair() {
        let fields = vec![InvalidField::new("FillName", "name")];
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json, serde_json::json!([["FillName", "name"]]));

        let back: Vec<InvalidField> = serde_json::from_value(json).unwrap();
        assert_eq!(back, fields);
    }

    // --- Context ---

    #[tokio::test]
    async fn context_set_and_get_round_trip() {
        let ctx = Context::new();
        ctx.set("key", serde_json::json!("hello")).await;
        assert_eq!(ctx.get("key").await, Some(serde_json::json!("hello")));
    }

    #[tokio::test]
    async fn context_get_string_returns_default_when_missing() {
        let ctx = Context::new();
        assert_eq!(ctx.get_string("missing", "fallback").await, "fallback");
    }

    #[tokio::test]
    async fn context_remove_clears_key() {
        let ctx = Context::new();
        ctx.set("summary_url", serde_json::json!("https://x")).await;
        assert!(ctx.remove("summary_url").await.is_some());
        assert_eq!(ctx.get("summary_url").await, None);
    }

    #[tokio::test]
    async fn context_clones_share_state() {
        let ctx = Context::new();
        let other = ctx.clone();
        other.set("a", serde_json::json!(1)).await;
        other.append_log("fill: #name").await;
        assert_eq!(ctx.get("a").await, Some(serde_json::json!(1)));
        assert_eq!(ctx.logs().await, vec!["fill: #name".to_string()]);
        assert_eq!(ctx.snapshot().await.len(), 1);
    }

    // --- RunStatus ---

    #[test]
    fn run_status_from_counts() {
        assert_eq!(RunStatus::from_counts(3, 3), RunStatus::Success);
        assert_eq!(RunStatus::from_counts(1, 3), RunStatus::PartialSuccess);
        assert_eq!(RunStatus::from_counts(0, 3), RunStatus::Failed);
        assert_eq!(RunStatus::from_counts(0, 0), RunStatus::Success);
    }

    #[test]
    fn run_status_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&RunStatus::PartialSuccess).unwrap(),
            "\"partial_success\""
        );
    }
}
