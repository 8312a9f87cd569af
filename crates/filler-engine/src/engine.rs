//! The run loop: replay an action list against one browser session.
//!
//! Actions run strictly in order. Each one is reported to the progress sink,
//! filtered through its option modifiers, and dispatched to the registered
//! handler. A failing action gets a full-page screenshot and ends the run with
//! [`FillerError::ActionFailed`]; there is no retry at this layer. A handler may
//! return [`Flow::Jump`] to move the cursor to another action by name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filler_graph::FillerGraph;
use filler_types::{Context, FillerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Action;
use crate::data::DataSource;
use crate::driver::BrowserSession;
use crate::events::{ProgressMessage, ProgressSink, ProgressUpdate};
use crate::fetch::{HttpObjectFetcher, ObjectFetcher};
use crate::handler::{default_registry, ActionEnv, Flow, HandlerRegistry};
use crate::hooks::{BreakpointHook, OptionResolver};
use crate::preflight::{preflight, PreflightOptions, DEFAULT_MAX_STEPS};

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Timing and limits for a run. All durations are milliseconds on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-operation timeout for waits and driver calls.
    pub timeout_ms: u64,
    /// Where failure screenshots are written.
    pub screenshot_dir: PathBuf,
    /// Where remote upload sources are downloaded. Defaults to the OS temp dir.
    pub upload_dir: Option<PathBuf>,
    /// How long `skip_nonexist` waits before counting matches.
    pub grace_ms: u64,
    pub post_pause_ms: u64,
    pub batch_delay_ms: u64,
    pub finalize_settle_ms: u64,
    /// How long an either-of selector waits for its second target.
    pub either_wait_ms: u64,
    /// Keystroke delay for `fill` with option `type`.
    pub type_delay_ms: u64,
    /// Upper bound on executed actions, counting jumps.
    pub max_steps: usize,
    pub max_batch_clicks: usize,
    /// Upper bound on "next" clicks while finalizing.
    pub max_finalize_pages: usize,
    pub finalize_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            screenshot_dir: PathBuf::from("."),
            upload_dir: None,
            grace_ms: 5_000,
            post_pause_ms: 2_000,
            batch_delay_ms: 3_000,
            finalize_settle_ms: 2_000,
            either_wait_ms: 5_000,
            type_delay_ms: 100,
            max_steps: DEFAULT_MAX_STEPS,
            max_batch_clicks: 200,
            max_finalize_pages: 50,
            finalize_base_url: "https://tfwp.lmia.esdc.gc.ca".into(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// No sleeps or grace periods. Useful for tests and dry runs.
    pub fn instant() -> Self {
        Self {
            grace_ms: 0,
            post_pause_ms: 0,
            batch_delay_ms: 0,
            finalize_settle_ms: 0,
            either_wait_ms: 0,
            type_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
    pub fn post_pause(&self) -> Duration {
        Duration::from_millis(self.post_pause_ms)
    }
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
    pub fn finalize_settle(&self) -> Duration {
        Duration::from_millis(self.finalize_settle_ms)
    }
    pub fn either_wait(&self) -> Duration {
        Duration::from_millis(self.either_wait_ms)
    }
    pub fn type_delay(&self) -> Duration {
        Duration::from_millis(self.type_delay_ms)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Actions executed, counting repeats caused by jumps.
    pub steps: usize,
    /// Set by `finalize`.
    pub summary_url: Option<String>,
    /// Values captured during the run.
    pub context: HashMap<String, Value>,
    /// Ordered log of what was attempted.
    pub log: Vec<String>,
}

/// Executes action lists. Owns a handler registry and the caller's hooks;
/// every `run` gets a fresh context, so one filler can serve concurrent runs
/// on separate sessions.
pub struct WebFiller {
    registry: HandlerRegistry,
    config: EngineConfig,
    progress: Option<Arc<dyn ProgressSink>>,
    breakpoint: Option<Arc<dyn BreakpointHook>>,
    resolver: Option<Arc<dyn OptionResolver>>,
    fetcher: Arc<dyn ObjectFetcher>,
}

impl WebFiller {
    /// Create a filler pre-loaded with the default built-in handlers.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            registry: default_registry(),
            config,
            progress: None,
            breakpoint: None,
            resolver: None,
            fetcher: Arc::new(HttpObjectFetcher::new()),
        }
    }

    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }

    pub fn breakpoint(mut self, hook: impl BreakpointHook + 'static) -> Self {
        self.breakpoint = Some(Arc::new(hook));
        self
    }

    pub fn resolver(mut self, resolver: impl OptionResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn fetcher(mut self, fetcher: impl ObjectFetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Linearize `graph` against `source`, then run the result.
    pub async fn fill(
        &self,
        graph: &FillerGraph,
        source: &dyn DataSource,
        options: PreflightOptions,
        session: &dyn BrowserSession,
    ) -> Result<RunSummary> {
        let actions = preflight(graph, source, options)?;
        self.run(&actions, session).await
    }

    /// Replay `actions` against `session`.
    pub async fn run(&self, actions: &[Action], session: &dyn BrowserSession) -> Result<RunSummary> {
        let context = Context::new();
        let env = ActionEnv {
            session,
            context: &context,
            config: &self.config,
            resolver: self.resolver.as_deref(),
            breakpoint: self.breakpoint.as_deref(),
            fetcher: self.fetcher.as_ref(),
        };
        let total = actions.len();
        let mut index = 0;
        let mut steps = 0;
        tracing::info!(actions = total, timeout_ms = self.config.timeout_ms, "Starting run");

        while index < total {
            steps += 1;
            if steps > self.config.max_steps {
                return Err(FillerError::StepLimitExceeded {
                    limit: self.config.max_steps,
                });
            }
            let action = &actions[index];
            let progress = ProgressUpdate::percent(index, total);
            self.report(progress, message_for(action));
            context
                .append_log(format!("{}: {} {}", action.kind, action.name, action.selector_str()))
                .await;
            tracing::info!(step = steps, name = %action.name, kind = %action.kind, selector = %action.selector_str(), "Executing action");

            let flow = match self.perform(action, &env).await {
                Ok(flow) => flow,
                Err(cause) => {
                    let screenshot = self.capture_failure(action, session).await;
                    tracing::error!(name = %action.name, kind = %action.kind, error = %cause, "Action failed");
                    let err = cause.into_action_failure(
                        action.kind.as_str(),
                        action.selector_str(),
                        action.option_str(),
                        action.value_text(),
                        screenshot,
                    );
                    let mut message = message_for(action);
                    message.option = None;
                    message.error = Some(err.to_string());
                    self.report(progress, message);
                    return Err(err);
                }
            };

            match flow {
                Flow::Continue => index += 1,
                Flow::Jump(target) => {
                    index = actions
                        .iter()
                        .position(|a| a.name.eq_ignore_ascii_case(&target))
                        .ok_or(FillerError::JumpTargetNotFound { target: target.clone() })?;
                    tracing::info!(target = %target, index, "Jumping to action");
                }
            }
        }

        self.report(
            100,
            ProgressMessage {
                action: "complete".into(),
                success: Some(true),
                ..Default::default()
            },
        );
        let summary_url = context.get("summary_url").await.and_then(|v| v.as_str().map(String::from));
        tracing::info!(steps, summary_url = ?summary_url, "Run complete");
        Ok(RunSummary {
            steps,
            summary_url,
            context: context.snapshot().await,
            log: context.logs().await,
        })
    }

    /// Apply modifiers, dispatch, and honor `post_pause`.
    async fn perform(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let handler = self.registry.get(action.kind).ok_or_else(|| {
            FillerError::Other(format!("No handler registered for action kind '{}'", action.kind))
        })?;
        let modifiers = action.modifiers();

        if modifiers.skip_disabled {
            let target = env.locate(action.selector_str(), &Value::Null).await?;
            if env.session.is_disabled(&target).await? {
                tracing::info!(selector = %target, "Skipping disabled element");
                return Ok(Flow::Continue);
            }
        }
        if modifiers.skip_absent {
            tokio::time::sleep(self.config.grace()).await;
            let target = env.locate(action.selector_str(), &Value::Null).await?;
            if env.session.count(&target).await? == 0 {
                tracing::info!(selector = %target, "Skipping nonexistent element");
                return Ok(Flow::Continue);
            }
        }

        let flow = handler.execute(action, env).await?;

        if modifiers.post_pause {
            tracing::debug!(ms = self.config.post_pause_ms, "Post-action pause");
            tokio::time::sleep(self.config.post_pause()).await;
        }
        Ok(flow)
    }

    async fn capture_failure(&self, action: &Action, session: &dyn BrowserSession) -> Option<PathBuf> {
        let stamp = chrono::Local::now().format("%H%M%S");
        let path = self
            .config
            .screenshot_dir
            .join(format!("error_{}_{}.png", action.kind, stamp));
        match session.screenshot(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Error screenshot saved");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not capture error screenshot");
                None
            }
        }
    }

    fn report(&self, progress: u8, message: ProgressMessage) {
        if let Some(sink) = &self.progress {
            sink.report(ProgressUpdate { progress, message });
        }
    }
}

fn message_for(action: &Action) -> ProgressMessage {
    ProgressMessage {
        action: action.kind.to_string(),
        name: action.name.clone(),
        selector: action.selector.clone(),
        option: action.option.clone(),
        value: Some(action.value.clone()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{"timeout_ms": 5000}"#).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.grace(), Duration::from_secs(5));
        assert_eq!(config.max_batch_clicks, 200);
        assert_eq!(config.max_finalize_pages, 50);
        assert_eq!(config.finalize_base_url, "https://tfwp.lmia.esdc.gc.ca");
    }

    #[test]
    fn instant_config_has_no_delays() {
        let config = EngineConfig::instant();
        assert_eq!(config.post_pause(), Duration::ZERO);
        assert_eq!(config.either_wait(), Duration::ZERO);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn config_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"screenshot_dir": "/tmp/shots", "max_steps": 12}"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.screenshot_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.max_steps, 12);
    }
}
