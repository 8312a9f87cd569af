//! Caller-supplied hooks consulted by handlers: breakpoints for duration-less
//! pauses, and a resolver for `match_select` when no option label matches.

use async_trait::async_trait;
use filler_types::{FillerError, Result};

use crate::action::Action;

#[async_trait]
pub trait BreakpointHook: Send + Sync {
    /// Called when a pause action has no duration. Returning resumes the run.
    async fn pause(&self, action: &Action) -> Result<()>;
}

#[async_trait]
impl<T: BreakpointHook + ?Sized> BreakpointHook for std::sync::Arc<T> {
    async fn pause(&self, action: &Action) -> Result<()> {
        (**self).pause(action).await
    }
}

// ---------------------------------------------------------------------------
// AutoContinue
// ---------------------------------------------------------------------------

pub struct AutoContinue;

#[async_trait]
impl BreakpointHook for AutoContinue {
    async fn pause(&self, action: &Action) -> Result<()> {
        tracing::debug!(name = %action.name, "Breakpoint auto-continued");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ConsoleBreakpoint
// ---------------------------------------------------------------------------

/// Waits for Enter on stdin.
pub struct ConsoleBreakpoint;

#[async_trait]
impl BreakpointHook for ConsoleBreakpoint {
    async fn pause(&self, action: &Action) -> Result<()> {
        println!("\nPaused at '{}'. Press Enter to continue...", action.name);
        tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            std::io::stdin().read_line(&mut input).map(|_| ())
        })
        .await
        .map_err(|e| FillerError::Other(format!("breakpoint task failed: {e}")))?
        .map_err(FillerError::Io)
    }
}

// ---------------------------------------------------------------------------
// RecordingBreakpoint
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingBreakpoint {
    hits: std::sync::Mutex<Vec<String>>,
}

impl RecordingBreakpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the actions that paused, in order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

#[async_trait]
impl BreakpointHook for RecordingBreakpoint {
    async fn pause(&self, action: &Action) -> Result<()> {
        self.hits.lock().unwrap().push(action.name.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OptionResolver
// ---------------------------------------------------------------------------

/// Picks an option when `match_select` finds no label containing the wanted
/// text. Returns the option value to select, or `None` to give up.
#[async_trait]
pub trait OptionResolver: Send + Sync {
    async fn resolve(&self, wanted: &str, available: &[String]) -> Result<Option<String>>;
}

#[async_trait]
impl<F> OptionResolver for F
where
    F: Fn(&str, &[String]) -> Option<String> + Send + Sync,
{
    async fn resolve(&self, wanted: &str, available: &[String]) -> Result<Option<String>> {
        Ok(self(wanted, available))
    }
}
