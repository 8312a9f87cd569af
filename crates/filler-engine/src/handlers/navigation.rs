//! Handlers that move around the page or steer the run.

use async_trait::async_trait;
use filler_graph::ActionKind;
use filler_types::{FillerError, Result};
use serde_json::Value;

use crate::action::Action;
use crate::handler::{ActionEnv, ActionHandler, Flow};
use crate::selector::substitute;

// ---------------------------------------------------------------------------
// click / goto / keyboard / wait
// ---------------------------------------------------------------------------

pub struct ClickHandler;

#[async_trait]
impl ActionHandler for ClickHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Click
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let target = env.locate(action.selector_str(), &action.value).await?;
        env.session.click(&target, action.has_option("force")).await?;
        Ok(Flow::Continue)
    }
}

/// Navigates to the selector, with `{}` replaced by the value when present.
pub struct GotoHandler;

#[async_trait]
impl ActionHandler for GotoHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Goto
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let url = substitute(action.selector_str(), &action.value);
        env.session.goto(&url).await?;
        Ok(Flow::Continue)
    }
}

pub struct KeyboardHandler;

#[async_trait]
impl ActionHandler for KeyboardHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Keyboard
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        env.session.press(&action.value_text()).await?;
        Ok(Flow::Continue)
    }
}

pub struct WaitHandler;

#[async_trait]
impl ActionHandler for WaitHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Wait
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let target = env.locate(action.selector_str(), &Value::Null).await?;
        let timeout = env.config.timeout();
        if let Err(e) = env.session.wait_visible(&target, timeout).await {
            tracing::error!(selector = %target, timeout_ms = %timeout.as_millis(), "Element did not become visible");
            return Err(e);
        }
        tracing::debug!(selector = %target, "Element visible");
        Ok(Flow::Continue)
    }
}

// ---------------------------------------------------------------------------
// read
// ---------------------------------------------------------------------------

/// Captures page state into the context.
///
/// With selector `url` the current URL is stored under `url`; an option of
/// the form `var=prefix{}suffix` also stores the middle part under `var` (or
/// null when the URL does not fit). With any other selector the element text
/// is compared to the value, and a match jumps to the action named by the
/// option.
pub struct ReadHandler;

/// Extract the part of `text` that fills `{}` in `template`.
pub(crate) fn extract(template: &str, text: &str) -> Option<String> {
    let (prefix, suffix) = template.split_once("{}")?;
    if text.len() >= prefix.len() + suffix.len() && text.starts_with(prefix) && text.ends_with(suffix) {
        Some(text[prefix.len()..text.len() - suffix.len()].to_string())
    } else {
        None
    }
}

#[async_trait]
impl ActionHandler for ReadHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Read
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        if action.selector_str() == "url" {
            let url = env.session.current_url().await?;
            env.context.set("url", Value::String(url.clone())).await;
            if let Some((var, template)) = action.option_str().split_once('=') {
                if template.contains("{}") {
                    let captured = extract(template, &url).map_or(Value::Null, Value::String);
                    tracing::info!(var = %var, value = %captured, "Captured URL variable");
                    env.context.set(var.trim(), captured).await;
                }
            }
            return Ok(Flow::Continue);
        }

        let target = env.locate(action.selector_str(), &Value::Null).await?;
        let content = env.session.inner_text(&target).await?;
        let target_name = action.option_str().trim();
        if let Value::String(expected) = &action.value {
            if !target_name.is_empty() && content.trim().to_lowercase() == expected.to_lowercase() {
                return Ok(Flow::Jump(target_name.to_string()));
            }
        }
        Ok(Flow::Continue)
    }
}

// ---------------------------------------------------------------------------
// pause
// ---------------------------------------------------------------------------

/// Sleeps for the value in seconds. Without a duration the breakpoint hook
/// is consulted, and skipped when none is installed.
pub struct PauseHandler;

fn pause_seconds(value: &Value) -> Option<f64> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (secs > 0.0 && secs.is_finite()).then_some(secs)
}

#[async_trait]
impl ActionHandler for PauseHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Pause
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        match pause_seconds(&action.value) {
            Some(secs) => {
                tracing::info!(seconds = secs, "Pausing");
                tokio::time::sleep(std::time::Duration::from_secs_f64(secs)).await;
            }
            None => match env.breakpoint {
                Some(hook) => hook.pause(action).await?,
                None => tracing::info!(name = %action.name, "No breakpoint hook, skipping pause"),
            },
        }
        Ok(Flow::Continue)
    }
}

// ---------------------------------------------------------------------------
// batch_click
// ---------------------------------------------------------------------------

/// Clicks the last match until none remain, confirming through the option's
/// selector after each click when one is given.
pub struct BatchClickHandler;

#[async_trait]
impl ActionHandler for BatchClickHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::BatchClick
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let target = env.locate(action.selector_str(), &Value::Null).await?;
        let confirm = action.option_str().trim();
        let limit = env.config.max_batch_clicks;

        for clicked in 0..=limit {
            if env.session.count(&target).await? == 0 {
                tracing::debug!(selector = %target, clicked, "Batch click finished");
                return Ok(Flow::Continue);
            }
            if clicked == limit {
                break;
            }
            env.session.click(&target.clone().last(), false).await?;
            tokio::time::sleep(env.config.batch_delay()).await;
            if !confirm.is_empty() {
                let confirm_at = env.locate(confirm, &Value::Null).await?;
                env.session.click(&confirm_at, false).await?;
                tokio::time::sleep(env.config.batch_delay()).await;
            }
        }
        Err(FillerError::Other(format!(
            "{target} still matched after {limit} clicks"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_middle_of_template() {
        let t = "https://portal.test/application/profile/{}";
        assert_eq!(extract(t, "https://portal.test/application/profile/A123").as_deref(), Some("A123"));
        assert_eq!(extract(t, "https://elsewhere.test/x"), None);
        assert_eq!(extract("https://x.test/{}/edit", "https://x.test/42/edit").as_deref(), Some("42"));
        assert_eq!(extract("ab{}ba", "aba"), None);
    }

    #[test]
    fn pause_durations() {
        assert_eq!(pause_seconds(&json!(2)), Some(2.0));
        assert_eq!(pause_seconds(&json!("0.5")), Some(0.5));
        assert_eq!(pause_seconds(&json!(0)), None);
        assert_eq!(pause_seconds(&Value::Null), None);
        assert_eq!(pause_seconds(&json!("soon")), None);
    }
}
