//! Action handler trait, dynamic dispatch wrapper, and handler registry.

use std::collections::HashMap;

use async_trait::async_trait;
use filler_graph::ActionKind;
use filler_types::{Context, Result};
use serde_json::Value;

use crate::action::Action;
use crate::driver::BrowserSession;
use crate::engine::EngineConfig;
use crate::fetch::ObjectFetcher;
use crate::hooks::{BreakpointHook, OptionResolver};
use crate::selector::{substitute, Selector, Target};

/// What the run loop does after a successful action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Move the cursor to the action with this name (case-insensitive).
    Jump(String),
}

// ---------------------------------------------------------------------------
// ActionEnv: everything a handler may touch
// ---------------------------------------------------------------------------

pub struct ActionEnv<'a> {
    pub session: &'a dyn BrowserSession,
    pub context: &'a Context,
    pub config: &'a EngineConfig,
    pub resolver: Option<&'a dyn OptionResolver>,
    pub breakpoint: Option<&'a dyn BreakpointHook>,
    pub fetcher: &'a dyn ObjectFetcher,
}

impl ActionEnv<'_> {
    /// Resolve a selector template to a single target. `{}` is replaced by
    /// `value`; an either-of selector waits briefly for its second target and
    /// falls back to the first.
    pub async fn locate(&self, template: &str, value: &Value) -> Result<Target> {
        match Selector::parse(&substitute(template, value))? {
            Selector::Single(target) => Ok(target),
            Selector::Either(first, second) => {
                if self
                    .session
                    .wait_visible(&second, self.config.either_wait())
                    .await
                    .is_ok()
                {
                    tracing::debug!(selector = %second, "Either-of resolved to second target");
                    Ok(second)
                } else {
                    Ok(first)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ActionHandler trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// The action kind this handler executes.
    fn kind(&self) -> ActionKind;

    /// Perform exactly one semantic browser operation for `action`.
    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow>;
}

// ---------------------------------------------------------------------------
// DynHandler: object-safe wrapper
// ---------------------------------------------------------------------------

pub struct DynHandler(Box<dyn ActionHandler>);

impl DynHandler {
    pub fn new(handler: impl ActionHandler + 'static) -> Self {
        Self(Box::new(handler))
    }

    pub fn kind(&self) -> ActionKind {
        self.0.kind()
    }

    pub async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        self.0.execute(action, env).await
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionKind, DynHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same kind.
    pub fn register(&mut self, handler: impl ActionHandler + 'static) {
        self.handlers.insert(handler.kind(), DynHandler::new(handler));
    }

    pub fn get(&self, kind: ActionKind) -> Option<&DynHandler> {
        self.handlers.get(&kind)
    }

    pub fn has(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Default registry factory
// ---------------------------------------------------------------------------

pub fn default_registry() -> HandlerRegistry {
    use crate::handlers::*;

    let mut reg = HandlerRegistry::new();
    reg.register(FillHandler);
    reg.register(FillDateHandler);
    reg.register(SelectHandler);
    reg.register(MatchSelectHandler);
    reg.register(CheckHandler);
    reg.register(GroupCheckboxHandler);
    reg.register(ClickHandler);
    reg.register(GotoHandler);
    reg.register(ReadHandler);
    reg.register(QuestionAnswerHandler);
    reg.register(PauseHandler);
    reg.register(UploadHandler);
    reg.register(WaitHandler);
    reg.register(KeyboardHandler);
    reg.register(BatchClickHandler);
    reg.register(FinalizeHandler);
    reg
}
