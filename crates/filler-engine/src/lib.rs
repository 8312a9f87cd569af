//! Declarative form-filling engine.
//!
//! - [`preflight`] walks a [`filler_graph::FillerGraph`] against a
//!   [`DataSource`] and produces a flat list of [`Action`]s.
//! - [`WebFiller`] replays an action list against a [`BrowserSession`],
//!   dispatching each action to an [`ActionHandler`] from a [`HandlerRegistry`].
//! - [`selector`] parses selector strings into typed [`Target`]s.
//! - [`retry`] supplies backoff policies for orchestrators built on top.

pub mod action;
pub mod data;
pub mod driver;
pub mod engine;
pub mod events;
pub mod fetch;
pub mod handler;
pub mod handlers;
pub mod hooks;
pub mod preflight;
pub mod retry;
pub mod selector;

pub use action::{load_actions, validate_actions, Action, Modifiers};
pub use data::{DataSource, JsonDataSource};
pub use driver::{BrowserSession, OptionChoice};
pub use engine::{EngineConfig, RunSummary, WebFiller};
pub use events::{EventEmitter, ProgressMessage, ProgressSink, ProgressUpdate};
pub use fetch::{HttpObjectFetcher, ObjectFetcher};
pub use handler::{default_registry, ActionEnv, ActionHandler, DynHandler, Flow, HandlerRegistry};
pub use hooks::{AutoContinue, BreakpointHook, ConsoleBreakpoint, OptionResolver, RecordingBreakpoint};
pub use preflight::{preflight, Linearizer, PreflightOptions};
pub use retry::{execute_with_retry, BackoffPolicy};
pub use selector::{Query, Selector, Target};
