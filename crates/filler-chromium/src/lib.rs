//! Chromium driver for the filler engine.
//!
//! [`ChromiumSession`] launches a browser through `chromiumoxide` and
//! implements [`filler_engine::BrowserSession`]. Targets are resolved in the
//! page by a small script that understands every [`filler_engine::Query`]
//! form; the chosen element is tagged so native CDP input can reach it.

pub mod config;
pub mod script;
pub mod session;

pub use config::ChromiumConfig;
pub use session::ChromiumSession;
