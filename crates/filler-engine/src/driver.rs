//! The browser seam. Handlers only talk to a page through [`BrowserSession`];
//! `filler-chromium` implements it over CDP and tests use an in-memory fake.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use filler_types::Result;

use crate::selector::Target;

/// How a `<select>` option is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionChoice {
    /// Match the option's `value` attribute.
    Value(String),
    /// Match the option's visible label.
    Label(String),
}

impl OptionChoice {
    pub fn text(&self) -> &str {
        match self {
            OptionChoice::Value(s) | OptionChoice::Label(s) => s,
        }
    }
}

/// A live page. Element methods resolve the target at call time and fail
/// with `ElementNotFound` when it matches nothing.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    async fn go_back(&self) -> Result<()>;
    /// Wait until the page has finished loading.
    async fn wait_for_idle(&self) -> Result<()>;

    async fn count(&self, target: &Target) -> Result<usize>;
    async fn is_visible(&self, target: &Target) -> Result<bool>;
    async fn is_disabled(&self, target: &Target) -> Result<bool>;
    /// Wait up to `timeout` for the target to become visible.
    async fn wait_visible(&self, target: &Target, timeout: Duration) -> Result<()>;

    async fn click(&self, target: &Target, force: bool) -> Result<()>;
    async fn fill(&self, target: &Target, text: &str) -> Result<()>;
    /// Type one character at a time with `delay` between keystrokes.
    async fn type_text(&self, target: &Target, text: &str, delay: Duration) -> Result<()>;
    /// Press a key on the focused element.
    async fn press(&self, key: &str) -> Result<()>;
    /// Type into the focused element.
    async fn keyboard_type(&self, text: &str) -> Result<()>;
    async fn select_option(&self, target: &Target, choice: &OptionChoice) -> Result<()>;
    /// Visible labels of a `<select>`'s options, in document order.
    async fn option_labels(&self, target: &Target) -> Result<Vec<String>>;
    async fn check(&self, target: &Target) -> Result<()>;
    async fn inner_text(&self, target: &Target) -> Result<String>;
    async fn attribute(&self, target: &Target, name: &str) -> Result<Option<String>>;
    async fn set_input_files(&self, target: &Target, files: &[PathBuf]) -> Result<()>;
    async fn scroll_into_view(&self, target: &Target) -> Result<()>;
    async fn screenshot(&self, path: &Path) -> Result<()>;
}
