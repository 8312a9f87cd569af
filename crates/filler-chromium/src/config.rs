use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::BrowserConfig;
use filler_types::{FillerError, Result};
use serde::{Deserialize, Serialize};

/// Browser launch settings. Durations are milliseconds on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromiumConfig {
    pub headless: bool,
    /// How long element operations wait for their target to appear.
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub no_sandbox: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    /// Chrome binary. Detected from the system when unset.
    pub executable: Option<PathBuf>,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_ms: 30_000,
            poll_interval_ms: 100,
            no_sandbox: false,
            window_width: 1366,
            window_height: 900,
            user_agent: None,
            executable: None,
        }
    }
}

impl ChromiumConfig {
    pub fn headed(mut self, headed: bool) -> Self {
        self.headless = !headed;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    /// Extra command-line switches passed to Chrome.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--disable-background-networking".to_string(),
            "--disable-default-apps".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-extensions".to_string(),
            "--disable-popup-blocking".to_string(),
            "--disable-sync".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--password-store=basic".to_string(),
        ];
        if let Some(agent) = &self.user_agent {
            args.push(format!("--user-agent={agent}"));
        }
        args
    }

    pub(crate) fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.timeout())
            .window_size(self.window_width, self.window_height)
            .args(self.args());
        if !self.headless {
            builder = builder.with_head();
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| FillerError::Driver(format!("browser config error: {e}")))
    }
}
