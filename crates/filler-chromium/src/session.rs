use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use filler_engine::{BrowserSession, OptionChoice, Target};
use filler_types::{FillerError, Result};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ChromiumConfig;
use crate::script::{expression, marked_selector, JsQuery, Op, Reply, DISMISS_DIALOGS};

fn driver(e: impl std::fmt::Display) -> FillerError {
    FillerError::Driver(e.to_string())
}

/// One browser with one page.
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    config: ChromiumConfig,
}

impl ChromiumSession {
    pub async fn launch(config: ChromiumConfig) -> Result<Self> {
        let (browser, mut events) = Browser::launch(config.browser_config()?)
            .await
            .map_err(|e| FillerError::Driver(format!("failed to launch browser: {e}")))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "Browser event loop stopped");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(driver)?;
        let dismiss = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(DISMISS_DIALOGS)
            .build()
            .map_err(driver)?;
        page.evaluate_on_new_document(dismiss).await.map_err(driver)?;
        tracing::info!(headless = config.headless, "Browser launched");

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
            config,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn close(self) -> Result<()> {
        let mut browser = self.browser.into_inner();
        let closed = browser.close().await.map(|_| ()).map_err(driver);
        self.handler.abort();
        tracing::info!("Browser closed");
        closed
    }

    async fn eval(&self, expr: String) -> Result<Value> {
        let params = EvaluateParams::builder()
            .expression(expr)
            .return_by_value(true)
            .build()
            .map_err(driver)?;
        let result = self.page.evaluate_expression(params).await.map_err(driver)?;
        result.into_value::<Value>().map_err(driver)
    }

    async fn query(&self, query: &JsQuery, op: Op, arg: Value) -> Result<Reply> {
        let value = self.eval(expression(query, op, &arg)).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// Run `op` on `target`, polling until it resolves or the timeout passes.
    async fn on(&self, target: &Target, op: Op, arg: Value) -> Result<Value> {
        let query = JsQuery::from(target);
        let deadline = tokio::time::Instant::now() + self.config.timeout();
        loop {
            let reply = self.query(&query, op, arg.clone()).await?;
            if reply.found {
                return Ok(reply.value);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FillerError::ElementNotFound {
                    selector: target.to_string(),
                });
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Tag the target and hand back a native element for CDP input.
    async fn element(&self, target: &Target) -> Result<Element> {
        self.on(target, Op::Mark, Value::Null).await?;
        self.page.find_element(marked_selector()).await.map_err(driver)
    }

    async fn focused(&self) -> Result<Element> {
        let reply = self.query(&JsQuery::Focused, Op::Mark, Value::Null).await?;
        if !reply.found {
            return Err(driver("no focused element"));
        }
        self.page.find_element(marked_selector()).await.map_err(driver)
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&self, url: &str) -> Result<()> {
        tracing::debug!(url, "Navigating");
        self.page.goto(url).await.map_err(driver)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await.map_err(driver)?.unwrap_or_default())
    }

    async fn go_back(&self) -> Result<()> {
        self.eval("history.back()".into()).await?;
        self.page.wait_for_navigation().await.map_err(driver)?;
        Ok(())
    }

    async fn wait_for_idle(&self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.config.timeout();
        loop {
            let state = self.eval("document.readyState".into()).await?;
            if state == "complete" {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FillerError::Timeout {
                    what: "page load".into(),
                    timeout_ms: self.config.timeout_ms,
                });
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn count(&self, target: &Target) -> Result<usize> {
        let reply = self.query(&JsQuery::from(target), Op::Count, Value::Null).await?;
        Ok(reply.value.as_u64().unwrap_or(0) as usize)
    }

    async fn is_visible(&self, target: &Target) -> Result<bool> {
        let reply = self.query(&JsQuery::from(target), Op::Visible, Value::Null).await?;
        Ok(reply.found && reply.value.as_bool().unwrap_or(false))
    }

    async fn is_disabled(&self, target: &Target) -> Result<bool> {
        let value = self.on(target, Op::Disabled, Value::Null).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn wait_visible(&self, target: &Target, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_visible(target).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FillerError::Timeout {
                    what: target.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn click(&self, target: &Target, force: bool) -> Result<()> {
        if force {
            self.on(target, Op::ForceClick, Value::Null).await?;
        } else {
            self.element(target).await?.click().await.map_err(driver)?;
        }
        Ok(())
    }

    async fn fill(&self, target: &Target, text: &str) -> Result<()> {
        self.on(target, Op::Fill, json!(text)).await?;
        Ok(())
    }

    async fn type_text(&self, target: &Target, text: &str, delay: Duration) -> Result<()> {
        let element = self.element(target).await?;
        element.focus().await.map_err(driver)?;
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            element.type_str(ch.encode_utf8(&mut buf)).await.map_err(driver)?;
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        self.focused().await?.press_key(key).await.map_err(driver)?;
        Ok(())
    }

    async fn keyboard_type(&self, text: &str) -> Result<()> {
        self.focused().await?.type_str(text).await.map_err(driver)?;
        Ok(())
    }

    async fn select_option(&self, target: &Target, choice: &OptionChoice) -> Result<()> {
        let by = match choice {
            OptionChoice::Value(_) => "value",
            OptionChoice::Label(_) => "label",
        };
        let selected = self
            .on(target, Op::Select, json!({"by": by, "text": choice.text()}))
            .await?;
        if selected.as_bool() == Some(true) {
            return Ok(());
        }
        let available = self.option_labels(target).await?;
        Err(FillerError::OptionNotFound {
            wanted: choice.text().to_string(),
            available,
        })
    }

    async fn option_labels(&self, target: &Target) -> Result<Vec<String>> {
        let value = self.on(target, Op::Labels, Value::Null).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn check(&self, target: &Target) -> Result<()> {
        let checked = self.on(target, Op::Checked, Value::Null).await?;
        if checked.as_bool() == Some(true) {
            return Ok(());
        }
        self.element(target).await?.click().await.map_err(driver)?;
        Ok(())
    }

    async fn inner_text(&self, target: &Target) -> Result<String> {
        let value = self.on(target, Op::Text, Value::Null).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, target: &Target, name: &str) -> Result<Option<String>> {
        let value = self.on(target, Op::Attribute, json!(name)).await?;
        Ok(value.as_str().map(String::from))
    }

    async fn set_input_files(&self, target: &Target, files: &[PathBuf]) -> Result<()> {
        let element = self.element(target).await?;
        let files: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        let params = SetFileInputFilesParams::builder()
            .files(files)
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(driver)?;
        self.page.execute(params).await.map_err(driver)?;
        Ok(())
    }

    async fn scroll_into_view(&self, target: &Target) -> Result<()> {
        self.on(target, Op::Scroll, Value::Null).await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page.save_screenshot(params, path).await.map_err(driver)?;
        Ok(())
    }
}
