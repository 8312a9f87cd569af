//! The employer portal seam and its Job Bank implementation.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use filler_engine::{BrowserSession, OptionChoice, Target};
use filler_types::{FillerError, Result};
use rand::Rng;
use regex::Regex;

use crate::config::{CampaignConfig, Credentials};

/// One line of a job's candidate list.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRow {
    /// Zero-based position on the current page.
    pub index: usize,
    /// Match score out of 5.
    pub score: f64,
    pub invited: bool,
}

/// Score from text such as `"4.5 out of 5"`; 0 when absent.
pub fn parse_score(text: &str) -> f64 {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?) out of 5").unwrap());
    re.captures(text)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0.0)
}

#[async_trait]
pub trait PortalSession: Send + Sync {
    /// Sign in and answer the security question.
    async fn login(&self, credentials: &Credentials) -> Result<()>;
    /// Open a job's candidate dashboard. Fails with `JobNotFound` when the
    /// post is missing or pending review.
    async fn open_job(&self, job_id: &str, items_per_page: u32) -> Result<()>;
    /// Order candidates by score, highest first.
    async fn sort_by_score(&self) -> Result<()>;
    /// Candidate rows on the current page, in display order.
    async fn rows(&self) -> Result<Vec<CandidateRow>>;
    async fn has_next_page(&self) -> Result<bool>;
    async fn next_page(&self) -> Result<()>;
    /// Open the row's profile, send the invitation, and return to the list.
    async fn invite(&self, row: &CandidateRow) -> Result<()>;
    async fn logout(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// BrowserPortal
// ---------------------------------------------------------------------------

const ROWS: &str = "#matchlistpanel tbody tr";
const NOT_INVITED: &str = "Not invited to apply";

/// Which of the awaited markers showed up first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Error,
}

/// Drives the Job Bank employer site through a [`BrowserSession`].
pub struct BrowserPortal<S> {
    session: S,
    base_url: String,
    timeout: Duration,
    pace: (u64, u64),
    poll: Duration,
}

impl<S: BrowserSession> BrowserPortal<S> {
    pub fn new(session: S, config: &CampaignConfig) -> Self {
        Self {
            session,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            pace: (config.pace_min_ms, config.pace_max_ms),
            poll: Duration::from_millis(250),
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// A human-looking pause between interactions.
    async fn pace(&self, what: &str) {
        let (min, max) = self.pace;
        let ms = if max > min { rand::thread_rng().gen_range(min..=max) } else { min };
        tracing::debug!(what, ms, "Pacing");
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn target(selector: &str) -> Result<Target> {
        Target::parse(selector)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.session.click(&Self::target(selector)?, false).await
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        self.session.fill(&Self::target(selector)?, text).await
    }

    async fn present(&self, selector: &str) -> Result<bool> {
        Ok(self.session.count(&Self::target(selector)?).await? > 0)
    }

    /// Wait for one of the markers. Error markers win when both show up.
    async fn outcome(&self, success: &str, errors: &[&str]) -> Result<Outcome> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            for error in errors {
                if self.present(error).await? {
                    tracing::debug!(marker = error, "Error marker present");
                    return Ok(Outcome::Error);
                }
            }
            if self.present(success).await? {
                return Ok(Outcome::Success);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FillerError::Timeout {
                    what: success.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll).await;
        }
    }

    fn cell(index: usize, column: usize) -> Target {
        Target::css(format!("{ROWS}:nth-child({}) td:nth-child({column})", index + 1))
    }
}

#[async_trait]
impl<S: BrowserSession> PortalSession for BrowserPortal<S> {
    async fn login(&self, credentials: &Credentials) -> Result<()> {
        tracing::info!("Logging in to Job Bank");
        self.session.goto(&format!("{}/employer/", self.base_url)).await?;
        self.fill(r#"input[name="loginForm:input-email"]"#, &credentials.username)
            .await?;
        self.pace("after username").await;
        self.fill(r#"input[name="loginForm:input-password"]"#, &credentials.password)
            .await?;
        self.pace("after password").await;
        self.click(r#"button:has-text("Sign in")"#).await?;
        self.pace("after sign in").await;

        if self.outcome("span.field-name", &["span.error"]).await? == Outcome::Error {
            return Err(FillerError::Portal("Password or username is incorrect".into()));
        }

        let question = self
            .session
            .inner_text(&Self::target("span.field-name")?)
            .await?;
        let answer = credentials.answer_for(&question).ok_or_else(|| {
            FillerError::Portal(format!("No answer found for security question: {}", question.trim()))
        })?;
        self.fill(r#"input[name="securityForm:input-security-answer"]"#, answer)
            .await?;
        self.pace("after security answer").await;
        self.click(r#"button:has-text("Continue")"#).await?;

        if self
            .outcome(r#"h2.wb-inv:has-text("Account menu")"#, &["span.error"])
            .await?
            == Outcome::Error
        {
            return Err(FillerError::Portal(
                "Security question answer is incorrect. Please check your RCIC account in settings.".into(),
            ));
        }
        if self.present(r#"h1:text("Session expired")"#).await? {
            return Err(FillerError::Portal("Session expired".into()));
        }
        self.session
            .wait_visible(&Self::target(r#"//span[text()="View advertised jobs"]"#)?, self.timeout)
            .await?;

        let close = Self::target(r#"input[value="Close"]"#)?;
        if self.session.count(&close).await? > 0 {
            self.pace("close modal").await;
            self.session.click(&close, false).await?;
        }
        tracing::info!("Logged in to Job Bank");
        Ok(())
    }

    async fn open_job(&self, job_id: &str, items_per_page: u32) -> Result<()> {
        tracing::info!(job_id, "Opening job post");
        self.pace("before job post").await;
        let url = format!("{}/employer/match/dashboard/{job_id}", self.base_url);
        self.session.goto(&url).await?;
        self.pace("after job post").await;
        self.session.wait_for_idle().await?;

        let landed = self.session.current_url().await?;
        let outcome = self
            .outcome(
                r#"a.app-name:text("Job Bank")"#,
                &[
                    r#"h1:text("HTTP Error 404 - Not Found")"#,
                    r#"span.objectStatus.stateNeutral:text("Job posting pending review")"#,
                ],
            )
            .await?;
        if outcome == Outcome::Error || !landed.contains(&format!("/match/dashboard/{job_id}")) {
            return Err(FillerError::JobNotFound {
                job_id: job_id.to_string(),
            });
        }

        self.session
            .select_option(
                &Self::target(r#"select[name="matchlistpanel_length"]"#)?,
                &OptionChoice::Value(items_per_page.to_string()),
            )
            .await?;
        self.session.wait_for_idle().await
    }

    async fn sort_by_score(&self) -> Result<()> {
        let header = Self::target(r#"//span[text()="Score"]"#)?;
        // Ascending on the first click, descending on the second.
        self.session.click(&header, false).await?;
        self.session.click(&header, false).await?;
        tracing::debug!("Candidates sorted by score, descending");
        Ok(())
    }

    async fn rows(&self) -> Result<Vec<CandidateRow>> {
        let rows = Target::css(ROWS);
        self.session.wait_visible(&rows, self.timeout).await?;
        let count = self.session.count(&rows).await?;
        let mut out = Vec::with_capacity(count);
        for index in 0..count {
            let score = self.session.inner_text(&Self::cell(index, 3)).await?;
            let invited = self.session.inner_text(&Self::cell(index, 9)).await?;
            out.push(CandidateRow {
                index,
                score: parse_score(&score),
                invited: invited.trim() != NOT_INVITED,
            });
        }
        Ok(out)
    }

    async fn has_next_page(&self) -> Result<bool> {
        self.session.is_visible(&Target::css("#matchlistpanel_next")).await
    }

    async fn next_page(&self) -> Result<()> {
        self.click("#matchlistpanel_next").await?;
        self.session.wait_for_idle().await
    }

    async fn invite(&self, row: &CandidateRow) -> Result<()> {
        let profile = Self::cell(row.index, 1);
        if self.session.count(&profile).await? == 0 {
            // An earlier attempt stopped on the candidate's profile.
            tracing::debug!(row = row.index + 1, "Candidate list not showing, going back");
            self.session.go_back().await?;
            self.session.wait_for_idle().await?;
        }
        self.session.click(&profile, false).await?;
        let invite = Self::target(r#"input:has-text("Invite to apply")"#)?;
        self.session.scroll_into_view(&invite).await?;
        self.session.click(&invite, false).await?;
        self.session.go_back().await?;
        self.session.wait_for_idle().await
    }

    async fn logout(&self) -> Result<()> {
        self.click(r#"(//button[@class="btn dropdown-toggle"])[1]"#).await?;
        self.click(r#"get_by_role("link", name="Sign out")"#).await?;
        self.session.wait_for_idle().await?;
        tracing::info!("Logged out of Job Bank");
        Ok(())
    }
}
