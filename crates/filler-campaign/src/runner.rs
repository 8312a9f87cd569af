//! The campaign state machine.
//!
//! `LoggedOut → LoggingIn → (Navigating → Scanning → Inviting)* → LoggingOut
//! → Done`. Login happens once. A job that cannot be opened is recorded as
//! failed and the next one starts; an invitation that still fails after its
//! retries ends that job.

use std::fmt;

use filler_engine::{execute_with_retry, BackoffPolicy};
use filler_types::{FillerError, Result};

use crate::config::{CampaignConfig, JobPost};
use crate::portal::{CandidateRow, PortalSession};
use crate::report::{CampaignReport, JobOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignState {
    LoggedOut,
    LoggingIn,
    Navigating,
    Scanning,
    Inviting,
    LoggingOut,
    Done,
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CampaignState::LoggedOut => "logged_out",
            CampaignState::LoggingIn => "logging_in",
            CampaignState::Navigating => "navigating",
            CampaignState::Scanning => "scanning",
            CampaignState::Inviting => "inviting",
            CampaignState::LoggingOut => "logging_out",
            CampaignState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Progress callbacks. Every method defaults to doing nothing.
pub trait CampaignSink: Send + Sync {
    /// A job post is about to start. `index` is zero-based.
    fn job_started(&self, _index: usize, _total: usize, _job_post_id: &str) {}
    /// A candidate row is being examined. `row` is one-based.
    fn candidate(&self, _row: usize, _total: usize) {}
    /// An invitation went out; `invited` counts this job so far.
    fn invited(&self, _job_post_id: &str, _invited: usize) {}
    fn job_finished(&self, _job_post_id: &str, _invited: usize) {}
}

pub struct NoopSink;

impl CampaignSink for NoopSink {}

pub struct CampaignRunner<'a> {
    portal: &'a dyn PortalSession,
    sink: &'a dyn CampaignSink,
    items_per_page: u32,
    invite_retries: usize,
    backoff: BackoffPolicy,
    state: CampaignState,
}

impl<'a> CampaignRunner<'a> {
    pub fn new(portal: &'a dyn PortalSession, config: &CampaignConfig) -> Self {
        Self {
            portal,
            sink: &NoopSink,
            items_per_page: config.items_per_page,
            invite_retries: config.invite_attempts.saturating_sub(1),
            backoff: config.backoff.clone(),
            state: CampaignState::LoggedOut,
        }
    }

    pub fn sink(mut self, sink: &'a dyn CampaignSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn state(&self) -> CampaignState {
        self.state
    }

    fn enter(&mut self, state: CampaignState) {
        tracing::debug!(from = %self.state, to = %state, "Campaign state");
        self.state = state;
    }

    /// Run every job in `config`. Credentials are checked before the portal
    /// is touched.
    pub async fn run(&mut self, config: &CampaignConfig) -> Result<CampaignReport> {
        config.validate()?;
        let credentials = config.credentials()?;
        let mut report = CampaignReport::default();
        let total = config.jobs.len();

        self.enter(CampaignState::LoggingIn);
        if let Err(e) = self.portal.login(&credentials).await {
            tracing::error!(error = %e, "Login failed");
            let message = format!("Failed to login: {e}");
            for job in &config.jobs {
                report.record(&job.job_post_id, 0, JobOutcome::Failed { error: message.clone() });
            }
            self.enter(CampaignState::Done);
            return Ok(report);
        }

        for (index, job) in config.jobs.iter().enumerate() {
            tracing::info!(job_post_id = %job.job_post_id, job = index + 1, total, "Processing job post");
            self.sink.job_started(index, total, &job.job_post_id);
            let (invited, outcome) = self.job(job).await;
            tracing::info!(job_post_id = %job.job_post_id, invited, "Job post finished");
            self.sink.job_finished(&job.job_post_id, invited);
            report.record(&job.job_post_id, invited, outcome);
        }

        self.enter(CampaignState::LoggingOut);
        if let Err(e) = self.portal.logout().await {
            tracing::warn!(error = %e, "Logout failed");
        }
        self.enter(CampaignState::Done);
        tracing::info!(status = ?report.status(), invited = report.total_invited(), "Campaign complete");
        Ok(report)
    }

    /// Work one job post to completion. Returns the invitations sent and how
    /// the job ended.
    async fn job(&mut self, job: &JobPost) -> (usize, JobOutcome) {
        self.enter(CampaignState::Navigating);
        let opened = async {
            self.portal.open_job(&job.job_post_id, self.items_per_page).await?;
            self.portal.sort_by_score().await
        }
        .await;
        if let Err(e) = opened {
            if matches!(e, FillerError::JobNotFound { .. }) {
                tracing::warn!(job_post_id = %job.job_post_id, "Job post skipped");
            }
            return (0, JobOutcome::Failed { error: e.to_string() });
        }

        let mut invited = 0;
        loop {
            self.enter(CampaignState::Scanning);
            let row = match self.next_candidate(job.minimum_stars).await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return (invited, self.failure(invited, e)),
            };

            self.enter(CampaignState::Inviting);
            let portal = self.portal;
            let sent = execute_with_retry(
                || portal.invite(&row),
                self.invite_retries,
                &self.backoff,
                "invite",
            )
            .await;
            if let Err(e) = sent {
                tracing::error!(job_post_id = %job.job_post_id, row = row.index + 1, error = %e, "Invitation failed");
                return (invited, self.failure(invited, e));
            }
            invited += 1;
            tracing::info!(job_post_id = %job.job_post_id, invited, "Invitation sent");
            self.sink.invited(&job.job_post_id, invited);
        }

        let outcome = if invited > 0 {
            JobOutcome::Invited
        } else {
            JobOutcome::NoCandidates
        };
        (invited, outcome)
    }

    fn failure(&self, invited: usize, e: FillerError) -> JobOutcome {
        let error = if invited == 0 {
            format!("Invitation error: {e}")
        } else {
            format!("{e}, but have invited {invited} candidates already")
        };
        JobOutcome::Failed { error }
    }

    /// First uninvited row at or above `threshold`, paging forward. Rows are
    /// sorted by score, so the first row below the threshold ends the search.
    async fn next_candidate(&self, threshold: f64) -> Result<Option<CandidateRow>> {
        loop {
            let rows = self.portal.rows().await?;
            for row in &rows {
                self.sink.candidate(row.index + 1, rows.len());
                if row.score < threshold {
                    tracing::debug!(score = row.score, threshold, "Below threshold, stopping search");
                    return Ok(None);
                }
                if !row.invited {
                    return Ok(Some(row.clone()));
                }
            }
            if !self.portal.has_next_page().await? {
                return Ok(None);
            }
            tracing::debug!("Moving to next page");
            self.portal.next_page().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_display_snake_case() {
        assert_eq!(CampaignState::LoggingOut.to_string(), "logging_out");
        assert_eq!(CampaignState::Done.to_string(), "done");
    }

    #[test]
    fn failure_message_mentions_prior_invites() {
        struct Never;
        #[async_trait::async_trait]
        impl PortalSession for Never {
            async fn login(&self, _: &crate::Credentials) -> Result<()> {
                Ok(())
            }
            async fn open_job(&self, _: &str, _: u32) -> Result<()> {
                Ok(())
            }
            async fn sort_by_score(&self) -> Result<()> {
                Ok(())
            }
            async fn rows(&self) -> Result<Vec<CandidateRow>> {
                Ok(Vec::new())
            }
            async fn has_next_page(&self) -> Result<bool> {
                Ok(false)
            }
            async fn next_page(&self) -> Result<()> {
                Ok(())
            }
            async fn invite(&self, _: &CandidateRow) -> Result<()> {
                Ok(())
            }
            async fn logout(&self) -> Result<()> {
                Ok(())
            }
        }

        let portal = Never;
        let runner = CampaignRunner::new(&portal, &CampaignConfig::default());
        let e = || FillerError::Driver("reset".into());
        assert_eq!(
            runner.failure(0, e()),
            JobOutcome::Failed {
                error: "Invitation error: Browser driver error: reset".into()
            }
        );
        assert_eq!(
            runner.failure(2, e()),
            JobOutcome::Failed {
                error: "Browser driver error: reset, but have invited 2 candidates already".into()
            }
        );
        assert_eq!(runner.state(), CampaignState::LoggedOut);
    }
}
