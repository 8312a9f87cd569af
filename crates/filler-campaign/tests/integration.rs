use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use filler_campaign::{
    CampaignConfig, CampaignRunner, CampaignSink, CampaignState, CandidateRow, Credentials,
    JobOutcome, JobPost, PortalAccount, PortalSession,
};
use filler_engine::BackoffPolicy;
use filler_types::{FillerError, Result, RunStatus};

// ---------------------------------------------------------------------------
// FakePortal: scripted pages of candidates per job
// ---------------------------------------------------------------------------

type Page = Vec<(f64, bool)>;

#[derive(Default)]
struct FakePortal {
    /// Pages of `(score, invited)` per job id. Inviting a row marks it.
    jobs: Mutex<HashMap<String, Vec<Page>>>,
    login_error: Option<String>,
    /// Errors returned by successive invite calls before they succeed.
    invite_errors: Mutex<VecDeque<FillerError>>,
    current: Mutex<Option<(String, usize)>>,
    calls: Mutex<Vec<String>>,
}

impl FakePortal {
    fn job(self, id: &str, pages: Vec<Page>) -> Self {
        self.jobs.lock().unwrap().insert(id.into(), pages);
        self
    }

    fn login_fails(mut self, message: &str) -> Self {
        self.login_error = Some(message.into());
        self
    }

    fn invite_fails_with(self, errors: Vec<FillerError>) -> Self {
        *self.invite_errors.lock().unwrap() = errors.into();
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PortalSession for FakePortal {
    async fn login(&self, credentials: &Credentials) -> Result<()> {
        self.record(format!("login {}", credentials.username));
        match &self.login_error {
            Some(message) => Err(FillerError::Portal(message.clone())),
            None => Ok(()),
        }
    }

    async fn open_job(&self, job_id: &str, items_per_page: u32) -> Result<()> {
        self.record(format!("open {job_id} {items_per_page}"));
        if !self.jobs.lock().unwrap().contains_key(job_id) {
            return Err(FillerError::JobNotFound {
                job_id: job_id.into(),
            });
        }
        *self.current.lock().unwrap() = Some((job_id.to_string(), 0));
        Ok(())
    }

    async fn sort_by_score(&self) -> Result<()> {
        self.record("sort".into());
        Ok(())
    }

    async fn rows(&self) -> Result<Vec<CandidateRow>> {
        let current = self.current.lock().unwrap().clone();
        let Some((job, page)) = current else {
            return Ok(Vec::new());
        };
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs[&job][page]
            .iter()
            .enumerate()
            .map(|(index, &(score, invited))| CandidateRow {
                index,
                score,
                invited,
            })
            .collect())
    }

    async fn has_next_page(&self) -> Result<bool> {
        let current = self.current.lock().unwrap().clone();
        let jobs = self.jobs.lock().unwrap();
        Ok(current.is_some_and(|(job, page)| page + 1 < jobs[&job].len()))
    }

    async fn next_page(&self) -> Result<()> {
        self.record("next".into());
        if let Some((_, page)) = self.current.lock().unwrap().as_mut() {
            *page += 1;
        }
        Ok(())
    }

    async fn invite(&self, row: &CandidateRow) -> Result<()> {
        self.record(format!("invite {}", row.index));
        if let Some(err) = self.invite_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let current = self.current.lock().unwrap().clone();
        if let Some((job, page)) = current {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(cell) = jobs.get_mut(&job).and_then(|p| p[page].get_mut(row.index)) {
                cell.1 = true;
            }
        }
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.record("logout".into());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
    /// `(row, total)` for every examined candidate.
    candidates: Mutex<Vec<(usize, usize)>>,
}

impl CampaignSink for RecordingSink {
    fn job_started(&self, index: usize, total: usize, job_post_id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("job {index}/{total} {job_post_id}"));
    }

    fn candidate(&self, row: usize, total: usize) {
        self.candidates.lock().unwrap().push((row, total));
    }

    fn invited(&self, job_post_id: &str, invited: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("invited {job_post_id} {invited}"));
    }

    fn job_finished(&self, job_post_id: &str, invited: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {job_post_id} {invited}"));
    }
}

fn config(jobs: &[(&str, f64)]) -> CampaignConfig {
    CampaignConfig {
        portal: PortalAccount {
            email: Some("hr@example.test".into()),
            password: Some("secret".into()),
            ..Default::default()
        },
        jobs: jobs
            .iter()
            .map(|(id, stars)| JobPost {
                job_post_id: id.to_string(),
                minimum_stars: *stars,
            })
            .collect(),
        backoff: BackoffPolicy::None,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

// 1. Invites qualifying rows across pages, skipping already-invited ones
#[tokio::test]
async fn invites_across_pages() {
    let portal = FakePortal::default().job(
        "100",
        vec![
            vec![(5.0, true), (4.5, false)],
            vec![(4.0, false), (3.0, false)],
        ],
    );
    let sink = RecordingSink::default();
    let config = config(&[("100", 4.0)]);
    let mut runner = CampaignRunner::new(&portal, &config).sink(&sink);
    let report = runner.run(&config).await.unwrap();

    assert_eq!(report.jobs[0].invited, 2);
    assert_eq!(report.jobs[0].outcome, JobOutcome::Invited);
    assert_eq!(report.status(), RunStatus::Success);
    assert_eq!(runner.state(), CampaignState::Done);
    assert_eq!(
        portal.calls(),
        [
            "login hr@example.test",
            "open 100 100",
            "sort",
            "invite 1",
            "next",
            "invite 0",
            "logout"
        ]
    );
    assert_eq!(
        *sink.events.lock().unwrap(),
        ["job 0/1 100", "invited 100 1", "invited 100 2", "done 100 2"]
    );
    // Each scan restarts on the current page; rows are one-based.
    assert_eq!(
        *sink.candidates.lock().unwrap(),
        [(1, 2), (2, 2), (1, 2), (2, 2), (1, 2), (1, 2), (2, 2)]
    );
}

// 2. The first below-threshold row ends the search without paging
#[tokio::test]
async fn stops_at_first_row_below_threshold() {
    let portal = FakePortal::default().job("7", vec![vec![(3.5, false)], vec![(5.0, false)]]);
    let config = config(&[("7", 4.0)]);
    let report = CampaignRunner::new(&portal, &config).run(&config).await.unwrap();

    assert_eq!(report.no_candidates(), ["7"]);
    assert_eq!(portal.count("next"), 0);
    assert_eq!(portal.count("invite"), 0);
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

// 3. A transient failure followed by success records no error
#[tokio::test]
async fn transient_invite_failure_is_retried() {
    let portal = FakePortal::default()
        .job("1", vec![vec![(5.0, false)]])
        .invite_fails_with(vec![FillerError::Timeout {
            what: "input:has-text(\"Invite to apply\")".into(),
            timeout_ms: 100,
        }]);
    let config = config(&[("1", 4.0)]);
    let report = CampaignRunner::new(&portal, &config).run(&config).await.unwrap();

    assert!(report.errors.is_empty());
    assert_eq!(report.jobs[0].invited, 1);
    assert_eq!(portal.count("invite"), 2);
}

// 4. A permanent failure is attempted once and recorded once
#[tokio::test]
async fn permanent_invite_failure_is_not_retried() {
    let portal = FakePortal::default()
        .job("1", vec![vec![(5.0, false)]])
        .invite_fails_with(vec![FillerError::Portal("HTTP Error 404 - Not Found".into())]);
    let config = config(&[("1", 4.0)]);
    let report = CampaignRunner::new(&portal, &config).run(&config).await.unwrap();

    assert_eq!(portal.count("invite"), 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Invitation error:"));
    assert_eq!(report.status(), RunStatus::Failed);
}

// 5. Rejected credentials mid-job are permanent: one attempt, job failed
#[tokio::test]
async fn credential_rejection_is_not_retried() {
    let portal = FakePortal::default()
        .job("1", vec![vec![(5.0, false), (4.5, false)]])
        .invite_fails_with(vec![FillerError::Portal("Password or username is incorrect".into())]);
    let config = config(&[("1", 4.0)]);
    let report = CampaignRunner::new(&portal, &config).run(&config).await.unwrap();

    assert_eq!(portal.count("invite"), 1);
    assert_eq!(report.failed(), ["1"]);
    assert_eq!(
        report.errors,
        ["Invitation error: Password or username is incorrect"]
    );
}

// 6. Transient failures that outlast the attempts fail the job
#[tokio::test]
async fn exhausted_retries_fail_the_job() {
    let transient = || FillerError::Driver("connection reset".into());
    let portal = FakePortal::default()
        .job("1", vec![vec![(5.0, false)]])
        .invite_fails_with(vec![transient(), transient(), transient()]);
    let config = config(&[("1", 4.0)]);
    let report = CampaignRunner::new(&portal, &config).run(&config).await.unwrap();

    assert_eq!(portal.count("invite"), 2);
    assert_eq!(report.failed(), ["1"]);
}

// ---------------------------------------------------------------------------
// Failures around jobs
// ---------------------------------------------------------------------------

// 7. A missing job is skipped and the campaign moves on
#[tokio::test]
async fn missing_job_is_skipped() {
    let portal = FakePortal::default().job("2", vec![vec![(5.0, false)]]);
    let config = config(&[("404", 4.0), ("2", 4.0)]);
    let report = CampaignRunner::new(&portal, &config).run(&config).await.unwrap();

    assert_eq!(report.failed(), ["404"]);
    assert!(report.errors[0].contains("Job post 404 not found"));
    assert_eq!(report.successful(), ["2"]);
    assert_eq!(report.status(), RunStatus::PartialSuccess);
}

// 8. A login failure fails every job and never opens one
#[tokio::test]
async fn login_failure_fails_all_jobs() {
    let portal = FakePortal::default()
        .job("1", vec![vec![(5.0, false)]])
        .login_fails("Password or username is incorrect");
    let config = config(&[("1", 4.0), ("2", 3.0)]);
    let report = CampaignRunner::new(&portal, &config).run(&config).await.unwrap();

    assert_eq!(report.failed(), ["1", "2"]);
    assert_eq!(report.errors[0], "Failed to login: Password or username is incorrect");
    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(portal.calls(), ["login hr@example.test"]);
}

// 9. Missing credentials stop the campaign before the portal is touched
#[tokio::test]
async fn missing_credentials_touch_nothing() {
    let portal = FakePortal::default();
    let mut config = config(&[("1", 4.0)]);
    config.portal.password = None;
    let err = CampaignRunner::new(&portal, &config).run(&config).await.unwrap_err();

    assert!(matches!(err, FillerError::MissingCredentials(_)));
    assert!(portal.calls().is_empty());
}

// 10. Campaign files load from disk with the portal's field names
#[test]
fn campaign_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("campaign.json");
    std::fs::write(
        &path,
        r#"{
            "jobbank_portal": {"username": "hr", "password": "pw"},
            "jobs": [{"jobPostId": "55", "minimumStars": 4.5}],
            "backoff": {"kind": "fixed", "delay": 250}
        }"#,
    )
    .unwrap();
    let config = CampaignConfig::load(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.jobs[0].job_post_id, "55");
    assert_eq!(
        config.backoff,
        BackoffPolicy::Fixed {
            delay: std::time::Duration::from_millis(250)
        }
    );
}
