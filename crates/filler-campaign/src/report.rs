use filler_types::RunStatus;
use serde::Serialize;

/// How one job post ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// At least one invitation went out.
    Invited,
    /// Nobody qualified.
    NoCandidates,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_post_id: String,
    pub invited: usize,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

/// Summary of a whole campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CampaignReport {
    pub jobs: Vec<JobResult>,
    pub errors: Vec<String>,
}

impl CampaignReport {
    pub fn record(&mut self, job_post_id: &str, invited: usize, outcome: JobOutcome) {
        if let JobOutcome::Failed { error } = &outcome {
            self.errors.push(error.clone());
        }
        self.jobs.push(JobResult {
            job_post_id: job_post_id.to_string(),
            invited,
            outcome,
        });
    }

    pub fn total_invited(&self) -> usize {
        self.jobs.iter().map(|j| j.invited).sum()
    }

    fn bucket(&self, pred: impl Fn(&JobOutcome) -> bool) -> Vec<&str> {
        self.jobs
            .iter()
            .filter(|j| pred(&j.outcome))
            .map(|j| j.job_post_id.as_str())
            .collect()
    }

    pub fn successful(&self) -> Vec<&str> {
        self.bucket(|o| matches!(o, JobOutcome::Invited))
    }

    pub fn no_candidates(&self) -> Vec<&str> {
        self.bucket(|o| matches!(o, JobOutcome::NoCandidates))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.bucket(|o| matches!(o, JobOutcome::Failed { .. }))
    }

    /// Jobs that finished without error count as succeeded.
    pub fn status(&self) -> RunStatus {
        RunStatus::from_counts(self.jobs.len() - self.failed().len(), self.jobs.len())
    }

    /// One line per bucket, for logs and the CLI.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Campaign {:?}: {} invitation(s) across {} job post(s)",
            self.status(),
            self.total_invited(),
            self.jobs.len()
        )];
        let successful = self.successful();
        if !successful.is_empty() {
            lines.push(format!("Invited: {}", successful.join(", ")));
        }
        let none = self.no_candidates();
        if !none.is_empty() {
            lines.push(format!("No qualifying candidates: {}", none.join(", ")));
        }
        let failed = self.failed();
        if !failed.is_empty() {
            lines.push(format!("Failed: {}", failed.join(", ")));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_and_status() {
        let mut report = CampaignReport::default();
        report.record("1", 3, JobOutcome::Invited);
        report.record("2", 0, JobOutcome::NoCandidates);
        report.record(
            "3",
            1,
            JobOutcome::Failed {
                error: "timed out".into(),
            },
        );
        assert_eq!(report.successful(), ["1"]);
        assert_eq!(report.no_candidates(), ["2"]);
        assert_eq!(report.failed(), ["3"]);
        assert_eq!(report.errors, ["timed out"]);
        assert_eq!(report.total_invited(), 4);
        assert_eq!(report.status(), RunStatus::PartialSuccess);
        assert!(report.summary().contains("Failed: 3"));
    }

    #[test]
    fn empty_campaign_succeeds() {
        assert_eq!(CampaignReport::default().status(), RunStatus::Success);
    }

    #[test]
    fn job_result_serializes_flat() {
        let mut report = CampaignReport::default();
        report.record("9", 0, JobOutcome::Failed { error: "x".into() });
        let json = serde_json::to_value(&report.jobs[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"job_post_id": "9", "invited": 0, "outcome": "failed", "error": "x"})
        );
    }
}
