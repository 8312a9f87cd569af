use std::path::Path;
use std::time::Duration;

use filler_engine::BackoffPolicy;
use filler_types::{FillerError, Result};
use serde::{Deserialize, Serialize};

/// Portal login. Either `username` or `email` identifies the account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalAccount {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAnswer {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPost {
    #[serde(alias = "jobPostId")]
    pub job_post_id: String,
    /// Minimum score, out of 5, a candidate needs to be invited.
    #[serde(alias = "minimumStars")]
    pub minimum_stars: f64,
}

/// Validated login material handed to the portal.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub security_answers: Vec<SecurityAnswer>,
}

impl Credentials {
    /// The answer whose question equals `question` exactly.
    pub fn answer_for(&self, question: &str) -> Option<&str> {
        let question = question.trim();
        self.security_answers
            .iter()
            .find(|qa| qa.question.trim() == question)
            .map(|qa| qa.answer.as_str())
    }
}

fn default_items_per_page() -> u32 {
    100
}

fn default_backoff() -> BackoffPolicy {
    BackoffPolicy::Jittered {
        min: Duration::from_secs(1),
        max: Duration::from_secs(5),
    }
}

/// A campaign file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    #[serde(alias = "jobbank_portal")]
    pub portal: PortalAccount,
    #[serde(alias = "jobbank_sqa")]
    pub security_answers: Vec<SecurityAnswer>,
    pub jobs: Vec<JobPost>,
    pub items_per_page: u32,
    pub headless: bool,
    pub timeout_ms: u64,
    /// Attempts per invitation, counting the first.
    pub invite_attempts: usize,
    pub backoff: BackoffPolicy,
    pub base_url: String,
    /// Bounds of the random pause between portal interactions.
    pub pace_min_ms: u64,
    pub pace_max_ms: u64,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            portal: PortalAccount::default(),
            security_answers: Vec::new(),
            jobs: Vec::new(),
            items_per_page: default_items_per_page(),
            headless: true,
            timeout_ms: 100_000,
            invite_attempts: 2,
            backoff: default_backoff(),
            base_url: "https://employer.jobbank.gc.ca".into(),
            pace_min_ms: 1_000,
            pace_max_ms: 5_000,
        }
    }
}

impl CampaignConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check the configuration before any browser work.
    pub fn credentials(&self) -> Result<Credentials> {
        let username = self
            .portal
            .username
            .as_deref()
            .or(self.portal.email.as_deref())
            .filter(|s| !s.trim().is_empty());
        let password = self.portal.password.as_deref().filter(|s| !s.is_empty());
        match (username, password) {
            (Some(username), Some(password)) => Ok(Credentials {
                username: username.to_string(),
                password: password.to_string(),
                security_answers: self.security_answers.clone(),
            }),
            _ => Err(FillerError::MissingCredentials("jobbank portal".into())),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.credentials()?;
        if self.items_per_page == 0 {
            return Err(FillerError::Other("items_per_page must be positive".into()));
        }
        if self.invite_attempts == 0 {
            return Err(FillerError::Other("invite_attempts must be at least 1".into()));
        }
        if let Some(job) = self.jobs.iter().find(|j| j.job_post_id.trim().is_empty()) {
            return Err(FillerError::Other(format!(
                "job post with threshold {} has no id",
                job.minimum_stars
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_field_names_are_accepted() {
        let config: CampaignConfig = serde_json::from_str(
            r#"{
                "jobbank_portal": {"email": "hr@example.test", "password": "pw"},
                "jobbank_sqa": [{"question": "First pet?", "answer": "Rex"}],
                "jobs": [{"jobPostId": "123", "minimumStars": 4}]
            }"#,
        )
        .unwrap();
        let creds = config.credentials().unwrap();
        assert_eq!(creds.username, "hr@example.test");
        assert_eq!(creds.answer_for(" First pet? "), Some("Rex"));
        assert_eq!(config.jobs[0].minimum_stars, 4.0);
        assert_eq!(config.items_per_page, 100);
        assert_eq!(config.invite_attempts, 2);
    }

    #[test]
    fn missing_password_is_rejected() {
        let config = CampaignConfig {
            portal: PortalAccount {
                username: Some("hr".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, FillerError::MissingCredentials(_)));
        assert_eq!(err.to_string(), "Missing jobbank portal credentials");
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let config = CampaignConfig {
            portal: PortalAccount {
                username: Some("hr".into()),
                password: Some("pw".into()),
                ..Default::default()
            },
            invite_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn answers_match_whole_question() {
        let creds = Credentials {
            username: "u".into(),
            password: "p".into(),
            security_answers: vec![SecurityAnswer {
                question: "City of birth?".into(),
                answer: "Oslo".into(),
            }],
        };
        assert_eq!(creds.answer_for("City?"), None);
    }
}
