//! Invitation campaigns.
//!
//! A campaign logs in to an employer portal once, then for each job post
//! sorts the candidate list by score and invites every not-yet-invited
//! candidate at or above the job's threshold. The portal is reached through
//! [`PortalSession`]; [`BrowserPortal`] drives the Job Bank web UI over any
//! [`filler_engine::BrowserSession`].

pub mod config;
pub mod portal;
pub mod report;
pub mod runner;

pub use config::{CampaignConfig, Credentials, JobPost, PortalAccount, SecurityAnswer};
pub use portal::{parse_score, BrowserPortal, CandidateRow, PortalSession};
pub use report::{CampaignReport, JobOutcome, JobResult};
pub use runner::{CampaignRunner, CampaignSink, CampaignState, NoopSink};
