//! Drives the LMIA submission wizard to its last page and records the
//! summary URL under `summary_url`.

use async_trait::async_trait;
use filler_graph::ActionKind;
use filler_types::{FillerError, Result};
use serde_json::Value;

use crate::action::Action;
use crate::handler::{ActionEnv, ActionHandler, Flow};
use crate::selector::{Query, Target};

pub struct FinalizeHandler;

/// `(employer_id, application_id)` from the wizard's edit link: the third and
/// sixth `/`-separated segments of its path.
pub(crate) fn ids_from_edit_link(href: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = href.split('/').collect();
    match (parts.get(2), parts.get(5)) {
        (Some(employer), Some(application)) if !employer.is_empty() && !application.is_empty() => {
            Some((*employer, *application))
        }
        _ => None,
    }
}

#[async_trait]
impl ActionHandler for FinalizeHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Finalize
    }

    async fn execute(&self, _action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let base = env.config.finalize_base_url.trim_end_matches('/');
        tokio::time::sleep(env.config.finalize_settle()).await;

        let edit = Target {
            query: Query::Css {
                css: "a".into(),
                has_text: Some("Edit".into()),
            },
            nth: Some(-1),
        };
        let href = env
            .session
            .attribute(&edit, "href")
            .await?
            .ok_or_else(|| FillerError::ElementNotFound {
                selector: edit.to_string(),
            })?;
        let (employer, application) = ids_from_edit_link(&href).ok_or_else(|| FillerError::InvalidValue {
            action: "finalize".into(),
            message: format!("unexpected edit link {href}"),
        })?;
        tracing::info!(employer, application, "Finalizing application");

        env.session.goto(&format!("{base}{href}")).await?;
        let next = Target::css("#next");
        let limit = env.config.max_finalize_pages;
        let mut pages = 0;
        loop {
            tokio::time::sleep(env.config.finalize_settle()).await;
            if env.session.is_disabled(&next).await? {
                break;
            }
            if pages == limit {
                return Err(FillerError::Other(format!(
                    "{next} still enabled after {limit} pages"
                )));
            }
            env.session.click(&next, false).await?;
            pages += 1;
        }
        tracing::debug!(pages, "Reached the last wizard page");

        let summary = format!("{base}/Employer/{employer}/Application/{application}/Summary");
        env.context.set("summary_url", Value::String(summary)).await;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_link_ids() {
        assert_eq!(
            ids_from_edit_link("/Employer/E77/Lmia/Application/A99/Edit"),
            Some(("E77", "A99"))
        );
        assert_eq!(ids_from_edit_link("/Employer"), None);
    }
}
