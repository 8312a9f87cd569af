//! Handlers that put data into form controls.

use std::path::PathBuf;

use async_trait::async_trait;
use filler_graph::ActionKind;
use filler_types::{FillerError, Result};
use serde_json::Value;

use super::yes_no_text;
use crate::action::{value_text, Action};
use crate::driver::OptionChoice;
use crate::fetch::is_remote;
use crate::handler::{ActionEnv, ActionHandler, Flow};
use crate::selector::{Query, Target};

// ---------------------------------------------------------------------------
// fill / fill_date
// ---------------------------------------------------------------------------

/// Sets a field's value; option `type` types one key at a time instead.
pub struct FillHandler;

#[async_trait]
impl ActionHandler for FillHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Fill
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let target = env.locate(action.selector_str(), &Value::Null).await?;
        let text = action.value_text();
        if action.has_option("type") {
            tracing::debug!(selector = %target, "Typing sequentially");
            env.session
                .type_text(&target, &text, env.config.type_delay())
                .await?;
        } else {
            env.session.fill(&target, &text).await?;
        }
        Ok(Flow::Continue)
    }
}

/// Option `us` fills directly; otherwise click, type, and confirm with Enter.
pub struct FillDateHandler;

#[async_trait]
impl ActionHandler for FillDateHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::FillDate
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let target = env.locate(action.selector_str(), &Value::Null).await?;
        let text = action.value_text();
        if action.has_option("us") {
            env.session.fill(&target, &text).await?;
        } else {
            env.session.click(&target, false).await?;
            env.session.keyboard_type(&text).await?;
            env.session.press("Enter").await?;
        }
        Ok(Flow::Continue)
    }
}

// ---------------------------------------------------------------------------
// select / match_select
// ---------------------------------------------------------------------------

pub struct SelectHandler;

#[async_trait]
impl ActionHandler for SelectHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Select
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let target = env.locate(action.selector_str(), &Value::Null).await?;
        let text = yes_no_text(&action.value);
        let choice = if action.option_str().contains("label") {
            OptionChoice::Label(text)
        } else {
            OptionChoice::Value(text)
        };
        env.session.select_option(&target, &choice).await?;
        Ok(Flow::Continue)
    }
}

/// Picks the first option whose label contains the value (ignoring case),
/// then asks the resolver, then gives up.
pub struct MatchSelectHandler;

#[async_trait]
impl ActionHandler for MatchSelectHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::MatchSelect
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let target = env.locate(action.selector_str(), &Value::Null).await?;
        let wanted = action.value_text();
        let needle = wanted.to_lowercase();
        let labels = env.session.option_labels(&target).await?;

        if let Some(label) = labels.iter().find(|l| l.to_lowercase().contains(&needle)) {
            env.session
                .select_option(&target, &OptionChoice::Label(label.clone()))
                .await?;
            return Ok(Flow::Continue);
        }
        if let Some(resolver) = env.resolver {
            if let Some(value) = resolver.resolve(&wanted, &labels).await? {
                tracing::info!(wanted = %wanted, picked = %value, "Option chosen by resolver");
                env.session
                    .select_option(&target, &OptionChoice::Value(value))
                    .await?;
                return Ok(Flow::Continue);
            }
        }
        Err(FillerError::OptionNotFound {
            wanted,
            available: labels,
        })
    }
}

// ---------------------------------------------------------------------------
// check / group_checkbox
// ---------------------------------------------------------------------------

/// Ticks a checkbox or radio.
///
/// Options: `name` finds the label following `input[name=<selector>]` whose
/// text is the value; `iname` puts the lowercased value into the selector's
/// `{}`. Without a value the selector is checked as-is.
pub struct CheckHandler;

#[async_trait]
impl ActionHandler for CheckHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Check
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let data = yes_no_text(&action.value);
        let selector = action.selector_str();
        let target = if data.is_empty() {
            env.locate(selector, &Value::Null).await?
        } else if action.option_str() == "name" {
            Target {
                query: Query::Css {
                    css: format!("input[name=\"{selector}\"] + label"),
                    has_text: Some(data),
                },
                nth: None,
            }
        } else if action.option_str() == "iname" {
            Target::parse(&selector.replacen("{}", &data.to_lowercase(), 1))?
        } else {
            env.locate(selector, &Value::String(data)).await?
        };
        env.session.check(&target).await?;
        Ok(Flow::Continue)
    }
}

/// Ticks the input with the value inside the fieldset whose legend contains
/// the selector text. Option `multiple` targets checkboxes, otherwise radios.
pub struct GroupCheckboxHandler;

pub(crate) fn fieldset_input(legend: &str, input_type: &str, value: &str) -> Target {
    Target::xpath(format!(
        "//fieldset[legend/span[@class=\"field-name\" and contains(text(), \"{legend}\")]]//input[@type=\"{input_type}\"][@value=\"{value}\"]"
    ))
}

#[async_trait]
impl ActionHandler for GroupCheckboxHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::GroupCheckbox
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let input_type = if action.has_option("multiple") { "checkbox" } else { "radio" };
        let target = fieldset_input(action.selector_str(), input_type, &yes_no_text(&action.value));
        env.session.check(&target).await?;
        Ok(Flow::Continue)
    }
}

// ---------------------------------------------------------------------------
// question_answer
// ---------------------------------------------------------------------------

/// Reads the question rendered at the option's selector and fills the answer
/// of every `{question, answer}` pair whose question it contains.
pub struct QuestionAnswerHandler;

#[async_trait]
impl ActionHandler for QuestionAnswerHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::QuestionAnswer
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let question_at = env.locate(action.option_str(), &Value::Null).await?;
        let question = env.session.inner_text(&question_at).await?;
        let pairs = action.value.as_array().map(Vec::as_slice).unwrap_or_default();

        for pair in pairs {
            let (Some(q), Some(a)) = (pair.get("question"), pair.get("answer")) else {
                continue;
            };
            let q = value_text(q);
            if !q.is_empty() && question.contains(&q) {
                let answer_at = env.locate(action.selector_str(), &Value::Null).await?;
                env.session.fill(&answer_at, &value_text(a)).await?;
            }
        }
        Ok(Flow::Continue)
    }
}

// ---------------------------------------------------------------------------
// upload
// ---------------------------------------------------------------------------

/// Attaches files. The value is a path, a remote URI, an object with a
/// `path`, or an array of those. Remote objects are downloaded first.
pub struct UploadHandler;

impl UploadHandler {
    async fn local_path(source: &Value, env: &ActionEnv<'_>) -> Result<PathBuf> {
        let uri = match source {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("path").and_then(Value::as_str).ok_or_else(|| FillerError::InvalidValue {
                action: "upload".into(),
                message: "object has no path".into(),
            })?,
            other => {
                return Err(FillerError::InvalidValue {
                    action: "upload".into(),
                    message: format!("cannot upload {other}"),
                })
            }
        };
        if is_remote(uri) {
            env.fetcher.fetch_to(uri, &env.config.upload_dir()).await
        } else {
            Ok(PathBuf::from(uri))
        }
    }
}

#[async_trait]
impl ActionHandler for UploadHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Upload
    }

    async fn execute(&self, action: &Action, env: &ActionEnv<'_>) -> Result<Flow> {
        let sources: Vec<&Value> = match &action.value {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        if sources.is_empty() {
            tracing::debug!(name = %action.name, "Nothing to upload");
            return Ok(Flow::Continue);
        }
        let mut files = Vec::with_capacity(sources.len());
        for source in sources {
            files.push(Self::local_path(source, env).await?);
        }
        let target = env.locate(action.selector_str(), &Value::Null).await?;
        env.session.set_input_files(&target, &files).await?;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fieldset_xpath_shape() {
        let t = fieldset_input("Languages", "checkbox", "French");
        assert_eq!(
            t.query,
            Query::XPath(
                "//fieldset[legend/span[@class=\"field-name\" and contains(text(), \"Languages\")]]//input[@type=\"checkbox\"][@value=\"French\"]".into()
            )
        );
    }
}
