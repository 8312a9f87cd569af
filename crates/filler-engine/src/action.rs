//! Concrete action records, the unit of work replayed by the engine.

use std::path::Path;

use filler_graph::ActionKind;
use filler_types::{FillerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One resolved step: `[name, kind, selector, option, value]` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ActionTuple", into = "ActionTuple")]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    pub selector: Option<String>,
    pub option: Option<String>,
    pub value: Value,
}

type ActionTuple = (String, ActionKind, Option<String>, Option<String>, Value);

impl From<ActionTuple> for Action {
    fn from((name, kind, selector, option, value): ActionTuple) -> Self {
        Self {
            name,
            kind,
            selector,
            option,
            value,
        }
    }
}

impl From<Action> for ActionTuple {
    fn from(a: Action) -> Self {
        (a.name, a.kind, a.selector, a.option, a.value)
    }
}

impl Action {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            selector: None,
            option: None,
            value: Value::Null,
        }
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.option = Some(option.into());
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn selector_str(&self) -> &str {
        self.selector.as_deref().unwrap_or("")
    }

    pub fn option_str(&self) -> &str {
        self.option.as_deref().unwrap_or("")
    }

    /// The value as plain text: strings unquoted, null as empty.
    pub fn value_text(&self) -> String {
        value_text(&self.value)
    }

    /// True when the comma/space separated option contains `token`.
    pub fn has_option(&self, token: &str) -> bool {
        option_tokens(self.option_str()).any(|t| t == token)
    }

    pub fn modifiers(&self) -> Modifiers {
        Modifiers::from_option(self.option_str())
    }
}

pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn option_tokens(option: &str) -> impl Iterator<Item = &str> {
    option
        .split(|c: char| c == ',' || c == '|' || c.is_whitespace())
        .filter(|t| !t.is_empty())
}

/// Engine-level behaviors requested through the option string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Skip without error when the element reports disabled.
    pub skip_disabled: bool,
    /// Skip without error when the element is absent after a grace period.
    pub skip_absent: bool,
    /// Sleep briefly after the action succeeds.
    pub post_pause: bool,
}

impl Modifiers {
    pub fn from_option(option: &str) -> Self {
        Self {
            skip_disabled: option.contains("skip_disabled"),
            skip_absent: option.contains("skip_nonexist") || option.contains("skip_absent"),
            post_pause: option_tokens(option).any(|t| t == "post_pause"),
        }
    }
}

// ---------------------------------------------------------------------------
// Prebuilt action lists
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum ActionFile {
    List(Vec<Action>),
    Form { actions: Vec<Action> },
}

/// Load a prebuilt action list: either a bare array of 5-tuples or an
/// object with an `actions` array.
pub fn load_actions(path: &Path) -> Result<Vec<Action>> {
    let json = std::fs::read_to_string(path)?;
    let file: ActionFile = serde_json::from_str(&json)?;
    Ok(match file {
        ActionFile::List(actions) | ActionFile::Form { actions } => actions,
    })
}

/// Structural problems with a prebuilt list, one message per problem.
pub fn validate_actions(actions: &[Action]) -> Vec<String> {
    if actions.is_empty() {
        return vec!["Action list must contain at least one action".into()];
    }
    actions
        .iter()
        .enumerate()
        .filter(|(_, a)| {
            let selector_optional = matches!(
                a.kind,
                ActionKind::Pause | ActionKind::Keyboard | ActionKind::Finalize
            );
            !selector_optional && a.selector_str().trim().is_empty()
        })
        .map(|(i, a)| format!("Action {} ({}): missing selector", i + 1, a.name))
        .chain(
            actions
                .iter()
                .enumerate()
                .filter(|(_, a)| a.kind.is_structural())
                .map(|(i, a)| {
                    format!("Action {} ({}): {} cannot be executed", i + 1, a.name, a.kind)
                }),
        )
        .collect()
}

/// Fail with every structural problem at once.
pub fn ensure_runnable(actions: &[Action]) -> Result<()> {
    let problems = validate_actions(actions);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(FillerError::Other(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_as_five_tuple() {
        let action = Action::new("FillName", ActionKind::Fill)
            .selector("#name")
            .value("Ada");
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!(["FillName", "fill", "#name", null, "Ada"])
        );
    }

    #[test]
    fn legacy_kind_names_load() {
        let action: Action =
            serde_json::from_value(json!(["Capture", "get", "url", "case_id=https://x/{}", null])).unwrap();
        assert_eq!(action.kind, ActionKind::Read);
        assert_eq!(action.option_str(), "case_id=https://x/{}");
    }

    #[test]
    fn modifiers_parse_from_option() {
        let m = Modifiers::from_option("skip_nonexist,post_pause");
        assert!(m.skip_absent);
        assert!(m.post_pause);
        assert!(!m.skip_disabled);
        assert_eq!(Modifiers::from_option(""), Modifiers::default());
    }

    #[test]
    fn has_option_matches_whole_tokens() {
        let a = Action::new("c", ActionKind::Click).option("force, post_pause");
        assert!(a.has_option("force"));
        assert!(!a.has_option("for"));
    }

    #[test]
    fn load_actions_accepts_both_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("bare.json");
        std::fs::write(&bare, r#"[["Go", "goto", "https://example.test", null, null]]"#).unwrap();
        assert_eq!(load_actions(&bare).unwrap().len(), 1);

        let form = dir.path().join("form.json");
        std::fs::write(
            &form,
            r#"{"name": "Test", "actions": [["Go", "goto", "https://example.test", null, null], ["Wait", "pause", null, null, 2]]}"#,
        )
        .unwrap();
        let actions = load_actions(&form).unwrap();
        assert_eq!(actions[1].kind, ActionKind::Pause);
        assert_eq!(actions[1].value, json!(2));
    }

    #[test]
    fn validate_actions_reports_every_problem() {
        let actions = vec![
            Action::new("Go", ActionKind::Goto),
            Action::new("Wait", ActionKind::Pause).value(2),
            Action::new("Click", ActionKind::Click),
            Action::new("Loop", ActionKind::Group).selector("#x"),
        ];
        let problems = validate_actions(&actions);
        assert_eq!(problems.len(), 3, "{problems:?}");
        assert!(problems[0].starts_with("Action 1 (Go)"));
        assert!(ensure_runnable(&actions).is_err());
        assert_eq!(validate_actions(&[]).len(), 1);
    }
}
