//! The closed set of operations a node or action can perform.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Fill,
    FillDate,
    Select,
    MatchSelect,
    Check,
    #[serde(alias = "fieldset_check")]
    GroupCheckbox,
    #[serde(alias = "navigate")]
    Goto,
    #[serde(alias = "get")]
    Read,
    #[serde(alias = "qa")]
    QuestionAnswer,
    Pause,
    Upload,
    Wait,
    Keyboard,
    BatchClick,
    #[serde(alias = "lmia_finalize")]
    Finalize,
    /// Structural: picks a transition from a fetched discriminator.
    Branch,
    /// Structural: repeats a loop body once per item of a fetched collection.
    Group,
}

impl ActionKind {
    pub const ALL: [ActionKind; 18] = [
        ActionKind::Click,
        ActionKind::Fill,
        ActionKind::FillDate,
        ActionKind::Select,
        ActionKind::MatchSelect,
        ActionKind::Check,
        ActionKind::GroupCheckbox,
        ActionKind::Goto,
        ActionKind::Read,
        ActionKind::QuestionAnswer,
        ActionKind::Pause,
        ActionKind::Upload,
        ActionKind::Wait,
        ActionKind::Keyboard,
        ActionKind::BatchClick,
        ActionKind::Finalize,
        ActionKind::Branch,
        ActionKind::Group,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Fill => "fill",
            ActionKind::FillDate => "fill_date",
            ActionKind::Select => "select",
            ActionKind::MatchSelect => "match_select",
            ActionKind::Check => "check",
            ActionKind::GroupCheckbox => "group_checkbox",
            ActionKind::Goto => "goto",
            ActionKind::Read => "read",
            ActionKind::QuestionAnswer => "question_answer",
            ActionKind::Pause => "pause",
            ActionKind::Upload => "upload",
            ActionKind::Wait => "wait",
            ActionKind::Keyboard => "keyboard",
            ActionKind::BatchClick => "batch_click",
            ActionKind::Finalize => "finalize",
            ActionKind::Branch => "branch",
            ActionKind::Group => "group",
        }
    }

    /// Kinds that run without a data value, so a missing value is never an error.
    pub fn is_value_independent(&self) -> bool {
        matches!(
            self,
            ActionKind::Check
                | ActionKind::Click
                | ActionKind::Read
                | ActionKind::Pause
                | ActionKind::Finalize
                | ActionKind::Goto
                | ActionKind::Wait
                | ActionKind::BatchClick
        )
    }

    /// Branch and group nodes steer the walk and never become actions.
    pub fn is_structural(&self) -> bool {
        matches!(self, ActionKind::Branch | ActionKind::Group)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown action kind '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_aliases_deserialize() {
        let cases = [
            ("\"fieldset_check\"", ActionKind::GroupCheckbox),
            ("\"navigate\"", ActionKind::Goto),
            ("\"get\"", ActionKind::Read),
            ("\"qa\"", ActionKind::QuestionAnswer),
            ("\"lmia_finalize\"", ActionKind::Finalize),
        ];
        for (json, expected) in cases {
            let kind: ActionKind = serde_json::from_str(json).unwrap();
            assert_eq!(kind, expected, "alias {json}");
        }
    }

    #[test]
    fn as_str_matches_serialized_name() {
        for kind in ActionKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn from_str_accepts_aliases_and_rejects_unknown() {
        assert_eq!("get".parse::<ActionKind>().unwrap(), ActionKind::Read);
        assert!("teleport".parse::<ActionKind>().is_err());
    }

    #[test]
    fn value_independent_allow_list() {
        let exempt: Vec<_> = ActionKind::ALL
            .iter()
            .filter(|k| k.is_value_independent())
            .map(|k| k.as_str())
            .collect();
        assert_eq!(
            exempt,
            vec!["click", "check", "goto", "read", "pause", "wait", "batch_click", "finalize"]
        );
    }
}
