//! Labeled transitions and the pure `advance` step.
//!
//! From a node, the next node is chosen by a short cascade: no transitions
//! means the walk is over, a single transition is taken unconditionally, and
//! otherwise an exact label match wins over a wildcard. Anything else is a
//! dead end that the caller must decide how to report.

use std::fmt;

use serde_json::Value;

use crate::graph::{FillerGraph, NodeId};

/// The condition under which a transition is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionLabel {
    /// Empty or null label: the unconditional exit.
    Always,
    /// `*`: taken when no exact label matches.
    Wildcard,
    /// A concrete stringified value.
    Exact(String),
}

impl TransitionLabel {
    /// Read a label from the third slot of a document transition triple.
    pub fn from_value(value: &Value) -> Self {
        match label_for_value(value) {
            None => TransitionLabel::Always,
            Some(s) if s.is_empty() => TransitionLabel::Always,
            Some(s) if s == "*" => TransitionLabel::Wildcard,
            Some(s) => TransitionLabel::Exact(s),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            TransitionLabel::Always => Value::Null,
            TransitionLabel::Wildcard => Value::String("*".into()),
            TransitionLabel::Exact(s) => Value::String(s.clone()),
        }
    }

    /// Exact labels compare ASCII case-insensitively so that legacy
    /// `True`/`False` labels match boolean data.
    fn matches(&self, label: Option<&str>) -> bool {
        match (self, label) {
            (TransitionLabel::Exact(expected), Some(actual)) => {
                expected.eq_ignore_ascii_case(actual)
            }
            (TransitionLabel::Always, None) => true,
            _ => false,
        }
    }
}

impl From<&str> for TransitionLabel {
    fn from(s: &str) -> Self {
        TransitionLabel::from_value(&Value::String(s.to_string()))
    }
}

/// A directed, labeled edge between two nodes of the same graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub source: NodeId,
    pub target: NodeId,
    pub label: TransitionLabel,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            TransitionLabel::Always => write!(f, "({} --> {})", self.source, self.target),
            TransitionLabel::Wildcard => write!(f, "({} --> * --> {})", self.source, self.target),
            TransitionLabel::Exact(v) => write!(f, "({} --> {} --> {})", self.source, v, self.target),
        }
    }
}

/// Stringify a data value for use as a transition label.
///
/// Null yields `None`; booleans become `true`/`false`; numbers use their
/// decimal form; arrays and objects use compact JSON.
pub fn label_for_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Resolve the node that follows `current` for the given label.
///
/// Returns `None` when `current` is absent, has no transitions, or has
/// several transitions none of which match.
pub fn advance(graph: &FillerGraph, current: NodeId, label: Option<&str>) -> Option<NodeId> {
    let node = graph.node(current)?;
    match node.transitions.as_slice() {
        [] => None,
        [only] => Some(only.target),
        many => many
            .iter()
            .find(|t| t.label.matches(label))
            .or_else(|| many.iter().find(|t| t.label == TransitionLabel::Wildcard))
            .map(|t| t.target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeSpec;

    fn branching_graph() -> (FillerGraph, NodeId, NodeId, NodeId) {
        let mut g = FillerGraph::new();
        let a = g.add_node(NodeSpec::named("Question").entrance());
        let x = g.add_node(NodeSpec::named("X"));
        let y = g.add_node(NodeSpec::named("Y"));
        g.add_transition(a, x, "A").unwrap();
        g.add_transition(a, y, "*").unwrap();
        (g, a, x, y)
    }

    // 1. Exact label wins
    #[test]
    fn exact_label_selects_matching_target() {
        let (g, a, x, _) = branching_graph();
        assert_eq!(advance(&g, a, Some("A")), Some(x));
    }

    // 2. Wildcard catches everything else
    #[test]
    fn wildcard_catches_unmatched_label() {
        let (g, a, _, y) = branching_graph();
        assert_eq!(advance(&g, a, Some("B")), Some(y));
        assert_eq!(advance(&g, a, None), Some(y));
    }

    // 3. Resolution is deterministic across repeated calls
    #[test]
    fn resolution_is_deterministic() {
        let (g, a, x, y) = branching_graph();
        for _ in 0..10 {
            assert_eq!(advance(&g, a, Some("A")), Some(x));
            assert_eq!(advance(&g, a, Some("B")), Some(y));
        }
    }

    // 4. Zero transitions always terminate
    #[test]
    fn terminal_node_returns_none_for_any_label() {
        let (g, _, x, _) = branching_graph();
        assert_eq!(advance(&g, x, Some("A")), None);
        assert_eq!(advance(&g, x, None), None);
    }

    // 5. A single transition is followed regardless of label
    #[test]
    fn single_transition_is_unconditional() {
        let mut g = FillerGraph::new();
        let a = g.add_node(NodeSpec::named("A"));
        let b = g.add_node(NodeSpec::named("B"));
        g.add_transition(a, b, "True").unwrap();
        assert_eq!(advance(&g, a, Some("False")), Some(b));
        assert_eq!(advance(&g, a, None), Some(b));
    }

    // 6. Multiple exits and no match is a dead end
    #[test]
    fn dead_end_without_wildcard() {
        let mut g = FillerGraph::new();
        let a = g.add_node(NodeSpec::named("A"));
        let b = g.add_node(NodeSpec::named("B"));
        let c = g.add_node(NodeSpec::named("C"));
        g.add_transition(a, b, "yes").unwrap();
        g.add_transition(a, c, "no").unwrap();
        assert_eq!(advance(&g, a, Some("maybe")), None);
    }

    // 7. Legacy capitalized boolean labels match boolean data
    #[test]
    fn boolean_labels_match_case_insensitively() {
        let mut g = FillerGraph::new();
        let a = g.add_node(NodeSpec::named("A"));
        let t = g.add_node(NodeSpec::named("T"));
        let f = g.add_node(NodeSpec::named("F"));
        g.add_transition(a, t, "True").unwrap();
        g.add_transition(a, f, "False").unwrap();
        let label = label_for_value(&serde_json::json!(false));
        assert_eq!(advance(&g, a, label.as_deref()), Some(f));
    }

    #[test]
    fn label_from_value_variants() {
        assert_eq!(TransitionLabel::from_value(&Value::Null), TransitionLabel::Always);
        assert_eq!(TransitionLabel::from_value(&serde_json::json!("")), TransitionLabel::Always);
        assert_eq!(TransitionLabel::from_value(&serde_json::json!("*")), TransitionLabel::Wildcard);
        assert_eq!(
            TransitionLabel::from_value(&serde_json::json!(2)),
            TransitionLabel::Exact("2".into())
        );
    }

    #[test]
    fn display_formats_like_arrows() {
        let t = Transition {
            source: 1,
            target: 2,
            label: TransitionLabel::Exact("Yes".into()),
        };
        assert_eq!(t.to_string(), "(1 --> Yes --> 2)");
    }
}
