//! Graph validation: lint rules and diagnostics.
//!
//! Call [`validate`] for advisory diagnostics or [`validate_or_raise`] to fail
//! on the first `Error`-severity issue. Broken references are configuration
//! errors and must be caught before a browser session is opened.

use std::collections::{HashMap, HashSet};

use crate::graph::{FillerGraph, NodeId};
use crate::kind::ActionKind;
use crate::transition::TransitionLabel;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub node_id: Option<NodeId>,
    pub transition: Option<(NodeId, NodeId)>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Diagnostic {
    fn error(rule: &str, node_id: Option<NodeId>, message: String) -> Self {
        Self {
            rule: rule.into(),
            severity: Severity::Error,
            message,
            node_id,
            transition: None,
            fix: None,
        }
    }

    fn warning(rule: &str, node_id: Option<NodeId>, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(rule, node_id, message)
        }
    }

    fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, graph: &FillerGraph) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct EntranceNodeRule;
impl LintRule for EntranceNodeRule {
    fn name(&self) -> &str { "entrance_node" }
    fn apply(&self, graph: &FillerGraph) -> Vec<Diagnostic> {
        let entrances: Vec<_> = graph.nodes().filter(|n| n.is_entrance).collect();
        match entrances.len() {
            1 => vec![],
            0 => vec![Diagnostic::error(self.name(), None, "Graph has no entrance node".into())
                .with_fix("Set is_entrance=true on the first node")],
            n => vec![Diagnostic::error(
                self.name(),
                None,
                format!(
                    "Graph has {n} entrance nodes: {}; expected exactly one",
                    entrances.iter().map(|e| e.id.to_string()).collect::<Vec<_>>().join(", ")
                ),
            )
            .with_fix("Clear is_entrance on all but one node")],
        }
    }
}

struct TransitionTargetRule;
impl LintRule for TransitionTargetRule {
    fn name(&self) -> &str { "transition_target" }
    fn apply(&self, graph: &FillerGraph) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for node in graph.nodes() {
            for t in &node.transitions {
                if t.source != node.id {
                    out.push(Diagnostic {
                        transition: Some((t.source, t.target)),
                        ..Diagnostic::error(
                            self.name(),
                            Some(node.id),
                            format!(
                                "Transition {t} is stored on node {} but names {} as its source",
                                node.id, t.source
                            ),
                        )
                    });
                }
                if graph.node(t.target).is_none() {
                    out.push(Diagnostic {
                        transition: Some((t.source, t.target)),
                        ..Diagnostic::error(
                            self.name(),
                            Some(node.id),
                            format!("Transition {t} targets missing node {}", t.target),
                        )
                    });
                }
            }
        }
        out
    }
}

struct GroupExitRule;
impl LintRule for GroupExitRule {
    fn name(&self) -> &str { "group_exit" }
    fn apply(&self, graph: &FillerGraph) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for node in graph.nodes().filter(|n| n.action == Some(ActionKind::Group)) {
            match node.option.as_deref() {
                Some(exit) if graph.node_by_name(exit).is_some() => {}
                Some(exit) => out.push(Diagnostic::error(
                    self.name(),
                    Some(node.id),
                    format!("Group '{}' names exit node '{exit}', which does not exist", node.name),
                )),
                None => out.push(
                    Diagnostic::error(
                        self.name(),
                        Some(node.id),
                        format!("Group '{}' has no exit node in its option", node.name),
                    )
                    .with_fix("Set option to the name of the first node after the loop"),
                ),
            }
            if node.transitions.is_empty() {
                out.push(Diagnostic::error(
                    self.name(),
                    Some(node.id),
                    format!("Group '{}' has no transition into its loop body", node.name),
                ));
            }
        }
        out
    }
}

struct BranchFallbackRule;
impl LintRule for BranchFallbackRule {
    fn name(&self) -> &str { "branch_fallback" }
    fn apply(&self, graph: &FillerGraph) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for node in graph.nodes() {
            if let Some(fallback) = node.fallback.as_deref() {
                if graph.node_by_name(fallback).is_none() {
                    out.push(Diagnostic::error(
                        self.name(),
                        Some(node.id),
                        format!("Node '{}' falls back to missing node '{fallback}'", node.name),
                    ));
                }
                if !node.is_optional {
                    out.push(Diagnostic::warning(
                        self.name(),
                        Some(node.id),
                        format!("Node '{}' has a fallback but is not optional; it is never used", node.name),
                    ));
                }
            }
            if node.action == Some(ActionKind::Branch) && node.transitions.is_empty() {
                out.push(Diagnostic::warning(
                    self.name(),
                    Some(node.id),
                    format!("Branch '{}' has no transitions", node.name),
                ));
            }
        }
        out
    }
}

struct WildcardCountRule;
impl LintRule for WildcardCountRule {
    fn name(&self) -> &str { "wildcard_count" }
    fn apply(&self, graph: &FillerGraph) -> Vec<Diagnostic> {
        graph
            .nodes()
            .filter(|n| {
                n.transitions
                    .iter()
                    .filter(|t| t.label == TransitionLabel::Wildcard)
                    .count()
                    > 1
            })
            .map(|n| {
                Diagnostic::warning(
                    self.name(),
                    Some(n.id),
                    format!("Node '{}' has more than one wildcard transition; only the first is used", n.name),
                )
            })
            .collect()
    }
}

struct DataKeyRule;
impl LintRule for DataKeyRule {
    fn name(&self) -> &str { "data_key" }
    fn apply(&self, graph: &FillerGraph) -> Vec<Diagnostic> {
        graph
            .nodes()
            .filter(|n| !n.skip)
            .filter_map(|n| n.action.map(|kind| (n, kind)))
            .filter(|(n, kind)| {
                let needs_data = kind.is_structural() || !kind.is_value_independent();
                needs_data && n.data.is_none()
            })
            .map(|(n, kind)| {
                Diagnostic::warning(
                    self.name(),
                    Some(n.id),
                    format!("Node '{}' ({kind}) has no data key or literal value", n.name),
                )
                .with_fix("Set data to the key this node reads")
            })
            .collect()
    }
}

struct UniqueNameRule;
impl LintRule for UniqueNameRule {
    fn name(&self) -> &str { "unique_name" }
    fn apply(&self, graph: &FillerGraph) -> Vec<Diagnostic> {
        // Exits, fallbacks and jumps are resolved by name, first match wins.
        let mut seen: HashMap<String, NodeId> = HashMap::new();
        let mut reported = HashSet::new();
        let mut out = Vec::new();
        for node in graph.nodes().filter(|n| !n.name.is_empty()) {
            let key = node.name.to_ascii_lowercase();
            match seen.get(&key) {
                Some(first) if reported.insert(key.clone()) => out.push(Diagnostic::warning(
                    self.name(),
                    Some(node.id),
                    format!("Node name '{}' is used by nodes {first} and {}", node.name, node.id),
                )),
                Some(_) => {}
                None => {
                    seen.insert(key, node.id);
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules and return collected diagnostics.
pub fn validate(graph: &FillerGraph) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(EntranceNodeRule),
        Box::new(TransitionTargetRule),
        Box::new(GroupExitRule),
        Box::new(BranchFallbackRule),
        Box::new(WildcardCountRule),
        Box::new(DataKeyRule),
        Box::new(UniqueNameRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(graph));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(graph: &FillerGraph) -> filler_types::Result<Vec<Diagnostic>> {
    let diagnostics = validate(graph);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(filler_types::FillerError::InvalidGraph(errors.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
