//! Preflight: turn a graph plus live data into a flat action list.
//!
//! The walk starts at the entrance node and follows transitions chosen by each
//! node's resolved value. Branch nodes only steer; group nodes replay their
//! loop body once per item of a fetched collection; every other node with an
//! action emits one [`Action`]. Missing required data is collected rather than
//! raised, and any collected field makes the whole run fail with
//! [`FillerError::InvalidFields`] and no actions.

use chrono::{DateTime, NaiveDate, Utc};
use filler_graph::{advance, label_for_value, ActionKind, FillerGraph, Node, NodeId};
use filler_types::{FillerError, InvalidField, Result};
use serde_json::Value;

use crate::action::{option_tokens, value_text, Action};
use crate::data::{lookup, DataSource};
use crate::selector::substitute;

pub const DEFAULT_MAX_STEPS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct PreflightOptions {
    /// Stop after emitting the node with this name, appending a pause.
    pub pause_at: Option<String>,
    /// Upper bound on visited nodes, so a cyclic graph fails instead of hanging.
    pub max_steps: usize,
}

impl Default for PreflightOptions {
    fn default() -> Self {
        Self {
            pause_at: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Linearize `graph` against `source` with the given options.
pub fn preflight(
    graph: &FillerGraph,
    source: &dyn DataSource,
    options: PreflightOptions,
) -> Result<Vec<Action>> {
    Linearizer::new(graph, source).options(options).run()
}

pub struct Linearizer<'a> {
    graph: &'a FillerGraph,
    source: &'a dyn DataSource,
    options: PreflightOptions,
}

impl<'a> Linearizer<'a> {
    pub fn new(graph: &'a FillerGraph, source: &'a dyn DataSource) -> Self {
        Self {
            graph,
            source,
            options: PreflightOptions::default(),
        }
    }

    pub fn options(mut self, options: PreflightOptions) -> Self {
        self.options = options;
        self
    }

    pub fn pause_at(mut self, name: impl Into<String>) -> Self {
        self.options.pause_at = Some(name.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.options.max_steps = max_steps;
        self
    }

    pub fn run(self) -> Result<Vec<Action>> {
        let entrance = self
            .graph
            .entrance()
            .ok_or_else(|| FillerError::InvalidGraph("graph has no entrance node".into()))?;

        let mut walk = Walk {
            graph: self.graph,
            source: self.source,
            options: &self.options,
            actions: Vec::new(),
            invalid: Vec::new(),
            steps: 0,
        };
        let end = walk.walk(Some(entrance.id), None, &Frame::Root)?;

        if !walk.invalid.is_empty() {
            tracing::warn!(
                invalid = walk.invalid.len(),
                discarded = walk.actions.len(),
                "Preflight found missing data"
            );
            return Err(FillerError::InvalidFields(walk.invalid));
        }
        tracing::info!(
            actions = walk.actions.len(),
            steps = walk.steps,
            paused = matches!(end, WalkEnd::Paused),
            "Preflight complete"
        );
        Ok(walk.actions)
    }
}

// ---------------------------------------------------------------------------
// Walk state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkEnd {
    /// The path ran out of transitions.
    Ended,
    /// The walk arrived at its stop node (a group's exit).
    Reached,
    /// A pause-at breakpoint was emitted.
    Paused,
    /// Unrecoverable missing data; the invalid list is non-empty.
    Aborted,
}

/// Where values come from: the data source, or one item of a group.
enum Frame<'f> {
    Root,
    Item {
        item: &'f Value,
        index: usize,
        count: usize,
        /// Prefix for invalid-field keys, e.g. `employees[2].`.
        prefix: String,
    },
}

impl Frame<'_> {
    fn prefix(&self) -> &str {
        match self {
            Frame::Root => "",
            Frame::Item { prefix, .. } => prefix,
        }
    }

    fn is_last_item(&self) -> bool {
        matches!(self, Frame::Item { index, count, .. } if index + 1 == *count)
    }
}

/// A node's value, or a marker that resolving it already recorded a problem.
enum Resolved {
    Value(Value),
    Failed,
}

struct Walk<'a> {
    graph: &'a FillerGraph,
    source: &'a dyn DataSource,
    options: &'a PreflightOptions,
    actions: Vec<Action>,
    invalid: Vec<InvalidField>,
    steps: usize,
}

impl Walk<'_> {
    fn walk(&mut self, start: Option<NodeId>, stop_at: Option<NodeId>, frame: &Frame<'_>) -> Result<WalkEnd> {
        let mut current = start;
        loop {
            let Some(id) = current else {
                return Ok(WalkEnd::Ended);
            };
            if Some(id) == stop_at {
                return Ok(WalkEnd::Reached);
            }
            self.steps += 1;
            if self.steps > self.options.max_steps {
                return Err(FillerError::StepLimitExceeded {
                    limit: self.options.max_steps,
                });
            }
            let graph = self.graph;
            let node = graph.node(id).ok_or(FillerError::UnknownNode { id })?;
            tracing::debug!(node = id, name = %node.name, "Preflight visiting node");

            let step = match node.action {
                Some(ActionKind::Branch) => self.branch(node, frame)?,
                Some(ActionKind::Group) => self.group(node, frame)?,
                _ => self.ordinary(node, frame)?,
            };
            match step {
                Step::Next(next) => current = next,
                Step::Stop(end) => return Ok(end),
            }
        }
    }

    fn branch(&mut self, node: &Node, frame: &Frame<'_>) -> Result<Step> {
        let value = match self.resolve(node, frame) {
            Resolved::Value(v) => v,
            Resolved::Failed => return Ok(Step::Stop(WalkEnd::Aborted)),
        };

        if is_empty(&value) {
            if node.is_optional {
                if let Some(fallback) = &node.fallback {
                    let target = self
                        .graph
                        .node_by_name(fallback)
                        .ok_or_else(|| FillerError::NodeNotFound {
                            name: fallback.clone(),
                        })?;
                    tracing::debug!(node = node.id, fallback = %target.name, "Branch value empty, taking fallback");
                    return Ok(Step::Next(Some(target.id)));
                }
                return Ok(self.pass_through(node, frame, true));
            }
            self.record(node, frame);
            return Ok(Step::Stop(WalkEnd::Aborted));
        }

        Ok(self.follow(node, &value, frame))
    }

    fn group(&mut self, node: &Node, frame: &Frame<'_>) -> Result<Step> {
        let graph = self.graph;
        let exit_name = node.option_str().trim();
        let exit = graph
            .node_by_name(exit_name)
            .ok_or_else(|| FillerError::NodeNotFound {
                name: exit_name.to_string(),
            })?;

        let value = match self.resolve(node, frame) {
            Resolved::Value(v) => v,
            Resolved::Failed => return Ok(Step::Next(Some(exit.id))),
        };
        let items: &[Value] = match &value {
            Value::Array(items) => items.as_slice(),
            Value::Null => &[],
            _ => {
                self.record(node, frame);
                return Ok(Step::Next(Some(exit.id)));
            }
        };
        let body = node.transitions.first().map(|t| t.target);
        let (Some(body), false) = (body, items.is_empty()) else {
            tracing::debug!(node = node.id, exit = %exit.name, "Group empty, jumping to exit");
            return Ok(Step::Next(Some(exit.id)));
        };

        let key = node.data_key().unwrap_or(&node.name);
        tracing::debug!(node = node.id, items = items.len(), "Expanding group");
        for (index, item) in items.iter().enumerate() {
            let item_frame = Frame::Item {
                item,
                index,
                count: items.len(),
                prefix: format!("{}{}[{}].", frame.prefix(), key, index),
            };
            match self.walk(Some(body), Some(exit.id), &item_frame)? {
                WalkEnd::Reached | WalkEnd::Ended => {}
                end @ (WalkEnd::Paused | WalkEnd::Aborted) => return Ok(Step::Stop(end)),
            }
        }
        Ok(Step::Next(Some(exit.id)))
    }

    fn ordinary(&mut self, node: &Node, frame: &Frame<'_>) -> Result<Step> {
        let value = match self.resolve(node, frame) {
            Resolved::Value(v) => normalize_date(v),
            Resolved::Failed => return Ok(self.pass_through(node, frame, false)),
        };

        let exempt = node.action.map_or(true, |k| k.is_value_independent());
        if is_empty(&value) && !exempt {
            if !node.is_optional {
                self.record(node, frame);
            }
            if let Some(step) = self.pause_here(node) {
                return Ok(step);
            }
            return Ok(self.pass_through(node, frame, node.is_optional));
        }

        if let Some(kind) = node.action {
            let skip_last = frame.is_last_item() && option_tokens(node.option_str()).any(|t| t == "skip_last");
            if !node.skip && !skip_last {
                self.actions.push(Action {
                    name: node.name.clone(),
                    kind,
                    selector: node.selector.as_deref().map(|s| render_selector(s, node.option_str(), &value, frame)),
                    option: node.option.clone(),
                    value: value.clone(),
                });
            }
        }

        if let Some(step) = self.pause_here(node) {
            return Ok(step);
        }

        Ok(self.follow(node, &value, frame))
    }

    /// Append the breakpoint pause when `node` is the pause-at node.
    fn pause_here(&mut self, node: &Node) -> Option<Step> {
        if self.options.pause_at.as_deref() != Some(node.name.as_str()) {
            return None;
        }
        tracing::info!(node = node.id, name = %node.name, "Pause-at breakpoint reached");
        self.actions
            .push(Action::new(format!("Paused at {}", node.name), ActionKind::Pause));
        Some(Step::Stop(WalkEnd::Paused))
    }

    /// Leave a node that has no value to route by. Only an unlabeled single
    /// exit can be taken; several labeled exits are a dead end. `record` is
    /// false when the node is already in the invalid list.
    fn pass_through(&mut self, node: &Node, frame: &Frame<'_>, record: bool) -> Step {
        let next = advance(self.graph, node.id, None);
        if next.is_none() && node.transitions.len() > 1 {
            tracing::warn!(node = node.id, name = %node.name, "No value to choose between exits");
            if record {
                self.record(node, frame);
            }
            return Step::Stop(WalkEnd::Aborted);
        }
        Step::Next(next)
    }

    /// Advance by the value's label. Several exits and no match is a dead end.
    fn follow(&mut self, node: &Node, value: &Value, frame: &Frame<'_>) -> Step {
        let label = label_for_value(value);
        let next = advance(self.graph, node.id, label.as_deref());
        if next.is_none() && node.transitions.len() > 1 {
            tracing::warn!(node = node.id, label = ?label, "No transition matches value");
            self.record(node, frame);
            return Step::Stop(WalkEnd::Aborted);
        }
        Step::Next(next)
    }

    fn resolve(&mut self, node: &Node, frame: &Frame<'_>) -> Resolved {
        let key = match (&node.data, node.action) {
            (Some(Value::String(key)), kind) if kind != Some(ActionKind::Read) => key,
            (data, _) => return Resolved::Value(data.clone().unwrap_or(Value::Null)),
        };
        match frame {
            Frame::Item { item, .. } => Resolved::Value(lookup(item, key).cloned().unwrap_or(Value::Null)),
            Frame::Root => match self.source.fetch(key) {
                Ok(v) => Resolved::Value(v.unwrap_or(Value::Null)),
                Err(e) => {
                    tracing::warn!(node = node.id, key = %key, error = %e, "Data fetch failed");
                    self.record(node, frame);
                    Resolved::Failed
                }
            },
        }
    }

    fn record(&mut self, node: &Node, frame: &Frame<'_>) {
        let key = node.data_key().unwrap_or("");
        self.invalid
            .push(InvalidField::new(node.name.clone(), format!("{}{}", frame.prefix(), key)));
    }
}

enum Step {
    Next(Option<NodeId>),
    Stop(WalkEnd),
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Resolve a selector template for one group item according to the tag in
/// the node's option. Outside a group the template is left for the engine.
fn render_selector(template: &str, option: &str, value: &Value, frame: &Frame<'_>) -> String {
    let Frame::Item { index, .. } = frame else {
        return template.to_string();
    };
    for tag in option_tokens(option) {
        match tag {
            "literal" => return substitute(template, value),
            "yes_no" => {
                let text = match value {
                    Value::Bool(true) => "yes".to_string(),
                    Value::Bool(false) => "no".to_string(),
                    other => value_text(other).to_lowercase(),
                };
                return template.replacen("{}", &text, 1);
            }
            "index1" => return template.replacen("{}", &(index + 1).to_string(), 1),
            "index0" => return template.replacen("{}", &index.to_string(), 1),
            _ => {}
        }
    }
    template.to_string()
}

/// `{"$date": ...}` objects and RFC 3339 timestamps become `YYYY-MM-DD`.
fn normalize_date(value: Value) -> Value {
    let date = match &value {
        Value::Object(map) if map.len() == 1 => match map.get("$date") {
            Some(Value::String(s)) => parse_timestamp(s),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|dt| dt.date_naive()),
            _ => None,
        },
        Value::String(s) if s.contains('T') => parse_timestamp(s),
        _ => None,
    };
    match date {
        Some(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        None => value,
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}
