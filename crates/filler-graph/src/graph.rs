use std::collections::BTreeMap;
use std::fmt;

use filler_types::{FillerError, Result};
use serde_json::Value;

use crate::kind::ActionKind;
use crate::transition::{advance, Transition, TransitionLabel};

pub type NodeId = u32;

/// Nodes keyed by id. Ids are assigned in increasing order, so iteration
/// order is insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillerGraph {
    nodes: BTreeMap<NodeId, Node>,
    next_id: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub description: Option<String>,
    /// A data key (string) or a literal value.
    pub data: Option<Value>,
    pub selector: Option<String>,
    pub option: Option<String>,
    /// Name of the node an optional branch jumps to when its value is null.
    pub fallback: Option<String>,
    pub action: Option<ActionKind>,
    pub is_entrance: bool,
    pub is_optional: bool,
    pub skip: bool,
    pub transitions: Vec<Transition>,
}

impl Node {
    /// The data key, when `data` is a string.
    pub fn data_key(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }

    pub fn option_str(&self) -> &str {
        self.option.as_deref().unwrap_or("")
    }

    pub fn selector_str(&self) -> &str {
        self.selector.as_deref().unwrap_or("")
    }
}

/// Everything needed to create a node except its id.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    pub name: String,
    pub description: Option<String>,
    pub data: Option<Value>,
    pub selector: Option<String>,
    pub option: Option<String>,
    pub fallback: Option<String>,
    pub action: Option<ActionKind>,
    pub is_entrance: bool,
    pub is_optional: bool,
    pub skip: bool,
}

impl NodeSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn action(mut self, kind: ActionKind) -> Self {
        self.action = Some(kind);
        self
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.option = Some(option.into());
        self
    }

    pub fn fallback(mut self, node_name: impl Into<String>) -> Self {
        self.fallback = Some(node_name.into());
        self
    }

    /// Read the node's value from the data source under `key`.
    pub fn data_key(mut self, key: impl Into<String>) -> Self {
        self.data = Some(Value::String(key.into()));
        self
    }

    /// Use `value` as the node's literal data.
    pub fn literal(mut self, value: Value) -> Self {
        self.data = Some(value);
        self
    }

    pub fn entrance(mut self) -> Self {
        self.is_entrance = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }
}

impl FillerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under the next free id.
    pub fn add_node(&mut self, spec: NodeSpec) -> NodeId {
        let id = self.next_id;
        self.nodes.insert(
            id,
            Node {
                id,
                name: spec.name,
                description: spec.description,
                data: spec.data,
                selector: spec.selector,
                option: spec.option,
                fallback: spec.fallback,
                action: spec.action,
                is_entrance: spec.is_entrance,
                is_optional: spec.is_optional,
                skip: spec.skip,
                transitions: Vec::new(),
            },
        );
        self.next_id += 1;
        id
    }

    /// Insert a fully formed node, replacing any node with the same id.
    /// The id counter moves past it so later `add_node` calls never collide.
    pub fn insert_node(&mut self, node: Node) {
        if node.id >= self.next_id {
            self.next_id = node.id + 1;
        }
        self.nodes.insert(node.id, node);
    }

    pub fn add_transition(
        &mut self,
        source: NodeId,
        target: NodeId,
        label: impl Into<TransitionLabel>,
    ) -> Result<()> {
        if !self.nodes.contains_key(&target) {
            return Err(FillerError::UnknownNode { id: target });
        }
        let node = self
            .nodes
            .get_mut(&source)
            .ok_or(FillerError::UnknownNode { id: source })?;
        node.transitions.push(Transition {
            source,
            target,
            label: label.into(),
        });
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The id the next `add_node` call will assign.
    pub fn next_id(&self) -> NodeId {
        self.next_id
    }

    pub fn entrance(&self) -> Option<&Node> {
        self.nodes.values().find(|n| n.is_entrance)
    }

    /// Look a node up by name, ignoring ASCII case.
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes
            .values()
            .find(|n| n.name.eq_ignore_ascii_case(name))
    }

    /// Shift every id `>= from` up by `by`, rewriting transitions to match.
    /// Used to open a gap for nodes spliced into an existing form.
    /// Returns the number of nodes that moved. Fails without touching the
    /// graph when a shifted id would not fit in a [`NodeId`].
    pub fn renumber(&mut self, from: NodeId, by: NodeId) -> Result<usize> {
        if by == 0 || self.next_id < from {
            return Ok(0);
        }
        if self.next_id.checked_add(by).is_none() {
            return Err(FillerError::InvalidGraph(format!(
                "shifting ids from {from} by {by} overflows the id range"
            )));
        }
        let shift = |id: NodeId| if id >= from { id + by } else { id };
        let old = std::mem::take(&mut self.nodes);
        let mut moved = 0;
        for (id, mut node) in old {
            if id >= from {
                moved += 1;
            }
            node.id = shift(id);
            for t in &mut node.transitions {
                t.source = shift(t.source);
                t.target = shift(t.target);
            }
            self.nodes.insert(node.id, node);
        }
        self.next_id = shift(self.next_id);
        tracing::debug!(from, by, moved, "Renumbered graph nodes");
        Ok(moved)
    }
}

impl fmt::Display for FillerGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in self.nodes.values() {
            let data = node
                .data
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "null".into());
            let transitions: Vec<_> = node.transitions.iter().map(|t| t.to_string()).collect();
            writeln!(f, "{}: {} ({}): {}", node.id, node.name, data, transitions.join(", "))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GraphCursor: caller-held traversal position
// ---------------------------------------------------------------------------

/// A position in a graph. The graph itself stays immutable, so any number
/// of cursors can walk it at once.
#[derive(Debug, Clone)]
pub struct GraphCursor<'g> {
    graph: &'g FillerGraph,
    current: Option<NodeId>,
}

impl<'g> GraphCursor<'g> {
    /// Start at the entrance node (or nowhere if the graph has none).
    pub fn new(graph: &'g FillerGraph) -> Self {
        Self {
            graph,
            current: graph.entrance().map(|n| n.id),
        }
    }

    pub fn current(&self) -> Option<&'g Node> {
        self.current.and_then(|id| self.graph.node(id))
    }

    pub fn set_current(&mut self, id: NodeId) -> Result<&'g Node> {
        let node = self.graph.node(id).ok_or(FillerError::UnknownNode { id })?;
        self.current = Some(id);
        Ok(node)
    }

    /// Move along the transition chosen for `label`. A terminal or dead-end
    /// node leaves the cursor empty.
    pub fn advance(&mut self, label: Option<&str>) -> Option<&'g Node> {
        self.current = self.current.and_then(|id| advance(self.graph, id, label));
        self.current()
    }

    pub fn graph(&self) -> &'g FillerGraph {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_graph() -> FillerGraph {
        let mut g = FillerGraph::new();
        let start = g.add_node(NodeSpec::named("Start").entrance());
        let end = g.add_node(NodeSpec::named("End"));
        g.add_transition(start, end, "True").unwrap();
        g
    }

    #[test]
    fn add_node_assigns_sequential_ids() {
        let mut g = FillerGraph::new();
        assert_eq!(g.add_node(NodeSpec::named("a")), 0);
        assert_eq!(g.add_node(NodeSpec::named("b")), 1);
        assert_eq!(g.next_id(), 2);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn add_transition_rejects_unknown_nodes() {
        let mut g = two_node_graph();
        let err = g.add_transition(0, 9, "").unwrap_err();
        assert!(matches!(err, FillerError::UnknownNode { id: 9 }));
        let err = g.add_transition(7, 0, "").unwrap_err();
        assert!(matches!(err, FillerError::UnknownNode { id: 7 }));
    }

    #[test]
    fn insert_node_keeps_counter_ahead() {
        let mut g = FillerGraph::new();
        let id = g.add_node(NodeSpec::named("tmp"));
        let mut node = g.node(id).cloned().unwrap();
        node.id = 40;
        g.insert_node(node);
        assert_eq!(g.add_node(NodeSpec::named("next")), 41);
    }

    #[test]
    fn node_by_name_ignores_case() {
        let g = two_node_graph();
        assert_eq!(g.node_by_name("end").map(|n| n.id), Some(1));
        assert!(g.node_by_name("middle").is_none());
    }

    #[test]
    fn cursor_walks_from_entrance() {
        let g = two_node_graph();
        let mut cursor = GraphCursor::new(&g);
        assert_eq!(cursor.current().map(|n| n.name.as_str()), Some("Start"));
        assert_eq!(cursor.advance(None).map(|n| n.name.as_str()), Some("End"));
        assert!(cursor.advance(None).is_none());
        assert!(cursor.current().is_none());
    }

    #[test]
    fn cursor_set_current_repositions() {
        let g = two_node_graph();
        let mut cursor = GraphCursor::new(&g);
        assert_eq!(cursor.set_current(1).unwrap().name, "End");
        assert!(cursor.set_current(5).is_err());
    }

    #[test]
    fn renumber_shifts_ids_and_transitions() {
        let mut g = FillerGraph::new();
        let a = g.add_node(NodeSpec::named("A").entrance());
        let b = g.add_node(NodeSpec::named("B"));
        let c = g.add_node(NodeSpec::named("C"));
        g.add_transition(a, b, "").unwrap();
        g.add_transition(b, c, "").unwrap();

        let moved = g.renumber(1, 10).unwrap();
        assert_eq!(moved, 2);
        assert_eq!(g.node(11).unwrap().name, "B");
        assert_eq!(g.node(12).unwrap().name, "C");
        assert_eq!(g.node(0).unwrap().transitions[0].target, 11);
        let b = g.node(11).unwrap();
        assert_eq!((b.transitions[0].source, b.transitions[0].target), (11, 12));
        assert_eq!(g.next_id(), 13);
    }

    #[test]
    fn renumber_rejects_overflowing_shift() {
        let mut g = two_node_graph();
        let err = g.renumber(0, NodeId::MAX).unwrap_err();
        assert!(matches!(err, FillerError::InvalidGraph(_)));
        assert_eq!(g.node(1).unwrap().name, "End");
        assert_eq!(g.next_id(), 2);

        // Nothing at or above `from` means nothing to shift.
        assert_eq!(g.renumber(5, NodeId::MAX).unwrap(), 0);
    }

    #[test]
    fn display_lists_nodes_and_transitions() {
        let g = two_node_graph();
        let text = g.to_string();
        assert!(text.contains("0: Start (null): (0 --> True --> 1)"));
        assert!(text.contains("1: End (null): "));
    }
}
