//! JSON document format for graphs.
//!
//! ```json
//! {
//!   "nodes": {
//!     "0": {"name": "Start", "action": null, "is_entrance": true, "transitions": [[0, 1, null]]},
//!     "1": {"name": "FillName", "action": "fill", "selector": "#name", "data": "name", "transitions": []}
//!   },
//!   "quebec": { "1": {"name": "FillName", "action": "fill", "selector": "#nom", "data": "name"} }
//! }
//! ```
//!
//! Any top-level key other than `nodes` is a named patch of the same shape.
//! Restoring with a patch replaces base nodes with the patch's nodes of the
//! same id and adds the rest.

use std::collections::BTreeMap;
use std::path::Path;

use filler_types::{FillerError, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::graph::{FillerGraph, Node, NodeId};
use crate::kind::ActionKind;
use crate::transition::{Transition, TransitionLabel};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct GraphDocument {
    pub nodes: BTreeMap<NodeId, NodeDocument>,
    pub patches: BTreeMap<String, Value>,
}

// Node ids are numeric keys written as strings, which `#[serde(flatten)]`
// cannot parse, so the top level is split by hand.
impl TryFrom<Map<String, Value>> for GraphDocument {
    type Error = String;

    fn try_from(mut map: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let nodes = map
            .remove("nodes")
            .ok_or_else(|| "graph document has no 'nodes' object".to_string())?;
        let nodes = serde_json::from_value(nodes).map_err(|e| format!("invalid nodes: {e}"))?;
        Ok(Self {
            nodes,
            patches: map.into_iter().collect(),
        })
    }
}

impl Serialize for GraphDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + self.patches.len()))?;
        map.serialize_entry("nodes", &self.nodes)?;
        for (name, patch) in &self.patches {
            map.serialize_entry(name, patch)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub option: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(default)]
    pub action: Option<ActionKind>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_entrance: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_optional: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub skip: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub transitions: Vec<(NodeId, NodeId, Value)>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl NodeDocument {
    fn into_node(self, id: NodeId) -> Node {
        Node {
            id,
            name: self.name.unwrap_or_default(),
            description: self.description,
            data: self.data.filter(|d| !d.is_null()),
            selector: self.selector,
            option: self.option,
            fallback: self.fallback,
            action: self.action,
            is_entrance: self.is_entrance,
            is_optional: self.is_optional,
            skip: self.skip,
            transitions: self
                .transitions
                .into_iter()
                .map(|(source, target, label)| Transition {
                    source,
                    target,
                    label: TransitionLabel::from_value(&label),
                })
                .collect(),
        }
    }

    fn from_node(node: &Node) -> Self {
        Self {
            name: Some(node.name.clone()),
            description: node.description.clone(),
            data: node.data.clone(),
            selector: node.selector.clone(),
            option: node.option.clone(),
            fallback: node.fallback.clone(),
            action: node.action,
            is_entrance: node.is_entrance,
            is_optional: node.is_optional,
            skip: node.skip,
            transitions: node
                .transitions
                .iter()
                .map(|t| (t.source, t.target, t.label.to_value()))
                .collect(),
        }
    }
}

impl GraphDocument {
    /// Node set with the named patch applied. An unknown patch name leaves
    /// the base nodes untouched.
    pub fn resolved_nodes(&self, patch: Option<&str>) -> Result<BTreeMap<NodeId, NodeDocument>> {
        let mut nodes = self.nodes.clone();
        if let Some(name) = patch {
            match self.patches.get(name) {
                Some(overlay) => {
                    let overlay: BTreeMap<NodeId, NodeDocument> =
                        serde_json::from_value(overlay.clone()).map_err(|e| {
                            FillerError::InvalidGraph(format!("patch '{name}' is malformed: {e}"))
                        })?;
                    tracing::debug!(patch = %name, nodes = overlay.len(), "Applying graph patch");
                    nodes.extend(overlay);
                }
                None => tracing::warn!(patch = %name, "Graph patch not present; using base nodes"),
            }
        }
        Ok(nodes)
    }

    pub fn patch_names(&self) -> impl Iterator<Item = &str> {
        self.patches.keys().map(String::as_str)
    }
}

impl FillerGraph {
    pub fn from_document(doc: &GraphDocument, patch: Option<&str>) -> Result<Self> {
        let mut graph = FillerGraph::new();
        for (id, node_doc) in doc.resolved_nodes(patch)? {
            graph.insert_node(node_doc.into_node(id));
        }
        Ok(graph)
    }

    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            nodes: self
                .nodes()
                .map(|n| (n.id, NodeDocument::from_node(n)))
                .collect(),
            patches: BTreeMap::new(),
        }
    }

    pub fn from_json_str(json: &str, patch: Option<&str>) -> Result<Self> {
        let doc: GraphDocument = serde_json::from_str(json)?;
        Self::from_document(&doc, patch)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Restore a graph from a JSON file, optionally overlaying a named patch.
    pub fn load(path: &Path, patch: Option<&str>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let graph = Self::from_json_str(&json, patch)?;
        tracing::debug!(path = %path.display(), nodes = graph.len(), "Loaded graph");
        Ok(graph)
    }

    /// Dump the graph (without patches) to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeSpec;
    use serde_json::json;

    fn sample_graph() -> FillerGraph {
        let mut g = FillerGraph::new();
        let start = g.add_node(NodeSpec::named("Start").entrance());
        let nav = g.add_node(
            NodeSpec::named("Navigate")
                .action(ActionKind::Goto)
                .selector("https://example.test"),
        );
        let branch = g.add_node(
            NodeSpec::named("HasSpouse")
                .action(ActionKind::Branch)
                .data_key("spouse.present")
                .optional()
                .fallback("End"),
        );
        let spouse = g.add_node(
            NodeSpec::named("SpouseName")
                .action(ActionKind::Fill)
                .selector("#spouse")
                .data_key("spouse.name"),
        );
        let end = g.add_node(NodeSpec::named("End"));
        g.add_transition(start, nav, "").unwrap();
        g.add_transition(nav, branch, "").unwrap();
        g.add_transition(branch, spouse, "True").unwrap();
        g.add_transition(branch, end, "*").unwrap();
        g.add_transition(spouse, end, "").unwrap();
        g
    }

    #[test]
    fn round_trip_preserves_nodes_and_transitions() {
        let g = sample_graph();
        let json = g.to_json_string().unwrap();
        let restored = FillerGraph::from_json_str(&json, None).unwrap();
        assert_eq!(restored, g);
        assert_eq!(restored.to_json_string().unwrap(), json);
    }

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("form.json");
        let g = sample_graph();
        g.save(&path).unwrap();
        let restored = FillerGraph::load(&path, None).unwrap();
        assert_eq!(restored, g);
        assert_eq!(restored.next_id(), g.next_id());
    }

    #[test]
    fn transitions_dump_as_triples() {
        let doc = sample_graph().to_document();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["nodes"]["2"]["transitions"], json!([[2, 3, "True"], [2, 4, "*"]]));
        assert_eq!(value["nodes"]["0"]["transitions"], json!([[0, 1, null]]));
    }

    #[test]
    fn node_order_follows_ids_not_key_text() {
        let json = r#"{"nodes": {
            "10": {"name": "Ten", "transitions": []},
            "2": {"name": "Two", "is_entrance": true, "transitions": [[2, 10, ""]]}
        }}"#;
        let g = FillerGraph::from_json_str(json, None).unwrap();
        let names: Vec<_> = g.nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Two", "Ten"]);
        assert_eq!(g.next_id(), 11);
    }

    #[test]
    fn legacy_nulls_and_aliases_load() {
        let json = r#"{"nodes": {
            "0": {"name": "Start", "description": null, "data": null, "selector": null,
                  "option": null, "action": null, "is_entrance": true, "is_optional": null,
                  "skip": null, "transitions": [[0, 1, "True"]]},
            "1": {"name": "Capture", "action": "get", "selector": "url", "transitions": null}
        }}"#;
        let g = FillerGraph::from_json_str(json, None).unwrap();
        assert_eq!(g.node(1).unwrap().action, Some(ActionKind::Read));
        assert!(!g.node(0).unwrap().is_optional);
        assert!(g.node(1).unwrap().transitions.is_empty());
    }

    #[test]
    fn patch_overlays_nodes_by_id() {
        let json = r##"{
            "nodes": {
                "0": {"name": "Start", "is_entrance": true, "transitions": [[0, 1, null]]},
                "1": {"name": "FillName", "action": "fill", "selector": "#name", "data": "name", "transitions": []}
            },
            "quebec": {
                "1": {"name": "FillName", "action": "fill", "selector": "#nom", "data": "name", "transitions": [[1, 2, null]]},
                "2": {"name": "End", "transitions": []}
            }
        }"##;
        let base = FillerGraph::from_json_str(json, None).unwrap();
        assert_eq!(base.node(1).unwrap().selector.as_deref(), Some("#name"));
        assert_eq!(base.len(), 2);

        let patched = FillerGraph::from_json_str(json, Some("quebec")).unwrap();
        assert_eq!(patched.node(1).unwrap().selector.as_deref(), Some("#nom"));
        assert_eq!(patched.len(), 3);
        assert_eq!(patched.next_id(), 3);
    }

    #[test]
    fn unknown_patch_falls_back_to_base() {
        let json = r#"{"nodes": {"0": {"name": "Start", "is_entrance": true}}}"#;
        let g = FillerGraph::from_json_str(json, Some("ontario")).unwrap();
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn malformed_patch_is_a_graph_error() {
        let json = r#"{"nodes": {}, "broken": {"0": {"action": "teleport"}}}"#;
        let err = FillerGraph::from_json_str(json, Some("broken")).unwrap_err();
        assert!(matches!(err, FillerError::InvalidGraph(_)));
    }

    #[test]
    fn patch_names_are_listed() {
        let json = r#"{"nodes": {}, "quebec": {}, "bc": {}}"#;
        let doc: GraphDocument = serde_json::from_str(json).unwrap();
        let names: Vec<_> = doc.patch_names().collect();
        assert_eq!(names, vec!["bc", "quebec"]);
    }
}
