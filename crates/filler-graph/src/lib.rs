//! Workflow graph model for declarative form filling.
//!
//! A [`FillerGraph`] encodes a form as nodes joined by labeled transitions.
//! Traversal is a pure function of `(graph, current, label)`; the cursor lives
//! with the caller. Graphs load from and dump to a JSON document that may carry
//! named patch variants, and can be linted before anything touches a browser.

pub mod document;
pub mod graph;
pub mod kind;
pub mod transition;
pub mod validation;

pub use document::{GraphDocument, NodeDocument};
pub use graph::{FillerGraph, GraphCursor, Node, NodeId, NodeSpec};
pub use kind::ActionKind;
pub use transition::{advance, label_for_value, Transition, TransitionLabel};
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};
