//! The tag layer: a dialect-parameterized forest of GEDC tag-structures.
//!
//! A [`GedcForest`] owns every structure parsed from (or built for) one
//! document. Structures are stored in an arena and addressed by [`NodeId`];
//! superstructure, substructure, and reverse-reference links are all arena
//! indices, so pointer cycles in the data never become ownership cycles.
//!
//! This layer knows nothing about GEDCOM 7 semantics: it parses levels,
//! tags, cross-reference identifiers, pointers, and payloads, splices
//! CONT/CONC continuation lines, and serializes back out. The schema-aware
//! typed layer is built on top of it in [`crate::typed`].

mod json;
mod parser;
mod writer;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::dialect::GedcDialect;
use crate::error::{JsonError, ParseError, WriteError};
use crate::selector::{self, Queryable};
use crate::Diagnostics;

/// Arena handle for a structure within one [`GedcForest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Payload of a tag-structure.
///
/// A structure carries at most one of a string payload and a pointer
/// payload; CONT/CONC splices extend the string form only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GedcPayload {
    /// No payload on the line.
    #[default]
    Absent,
    /// String payload, with continuation lines already spliced in.
    Text(String),
    /// Pointer to another structure in the same forest.
    Pointer(NodeId),
    /// The `@VOID@` null-pointer sentinel.
    Void,
}

#[derive(Debug, Clone)]
pub(crate) struct GedcNode {
    pub(crate) tag: String,
    pub(crate) payload: GedcPayload,
    pub(crate) sub: Vec<NodeId>,
    pub(crate) sup: Option<NodeId>,
    pub(crate) referenced_by: Vec<NodeId>,
    pub(crate) xref_id: Option<String>,
}

impl GedcNode {
    fn new(tag: &str, sup: Option<NodeId>) -> Self {
        GedcNode {
            tag: tag.to_string(),
            payload: GedcPayload::Absent,
            sub: Vec::new(),
            sup,
            referenced_by: Vec::new(),
            xref_id: None,
        }
    }
}

/// A forest of tag-structures.
#[derive(Debug, Clone, Default)]
pub struct GedcForest {
    pub(crate) nodes: Vec<GedcNode>,
    pub(crate) roots: Vec<NodeId>,
}

impl GedcForest {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses GEDC text under the given dialect.
    ///
    /// Ill-formed lines are reported through `diag` (prefixed `line N:`)
    /// and skipped; the only fatal outcome is input with no parseable line
    /// at all. Pointers are resolved in a second pass: `@VOID@` becomes
    /// [`GedcPayload::Void`] silently, unresolved identifiers become void
    /// with a `pointer to undefined xref_id` error.
    pub fn parse(
        src: &str,
        dialect: &GedcDialect,
        diag: &mut Diagnostics,
    ) -> Result<GedcForest, ParseError> {
        parser::parse(src, dialect, diag)
    }

    /// Serializes the forest to GEDC text under the given dialect.
    ///
    /// Referenced structures are assigned stable identifiers (preferring
    /// their parsed identifier when free, minting `X1`, `X2`, … otherwise);
    /// newlines in payloads become CONT lines; with a positive line-length
    /// policy, long lines are wrapped with CONC.
    pub fn write(&self, dialect: &GedcDialect) -> Result<String, WriteError> {
        writer::write(self, dialect)
    }

    /// Encodes the forest as a JSON array of `{tag, id?, (href|text)?, sub?}`
    /// nodes. `href` names the pointed-to structure's identifier, `null`
    /// standing for `@VOID@`.
    pub fn to_json(&self) -> Value {
        json::to_json(self)
    }

    /// Decodes a forest from the JSON form produced by [`to_json`],
    /// resolving `href` members with the same two-pass scheme as
    /// [`parse`].
    ///
    /// [`to_json`]: GedcForest::to_json
    /// [`parse`]: GedcForest::parse
    pub fn from_json(value: &Value, diag: &mut Diagnostics) -> Result<GedcForest, JsonError> {
        json::from_json(value, diag)
    }

    /// Top-level structures, in document order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of structures in the forest.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the forest holds no structures.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The structure's tag.
    pub fn tag(&self, id: NodeId) -> &str {
        &self.nodes[id.0].tag
    }

    /// The structure's payload.
    pub fn payload(&self, id: NodeId) -> &GedcPayload {
        &self.nodes[id.0].payload
    }

    /// The string payload, if the payload is a string.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].payload {
            GedcPayload::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Substructures, in document order.
    pub fn sub(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].sub
    }

    /// The enclosing structure, or `None` for a top-level structure.
    pub fn sup(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].sup
    }

    /// Structures whose pointer payload targets this structure.
    pub fn references(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].referenced_by
    }

    /// The preferred cross-reference identifier, if any.
    pub fn xref_id(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].xref_id.as_deref()
    }

    /// Sets or clears the preferred cross-reference identifier used when
    /// serialization needs to point at this structure.
    pub fn set_xref_id(&mut self, id: NodeId, xref: Option<String>) {
        self.nodes[id.0].xref_id = xref;
    }

    /// Appends a new top-level structure.
    pub fn add_root(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(GedcNode::new(tag, None));
        self.roots.push(id);
        id
    }

    /// Appends a new substructure under `parent`.
    pub fn add_child(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(GedcNode::new(tag, Some(parent)));
        self.nodes[parent.0].sub.push(id);
        id
    }

    /// Sets a string payload, dropping any pointer payload.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        self.unlink_pointer(id);
        self.nodes[id.0].payload = GedcPayload::Text(text.into());
    }

    /// Sets a pointer payload, dropping any string payload.
    pub fn set_pointer(&mut self, id: NodeId, target: NodeId) {
        self.unlink_pointer(id);
        self.nodes[id.0].payload = GedcPayload::Pointer(target);
        self.push_reference(target, id);
    }

    /// Sets the null-pointer payload.
    pub fn set_void(&mut self, id: NodeId) {
        self.unlink_pointer(id);
        self.nodes[id.0].payload = GedcPayload::Void;
    }

    /// Removes the payload.
    pub fn clear_payload(&mut self, id: NodeId) {
        self.unlink_pointer(id);
        self.nodes[id.0].payload = GedcPayload::Absent;
    }

    /// Runs a dot-path query, yielding matches in document order.
    ///
    /// A leading `.` anchors at the top level, `..` steps to any
    /// descendant, and a bare leading segment matches at any depth:
    /// `.HEAD.GEDC` is the `GEDC` child of the top-level `HEAD`;
    /// `HEAD..VERS` is any `VERS` under any `HEAD`.
    pub fn select(&self, path: &str) -> Vec<NodeId> {
        selector::select(self, path)
    }

    /// Like [`select`], returning the first match only.
    ///
    /// [`select`]: GedcForest::select
    pub fn select_first(&self, path: &str) -> Option<NodeId> {
        selector::select(self, path).into_iter().next()
    }

    /// All structures in document order (pre-order over the roots).
    pub(crate) fn document_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut pending: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = pending.pop() {
            order.push(id);
            pending.extend(self.nodes[id.0].sub.iter().rev().copied());
        }
        order
    }

    pub(crate) fn push_reference(&mut self, target: NodeId, by: NodeId) {
        let refs = &mut self.nodes[target.0].referenced_by;
        if !refs.contains(&by) {
            refs.push(by);
        }
    }

    fn unlink_pointer(&mut self, id: NodeId) {
        if let GedcPayload::Pointer(target) = self.nodes[id.0].payload {
            self.nodes[target.0].referenced_by.retain(|&r| r != id);
        }
    }

    /// Identifier assignment shared by the text and JSON writers.
    pub(crate) fn assign_ids(&self) -> FxHashMap<NodeId, String> {
        let mut claimed: rustc_hash::FxHashSet<String> = rustc_hash::FxHashSet::default();
        claimed.insert("VOID".to_string());
        let mut ids: FxHashMap<NodeId, String> = FxHashMap::default();
        let order = self.document_order();

        // Preferred identifiers first, in document order.
        for &id in &order {
            if let Some(pref) = &self.nodes[id.0].xref_id {
                if claimed.insert(pref.clone()) {
                    ids.insert(id, pref.clone());
                }
            }
        }

        // Mint for referenced structures that still lack one.
        let mut counter = 1usize;
        for &id in &order {
            if self.nodes[id.0].referenced_by.is_empty() || ids.contains_key(&id) {
                continue;
            }
            loop {
                let candidate = format!("X{}", counter);
                counter += 1;
                if claimed.insert(candidate.clone()) {
                    ids.insert(id, candidate);
                    break;
                }
            }
        }
        ids
    }
}

impl Queryable for GedcForest {
    type Id = NodeId;

    fn roots(&self) -> Vec<NodeId> {
        self.roots.clone()
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.0].sub.clone()
    }

    fn matches(&self, id: NodeId, segment: &str) -> bool {
        self.nodes[id.0].tag == segment
    }
}
