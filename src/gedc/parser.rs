//! Parsing GEDC text into a forest.
//!
//! The scanner walks the input with the dialect's composite line regex.
//! Anything between two successive matches is an unparseable region,
//! reported at its starting line. A first pass builds the forest and
//! splices CONT/CONC continuations; a second pass resolves pointer
//! payloads against the cross-reference identifier table.

use regex::Captures;
use rustc_hash::FxHashMap;

use crate::dialect::GedcDialect;
use crate::error::ParseError;
use crate::Diagnostics;

use super::{GedcForest, GedcPayload, NodeId};

struct Parser<'d> {
    dialect: &'d GedcDialect,
    forest: GedcForest,
    /// Current path: the node at index `n` is the open structure at level `n`.
    stack: Vec<NodeId>,
    xrefs: FxHashMap<String, NodeId>,
    /// Pointer payloads awaiting resolution: (node, identifier, line).
    pending: Vec<(NodeId, String, usize)>,
}

pub(super) fn parse(
    src: &str,
    dialect: &GedcDialect,
    diag: &mut Diagnostics,
) -> Result<GedcForest, ParseError> {
    let src = src.strip_prefix('\u{FEFF}').unwrap_or(src);
    let mut p = Parser {
        dialect,
        forest: GedcForest::new(),
        stack: Vec::new(),
        xrefs: FxHashMap::default(),
        pending: Vec::new(),
    };

    let mut pos = 0usize;
    let mut line = 1usize;
    let mut matched = false;
    for caps in dialect.line_re().captures_iter(src) {
        let whole = caps.get(0).expect("match has a whole-match group");
        if whole.start() > pos {
            report_gap(&src[pos..whole.start()], line, diag);
            line += count_breaks(&src[pos..whole.start()]);
        }
        matched = true;
        p.line(&caps, line, diag);
        line += count_breaks(whole.as_str());
        pos = whole.end();
    }
    if pos < src.len() {
        report_gap(&src[pos..], line, diag);
    }
    if !matched {
        return Err(ParseError::EmptyInput);
    }

    // Second pass: bind pointers. `@VOID@` never reaches here.
    for (node, name, at) in p.pending {
        match p.xrefs.get(&name) {
            Some(&target) => {
                p.forest.nodes[node.0].payload = GedcPayload::Pointer(target);
                p.forest.push_reference(target, node);
            }
            None => {
                diag.error(format!(
                    "line {}: pointer to undefined xref_id @{}@",
                    at, name
                ));
                p.forest.nodes[node.0].payload = GedcPayload::Void;
            }
        }
    }
    Ok(p.forest)
}

fn report_gap(gap: &str, line: usize, diag: &mut Diagnostics) {
    if gap.trim().is_empty() {
        return;
    }
    let snippet = gap.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    diag.error(format!("line {}: unparseable text {:?}", line, snippet));
}

/// Counts line breaks, treating `\r\n` as one.
fn count_breaks(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut n = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => n += 1,
            b'\r' => {
                n += 1;
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    n
}

impl Parser<'_> {
    fn line(&mut self, caps: &Captures, line: usize, diag: &mut Diagnostics) {
        let level_text = &caps["level"];
        if !self.dialect.zeros() && level_text.len() > 1 && level_text.starts_with('0') {
            diag.error(format!(
                "line {}: level {} has leading zeros",
                line, level_text
            ));
        }
        let level: usize = match level_text.parse() {
            Ok(n) => n,
            Err(_) => {
                diag.error(format!("line {}: level {} out of range", line, level_text));
                return;
            }
        };
        if level > self.stack.len() {
            diag.error(format!(
                "line {}: level {} without an enclosing level {}",
                line,
                level,
                level - 1
            ));
            return;
        }

        let tag = &caps["tag"];
        if !self.dialect.valid_tag(tag) {
            diag.error(format!("line {}: invalid tag {:?}", line, tag));
            return;
        }

        if tag == "CONT" || tag == "CONC" {
            self.continuation(caps, tag, level, line, diag);
            return;
        }

        self.stack.truncate(level);
        let node = match self.stack.last().copied() {
            Some(parent) => self.forest.add_child(parent, tag),
            None => self.forest.add_root(tag),
        };

        if let Some(xref) = caps.name("xref") {
            self.define_xref(node, xref.as_str(), line, diag);
        }

        if let Some(ptr) = caps.name("ptr") {
            let name = ptr.as_str();
            if name == "VOID" {
                self.forest.nodes[node.0].payload = GedcPayload::Void;
            } else if !self.dialect.valid_xref(name) {
                diag.error(format!("line {}: invalid pointer @{}@", line, name));
                self.forest.nodes[node.0].payload = GedcPayload::Void;
            } else {
                self.pending.push((node, name.to_string(), line));
            }
        } else if let Some(payload) = caps.name("payload") {
            let raw = payload.as_str();
            if !raw.is_empty() {
                if !self.dialect.valid_payload(raw) {
                    diag.error(format!("line {}: invalid payload {:?}", line, raw));
                }
                self.forest.nodes[node.0].payload = GedcPayload::Text(decode_payload(raw));
            }
        }

        self.stack.push(node);
    }

    /// Splices a CONT/CONC line into the enclosing structure's payload.
    /// Continuations are directives, never structures: nothing is pushed
    /// on the path, so a deeper line after one is a level error.
    fn continuation(
        &mut self,
        caps: &Captures,
        tag: &str,
        level: usize,
        line: usize,
        diag: &mut Diagnostics,
    ) {
        if caps.name("xref").is_some() {
            diag.error(format!("line {}: {} cannot carry an xref_id", line, tag));
            return;
        }
        if tag == "CONC" && !self.dialect.conc_allowed() {
            diag.error(format!("line {}: CONC is not allowed by this dialect", line));
            return;
        }
        if level == 0 {
            diag.error(format!(
                "line {}: {} without an enclosing structure",
                line, tag
            ));
            return;
        }
        if caps.name("ptr").is_some() {
            diag.error(format!(
                "line {}: {} payload cannot be a pointer",
                line, tag
            ));
            return;
        }
        self.stack.truncate(level);
        // level <= stack len was checked by the caller, so the enclosing
        // structure at level-1 is the top of the truncated path.
        let target = self.stack[level - 1];

        let node = &self.forest.nodes[target.0];
        if !node.sub.is_empty() {
            diag.error(format!(
                "line {}: {} cannot follow substructures",
                line, tag
            ));
            return;
        }
        if matches!(node.payload, GedcPayload::Pointer(_) | GedcPayload::Void) {
            diag.error(format!(
                "line {}: {} cannot extend a pointer payload",
                line, tag
            ));
            return;
        }

        let appended = caps
            .name("payload")
            .map(|m| decode_payload(m.as_str()))
            .unwrap_or_default();
        let node = &mut self.forest.nodes[target.0];
        let text = match &mut node.payload {
            GedcPayload::Text(s) => s,
            payload => {
                *payload = GedcPayload::Text(String::new());
                match payload {
                    GedcPayload::Text(s) => s,
                    _ => unreachable!(),
                }
            }
        };
        if tag == "CONT" {
            text.push('\n');
        }
        text.push_str(&appended);
    }

    fn define_xref(&mut self, node: NodeId, xref: &str, line: usize, diag: &mut Diagnostics) {
        if !self.dialect.valid_xref(xref) {
            diag.error(format!("line {}: invalid xref_id @{}@", line, xref));
        } else if xref == "VOID" {
            diag.error(format!("line {}: xref_id @VOID@ is reserved", line));
        } else if self.xrefs.contains_key(xref) {
            diag.error(format!("line {}: xref_id @{}@ redefined", line, xref));
        } else {
            self.xrefs.insert(xref.to_string(), node);
            self.forest.nodes[node.0].xref_id = Some(xref.to_string());
        }
    }
}

/// Decodes the leading-`@` escape: `@@…` drops one `@`; anything else is
/// taken verbatim (so `@#…` and `@@#…` denote the same text).
fn decode_payload(raw: &str) -> String {
    match raw.strip_prefix("@@") {
        Some(rest) => format!("@{}", rest),
        None => raw.to_string(),
    }
}
