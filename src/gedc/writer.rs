//! Serializing a forest back to GEDC text.
//!
//! Structures are emitted in document order. Newlines in string payloads
//! become CONT lines one level down; with a positive line-length policy,
//! overlong lines are wrapped with CONC at the same continuation level. A
//! wrap boundary never leaves a bare `@` at the start of a continuation
//! payload: the leading-`@` escape is re-applied to the carried text, so
//! splicing on re-parse reproduces the original payload exactly.

use std::borrow::Cow;

use crate::dialect::GedcDialect;
use crate::error::WriteError;

use super::{GedcForest, GedcPayload, NodeId};

pub(super) fn write(forest: &GedcForest, dialect: &GedcDialect) -> Result<String, WriteError> {
    let ids = forest.assign_ids();
    let mut out = String::new();
    for &root in &forest.roots {
        write_node(forest, dialect, &ids, root, 0, &mut out)?;
    }
    Ok(out)
}

fn write_node(
    forest: &GedcForest,
    dialect: &GedcDialect,
    ids: &rustc_hash::FxHashMap<NodeId, String>,
    id: NodeId,
    level: usize,
    out: &mut String,
) -> Result<(), WriteError> {
    let node = &forest.nodes[id.0];
    let mut first = level.to_string();
    first.push(' ');
    if let Some(xref) = ids.get(&id) {
        first.push('@');
        first.push_str(xref);
        first.push('@');
        first.push(' ');
    }
    first.push_str(&node.tag);

    match &node.payload {
        GedcPayload::Absent => push_wrapped(out, first, None, level + 1, dialect)?,
        GedcPayload::Void => {
            first.push_str(" @VOID@");
            push_wrapped(out, first, None, level + 1, dialect)?;
        }
        GedcPayload::Pointer(target) => {
            // assign_ids gives every referenced structure an identifier.
            first.push_str(" @");
            first.push_str(&ids[target]);
            first.push('@');
            push_wrapped(out, first, None, level + 1, dialect)?;
        }
        GedcPayload::Text(text) => {
            for (i, segment) in text.split('\n').enumerate() {
                let mut line = if i == 0 {
                    std::mem::take(&mut first)
                } else {
                    format!("{} CONT", level + 1)
                };
                let payload_start = if segment.is_empty() {
                    None
                } else {
                    line.push(' ');
                    let start = line.len();
                    line.push_str(&escape_at(segment, dialect));
                    Some(start)
                };
                push_wrapped(out, line, payload_start, level + 1, dialect)?;
            }
        }
    }

    for &child in &node.sub {
        write_node(forest, dialect, ids, child, level + 1, out)?;
    }
    Ok(())
}

/// Re-applies the leading-`@` escape for output. With `escapes` on, `@#…`
/// keeps its single `@`; every other leading `@` is doubled.
fn escape_at<'a>(segment: &'a str, dialect: &GedcDialect) -> Cow<'a, str> {
    if !segment.starts_with('@') || (dialect.escapes() && segment.starts_with("@#")) {
        Cow::Borrowed(segment)
    } else {
        Cow::Owned(format!("@{}", segment))
    }
}

/// Emits one logical line, wrapping with CONC when the dialect demands it.
///
/// `payload_start` is the byte offset where the wrappable payload begins,
/// or `None` when the line has no wrappable payload (tag-only, pointer,
/// void): such a line either fits or serialization fails.
fn push_wrapped(
    out: &mut String,
    line: String,
    payload_start: Option<usize>,
    conc_level: usize,
    dialect: &GedcDialect,
) -> Result<(), WriteError> {
    if dialect.len() <= 0 {
        out.push_str(&line);
        out.push('\n');
        return Ok(());
    }
    let len = dialect.len() as usize;
    let prefix = format!("{} CONC ", conc_level);
    let prefix_chars = prefix.chars().count();

    let mut cur = line;
    let mut start = payload_start;
    loop {
        let total = cur.chars().count();
        if total <= len {
            out.push_str(&cur);
            out.push('\n');
            return Ok(());
        }
        let Some(payload_at) = start else {
            return Err(WriteError::LineLengthTooSmall {
                len,
                level: conc_level,
            });
        };

        let split = byte_at_char(&cur, len);
        let carried = escape_at(&cur[split..], dialect);
        // The head must keep at least one payload character, and the
        // continuation must be strictly shorter than what it replaces.
        let head_ok = split > payload_at;
        let shrinks = prefix_chars + carried.chars().count() < total;
        if !head_ok || !shrinks {
            return Err(WriteError::LineLengthTooSmall {
                len,
                level: conc_level,
            });
        }
        let carried = carried.into_owned();
        cur.truncate(split);
        out.push_str(&cur);
        out.push('\n');
        cur = format!("{}{}", prefix, carried);
        start = Some(prefix.len());
    }
}

/// Byte index of the `n`-th character (the string's length if it has
/// fewer than `n` characters).
fn byte_at_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
