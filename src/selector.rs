//! Dot-path queries shared by the tag and typed layers.
//!
//! Path grammar: segments separated by `.`. A leading `.` anchors the
//! first segment to the top level; `..` makes the following segment match
//! any descendant; a bare leading segment matches at any depth. So
//! `.HEAD.GEDC` is the `GEDC` child of a top-level `HEAD`, while
//! `HEAD..VERS` is any `VERS` anywhere under any `HEAD`.
//!
//! Execution keeps a set of active path positions per node, advancing a
//! position when the node matches its segment and letting
//! descendant-edged positions persist downward. Matches are yielded in
//! document order.

/// A tree that dot-path queries can run over. The two layers differ only
/// in what a child list is and what a segment matches against (tag vs.
/// structure type).
pub trait Queryable {
    /// Node handle.
    type Id: Copy + PartialEq;

    /// Top-level nodes, in document order.
    fn roots(&self) -> Vec<Self::Id>;

    /// Children of a node, in document order.
    fn children(&self, id: Self::Id) -> Vec<Self::Id>;

    /// Whether a path segment matches this node.
    fn matches(&self, id: Self::Id, segment: &str) -> bool;
}

struct Segment {
    name: String,
    /// True when this segment is reached over a descendant edge (`..`,
    /// or an unanchored path head).
    descendant: bool,
}

fn parse_path(path: &str) -> Vec<Segment> {
    let anchored = path.starts_with('.');
    let mut segments = Vec::new();
    let mut empties = 0usize;
    let mut first = true;
    for token in path.split('.') {
        if token.is_empty() {
            empties += 1;
            continue;
        }
        let descendant = if first {
            // One leading dot anchors; two or more make the head a
            // descendant step, same as no dot at all.
            !anchored || empties > 1
        } else {
            empties > 0
        };
        segments.push(Segment {
            name: token.to_string(),
            descendant,
        });
        first = false;
        empties = 0;
    }
    segments
}

/// Runs a dot-path query, yielding matching nodes in document order.
pub fn select<Q: Queryable + ?Sized>(q: &Q, path: &str) -> Vec<Q::Id> {
    let segments = parse_path(path);
    let mut out = Vec::new();
    if segments.is_empty() {
        return out;
    }
    for root in q.roots() {
        walk(q, root, &segments, &[0], &mut out);
    }
    out
}

/// Like [`select`], returning only the first match.
pub fn select_first<Q: Queryable + ?Sized>(q: &Q, path: &str) -> Option<Q::Id> {
    select(q, path).into_iter().next()
}

fn walk<Q: Queryable + ?Sized>(
    q: &Q,
    node: Q::Id,
    segments: &[Segment],
    active: &[usize],
    out: &mut Vec<Q::Id>,
) {
    let mut next: Vec<usize> = Vec::new();
    let mut yielded = false;
    for &i in active {
        if q.matches(node, &segments[i].name) {
            if i + 1 == segments.len() {
                if !yielded {
                    out.push(node);
                    yielded = true;
                }
            } else if !next.contains(&(i + 1)) {
                next.push(i + 1);
            }
        }
        if segments[i].descendant && !next.contains(&i) {
            next.push(i);
        }
    }
    if next.is_empty() {
        return;
    }
    for child in q.children(node) {
        walk(q, child, segments, &next, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::GEDCOM7;
    use crate::gedc::GedcForest;
    use crate::Diagnostics;

    fn sample() -> GedcForest {
        let mut diag = Diagnostics::new();
        let forest = GedcForest::parse(
            concat!(
                "0 HEAD\n",
                "1 GEDC\n",
                "2 VERS 7.0\n",
                "0 @I1@ INDI\n",
                "1 NAME a\n",
                "2 SURN b\n",
                "0 @I2@ INDI\n",
                "1 NAME c\n",
                "0 TRLR\n",
            ),
            &GEDCOM7,
            &mut diag,
        )
        .unwrap();
        assert!(diag.errors().is_empty());
        forest
    }

    #[test]
    fn test_anchored_child_path() {
        let forest = sample();
        let hits = forest.select(".HEAD.GEDC.VERS");
        assert_eq!(hits.len(), 1);
        assert_eq!(forest.text(hits[0]), Some("7.0"));
        // Anchoring means a nested segment cannot start the path.
        assert!(forest.select(".GEDC").is_empty());
    }

    #[test]
    fn test_descendant_path() {
        let forest = sample();
        let hits = forest.select("HEAD..VERS");
        assert_eq!(hits.len(), 1);
        // Unanchored head matches at any depth.
        let names = forest.select("NAME");
        assert_eq!(names.len(), 2);
        let surn = forest.select("INDI..SURN");
        assert_eq!(surn.len(), 1);
    }

    #[test]
    fn test_document_order_and_first() {
        let forest = sample();
        let names = forest.select("INDI.NAME");
        assert_eq!(forest.text(names[0]), Some("a"));
        assert_eq!(forest.text(names[1]), Some("c"));
        assert_eq!(forest.select_first("INDI.NAME"), Some(names[0]));
    }

    #[test]
    fn test_no_match_and_empty_path() {
        let forest = sample();
        assert!(forest.select("NOPE").is_empty());
        assert!(forest.select("").is_empty());
        assert!(forest.select(".").is_empty());
    }
}
