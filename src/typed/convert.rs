//! Converting a parsed tag forest into a typed dataset.
//!
//! `HEAD.SCHMA` is read first so that extension tags classify correctly
//! everywhere, then consumed — the block is regenerated from the live
//! extension table on serialization. Conversion proper walks the forest,
//! resolving every (container, tag) pair through the lookup and parsing
//! payloads; pointers are bound in a final pass over an identity map.

use rustc_hash::FxHashMap;

use crate::gedc::{GedcForest, GedcPayload, NodeId};
use crate::schema::Lookup;

use super::{bind_pointer, parse_payload_text, G7Dataset, G7Payload, StructId};

pub(super) fn from_forest(forest: &GedcForest, lookup: Lookup) -> G7Dataset {
    let mut ds = G7Dataset::new(lookup);

    // Extension declarations first: they change how every later tag
    // classifies.
    for tag_node in forest.select(".HEAD.SCHMA.TAG") {
        match forest.text(tag_node).and_then(|t| t.split_once(' ')) {
            Some((tag, uri)) if tag.starts_with('_') && !uri.trim().is_empty() => {
                ds.lookup.add_extension(tag, uri.trim());
            }
            _ => {
                let text = forest.text(tag_node).unwrap_or_default();
                ds.lookup
                    .diag
                    .error(format!("malformed SCHMA TAG payload {:?}", text));
            }
        }
    }

    if let Some(vers) = forest.select_first(".HEAD.GEDC.VERS") {
        if let Some(version) = forest.text(vers) {
            if version != "7" && !version.starts_with("7.") {
                ds.lookup.diag.warn(format!(
                    "expected GEDCOM version 7.x, found {}",
                    version
                ));
            }
        }
    }

    match forest.roots().last() {
        Some(&last) if forest.tag(last) == "TRLR" => {}
        _ => ds.lookup.diag.error("document does not end with TRLR"),
    }

    let mut map: FxHashMap<NodeId, StructId> = FxHashMap::default();
    let mut pending: Vec<(StructId, NodeId)> = Vec::new();
    let mut head_seen = false;

    for &root in forest.roots() {
        let tag = forest.tag(root);
        if tag == "TRLR" {
            continue;
        }
        if tag == "HEAD" && !head_seen {
            head_seen = true;
            let header = ds.header();
            map.insert(root, header);
            for &child in forest.sub(root) {
                // SCHMA was consumed above.
                if forest.tag(child) == "SCHMA" {
                    continue;
                }
                convert_node(&mut ds, forest, child, header, &mut map, &mut pending);
            }
            continue;
        }

        let type_ = ds.lookup.record(tag).type_;
        let record = ds.push_record(type_);
        ds.set_xref_id(record, forest.xref_id(root).map(str::to_string));
        map.insert(root, record);
        apply_payload(&mut ds, forest, root, record, &mut pending);
        for &child in forest.sub(root) {
            convert_node(&mut ds, forest, child, record, &mut map, &mut pending);
        }
    }

    if !head_seen {
        ds.lookup.diag.error("document has no HEAD record");
    }

    // Pointer fix-up: swap tag-structure targets for typed ones.
    for (source, node) in pending {
        match map.get(&node) {
            Some(&target) => bind_pointer(&mut ds, source, target),
            None => {
                ds.structs[source.0].payload = G7Payload::Void;
                ds.lookup
                    .diag
                    .error("pointer to a structure outside the dataset");
            }
        }
    }
    ds
}

fn convert_node(
    ds: &mut G7Dataset,
    forest: &GedcForest,
    node: NodeId,
    parent: StructId,
    map: &mut FxHashMap<NodeId, StructId>,
    pending: &mut Vec<(StructId, NodeId)>,
) {
    let parent_type = ds.structs[parent.0].type_.clone();
    let type_ = ds.lookup.substructure(&parent_type, forest.tag(node)).type_;
    let id = ds.push_substructure(parent, type_);
    ds.set_xref_id(id, forest.xref_id(node).map(str::to_string));
    map.insert(node, id);
    apply_payload(ds, forest, node, id, pending);
    for &child in forest.sub(node) {
        convert_node(ds, forest, child, id, map, pending);
    }
}

fn apply_payload(
    ds: &mut G7Dataset,
    forest: &GedcForest,
    node: NodeId,
    id: StructId,
    pending: &mut Vec<(StructId, NodeId)>,
) {
    match forest.payload(node) {
        GedcPayload::Absent => {}
        GedcPayload::Text(text) => {
            let type_ = ds.structs[id.0].type_.clone();
            ds.structs[id.0].payload = parse_payload_text(&mut ds.lookup, &type_, text);
        }
        GedcPayload::Pointer(target) => pending.push((id, *target)),
        GedcPayload::Void => ds.structs[id.0].payload = G7Payload::Void,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::GEDCOM7;
    use crate::testutil;
    use crate::Diagnostics;

    fn g7(name: &str) -> String {
        format!("https://gedcom.io/terms/v7/{}", name)
    }

    fn convert(src: &str) -> G7Dataset {
        let mut diag = Diagnostics::new();
        let forest = GedcForest::parse(src, &GEDCOM7, &mut diag).expect("parseable");
        assert!(diag.errors().is_empty(), "{:?}", diag.errors());
        G7Dataset::from_forest(&forest, Lookup::new(testutil::schema()))
    }

    #[test]
    fn test_minimum_dataset() {
        let ds = convert("0 HEAD\n1 GEDC\n2 VERS 7.0\n0 TRLR\n");
        assert!(ds.lookup().diag.errors().is_empty(), "{:?}", ds.lookup().diag.errors());
        assert_eq!(ds.records().count(), 0);
        let vers = ds.select_first(".HEAD.GEDC.VERS").unwrap();
        assert_eq!(*ds.payload(vers), G7Payload::Text("7.0".to_string()));
    }

    #[test]
    fn test_version_mismatch_warns() {
        let ds = convert("0 HEAD\n1 GEDC\n2 VERS 5.5.1\n0 TRLR\n");
        assert!(ds
            .lookup()
            .diag
            .warnings()
            .iter()
            .any(|w| w.contains("expected GEDCOM version 7.x, found 5.5.1")));
    }

    #[test]
    fn test_missing_trailer_is_error() {
        let ds = convert("0 HEAD\n1 GEDC\n2 VERS 7.0\n");
        assert!(ds
            .lookup()
            .diag
            .errors()
            .iter()
            .any(|e| e.contains("does not end with TRLR")));
    }

    #[test]
    fn test_void_pointer_stays_void() {
        let ds = convert(
            "0 HEAD\n1 GEDC\n2 VERS 7.0\n0 @F1@ FAM\n1 HUSB @VOID@\n0 TRLR\n",
        );
        assert!(ds.lookup().diag.errors().is_empty(), "{:?}", ds.lookup().diag.errors());
        let husb = ds.select_first("FAM.HUSB").unwrap();
        assert_eq!(*ds.payload(husb), G7Payload::Void);
    }

    #[test]
    fn test_pointers_bind_to_typed_records() {
        let ds = convert(
            "0 HEAD\n1 GEDC\n2 VERS 7.0\n0 @I1@ INDI\n0 @F1@ FAM\n1 HUSB @I1@\n0 TRLR\n",
        );
        assert!(ds.lookup().diag.errors().is_empty(), "{:?}", ds.lookup().diag.errors());
        let indi = ds.select_first(".INDI").unwrap();
        let husb = ds.select_first("FAM.HUSB").unwrap();
        assert_eq!(*ds.payload(husb), G7Payload::Pointer(indi));
        assert_eq!(ds.references(indi), [husb]);
        assert_eq!(ds.xref_id(indi), Some("I1"));
    }

    #[test]
    fn test_pointer_to_wrong_record_type() {
        let ds = convert(
            "0 HEAD\n1 GEDC\n2 VERS 7.0\n0 @F1@ FAM\n0 @F2@ FAM\n1 HUSB @F1@\n0 TRLR\n",
        );
        let husb = ds.select_first("FAM.HUSB").unwrap();
        assert_eq!(*ds.payload(husb), G7Payload::Void);
        assert!(ds
            .lookup()
            .diag
            .errors()
            .iter()
            .any(|e| e.contains("expected") && e.contains("record-INDI")));
    }

    #[test]
    fn test_schma_extension_classification() {
        let ds = convert(
            "0 HEAD\n1 GEDC\n2 VERS 7.0\n1 SCHMA\n2 TAG _FOO https://example.com/foo\n0 @I1@ INDI\n1 _FOO bar\n0 TRLR\n",
        );
        let warnings = ds.lookup().diag.warnings();
        assert!(
            warnings
                .iter()
                .any(|w| w.contains("Unregistered extension https://example.com/foo")),
            "{:?}",
            warnings
        );
        assert!(
            !warnings.iter().any(|w| w.contains("Undocumented")),
            "{:?}",
            warnings
        );
        let indi = ds.select_first(".INDI").unwrap();
        let ext = ds.sub_of_type(indi, "https://example.com/foo");
        assert_eq!(ext.len(), 1);
        assert_eq!(*ds.payload(ext[0]), G7Payload::Text("bar".to_string()));
    }

    #[test]
    fn test_schma_block_is_consumed() {
        let ds = convert(
            "0 HEAD\n1 GEDC\n2 VERS 7.0\n1 SCHMA\n2 TAG _FOO https://example.com/foo\n0 TRLR\n",
        );
        let head = ds.header();
        assert!(ds.sub_of_type(head, &g7("SCHMA")).is_empty());
        assert_eq!(ds.lookup().extension_uris("_FOO"), ["https://example.com/foo"]);
    }

    #[test]
    fn test_typed_payloads_from_text() {
        let ds = convert(
            concat!(
                "0 HEAD\n1 GEDC\n2 VERS 7.0\n",
                "0 @I1@ INDI\n",
                "1 NAME John /Doe/\n",
                "1 SEX M\n",
                "1 BIRT Y\n",
                "2 DATE 1 JAN 1990\n",
                "3 TIME 14:30\n",
                "2 AGE > 8y\n",
                "0 TRLR\n",
            ),
        );
        assert!(ds.lookup().diag.errors().is_empty(), "{:?}", ds.lookup().diag.errors());
        let date = ds.select_first("INDI.BIRT.DATE").unwrap();
        assert!(matches!(
            ds.payload(date),
            G7Payload::DateValue(crate::types::DateValue::Single(_))
        ));
        let age = ds.select_first("INDI.BIRT.AGE").unwrap();
        assert!(matches!(ds.payload(age), G7Payload::Age(_)));
        let time = ds.select_first("INDI..TIME").unwrap();
        assert!(matches!(ds.payload(time), G7Payload::Time(_)));
    }

    #[test]
    fn test_period_downgrade_end_to_end() {
        let ds = convert(
            "0 HEAD\n1 GEDC\n2 VERS 7.0\n0 @I1@ INDI\n1 PERI ABT 1 JAN 2020\n0 TRLR\n",
        );
        let peri = ds.select_first("INDI.PERI").unwrap();
        assert_eq!(
            *ds.payload(peri),
            G7Payload::DateValue(crate::types::DateValue::Empty)
        );
        assert!(ds
            .lookup()
            .diag
            .errors()
            .iter()
            .any(|e| e.contains("Expected DatePeriod, not ABT")));
    }
}
