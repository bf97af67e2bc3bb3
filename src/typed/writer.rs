//! Serializing a typed dataset back to a tag forest.
//!
//! A first pass reserves a serialized tag for every type, enumeration
//! value, calendar, and month URI in use; anything that is not standard
//! in its context lands in the extension reservation table. The forest is
//! then built — header first, with the minimal `SCHMA` block when any
//! extension tag is in use, then records grouped by type — and closed
//! with `TRLR`. Pointer payloads are filled in through an identity map in
//! a final pass.

use rustc_hash::FxHashMap;

use crate::gedc::{GedcForest, NodeId};
use crate::schema::{PayloadKind, PayloadSpec, TagKind};
use crate::types::DateValue;

use super::{payload_text, G7Dataset, G7Payload, StructId};

pub(super) fn to_forest(ds: &mut G7Dataset) -> GedcForest {
    ds.lookup.begin_reservation();
    reserve_all(ds);

    let mut forest = GedcForest::new();
    let mut map: FxHashMap<StructId, NodeId> = FxHashMap::default();
    let mut fixups: Vec<(NodeId, StructId)> = Vec::new();

    let header = ds.header;
    emit(ds, &mut forest, header, None, &mut map, &mut fixups);

    let entries = ds.lookup.schema_entries();
    if !entries.is_empty() {
        let schma = forest.add_child(map[&header], "SCHMA");
        for (tag, uri) in entries {
            let node = forest.add_child(schma, "TAG");
            forest.set_text(node, format!("{} {}", tag, uri));
        }
    }

    let record_ids: Vec<StructId> = ds
        .records
        .iter()
        .flat_map(|(_, ids)| ids.iter().copied())
        .collect();
    for id in record_ids {
        emit(ds, &mut forest, id, None, &mut map, &mut fixups);
    }

    forest.add_root("TRLR");

    for (node, target) in fixups {
        match map.get(&target) {
            Some(&target_node) => forest.set_pointer(node, target_node),
            None => forest.set_void(node),
        }
    }
    forest
}

/// Walks the dataset reserving tags for every URI that will serialize:
/// structure types in their containers, enumeration values in their sets,
/// and the calendars and months inside date payloads.
fn reserve_all(ds: &mut G7Dataset) {
    for id in ds.document_order() {
        let type_ = ds.structs[id.0].type_.clone();
        let within = match ds.structs[id.0].sup {
            Some(parent) => ds.structs[parent.0].type_.clone(),
            None => String::new(),
        };
        ds.lookup.reserve_tag(&type_, TagKind::Structure, &within);

        match ds.structs[id.0].payload.clone() {
            G7Payload::Enum(value) => reserve_enum(ds, &type_, &value),
            G7Payload::ListEnum(values) => {
                for value in values {
                    reserve_enum(ds, &type_, &value);
                }
            }
            G7Payload::Date(date) => reserve_date_vocab(ds, &date),
            G7Payload::DateValue(value) => match value {
                DateValue::Empty => {}
                DateValue::Single(d)
                | DateValue::About(d)
                | DateValue::Calculated(d)
                | DateValue::Estimated(d) => reserve_date_vocab(ds, &d),
                DateValue::Range { start, end } => {
                    for d in [start, end].into_iter().flatten() {
                        reserve_date_vocab(ds, &d);
                    }
                }
                DateValue::Period { from, to } => {
                    for d in [from, to].into_iter().flatten() {
                        reserve_date_vocab(ds, &d);
                    }
                }
            },
            _ => {}
        }
    }
}

fn reserve_enum(ds: &mut G7Dataset, type_: &str, value: &str) {
    let set = match ds.lookup.payload(type_) {
        PayloadSpec::Kind(PayloadKind::Enum { set })
        | PayloadSpec::Kind(PayloadKind::ListEnum { set }) => set,
        _ => String::new(),
    };
    ds.lookup.reserve_tag(value, TagKind::EnumValue, &set);
}

fn reserve_date_vocab(ds: &mut G7Dataset, date: &crate::types::Date) {
    ds.lookup
        .reserve_tag(&date.calendar, TagKind::Calendar, "");
    if let Some(month) = &date.month {
        ds.lookup
            .reserve_tag(month, TagKind::Month, &date.calendar);
    }
}

fn emit(
    ds: &mut G7Dataset,
    forest: &mut GedcForest,
    id: StructId,
    parent: Option<NodeId>,
    map: &mut FxHashMap<StructId, NodeId>,
    fixups: &mut Vec<(NodeId, StructId)>,
) {
    let type_ = ds.structs[id.0].type_.clone();
    let within = match ds.structs[id.0].sup {
        Some(p) => ds.structs[p.0].type_.clone(),
        None => String::new(),
    };
    let tag = ds.lookup.reserve_tag(&type_, TagKind::Structure, &within);

    let node = match parent {
        Some(p) => forest.add_child(p, &tag),
        None => forest.add_root(&tag),
    };
    map.insert(id, node);
    forest.set_xref_id(node, ds.structs[id.0].xref_id.clone());

    match &ds.structs[id.0].payload {
        G7Payload::Absent => {}
        G7Payload::Void => forest.set_void(node),
        G7Payload::Pointer(target) => fixups.push((node, *target)),
        other => {
            if let Some(text) = payload_text(&ds.lookup, other) {
                forest.set_text(node, text);
            }
        }
    }

    for child in ds.structs[id.0].sub_order.clone() {
        emit(ds, forest, child, Some(node), map, fixups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::GEDCOM7;
    use crate::schema::Lookup;
    use crate::testutil;
    use crate::Diagnostics;

    fn convert(src: &str) -> G7Dataset {
        let mut diag = Diagnostics::new();
        let forest = GedcForest::parse(src, &GEDCOM7, &mut diag).expect("parseable");
        assert!(diag.errors().is_empty(), "{:?}", diag.errors());
        G7Dataset::from_forest(&forest, Lookup::new(testutil::schema()))
    }

    #[test]
    fn test_roundtrip_minimum() {
        let src = "0 HEAD\n1 GEDC\n2 VERS 7.0\n0 TRLR\n";
        let mut ds = convert(src);
        let text = ds.to_forest().write(&GEDCOM7).unwrap();
        assert_eq!(text, src);
    }

    #[test]
    fn test_roundtrip_records_and_pointers() {
        let src = concat!(
            "0 HEAD\n1 GEDC\n2 VERS 7.0\n",
            "0 @I1@ INDI\n1 NAME John /Doe/\n1 SEX M\n",
            "1 BIRT Y\n2 DATE 1 JAN 1990\n",
            "0 @F1@ FAM\n1 HUSB @I1@\n1 WIFE @VOID@\n",
            "0 TRLR\n",
        );
        let mut ds = convert(src);
        assert!(ds.lookup().diag.errors().is_empty(), "{:?}", ds.lookup().diag.errors());
        let text = ds.to_forest().write(&GEDCOM7).unwrap();
        assert_eq!(text, src);
    }

    #[test]
    fn test_schma_regenerated_for_extensions() {
        let src = concat!(
            "0 HEAD\n1 GEDC\n2 VERS 7.0\n",
            "1 SCHMA\n2 TAG _FOO https://example.com/foo\n",
            "0 @I1@ INDI\n1 _FOO bar\n",
            "0 TRLR\n",
        );
        let mut ds = convert(src);
        let forest = ds.to_forest();
        let text = forest.write(&GEDCOM7).unwrap();
        assert!(
            text.contains("1 SCHMA\n2 TAG _FOO https://example.com/foo\n"),
            "{}",
            text
        );
        assert!(text.contains("1 _FOO bar\n"), "{}", text);
    }

    #[test]
    fn test_undocumented_extension_keeps_tag_without_schma() {
        let src = concat!(
            "0 HEAD\n1 GEDC\n2 VERS 7.0\n",
            "0 @I1@ INDI\n1 _BARE data\n",
            "0 TRLR\n",
        );
        let mut ds = convert(src);
        let text = ds.to_forest().write(&GEDCOM7).unwrap();
        assert!(text.contains("1 _BARE data\n"), "{}", text);
        assert!(!text.contains("SCHMA"), "{}", text);
    }

    #[test]
    fn test_relocated_standard_structure_gets_extension_tag() {
        let mut ds = convert("0 HEAD\n1 GEDC\n2 VERS 7.0\n0 @F1@ FAM\n0 TRLR\n");
        let fam = ds.select_first(".FAM").unwrap();
        // Attach a NAME (standard under INDI) beneath a FAM record.
        let g7_name = "https://gedcom.io/terms/v7/NAME";
        let name = ds.add_substructure(fam, g7_name, Some("Irregular"));
        assert_eq!(ds.type_of(name), g7_name);
        let text = ds.to_forest().write(&GEDCOM7).unwrap();
        assert!(text.contains("1 _NAME Irregular\n"), "{}", text);
        assert!(
            text.contains(&format!("2 TAG _NAME {}\n", g7_name)),
            "{}",
            text
        );
    }

    #[test]
    fn test_trailer_closes_forest() {
        let mut ds = convert("0 HEAD\n1 GEDC\n2 VERS 7.0\n0 TRLR\n");
        let forest = ds.to_forest();
        let last = *forest.roots().last().unwrap();
        assert_eq!(forest.tag(last), "TRLR");
    }
}
