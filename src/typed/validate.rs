//! Dataset validation: cardinality, empty structures, payload
//! conformance, and deprecation checks.
//!
//! All violations are reported in a single pass, each prefixed with the
//! offending structure's type, and the pass returns how many errors it
//! recorded so callers can gate downstream behavior.

use crate::schema::{Cardinality, PayloadSpec};

use super::{G7Dataset, G7Payload, StructId};

const EXID: &str = "https://gedcom.io/terms/v7/EXID";
const EXID_TYPE: &str = "https://gedcom.io/terms/v7/EXID-TYPE";

pub(super) fn validate(ds: &mut G7Dataset) -> usize {
    let before = ds.lookup.diag.error_count();
    let mut roots = vec![ds.header];
    for (_, ids) in &ds.records {
        roots.extend(ids.iter().copied());
    }
    for id in roots {
        structure(ds, id);
    }
    ds.lookup.diag.error_count() - before
}

fn structure(ds: &mut G7Dataset, id: StructId) {
    let type_ = ds.structs[id.0].type_.clone();

    // Drop empty child lists so cardinality counts and emptiness see the
    // real children.
    ds.structs[id.0].sub.retain(|_, ids| !ids.is_empty());

    ds.lookup.diag.push_prefix(format!("{}: ", type_));

    let specs: Vec<(String, Cardinality)> = ds
        .lookup
        .schema()
        .members(&type_)
        .map(|members| {
            members
                .values()
                .map(|def| (def.type_.clone(), def.cardinality))
                .collect()
        })
        .unwrap_or_default();
    for (child, cardinality) in specs {
        let count = ds.structs[id.0].sub.get(&child).map_or(0, Vec::len);
        if cardinality.min >= 1 && count == 0 {
            ds.lookup
                .diag
                .error(format!("Missing substructure {}", child));
        }
        if let Some(max) = cardinality.max {
            if count > max as usize {
                ds.lookup.diag.error(format!(
                    "Substructure {} appears {} times but is limited to {}",
                    child, count, max
                ));
            }
        }
    }

    if ds.structs[id.0].sub_order.is_empty() && ds.structs[id.0].payload.is_empty() {
        ds.lookup.diag.error("empty structure");
    }

    payload(ds, id, &type_);

    if type_ == EXID && ds.structs[id.0].sub.get(EXID_TYPE).is_none() {
        ds.lookup
            .diag
            .warn("EXID without EXID-TYPE is deprecated");
    }

    ds.lookup.diag.pop_prefix();

    for child in ds.structs[id.0].sub_order.clone() {
        structure(ds, child);
    }
}

/// Checks that the stored payload variant conforms to the schema's
/// payload descriptor. Payloads were normalized at construction, so this
/// catches structural mismatches: payloads on payloadless types and
/// pointers where values belong (or vice versa).
fn payload(ds: &mut G7Dataset, id: StructId, type_: &str) {
    let spec = ds.lookup.payload(type_);
    let value = &ds.structs[id.0].payload;
    match (&spec, value) {
        (PayloadSpec::None, G7Payload::Absent) => {}
        (PayloadSpec::None, _) => {
            ds.lookup.diag.error("structure does not admit a payload");
        }
        (PayloadSpec::Pointer { .. }, G7Payload::Pointer(_) | G7Payload::Void) => {}
        (PayloadSpec::Pointer { .. }, G7Payload::Absent) => {
            ds.lookup.diag.error("missing pointer payload");
        }
        (PayloadSpec::Pointer { .. }, _) => {
            ds.lookup.diag.error("expected a pointer payload");
        }
        (_, G7Payload::Pointer(_) | G7Payload::Void) => {
            ds.lookup.diag.error("payload must not be a pointer");
        }
        _ => {}
    }
}
