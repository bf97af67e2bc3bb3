//! Shared test fixtures: a miniature GEDCOM 7 registry schema covering the
//! structure types, payload classes, enumeration sets, and calendars the
//! tests exercise.

use serde_json::{json, Value};

use crate::schema::Schema;

fn g7(name: &str) -> String {
    format!("https://gedcom.io/terms/v7/{}", name)
}

pub(crate) fn schema_json() -> Value {
    let months: Vec<&str> = vec![
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    let month_map: serde_json::Map<String, Value> = months
        .iter()
        .map(|m| (m.to_string(), Value::String(g7(&format!("month-{}", m)))))
        .collect();
    let month_tags: serde_json::Map<String, Value> = months
        .iter()
        .map(|m| (g7(&format!("month-{}", m)), Value::String(m.to_string())))
        .collect();

    let mut value = json!({
        "substructure": {
            "": {
                "HEAD": {"type": g7("HEAD"), "cardinality": "{1:1}"},
                "INDI": {"type": g7("record-INDI"), "cardinality": "{0:M}"},
                "FAM": {"type": g7("record-FAM"), "cardinality": "{0:M}"},
                "SNOTE": {"type": g7("record-SNOTE"), "cardinality": "{0:M}"},
            },
            g7("HEAD"): {
                "GEDC": {"type": g7("GEDC"), "cardinality": "{1:1}"},
                "SCHMA": {"type": g7("SCHMA"), "cardinality": "{0:1}"},
                "LANG": {"type": g7("HEAD-LANG"), "cardinality": "{0:1}"},
            },
            g7("GEDC"): {
                "VERS": {"type": g7("GEDC-VERS"), "cardinality": "{1:1}"},
            },
            g7("GEDC-VERS"): {},
            g7("SCHMA"): {
                "TAG": {"type": g7("TAG"), "cardinality": "{0:M}"},
            },
            g7("TAG"): {},
            g7("HEAD-LANG"): {},
            g7("record-INDI"): {
                "NAME": {"type": g7("NAME"), "cardinality": "{0:M}"},
                "SEX": {"type": g7("SEX"), "cardinality": "{0:1}"},
                "BIRT": {"type": g7("BIRT"), "cardinality": "{0:M}"},
                "EXID": {"type": g7("EXID"), "cardinality": "{0:M}"},
                "PERI": {"type": g7("PERI"), "cardinality": "{0:M}"},
            },
            g7("NAME"): {
                "SURN": {"type": g7("SURN"), "cardinality": "{0:1}"},
            },
            g7("SURN"): {},
            g7("SEX"): {},
            g7("BIRT"): {
                "DATE": {"type": g7("DATE"), "cardinality": "{0:1}"},
                "AGE": {"type": g7("AGE"), "cardinality": "{0:1}"},
            },
            g7("DATE"): {
                "TIME": {"type": g7("TIME"), "cardinality": "{0:1}"},
            },
            g7("TIME"): {},
            g7("AGE"): {},
            g7("EXID"): {
                "TYPE": {"type": g7("EXID-TYPE"), "cardinality": "{0:1}"},
            },
            g7("EXID-TYPE"): {},
            g7("PERI"): {},
            g7("record-FAM"): {
                "HUSB": {"type": g7("FAM-HUSB"), "cardinality": "{0:1}"},
                "WIFE": {"type": g7("FAM-WIFE"), "cardinality": "{0:1}"},
                "CHIL": {"type": g7("CHIL"), "cardinality": "{0:M}"},
            },
            g7("FAM-HUSB"): {},
            g7("FAM-WIFE"): {},
            g7("CHIL"): {},
            g7("record-SNOTE"): {},
        },
        "payload": {
            g7("HEAD"): null,
            g7("GEDC"): null,
            g7("GEDC-VERS"): {"type": "http://www.w3.org/2001/XMLSchema#string"},
            g7("SCHMA"): null,
            g7("TAG"): {"type": "http://www.w3.org/2001/XMLSchema#string"},
            g7("HEAD-LANG"): {"type": "http://www.w3.org/2001/XMLSchema#Language"},
            g7("record-INDI"): null,
            g7("record-FAM"): null,
            g7("record-SNOTE"): {"type": "http://www.w3.org/2001/XMLSchema#string"},
            g7("NAME"): {"type": g7("type-Name")},
            g7("SURN"): {"type": "http://www.w3.org/2001/XMLSchema#string"},
            g7("SEX"): {"type": g7("type-Enum"), "set": g7("enumset-SEX")},
            g7("BIRT"): {"type": "Y|<NULL>"},
            g7("DATE"): {"type": g7("type-Date")},
            g7("TIME"): {"type": g7("type-Time")},
            g7("AGE"): {"type": g7("type-Age")},
            g7("EXID"): {"type": "http://www.w3.org/2001/XMLSchema#string"},
            g7("EXID-TYPE"): {"type": "http://www.w3.org/2001/XMLSchema#string"},
            g7("PERI"): {"type": g7("type-Date#period")},
            g7("FAM-HUSB"): {"to": g7("record-INDI")},
            g7("FAM-WIFE"): {"to": g7("record-INDI")},
            g7("CHIL"): {"to": g7("record-INDI")},
        },
        "set": {
            g7("enumset-SEX"): {
                "M": g7("enum-M"),
                "F": g7("enum-F"),
                "U": g7("enum-U"),
            },
        },
        "calendar": {
            "GREGORIAN": {
                "type": g7("cal-GREGORIAN"),
                "months": month_map,
                "epochs": ["BCE"],
            },
            "JULIAN": {
                "type": g7("cal-JULIAN"),
                "months": {"JAN": g7("month-JAN"), "FEB": g7("month-FEB")},
                "epochs": ["BCE"],
            },
        },
        "tag": {},
        "tagInContext": {
            "struct": {},
            "enum": {
                g7("enum-M"): "M",
                g7("enum-F"): "F",
                g7("enum-U"): "U",
            },
            "cal": {
                g7("cal-GREGORIAN"): "GREGORIAN",
                g7("cal-JULIAN"): "JULIAN",
            },
            "month": month_tags,
        },
    });

    // Every structure URI gets a recommended tag and a struct context
    // entry, derived from the substructure maps.
    let mut tags = serde_json::Map::new();
    let mut struct_ctx = serde_json::Map::new();
    if let Some(containers) = value["substructure"].as_object() {
        for members in containers.values() {
            if let Some(members) = members.as_object() {
                for (tag, def) in members {
                    let uri = def["type"].as_str().expect("fixture type").to_string();
                    tags.insert(uri.clone(), Value::String(tag.clone()));
                    struct_ctx.insert(uri, Value::String(tag.clone()));
                }
            }
        }
    }
    for (uri, tag) in [
        (g7("enum-M"), "M"),
        (g7("enum-F"), "F"),
        (g7("enum-U"), "U"),
        (g7("cal-GREGORIAN"), "GREGORIAN"),
        (g7("cal-JULIAN"), "JULIAN"),
    ] {
        tags.insert(uri, Value::String(tag.to_string()));
    }
    for (uri, tag) in month_tags_pairs() {
        tags.insert(uri, Value::String(tag));
    }
    value["tag"] = Value::Object(tags);
    value["tagInContext"]["struct"] = Value::Object(struct_ctx);
    value
}

fn month_tags_pairs() -> Vec<(String, String)> {
    [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ]
    .iter()
    .map(|m| (g7(&format!("month-{}", m)), m.to_string()))
    .collect()
}

pub(crate) fn schema() -> Schema {
    Schema::from_json(schema_json()).expect("fixture schema ingests")
}
