//! JSON codec for the tag layer.
//!
//! A forest is an array of `{tag, id?, (href|text)?, sub?}` nodes. `href`
//! carries the identifier of the pointed-to structure (`null` for the
//! `@VOID@` sentinel); `text` carries a string payload with continuation
//! lines already spliced. Decoding mirrors the text parser's two passes:
//! nodes first, pointer binding after.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::error::JsonError;
use crate::Diagnostics;

use super::{GedcForest, GedcPayload, NodeId};

pub(super) fn to_json(forest: &GedcForest) -> Value {
    let ids = forest.assign_ids();
    Value::Array(
        forest
            .roots
            .iter()
            .map(|&root| node_to_json(forest, &ids, root))
            .collect(),
    )
}

fn node_to_json(forest: &GedcForest, ids: &FxHashMap<NodeId, String>, id: NodeId) -> Value {
    let node = &forest.nodes[id.0];
    let mut obj = Map::new();
    obj.insert("tag".to_string(), Value::String(node.tag.clone()));
    if let Some(xref) = ids.get(&id) {
        obj.insert("id".to_string(), Value::String(xref.clone()));
    }
    match &node.payload {
        GedcPayload::Absent => {}
        GedcPayload::Text(text) => {
            obj.insert("text".to_string(), Value::String(text.clone()));
        }
        GedcPayload::Pointer(target) => {
            obj.insert("href".to_string(), Value::String(ids[target].clone()));
        }
        GedcPayload::Void => {
            obj.insert("href".to_string(), Value::Null);
        }
    }
    if !node.sub.is_empty() {
        obj.insert(
            "sub".to_string(),
            Value::Array(
                node.sub
                    .iter()
                    .map(|&child| node_to_json(forest, ids, child))
                    .collect(),
            ),
        );
    }
    Value::Object(obj)
}

pub(super) fn from_json(value: &Value, diag: &mut Diagnostics) -> Result<GedcForest, JsonError> {
    let nodes = value.as_array().ok_or(JsonError::UnexpectedShape {
        expected: "array of nodes",
        path: "$".to_string(),
    })?;

    let mut decoder = Decoder {
        forest: GedcForest::new(),
        ids: FxHashMap::default(),
        pending: Vec::new(),
    };
    for (i, node) in nodes.iter().enumerate() {
        decoder.node(node, None, &format!("$[{}]", i), diag)?;
    }

    for (node, name) in decoder.pending {
        match decoder.ids.get(&name) {
            Some(&target) => {
                decoder.forest.nodes[node.0].payload = GedcPayload::Pointer(target);
                decoder.forest.push_reference(target, node);
            }
            None => {
                diag.error(format!("pointer to undefined xref_id @{}@", name));
                decoder.forest.nodes[node.0].payload = GedcPayload::Void;
            }
        }
    }
    Ok(decoder.forest)
}

struct Decoder {
    forest: GedcForest,
    ids: FxHashMap<String, NodeId>,
    pending: Vec<(NodeId, String)>,
}

impl Decoder {
    fn node(
        &mut self,
        value: &Value,
        parent: Option<NodeId>,
        path: &str,
        diag: &mut Diagnostics,
    ) -> Result<(), JsonError> {
        let obj = value.as_object().ok_or_else(|| JsonError::UnexpectedShape {
            expected: "node object",
            path: path.to_string(),
        })?;
        let tag = obj
            .get("tag")
            .ok_or_else(|| JsonError::MissingMember {
                member: "tag",
                path: path.to_string(),
            })?
            .as_str()
            .ok_or_else(|| JsonError::UnexpectedShape {
                expected: "string tag",
                path: path.to_string(),
            })?;

        let id = match parent {
            Some(p) => self.forest.add_child(p, tag),
            None => self.forest.add_root(tag),
        };

        if let Some(xref) = obj.get("id") {
            let xref = xref.as_str().ok_or_else(|| JsonError::UnexpectedShape {
                expected: "string id",
                path: path.to_string(),
            })?;
            if xref == "VOID" {
                diag.error("xref_id @VOID@ is reserved");
            } else if self.ids.contains_key(xref) {
                diag.error(format!("xref_id @{}@ redefined", xref));
            } else {
                self.ids.insert(xref.to_string(), id);
                self.forest.nodes[id.0].xref_id = Some(xref.to_string());
            }
        }

        match (obj.get("href"), obj.get("text")) {
            (Some(_), Some(_)) => {
                return Err(JsonError::UnexpectedShape {
                    expected: "href or text, not both",
                    path: path.to_string(),
                });
            }
            (Some(Value::Null), None) => self.forest.nodes[id.0].payload = GedcPayload::Void,
            (Some(Value::String(name)), None) => {
                if name == "VOID" {
                    self.forest.nodes[id.0].payload = GedcPayload::Void;
                } else {
                    self.pending.push((id, name.clone()));
                }
            }
            (Some(_), None) => {
                return Err(JsonError::UnexpectedShape {
                    expected: "string or null href",
                    path: path.to_string(),
                });
            }
            (None, Some(Value::String(text))) => {
                self.forest.nodes[id.0].payload = GedcPayload::Text(text.clone());
            }
            (None, Some(_)) => {
                return Err(JsonError::UnexpectedShape {
                    expected: "string text",
                    path: path.to_string(),
                });
            }
            (None, None) => {}
        }

        if let Some(sub) = obj.get("sub") {
            let children = sub.as_array().ok_or_else(|| JsonError::UnexpectedShape {
                expected: "array sub",
                path: path.to_string(),
            })?;
            for (i, child) in children.iter().enumerate() {
                self.node(child, Some(id), &format!("{}.sub[{}]", path, i), diag)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::GEDCOM7;
    use serde_json::json;

    #[test]
    fn test_json_shape() {
        let mut diag = Diagnostics::new();
        let forest = GedcForest::parse(
            "0 HEAD\n1 NOTE a\n2 CONT b\n0 @I1@ INDI\n0 FAM\n1 HUSB @I1@\n1 WIFE @VOID@\n0 TRLR\n",
            &GEDCOM7,
            &mut diag,
        )
        .unwrap();
        let value = forest.to_json();
        assert_eq!(
            value,
            json!([
                {"tag": "HEAD", "sub": [{"tag": "NOTE", "text": "a\nb"}]},
                {"tag": "INDI", "id": "I1"},
                {"tag": "FAM", "sub": [
                    {"tag": "HUSB", "href": "I1"},
                    {"tag": "WIFE", "href": null},
                ]},
                {"tag": "TRLR"},
            ])
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let src = "0 HEAD\n1 GEDC\n2 VERS 7.0\n0 @I1@ INDI\n0 FAM\n1 HUSB @I1@\n0 TRLR\n";
        let mut diag = Diagnostics::new();
        let forest = GedcForest::parse(src, &GEDCOM7, &mut diag).unwrap();
        let value = forest.to_json();
        let reparsed = GedcForest::from_json(&value, &mut diag).unwrap();
        assert_eq!(reparsed.write(&GEDCOM7).unwrap(), src);
        assert!(diag.errors().is_empty(), "{:?}", diag.errors());
    }

    #[test]
    fn test_json_unresolved_pointer() {
        let mut diag = Diagnostics::new();
        let forest = GedcForest::from_json(
            &json!([{"tag": "FAM", "sub": [{"tag": "HUSB", "href": "X9"}]}]),
            &mut diag,
        )
        .unwrap();
        assert!(diag.errors()[0].contains("pointer to undefined xref_id @X9@"));
        let husb = forest.sub(forest.roots()[0])[0];
        assert_eq!(*forest.payload(husb), GedcPayload::Void);
    }

    #[test]
    fn test_json_bad_shape_is_fatal() {
        let mut diag = Diagnostics::new();
        assert!(GedcForest::from_json(&json!({"tag": "HEAD"}), &mut diag).is_err());
        assert!(GedcForest::from_json(&json!([{"sub": []}]), &mut diag).is_err());
        assert!(GedcForest::from_json(
            &json!([{"tag": "A", "text": "x", "href": null}]),
            &mut diag
        )
        .is_err());
    }
}
