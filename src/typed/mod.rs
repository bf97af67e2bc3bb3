//! The typed layer: a schema-aware GEDCOM 7 dataset.
//!
//! A [`G7Dataset`] owns one header, any number of records grouped by type,
//! and the [`Lookup`] that classifies tags and payloads. Structures live
//! in an arena addressed by [`StructId`]; each structure knows its type
//! (a URI, or the bare tag of an undocumented extension), its typed
//! payload, its children grouped by type in insertion order, and its
//! reverse links.
//!
//! Datasets are built four ways — record/substructure creation, conversion
//! from a tag forest, and the JSON codec — and all four share the same
//! tag resolution and payload parsing.

mod convert;
mod json;
mod validate;
mod writer;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::JsonError;
use crate::gedc::GedcForest;
use crate::schema::{Lookup, PayloadKind, PayloadSpec};
use crate::selector::{self, Queryable};
use crate::types::{self, scalars, Age, Date, DateValue, Time};

/// Arena handle for a structure within one [`G7Dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructId(pub(crate) usize);

/// Typed payload of a structure.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum G7Payload {
    /// No payload.
    #[default]
    Absent,
    /// The null-pointer sentinel.
    Void,
    /// Pointer to a record in the same dataset.
    Pointer(StructId),
    /// Free text (also `Y|<NULL>` payloads, stored as `"Y"`).
    Text(String),
    /// A non-negative integer.
    Integer(u64),
    Age(Age),
    Time(Time),
    /// An exact single date (`type-Date#exact`).
    Date(Date),
    /// The `type-Date` union, including `#period` restrictions.
    DateValue(DateValue),
    /// An enumeration value: its URI, or a bare extension tag.
    Enum(String),
    ListText(Vec<String>),
    /// Enumeration values, URIs or bare extension tags.
    ListEnum(Vec<String>),
}

impl G7Payload {
    /// True when the payload carries no information.
    pub fn is_empty(&self) -> bool {
        match self {
            G7Payload::Absent => true,
            G7Payload::Text(s) => s.is_empty(),
            G7Payload::Age(a) => a.is_empty(),
            G7Payload::DateValue(v) => v.is_empty(),
            G7Payload::ListText(items) => items.is_empty(),
            G7Payload::ListEnum(items) => items.is_empty(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct G7Structure {
    pub(crate) type_: String,
    pub(crate) payload: G7Payload,
    pub(crate) sub_order: Vec<StructId>,
    pub(crate) sub: FxHashMap<String, Vec<StructId>>,
    pub(crate) sup: Option<StructId>,
    pub(crate) referenced_by: Vec<StructId>,
    pub(crate) xref_id: Option<String>,
}

impl G7Structure {
    fn new(type_: String, sup: Option<StructId>) -> Self {
        G7Structure {
            type_,
            payload: G7Payload::Absent,
            sub_order: Vec::new(),
            sub: FxHashMap::default(),
            sup,
            referenced_by: Vec::new(),
            xref_id: None,
        }
    }
}

const DEFAULT_HEAD: &str = "https://gedcom.io/terms/v7/HEAD";

/// A typed GEDCOM 7 dataset: one header, records grouped by type, and the
/// schema lookup that owns the diagnostics.
#[derive(Debug)]
pub struct G7Dataset {
    pub(crate) structs: Vec<G7Structure>,
    pub(crate) header: StructId,
    /// Record groups in insertion order: (type, records of that type).
    pub(crate) records: Vec<(String, Vec<StructId>)>,
    pub(crate) lookup: Lookup,
}

/// Payload match for [`G7Dataset::find`] steps.
#[derive(Debug, Clone, Copy)]
pub enum PayloadFilter<'a> {
    /// Matches any payload.
    Any,
    /// Matches a payload whose canonical text equals this string (absent
    /// payloads compare as the empty string).
    Is(&'a str),
}

impl G7Dataset {
    /// Creates a dataset holding an empty header.
    pub fn new(lookup: Lookup) -> G7Dataset {
        let head_type = lookup
            .schema()
            .members("")
            .and_then(|m| m.get("HEAD"))
            .map(|def| def.type_.clone())
            .unwrap_or_else(|| DEFAULT_HEAD.to_string());
        let header = StructId(0);
        G7Dataset {
            structs: vec![G7Structure::new(head_type, None)],
            header,
            records: Vec::new(),
            lookup,
        }
    }

    /// Converts a parsed tag forest. `HEAD.SCHMA` declarations are
    /// registered (and consumed — the block is regenerated on
    /// serialization), every structure is classified and its payload
    /// parsed, and pointers are bound with record-only and target-type
    /// enforcement.
    pub fn from_forest(forest: &GedcForest, lookup: Lookup) -> G7Dataset {
        convert::from_forest(forest, lookup)
    }

    /// Serializes back to a tag forest: extension tags are reserved for
    /// every used URI, a minimal `SCHMA` block is placed under the header,
    /// records follow grouped by type, and the forest is closed with
    /// `TRLR`.
    pub fn to_forest(&mut self) -> GedcForest {
        writer::to_forest(self)
    }

    /// Validates every structure (cardinality, empty structures, payload
    /// conformance, deprecations), reporting through the diagnostics.
    /// Returns the number of errors found by this pass.
    pub fn validate(&mut self) -> usize {
        validate::validate(self)
    }

    /// Encodes as `{header, records}` JSON (see the typed node grammar).
    pub fn to_json(&self) -> Value {
        json::to_json(self)
    }

    /// Decodes the JSON form produced by [`to_json`].
    ///
    /// [`to_json`]: G7Dataset::to_json
    pub fn from_json(value: &Value, lookup: Lookup) -> Result<G7Dataset, JsonError> {
        json::from_json(value, lookup)
    }

    /// The schema lookup (diagnostics included).
    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    /// Mutable access to the lookup and its diagnostics.
    pub fn lookup_mut(&mut self) -> &mut Lookup {
        &mut self.lookup
    }

    /// The dataset header.
    pub fn header(&self) -> StructId {
        self.header
    }

    /// Record groups in insertion order.
    pub fn records(&self) -> impl Iterator<Item = (&str, &[StructId])> + '_ {
        self.records
            .iter()
            .map(|(type_, ids)| (type_.as_str(), ids.as_slice()))
    }

    /// The structure's type: a URI, or a bare undocumented-extension tag.
    pub fn type_of(&self, id: StructId) -> &str {
        &self.structs[id.0].type_
    }

    /// The structure's payload.
    pub fn payload(&self, id: StructId) -> &G7Payload {
        &self.structs[id.0].payload
    }

    /// All children in document order.
    pub fn sub(&self, id: StructId) -> &[StructId] {
        &self.structs[id.0].sub_order
    }

    /// Children of one type, in insertion order.
    pub fn sub_of_type(&self, id: StructId, type_: &str) -> &[StructId] {
        self.structs[id.0]
            .sub
            .get(type_)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The enclosing structure, or `None` for the header and records.
    pub fn sup(&self, id: StructId) -> Option<StructId> {
        self.structs[id.0].sup
    }

    /// Structures whose pointer payload targets this structure.
    pub fn references(&self, id: StructId) -> &[StructId] {
        &self.structs[id.0].referenced_by
    }

    /// The preferred cross-reference identifier.
    pub fn xref_id(&self, id: StructId) -> Option<&str> {
        self.structs[id.0].xref_id.as_deref()
    }

    /// Sets or clears the preferred cross-reference identifier.
    pub fn set_xref_id(&mut self, id: StructId, xref: Option<String>) {
        self.structs[id.0].xref_id = xref;
    }

    /// Creates a record. `type_or_tag` may be a type URI or a tag resolved
    /// at record level.
    pub fn create_record(&mut self, type_or_tag: &str) -> StructId {
        let type_ = self.resolve_type("", type_or_tag);
        self.push_record(type_)
    }

    /// Creates a substructure under `parent`, parsing `payload` (when
    /// given) against the resolved type's payload descriptor.
    pub fn add_substructure(
        &mut self,
        parent: StructId,
        type_or_tag: &str,
        payload: Option<&str>,
    ) -> StructId {
        let parent_type = self.structs[parent.0].type_.clone();
        let type_ = self.resolve_type(&parent_type, type_or_tag);
        let id = self.push_substructure(parent, type_);
        if let Some(text) = payload {
            let type_ = self.structs[id.0].type_.clone();
            self.structs[id.0].payload = parse_payload_text(&mut self.lookup, &type_, text);
        }
        id
    }

    /// Sets a structure's payload from its text form.
    pub fn set_payload_text(&mut self, id: StructId, text: &str) {
        let type_ = self.structs[id.0].type_.clone();
        self.unlink_pointer(id);
        self.structs[id.0].payload = parse_payload_text(&mut self.lookup, &type_, text);
    }

    /// Sets a pointer payload, enforcing that the target is a record and
    /// (when the payload descriptor names one) of the right type.
    pub fn set_pointer(&mut self, id: StructId, target: StructId) {
        bind_pointer(self, id, target);
    }

    /// Descends alternating (child type, payload) steps from `start`,
    /// returning the first structure at the end of the chain.
    pub fn find(&self, start: StructId, steps: &[(&str, PayloadFilter)]) -> Option<StructId> {
        let mut current = start;
        for (type_, filter) in steps {
            current = *self.structs[current.0].sub_order.iter().find(|&&child| {
                self.step_matches(child, type_)
                    && match filter {
                        PayloadFilter::Any => true,
                        PayloadFilter::Is(text) => {
                            let payload =
                                payload_text(&self.lookup, &self.structs[child.0].payload)
                                    .unwrap_or_default();
                            payload == *text
                        }
                    }
            })?;
        }
        Some(current)
    }

    /// Like [`find`], creating each missing link of the chain and reusing
    /// every matched ancestor.
    ///
    /// [`find`]: G7Dataset::find
    pub fn find_or_create(&mut self, start: StructId, steps: &[(&str, Option<&str>)]) -> StructId {
        let mut current = start;
        for &(type_, payload) in steps {
            let filter = match payload {
                Some(text) => PayloadFilter::Is(text),
                None => PayloadFilter::Any,
            };
            current = match self.find(current, &[(type_, filter)]) {
                Some(next) => next,
                None => self.add_substructure(current, type_, payload),
            };
        }
        current
    }

    /// Runs a dot-path query over the dataset. Segments match a
    /// structure's type URI or its recommended tag, so tag-style paths
    /// (`.HEAD.GEDC`) work the same as on the tag layer.
    pub fn select(&self, path: &str) -> Vec<StructId> {
        selector::select(self, path)
    }

    /// Like [`select`], returning the first match only.
    ///
    /// [`select`]: G7Dataset::select
    pub fn select_first(&self, path: &str) -> Option<StructId> {
        selector::select(self, path).into_iter().next()
    }

    // -- construction plumbing -----------------------------------------------

    fn resolve_type(&mut self, container: &str, type_or_tag: &str) -> String {
        if type_or_tag.contains(':') {
            type_or_tag.to_string()
        } else {
            self.lookup.substructure(container, type_or_tag).type_
        }
    }

    pub(crate) fn push_record(&mut self, type_: String) -> StructId {
        let id = StructId(self.structs.len());
        self.structs.push(G7Structure::new(type_.clone(), None));
        match self.records.iter().position(|(t, _)| *t == type_) {
            Some(group) => self.records[group].1.push(id),
            None => self.records.push((type_, vec![id])),
        }
        id
    }

    pub(crate) fn push_substructure(&mut self, parent: StructId, type_: String) -> StructId {
        let id = StructId(self.structs.len());
        self.structs
            .push(G7Structure::new(type_.clone(), Some(parent)));
        let parent = &mut self.structs[parent.0];
        parent.sub_order.push(id);
        parent.sub.entry(type_).or_default().push(id);
        id
    }

    pub(crate) fn unlink_pointer(&mut self, id: StructId) {
        if let G7Payload::Pointer(target) = self.structs[id.0].payload {
            self.structs[target.0].referenced_by.retain(|&r| r != id);
        }
    }

    /// All structures in document order: header first, then records.
    pub(crate) fn document_order(&self) -> Vec<StructId> {
        let mut order = Vec::with_capacity(self.structs.len());
        let mut pending: Vec<StructId> = Vec::new();
        for (_, ids) in self.records.iter().rev() {
            pending.extend(ids.iter().rev().copied());
        }
        pending.push(self.header);
        while let Some(id) = pending.pop() {
            order.push(id);
            pending.extend(self.structs[id.0].sub_order.iter().rev().copied());
        }
        order
    }

    /// Identifier assignment for serialization, mirroring the tag layer:
    /// referenced or preferred-id structures get stable identifiers.
    pub(crate) fn assign_ids(&self) -> FxHashMap<StructId, String> {
        let mut claimed: rustc_hash::FxHashSet<String> = rustc_hash::FxHashSet::default();
        claimed.insert("VOID".to_string());
        let mut ids: FxHashMap<StructId, String> = FxHashMap::default();
        let order = self.document_order();
        for &id in &order {
            if let Some(pref) = &self.structs[id.0].xref_id {
                if claimed.insert(pref.clone()) {
                    ids.insert(id, pref.clone());
                }
            }
        }
        let mut counter = 1usize;
        for &id in &order {
            if self.structs[id.0].referenced_by.is_empty() || ids.contains_key(&id) {
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

    fn step_matches(&self, id: StructId, segment: &str) -> bool {
        let type_ = &self.structs[id.0].type_;
        type_ == segment
            || (!segment.contains(':') && self.lookup.tag(type_, false) == segment)
    }
}

impl Queryable for G7Dataset {
    type Id = StructId;

    fn roots(&self) -> Vec<StructId> {
        let mut roots = vec![self.header];
        for (_, ids) in &self.records {
            roots.extend(ids.iter().copied());
        }
        roots
    }

    fn children(&self, id: StructId) -> Vec<StructId> {
        self.structs[id.0].sub_order.clone()
    }

    fn matches(&self, id: StructId, segment: &str) -> bool {
        self.step_matches(id, segment)
    }
}

/// Parses a text payload against a type's payload descriptor. Diagnostics
/// emitted while parsing are prefixed with the type URI.
pub(crate) fn parse_payload_text(lookup: &mut Lookup, type_: &str, text: &str) -> G7Payload {
    if text.is_empty() {
        return G7Payload::Absent;
    }
    let spec = lookup.payload(type_);
    lookup.diag.push_prefix(format!("{}: ", type_));
    let payload = match spec {
        PayloadSpec::None => {
            lookup.diag.error("structure does not admit a payload");
            G7Payload::Absent
        }
        PayloadSpec::Unknown => G7Payload::Text(text.to_string()),
        PayloadSpec::Pointer { .. } => {
            lookup.diag.error("expected a pointer payload");
            G7Payload::Void
        }
        PayloadSpec::Kind(kind) => match kind {
            PayloadKind::Text => G7Payload::Text(text.to_string()),
            PayloadKind::NonNegativeInteger => {
                G7Payload::Integer(scalars::parse_nonnegative_integer(text, &mut lookup.diag))
            }
            PayloadKind::Name => G7Payload::Text(scalars::parse_name(text, &mut lookup.diag)),
            PayloadKind::Language => {
                G7Payload::Text(scalars::parse_language(text, &mut lookup.diag))
            }
            PayloadKind::MediaType => {
                G7Payload::Text(scalars::parse_media_type(text, &mut lookup.diag))
            }
            PayloadKind::YNull => {
                if scalars::parse_y_null(text, &mut lookup.diag) {
                    G7Payload::Text("Y".to_string())
                } else {
                    G7Payload::Absent
                }
            }
            PayloadKind::Age => G7Payload::Age(Age::parse(text, &mut lookup.diag)),
            PayloadKind::Time => G7Payload::Time(Time::parse(text, &mut lookup.diag)),
            PayloadKind::DateExact => G7Payload::Date(Date::parse(text, lookup)),
            PayloadKind::DateValue => {
                G7Payload::DateValue(DateValue::parse(text, false, lookup))
            }
            PayloadKind::DatePeriod => {
                G7Payload::DateValue(DateValue::parse(text, true, lookup))
            }
            PayloadKind::Enum { set } => G7Payload::Enum(lookup.enumval(&set, text)),
            PayloadKind::ListText => G7Payload::ListText(types::parse_list_text(text)),
            PayloadKind::ListEnum { set } => G7Payload::ListEnum(
                types::parse_list_text(text)
                    .iter()
                    .map(|item| lookup.enumval(&set, item))
                    .collect(),
            ),
        },
    };
    lookup.diag.pop_prefix();
    payload
}

/// The canonical text of a typed payload, or `None` for absent, empty,
/// and pointer payloads.
pub(crate) fn payload_text(lookup: &Lookup, payload: &G7Payload) -> Option<String> {
    match payload {
        G7Payload::Absent | G7Payload::Void | G7Payload::Pointer(_) => None,
        G7Payload::Text(s) => Some(s.clone()),
        G7Payload::Integer(n) => Some(n.to_string()),
        G7Payload::Age(a) => (!a.is_empty()).then(|| a.to_string()),
        G7Payload::Time(t) => Some(t.to_string()),
        G7Payload::Date(d) => Some(d.format(lookup)),
        G7Payload::DateValue(v) => {
            let text = v.format(lookup);
            (!text.is_empty()).then_some(text)
        }
        G7Payload::Enum(value) => Some(lookup.enum_tag(value)),
        G7Payload::ListText(items) => Some(types::format_list(items)),
        G7Payload::ListEnum(items) => {
            let tags: Vec<String> = items.iter().map(|v| lookup.enum_tag(v)).collect();
            Some(types::format_list(&tags))
        }
    }
}

/// Binds a pointer payload, normalizing violations to void: the source
/// type must admit a pointer, the target must be a record, and when the
/// payload descriptor names a target type, the record must have it.
pub(crate) fn bind_pointer(ds: &mut G7Dataset, source: StructId, target: StructId) {
    let source_type = ds.structs[source.0].type_.clone();
    let spec = ds.lookup.payload(&source_type);
    ds.unlink_pointer(source);
    ds.lookup.diag.push_prefix(format!("{}: ", source_type));
    let bound = match &spec {
        PayloadSpec::Pointer { to } => {
            if ds.structs[target.0].sup.is_some() {
                ds.lookup.diag.error("pointer to a substructure");
                false
            } else if let Some(to) = to {
                let target_type = &ds.structs[target.0].type_;
                if target_type != to {
                    ds.lookup.diag.error(format!(
                        "pointer to {}, expected {}",
                        target_type, to
                    ));
                    false
                } else {
                    true
                }
            } else {
                true
            }
        }
        PayloadSpec::Unknown => {
            if ds.structs[target.0].sup.is_some() {
                ds.lookup.diag.error("pointer to a substructure");
                false
            } else {
                true
            }
        }
        _ => {
            ds.lookup.diag.error("payload must not be a pointer");
            false
        }
    };
    ds.lookup.diag.pop_prefix();
    if bound {
        ds.structs[source.0].payload = G7Payload::Pointer(target);
        if !ds.structs[target.0].referenced_by.contains(&source) {
            ds.structs[target.0].referenced_by.push(source);
        }
    } else {
        ds.structs[source.0].payload = G7Payload::Void;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn g7(name: &str) -> String {
        format!("https://gedcom.io/terms/v7/{}", name)
    }

    fn dataset() -> G7Dataset {
        G7Dataset::new(Lookup::new(testutil::schema()))
    }

    #[test]
    fn test_new_dataset_has_header() {
        let ds = dataset();
        assert_eq!(ds.type_of(ds.header()), g7("HEAD"));
        assert_eq!(ds.records().count(), 0);
    }

    #[test]
    fn test_create_record_and_substructure() {
        let mut ds = dataset();
        let indi = ds.create_record("INDI");
        assert_eq!(ds.type_of(indi), g7("record-INDI"));
        let name = ds.add_substructure(indi, "NAME", Some("John /Doe/"));
        assert_eq!(ds.type_of(name), g7("NAME"));
        assert_eq!(
            *ds.payload(name),
            G7Payload::Text("John /Doe/".to_string())
        );
        assert_eq!(ds.sub_of_type(indi, &g7("NAME")), [name]);
        assert_eq!(ds.sup(name), Some(indi));
        assert!(ds.lookup().diag.errors().is_empty());
    }

    #[test]
    fn test_child_lists_group_by_type() {
        let mut ds = dataset();
        let indi = ds.create_record("INDI");
        let n1 = ds.add_substructure(indi, "NAME", Some("A"));
        let sex = ds.add_substructure(indi, "SEX", Some("M"));
        let n2 = ds.add_substructure(indi, "NAME", Some("B"));
        assert_eq!(ds.sub(indi), [n1, sex, n2]);
        assert_eq!(ds.sub_of_type(indi, &g7("NAME")), [n1, n2]);
        for &child in ds.sub_of_type(indi, &g7("NAME")) {
            assert_eq!(ds.type_of(child), g7("NAME"));
        }
    }

    #[test]
    fn test_enum_payload_resolves() {
        let mut ds = dataset();
        let indi = ds.create_record("INDI");
        let sex = ds.add_substructure(indi, "SEX", Some("M"));
        assert_eq!(*ds.payload(sex), G7Payload::Enum(g7("enum-M")));
    }

    #[test]
    fn test_pointer_target_type_enforced() {
        let mut ds = dataset();
        let indi = ds.create_record("INDI");
        let fam = ds.create_record("FAM");
        let husb = ds.add_substructure(fam, "HUSB", None);
        ds.set_pointer(husb, indi);
        assert_eq!(*ds.payload(husb), G7Payload::Pointer(indi));
        assert_eq!(ds.references(indi), [husb]);

        // A FAM is not an INDI.
        let wife = ds.add_substructure(fam, "WIFE", None);
        ds.set_pointer(wife, fam);
        assert_eq!(*ds.payload(wife), G7Payload::Void);
        assert!(ds.lookup().diag.errors()[0].contains("expected"));
    }

    #[test]
    fn test_pointer_to_substructure_rejected() {
        let mut ds = dataset();
        let indi = ds.create_record("INDI");
        let name = ds.add_substructure(indi, "NAME", Some("A"));
        let fam = ds.create_record("FAM");
        let husb = ds.add_substructure(fam, "HUSB", None);
        ds.set_pointer(husb, name);
        assert_eq!(*ds.payload(husb), G7Payload::Void);
        assert!(ds
            .lookup()
            .diag
            .errors()
            .iter()
            .any(|e| e.contains("pointer to a substructure")));
    }

    #[test]
    fn test_payload_prefix_on_diagnostics() {
        let mut ds = dataset();
        let indi = ds.create_record("INDI");
        ds.add_substructure(indi, "SEX", Some("banana"));
        let err = &ds.lookup().diag.errors()[0];
        assert!(err.starts_with(&format!("{}: ", g7("SEX"))), "{}", err);
    }

    #[test]
    fn test_find_and_find_or_create() {
        let mut ds = dataset();
        let indi = ds.create_record("INDI");
        ds.add_substructure(indi, "NAME", Some("A"));

        let hit = ds.find(indi, &[("NAME", PayloadFilter::Is("A"))]);
        assert!(hit.is_some());
        assert!(ds.find(indi, &[("NAME", PayloadFilter::Is("B"))]).is_none());
        assert!(ds.find(indi, &[("NAME", PayloadFilter::Any)]).is_some());

        // find_or_create reuses the matched ancestor and creates the rest.
        let surn = ds.find_or_create(indi, &[("NAME", Some("A")), ("SURN", Some("Doe"))]);
        assert_eq!(ds.type_of(surn), g7("SURN"));
        assert_eq!(ds.sub_of_type(indi, &g7("NAME")).len(), 1);

        let again = ds.find_or_create(indi, &[("NAME", Some("A")), ("SURN", Some("Doe"))]);
        assert_eq!(surn, again);
    }

    #[test]
    fn test_select_uses_recommended_tags() {
        let mut ds = dataset();
        let indi = ds.create_record("INDI");
        ds.add_substructure(indi, "NAME", Some("A"));
        assert_eq!(ds.select("INDI.NAME").len(), 1);
        assert_eq!(ds.select("INDI..SURN").len(), 0);
        assert_eq!(ds.select_first(".HEAD"), Some(ds.header()));
    }
}
