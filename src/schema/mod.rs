//! Schema lookup over the FamilySearch GEDCOM 7 registry JSON.
//!
//! The host supplies a parsed `g7validation.json`-layout object; this
//! module ingests it into flat maps and answers the questions the typed
//! layer asks: which structure type a (container, tag) pair denotes, what
//! payload a type carries, which months a calendar has, which values an
//! enumeration set admits, and which tag serializes a type in a given
//! context.
//!
//! A [`Lookup`] additionally tracks the document's own `SCHMA`-declared
//! extension tags and classifies every extension use into one of the
//! incident classes (undocumented, unregistered, aliased, ambiguous or
//! relocated, prohibited, novel), reporting each through its diagnostics
//! exactly once.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::SchemaError;
use crate::Diagnostics;

/// Payload-type URIs used by the GEDCOM 7 registry.
pub mod payload_types {
    pub const TEXT: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const NON_NEGATIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#nonNegativeInteger";
    pub const LANGUAGE: &str = "http://www.w3.org/2001/XMLSchema#Language";
    pub const MEDIA_TYPE: &str = "http://www.w3.org/ns/dcat#mediaType";
    pub const Y_NULL: &str = "Y|<NULL>";
    pub const NAME: &str = "https://gedcom.io/terms/v7/type-Name";
    pub const AGE: &str = "https://gedcom.io/terms/v7/type-Age";
    pub const TIME: &str = "https://gedcom.io/terms/v7/type-Time";
    pub const DATE: &str = "https://gedcom.io/terms/v7/type-Date";
    pub const DATE_EXACT: &str = "https://gedcom.io/terms/v7/type-Date#exact";
    pub const DATE_PERIOD: &str = "https://gedcom.io/terms/v7/type-Date#period";
    pub const ENUM: &str = "https://gedcom.io/terms/v7/type-Enum";
    pub const LIST_TEXT: &str = "https://gedcom.io/terms/v7/type-List#Text";
    pub const LIST_ENUM: &str = "https://gedcom.io/terms/v7/type-List#Enum";
    pub const FILE_PATH: &str = "https://gedcom.io/terms/v7/type-FilePath";
}

/// Required lower/upper bounds on a substructure count. `max` of `None`
/// is the registry's `M` (unbounded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    pub min: u8,
    pub max: Option<u8>,
}

impl Cardinality {
    /// The permissive `{0:M}` cardinality used for extensions.
    pub const ANY: Cardinality = Cardinality { min: 0, max: None };
}

impl FromStr for Cardinality {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchemaError::InvalidCardinality {
            text: s.to_string(),
        };
        let body = s
            .strip_prefix('{')
            .and_then(|r| r.strip_suffix('}'))
            .ok_or_else(invalid)?;
        let (min, max) = body.split_once(':').ok_or_else(invalid)?;
        let min = min.parse().map_err(|_| invalid())?;
        let max = match max {
            "M" => None,
            n => Some(n.parse().map_err(|_| invalid())?),
        };
        Ok(Cardinality { min, max })
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{{{}:{}}}", self.min, max),
            None => write!(f, "{{{}:M}}", self.min),
        }
    }
}

impl<'de> Deserialize<'de> for Cardinality {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// One permitted substructure: its type and how often it may appear.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubstructureDef {
    #[serde(rename = "type")]
    pub type_: String,
    pub cardinality: Cardinality,
}

/// Payload descriptor for a structure type. `to` names the record type a
/// pointer payload must target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PayloadDef {
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub set: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

/// A calendar: its type URI, month tags, and permitted epochs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarDef {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub months: FxHashMap<String, String>,
    #[serde(default)]
    pub epochs: Vec<String>,
}

/// Serialization tag maps, keyed by URI, one per vocabulary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TagInContext {
    #[serde(rename = "struct")]
    pub structure: FxHashMap<String, String>,
    #[serde(rename = "enum")]
    pub enumeration: FxHashMap<String, String>,
    pub cal: FxHashMap<String, String>,
    pub month: FxHashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SchemaJson {
    substructure: FxHashMap<String, FxHashMap<String, SubstructureDef>>,
    payload: FxHashMap<String, Option<PayloadDef>>,
    set: FxHashMap<String, FxHashMap<String, String>>,
    calendar: FxHashMap<String, CalendarDef>,
    tag: FxHashMap<String, String>,
    #[serde(rename = "tagInContext")]
    tag_in_context: TagInContext,
}

/// An ingested schema: the registry maps plus derived side-tables for
/// URI-keyed reverse lookups.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    raw: SchemaJson,
    /// Standard structure tag → URIs carrying it (for relocation).
    std_tag_uris: FxHashMap<String, Vec<String>>,
    /// Calendar URI → calendar tag.
    cal_by_uri: FxHashMap<String, String>,
    /// Month tag → month URIs across calendars.
    month_tag_uris: FxHashMap<String, Vec<String>>,
    /// Structure URI → its required substructure URIs, from `{1:*}`
    /// cardinalities.
    required: FxHashMap<String, Vec<String>>,
}

impl Schema {
    /// Ingests a registry-layout JSON object. Unknown members are ignored.
    pub fn from_json(value: Value) -> Result<Schema, SchemaError> {
        let raw: SchemaJson =
            serde_json::from_value(value).map_err(|e| SchemaError::Layout(e.to_string()))?;

        let mut std_tag_uris: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (uri, tag) in &raw.tag_in_context.structure {
            let uris = std_tag_uris.entry(tag.clone()).or_default();
            if !uris.contains(uri) {
                uris.push(uri.clone());
            }
        }
        for uris in std_tag_uris.values_mut() {
            uris.sort();
        }

        let mut cal_by_uri = FxHashMap::default();
        let mut month_tag_uris: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (cal_tag, def) in &raw.calendar {
            cal_by_uri.insert(def.type_.clone(), cal_tag.clone());
            for (month_tag, month_uri) in &def.months {
                let uris = month_tag_uris.entry(month_tag.clone()).or_default();
                if !uris.contains(month_uri) {
                    uris.push(month_uri.clone());
                }
            }
        }

        let mut required: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (container, members) in &raw.substructure {
            let mut needed: Vec<String> = members
                .values()
                .filter(|def| def.cardinality.min >= 1)
                .map(|def| def.type_.clone())
                .collect();
            needed.sort();
            if !needed.is_empty() {
                required.insert(container.clone(), needed);
            }
        }

        Ok(Schema {
            raw,
            std_tag_uris,
            cal_by_uri,
            month_tag_uris,
            required,
        })
    }

    /// Whether the registry defines this URI at all.
    pub fn knows_uri(&self, uri: &str) -> bool {
        self.raw.tag.contains_key(uri)
    }

    /// The registry's recommended tag for a URI, if any.
    pub fn recommended_tag(&self, uri: &str) -> Option<&str> {
        self.raw.tag.get(uri).map(String::as_str)
    }

    /// Permitted substructures of a container, if the container is known.
    pub fn members(&self, container: &str) -> Option<&FxHashMap<String, SubstructureDef>> {
        self.raw.substructure.get(container)
    }
}

/// What kind of payload a structure type carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSpec {
    /// The type carries no payload.
    None,
    /// The type is absent from the payload map: anything is accepted.
    Unknown,
    /// The payload is a pointer, optionally restricted to a record type.
    Pointer { to: Option<String> },
    /// The payload is a datatype from the type-class table.
    Kind(PayloadKind),
}

/// The typed-payload classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    NonNegativeInteger,
    Name,
    Language,
    MediaType,
    YNull,
    Age,
    Time,
    DateExact,
    DateValue,
    DatePeriod,
    Enum { set: String },
    ListText,
    ListEnum { set: String },
}

/// Which vocabulary a serialized tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Structure,
    EnumValue,
    Calendar,
    Month,
}

/// The resolution result for a (container, tag) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubSpec {
    /// Structure type: a URI, or the bare tag for an undocumented
    /// extension.
    pub type_: String,
    pub cardinality: Cardinality,
}

/// A live schema lookup: the ingested registry plus the document's own
/// extension declarations, diagnostics, and serialization reservations.
///
/// One lookup serves one dataset. Sharing a lookup across parses makes the
/// extension table accumulate; reset it between unrelated documents.
#[derive(Debug, Default)]
pub struct Lookup {
    schema: Schema,
    /// SCHMA-declared extension tag → URIs (more than one is ambiguous).
    ext: FxHashMap<String, Vec<String>>,
    /// First SCHMA-declared tag per URI.
    ext_by_uri: FxHashMap<String, String>,
    /// Serialization reservations: URI → minted tag.
    reserved: FxHashMap<String, String>,
    /// Minted tag → URI (empty string marks an undocumented extension).
    reserved_tags: FxHashMap<String, String>,
    /// URIs in reservation order, for the SCHMA block.
    reservation_order: Vec<String>,
    /// Error and warning sinks, deduplicated by message content.
    pub diag: Diagnostics,
}

impl Lookup {
    /// Wraps an ingested schema.
    pub fn new(schema: Schema) -> Lookup {
        Lookup {
            schema,
            ..Lookup::default()
        }
    }

    /// The underlying schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Registers a `HEAD.SCHMA.TAG` declaration.
    pub fn add_extension(&mut self, tag: &str, uri: &str) {
        let uris = self.ext.entry(tag.to_string()).or_default();
        if !uris.iter().any(|u| u == uri) {
            uris.push(uri.to_string());
        }
        self.ext_by_uri
            .entry(uri.to_string())
            .or_insert_with(|| tag.to_string());
    }

    /// The URIs a SCHMA-declared tag maps to.
    pub fn extension_uris(&self, tag: &str) -> &[String] {
        self.ext.get(tag).map(Vec::as_slice).unwrap_or_default()
    }

    /// Forgets SCHMA declarations and reservations, keeping the schema and
    /// diagnostics. Call between unrelated documents when sharing a lookup.
    pub fn reset_extensions(&mut self) {
        self.ext.clear();
        self.ext_by_uri.clear();
        self.begin_reservation();
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Resolves a tag at record level (container `""`).
    pub fn record(&mut self, tag: &str) -> SubSpec {
        self.substructure("", tag)
    }

    /// Resolves a (container, tag) pair to a structure type.
    ///
    /// Standard members resolve directly. Extension tags map through the
    /// SCHMA table with aliased/unregistered/undocumented/ambiguous
    /// classification. A standard tag outside its permitted container is
    /// prohibited (known container) or relocated (unknown container, where
    /// the tag is first tried as a record-level type).
    pub fn substructure(&mut self, container: &str, tag: &str) -> SubSpec {
        let known = container.is_empty()
            || self.schema.raw.substructure.contains_key(container)
            || self.schema.knows_uri(container);
        if known {
            if let Some(def) = self
                .schema
                .raw
                .substructure
                .get(container)
                .and_then(|m| m.get(tag))
            {
                return SubSpec {
                    type_: def.type_.clone(),
                    cardinality: def.cardinality,
                };
            }
            if tag.starts_with('_') {
                return self.extension_substructure(container, tag);
            }
            if let Some(uris) = self.schema.std_tag_uris.get(tag) {
                let type_ = uris[0].clone();
                self.prohibited(tag, container);
                return SubSpec {
                    type_,
                    cardinality: Cardinality::ANY,
                };
            }
            self.undocumented(tag);
            return SubSpec {
                type_: tag.to_string(),
                cardinality: Cardinality::ANY,
            };
        }

        // Unknown container: an extension-defined structure is holding
        // children the registry knows nothing about.
        self.novel(container);
        if tag.starts_with('_') {
            return self.extension_substructure(container, tag);
        }
        // Try the tag as a record-level type first.
        if let Some(def) = self
            .schema
            .raw
            .substructure
            .get("")
            .and_then(|m| m.get(tag))
        {
            return SubSpec {
                type_: def.type_.clone(),
                cardinality: def.cardinality,
            };
        }
        match self.schema.std_tag_uris.get(tag).cloned() {
            Some(uris) if uris.len() == 1 => {
                self.relocated(tag);
                SubSpec {
                    type_: uris[0].clone(),
                    cardinality: Cardinality::ANY,
                }
            }
            Some(uris) => {
                self.ambiguous(tag);
                SubSpec {
                    type_: uris[0].clone(),
                    cardinality: Cardinality::ANY,
                }
            }
            None => {
                self.undocumented(tag);
                SubSpec {
                    type_: tag.to_string(),
                    cardinality: Cardinality::ANY,
                }
            }
        }
    }

    fn extension_substructure(&mut self, container: &str, tag: &str) -> SubSpec {
        let uris = self.ext.get(tag).cloned().unwrap_or_default();
        match uris.as_slice() {
            [] => {
                self.undocumented(tag);
                SubSpec {
                    type_: tag.to_string(),
                    cardinality: Cardinality::ANY,
                }
            }
            [uri] => {
                if let Some(std_tag) = self.schema.recommended_tag(uri).map(str::to_string) {
                    // Extension tag for a structure the registry defines.
                    let cardinality = self
                        .schema
                        .raw
                        .substructure
                        .get(container)
                        .and_then(|m| m.values().find(|def| def.type_ == *uri))
                        .map(|def| def.cardinality)
                        .unwrap_or(Cardinality::ANY);
                    self.aliased(tag, &std_tag);
                    SubSpec {
                        type_: uri.clone(),
                        cardinality,
                    }
                } else {
                    self.unregistered(uri);
                    SubSpec {
                        type_: uri.clone(),
                        cardinality: Cardinality::ANY,
                    }
                }
            }
            multiple => {
                self.ambiguous(tag);
                SubSpec {
                    type_: multiple[0].clone(),
                    cardinality: Cardinality::ANY,
                }
            }
        }
    }

    /// Whether a token names a calendar the schema defines.
    pub fn knows_calendar(&self, tag: &str) -> bool {
        self.schema.raw.calendar.contains_key(tag)
    }

    /// Resolves a calendar tag to its URI (or keeps the tag for an
    /// undocumented extension calendar).
    pub fn calendar(&mut self, tag: &str) -> String {
        if let Some(def) = self.schema.raw.calendar.get(tag) {
            return def.type_.clone();
        }
        if tag.starts_with('_') {
            let uris = self.ext.get(tag).cloned().unwrap_or_default();
            return match uris.as_slice() {
                [] => {
                    self.undocumented(tag);
                    tag.to_string()
                }
                [uri] => {
                    if let Some(cal_tag) = self.schema.cal_by_uri.get(uri).cloned() {
                        self.aliased(tag, &cal_tag);
                    } else {
                        self.unregistered(uri);
                    }
                    uri.clone()
                }
                multiple => {
                    self.ambiguous(tag);
                    multiple[0].clone()
                }
            };
        }
        self.undocumented(tag);
        tag.to_string()
    }

    /// Resolves a month tag within a calendar. Months of an unrecognized
    /// calendar are accepted verbatim; a documented calendar's month list
    /// is enforced with the usual five-way extension handling.
    pub fn month(&mut self, calendar: &str, tag: &str) -> String {
        let Some(cal_tag) = self.schema.cal_by_uri.get(calendar).cloned() else {
            return tag.to_string();
        };
        if let Some(uri) = self
            .schema
            .raw
            .calendar
            .get(&cal_tag)
            .and_then(|def| def.months.get(tag))
        {
            return uri.clone();
        }
        if tag.starts_with('_') {
            let uris = self.ext.get(tag).cloned().unwrap_or_default();
            return match uris.as_slice() {
                [] => {
                    self.undocumented(tag);
                    tag.to_string()
                }
                [uri] => {
                    if let Some(std_tag) = self
                        .schema
                        .raw
                        .tag_in_context
                        .month
                        .get(uri)
                        .cloned()
                    {
                        self.aliased(tag, &std_tag);
                    } else {
                        self.unregistered(uri);
                    }
                    uri.clone()
                }
                multiple => {
                    self.ambiguous(tag);
                    multiple[0].clone()
                }
            };
        }
        if let Some(uris) = self.schema.month_tag_uris.get(tag).cloned() {
            // A month of some other calendar.
            self.prohibited(tag, &cal_tag);
            return uris[0].clone();
        }
        self.undocumented(tag);
        tag.to_string()
    }

    /// The epochs a calendar admits, or `None` when the calendar is not
    /// documented (any epoch is then accepted).
    pub fn epochs(&self, calendar: &str) -> Option<Vec<String>> {
        let cal_tag = self.schema.cal_by_uri.get(calendar)?;
        Some(self.schema.raw.calendar.get(cal_tag)?.epochs.clone())
    }

    /// Resolves an enumeration value tag within a set.
    pub fn enumval(&mut self, set: &str, tag: &str) -> String {
        if let Some(uri) = self.schema.raw.set.get(set).and_then(|m| m.get(tag)) {
            return uri.clone();
        }
        if tag.starts_with('_') {
            let uris = self.ext.get(tag).cloned().unwrap_or_default();
            return match uris.as_slice() {
                [] => {
                    self.undocumented(tag);
                    tag.to_string()
                }
                [uri] => {
                    let standard = self.schema.raw.set.get(set).and_then(|m| {
                        m.iter().find(|(_, u)| *u == uri).map(|(t, _)| t.clone())
                    });
                    match standard {
                        Some(std_tag) => self.aliased(tag, &std_tag),
                        None => self.unregistered(uri),
                    }
                    uri.clone()
                }
                multiple => {
                    self.ambiguous(tag);
                    multiple[0].clone()
                }
            };
        }
        self.prohibited(tag, set);
        tag.to_string()
    }

    /// The payload descriptor for a structure type.
    pub fn payload(&self, uri: &str) -> PayloadSpec {
        use payload_types as pt;
        match self.schema.raw.payload.get(uri) {
            None => PayloadSpec::Unknown,
            Some(None) => PayloadSpec::None,
            Some(Some(def)) => {
                if def.to.is_some() {
                    return PayloadSpec::Pointer {
                        to: def.to.clone(),
                    };
                }
                let Some(type_) = def.type_.as_deref() else {
                    return PayloadSpec::None;
                };
                let kind = match type_ {
                    pt::TEXT | pt::FILE_PATH => PayloadKind::Text,
                    pt::NON_NEGATIVE_INTEGER => PayloadKind::NonNegativeInteger,
                    pt::NAME => PayloadKind::Name,
                    pt::LANGUAGE => PayloadKind::Language,
                    pt::MEDIA_TYPE => PayloadKind::MediaType,
                    pt::Y_NULL => PayloadKind::YNull,
                    pt::AGE => PayloadKind::Age,
                    pt::TIME => PayloadKind::Time,
                    pt::DATE => PayloadKind::DateValue,
                    pt::DATE_EXACT => PayloadKind::DateExact,
                    pt::DATE_PERIOD => PayloadKind::DatePeriod,
                    pt::ENUM => match &def.set {
                        Some(set) => PayloadKind::Enum { set: set.clone() },
                        None => PayloadKind::Text,
                    },
                    pt::LIST_TEXT => PayloadKind::ListText,
                    pt::LIST_ENUM => match &def.set {
                        Some(set) => PayloadKind::ListEnum { set: set.clone() },
                        None => PayloadKind::ListText,
                    },
                    _ => return PayloadSpec::Unknown,
                };
                PayloadSpec::Kind(kind)
            }
        }
    }

    /// The required substructure types of a container.
    pub fn required(&self, uri: &str) -> &[String] {
        self.schema
            .required
            .get(uri)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    // =========================================================================
    // Serialization support
    // =========================================================================

    /// The recommended serialized tag for a URI: the standard tag, or (with
    /// `prefer_extension`, or for unregistered URIs) an extension tag.
    pub fn tag(&self, uri: &str, prefer_extension: bool) -> String {
        if !prefer_extension {
            if let Some(tag) = self.schema.recommended_tag(uri) {
                return tag.to_string();
            }
        }
        if let Some(tag) = self.ext_by_uri.get(uri) {
            return tag.clone();
        }
        if let Some(tag) = self.schema.recommended_tag(uri) {
            return format!("_{}", tag);
        }
        if !uri.contains(':') {
            return uri.to_string();
        }
        format!("_{}", uri_tail(uri))
    }

    /// The tag that serializes a calendar URI.
    pub fn calendar_tag(&self, uri: &str) -> String {
        if let Some(tag) = self.schema.raw.tag_in_context.cal.get(uri) {
            return tag.clone();
        }
        self.extension_tag_for(uri)
    }

    /// The tag that serializes a month URI.
    pub fn month_tag(&self, uri: &str) -> String {
        if let Some(tag) = self.schema.raw.tag_in_context.month.get(uri) {
            return tag.clone();
        }
        self.extension_tag_for(uri)
    }

    /// The tag that serializes an enumeration value URI.
    pub fn enum_tag(&self, uri: &str) -> String {
        if let Some(tag) = self.schema.raw.tag_in_context.enumeration.get(uri) {
            return tag.clone();
        }
        self.extension_tag_for(uri)
    }

    fn extension_tag_for(&self, uri: &str) -> String {
        if let Some(tag) = self.reserved.get(uri) {
            return tag.clone();
        }
        if let Some(tag) = self.ext_by_uri.get(uri) {
            return tag.clone();
        }
        if !uri.contains(':') {
            return uri.to_string();
        }
        format!("_{}", uri_tail(uri))
    }

    /// Drops all reservations, starting a fresh serialization.
    pub fn begin_reservation(&mut self) {
        self.reserved.clear();
        self.reserved_tags.clear();
        self.reservation_order.clear();
    }

    /// Reserves the tag that will serialize `type_` inside `within`.
    ///
    /// Standard-in-context types keep their registry tag and need no SCHMA
    /// entry. Everything else gets an extension tag: the SCHMA-declared
    /// one when available, otherwise a `_`-prefixed derivation from the
    /// recommended tag (relocated standard types) or the URI tail, with
    /// numeric suffixes minted to break collisions. An undocumented
    /// extension — whose type *is* its tag — keeps that tag
    /// unconditionally, re-tagging any URI that claimed it earlier.
    pub fn reserve_tag(&mut self, type_: &str, kind: TagKind, within: &str) -> String {
        if !type_.contains(':') {
            // Undocumented extension.
            if let Some(prev) = self.reserved_tags.get(type_).cloned() {
                if prev.is_empty() {
                    return type_.to_string();
                }
                // A documented URI claimed this tag first; displace it.
                self.reserved.remove(&prev);
                self.reserved_tags.remove(type_);
                self.reservation_order.retain(|u| u != &prev);
                self.reserved_tags.insert(type_.to_string(), String::new());
                self.mint(&prev);
                return type_.to_string();
            }
            self.reserved_tags.insert(type_.to_string(), String::new());
            return type_.to_string();
        }

        if let Some(tag) = self.standard_in_context(type_, kind, within) {
            return tag;
        }
        if let Some(tag) = self.reserved.get(type_) {
            return tag.clone();
        }
        self.mint(type_)
    }

    /// The `(tag, uri)` pairs the SCHMA block must declare, in reservation
    /// order.
    pub fn schema_entries(&self) -> Vec<(String, String)> {
        self.reservation_order
            .iter()
            .map(|uri| (self.reserved[uri].clone(), uri.clone()))
            .collect()
    }

    fn standard_in_context(&self, uri: &str, kind: TagKind, within: &str) -> Option<String> {
        let ctx = &self.schema.raw.tag_in_context;
        match kind {
            TagKind::Structure => {
                let tag = ctx.structure.get(uri)?;
                let def = self.schema.raw.substructure.get(within)?.get(tag)?;
                (def.type_ == uri).then(|| tag.clone())
            }
            TagKind::EnumValue => {
                let tag = ctx.enumeration.get(uri)?;
                let member = self.schema.raw.set.get(within)?.get(tag)?;
                (member == uri).then(|| tag.clone())
            }
            TagKind::Calendar => {
                let tag = ctx.cal.get(uri)?;
                let def = self.schema.raw.calendar.get(tag)?;
                (def.type_ == uri).then(|| tag.clone())
            }
            TagKind::Month => {
                let tag = ctx.month.get(uri)?;
                let cal_tag = self.schema.cal_by_uri.get(within)?;
                let month = self.schema.raw.calendar.get(cal_tag)?.months.get(tag)?;
                (month == uri).then(|| tag.clone())
            }
        }
    }

    fn mint(&mut self, uri: &str) -> String {
        let base = if let Some(tag) = self.ext_by_uri.get(uri) {
            tag.clone()
        } else if let Some(tag) = self.schema.recommended_tag(uri) {
            format!("_{}", tag)
        } else {
            format!("_{}", uri_tail(uri))
        };
        let base = if base.starts_with('_') {
            base
        } else {
            format!("_{}", base)
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while self.tag_taken(&candidate, uri) {
            candidate = format!("{}{}", base, n);
            n += 1;
        }
        self.reserved.insert(uri.to_string(), candidate.clone());
        self.reserved_tags.insert(candidate.clone(), uri.to_string());
        self.reservation_order.push(uri.to_string());
        candidate
    }

    fn tag_taken(&self, tag: &str, uri: &str) -> bool {
        if let Some(claimed) = self.reserved_tags.get(tag) {
            return claimed != uri;
        }
        if let Some(uris) = self.ext.get(tag) {
            return !(uris.len() == 1 && uris[0] == uri);
        }
        false
    }

    // =========================================================================
    // Incidents
    // =========================================================================

    fn undocumented(&mut self, tag: &str) {
        self.diag.warn(format!("Undocumented extension {}", tag));
    }

    fn unregistered(&mut self, uri: &str) {
        self.diag.warn(format!("Unregistered extension {}", uri));
    }

    fn aliased(&mut self, tag: &str, std_tag: &str) {
        self.diag.warn(format!(
            "Extension tag {} duplicates standard {}; prefer {}",
            tag, std_tag, std_tag
        ));
    }

    fn ambiguous(&mut self, tag: &str) {
        self.diag.error(format!("Ambiguous extension tag {}", tag));
    }

    fn relocated(&mut self, tag: &str) {
        self.diag
            .warn(format!("Relocated standard structure {}", tag));
    }

    fn prohibited(&mut self, tag: &str, container: &str) {
        let place = if container.is_empty() {
            "the record level".to_string()
        } else {
            container.to_string()
        };
        self.diag
            .error(format!("{} is not permitted under {}", tag, place));
    }

    fn novel(&mut self, container: &str) {
        self.diag
            .warn(format!("Novel extension structure {}", container));
    }
}

/// The last path-ish segment of a URI, uppercased and restricted to the
/// extension tag alphabet.
fn uri_tail(uri: &str) -> String {
    let tail = uri
        .rsplit(|c| c == '/' || c == '#' || c == ':')
        .next()
        .unwrap_or("");
    let cleaned: String = tail
        .chars()
        .map(|c| {
            let c = c.to_ascii_uppercase();
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "EXT".to_string()
    } else {
        cleaned
    }
}
