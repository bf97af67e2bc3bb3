//! Reading, validating, and writing genealogical data in the GEDCOM
//! family of formats.
//!
//! This crate provides two stacked processing layers:
//!
//! - **Tag layer** ([`gedc`]): a dialect-parameterized parser and
//!   serializer for the line-oriented GEDC grammar — levels, tags,
//!   cross-reference identifiers, pointers, payloads, and CONT/CONC
//!   continuation splicing — producing a forest of generic
//!   tag-structures.
//! - **Typed layer** ([`typed`]): a schema-aware layer over the tag
//!   forest for FamilySearch GEDCOM 7. Structure types become URIs,
//!   payloads parse into typed values (dates, ages, times, enumerations,
//!   language tags, media types, lists), substructure cardinality is
//!   checked, pointers resolve against declared target types, and
//!   SCHMA-declared extensions are tracked and classified.
//!
//! # Quick start
//!
//! ```rust
//! use gedcom_7::{dialect, Diagnostics, GedcForest};
//!
//! let source = "0 HEAD\n1 GEDC\n2 VERS 7.0\n0 TRLR\n";
//! let mut diag = Diagnostics::new();
//! let forest = GedcForest::parse(source, &dialect::GEDCOM7, &mut diag).unwrap();
//! assert!(diag.errors().is_empty());
//!
//! let vers = forest.select_first(".HEAD.GEDC.VERS").unwrap();
//! assert_eq!(forest.text(vers), Some("7.0"));
//!
//! // Serialization round-trips.
//! assert_eq!(forest.write(&dialect::GEDCOM7).unwrap(), source);
//! ```
//!
//! The typed layer needs a schema: ingest the registry's
//! `g7validation.json` with [`Schema::from_json`], wrap it in a
//! [`Lookup`], and convert with [`G7Dataset::from_forest`]. The lookup
//! owns the diagnostics for everything built on it; validation reports
//! through the same sinks and returns its error count.
//!
//! # Error handling
//!
//! Only failures that prevent an operation from producing any result are
//! `Err` values ([`error`]). Everything recoverable — unparseable lines,
//! invalid payloads, prohibited substructures, cardinality violations,
//! extension incidents — is reported through [`Diagnostics`] in document
//! order, deduplicated by message, and processing continues on a safe
//! sentinel (void pointers, default dates, empty payloads).
//!
//! # Modules
//!
//! - [`dialect`]: tag-layer grammar parameters; GEDCOM 5.x and 7 presets
//! - [`gedc`]: the tag layer and its JSON codec
//! - [`types`]: typed payload values (`Age`, `Time`, `Date`, …)
//! - [`schema`]: registry ingestion and the live lookup
//! - [`typed`]: the typed dataset and its JSON codec
//! - [`selector`]: dot-path queries shared by both layers
//! - [`error`]: fatal error types

pub mod dialect;
pub mod error;
pub mod gedc;
pub mod schema;
pub mod selector;
pub mod typed;
pub mod types;

mod diag;
#[cfg(test)]
mod testutil;

pub use diag::Diagnostics;
pub use gedc::{GedcForest, GedcPayload, NodeId};
pub use schema::{Lookup, Schema};
pub use typed::{G7Dataset, G7Payload, PayloadFilter, StructId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GEDCOM version the typed layer implements.
pub const SPEC_VERSION: &str = "7.0";
