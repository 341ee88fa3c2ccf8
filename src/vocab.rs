//! The fixed predicate vocabulary the loader understands.
//!
//! Namespace IRIs for the Wikidata RDF export layout, the Turtle prefix
//! preamble prepended to every input document, and small helpers for
//! splitting IRIs into (namespace, local name). These IRIs are the
//! configuration surface of the input format: stable and documented here,
//! not scattered through the loader.

use crate::model::Rank;

/// Entity namespace: `wd:Q42`, also `wd:P31` for properties-as-values.
pub const WD: &str = "http://www.wikidata.org/entity/";
/// Document-local statement node namespace (`wds:`). Labels in this
/// namespace are grouping devices only and never become identities.
pub const WDS: &str = "http://www.wikidata.org/entity/statement/";
/// Direct claim predicate: main value attached straight to the entity.
pub const WDT: &str = "http://www.wikidata.org/prop/direct/";
/// Statement-node attachment predicate: `p:P31` links entity to node.
pub const P: &str = "http://www.wikidata.org/prop/";
/// Main value predicate on a statement node.
pub const PS: &str = "http://www.wikidata.org/prop/statement/";
/// Main value predicate on a statement node (typed value node form).
pub const PSV: &str = "http://www.wikidata.org/prop/statement/value/";
/// Qualifier predicate on a statement node.
pub const PQ: &str = "http://www.wikidata.org/prop/qualifier/";
/// Qualifier predicate (typed value node form).
pub const PQV: &str = "http://www.wikidata.org/prop/qualifier/value/";
/// Property predicate on a reference node.
pub const PR: &str = "http://www.wikidata.org/prop/reference/";
/// Property predicate on a reference node (typed value node form).
pub const PRV: &str = "http://www.wikidata.org/prop/reference/value/";
/// "No value" property namespace: `wdno:P31` as an object marks the sentinel.
pub const WDNO: &str = "http://www.wikidata.org/prop/novalue/";
/// Wikibase ontology namespace (ranks, typed value nodes).
pub const WIKIBASE: &str = "http://wikiba.se/ontology#";
/// Commons media file namespace; local names are percent-encoded filenames.
pub const COMMONS_MEDIA: &str = "http://commons.wikimedia.org/wiki/Special:FilePath/";

/// Links a statement node to a reference node.
pub const PROV_WAS_DERIVED_FROM: &str = "http://www.w3.org/ns/prov#wasDerivedFrom";
/// Rank predicate on a statement node.
pub const WIKIBASE_RANK: &str = "http://wikiba.se/ontology#rank";
/// WKT literal datatype for globe coordinates.
pub const GEO_WKT_LITERAL: &str = "http://www.opengis.net/ont/geosparql#wktLiteral";

/// rdf:type objects for typed value nodes.
pub const WIKIBASE_TIME_VALUE: &str = "http://wikiba.se/ontology#TimeValue";
pub const WIKIBASE_QUANTITY_VALUE: &str = "http://wikiba.se/ontology#QuantityValue";

/// Predicates on a `wikibase:TimeValue` node.
pub const WIKIBASE_TIME: &str = "http://wikiba.se/ontology#timeValue";
pub const WIKIBASE_TIME_PRECISION: &str = "http://wikiba.se/ontology#timePrecision";
pub const WIKIBASE_TIME_TIMEZONE: &str = "http://wikiba.se/ontology#timeTimezone";
pub const WIKIBASE_TIME_CALENDAR: &str = "http://wikiba.se/ontology#timeCalendarModel";

/// Predicates on a `wikibase:QuantityValue` node.
pub const WIKIBASE_QUANTITY_AMOUNT: &str = "http://wikiba.se/ontology#quantityAmount";
pub const WIKIBASE_QUANTITY_UNIT: &str = "http://wikiba.se/ontology#quantityUnit";
pub const WIKIBASE_QUANTITY_LOWER: &str = "http://wikiba.se/ontology#quantityLowerBound";
pub const WIKIBASE_QUANTITY_UPPER: &str = "http://wikiba.se/ontology#quantityUpperBound";

/// Project namespace for authoring directives that are not statements.
pub const WDR: &str = "https://wd-reconcile.dev/ns#";
/// Per-entity edit summary directive.
pub const WDR_EDIT_SUMMARY: &str = "https://wd-reconcile.dev/ns#editSummary";

/// Default calendar model for date literals.
pub const GREGORIAN_CALENDAR: &str = "http://www.wikidata.org/entity/Q1985727";
/// Default globe for coordinate literals.
pub const EARTH_GLOBE: &str = "http://www.wikidata.org/entity/Q2";

const WIKIBASE_PREFERRED_RANK: &str = "http://wikiba.se/ontology#PreferredRank";
const WIKIBASE_NORMAL_RANK: &str = "http://wikiba.se/ontology#NormalRank";
const WIKIBASE_DEPRECATED_RANK: &str = "http://wikiba.se/ontology#DeprecatedRank";

/// Prefix preamble prepended to every input document, so authors can use
/// qnames without declaring them. SPARQL-style PREFIX lines are valid
/// Turtle 1.1.
pub const TURTLE_PREFIXES: &str = "\
PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>
PREFIX geo: <http://www.opengis.net/ont/geosparql#>
PREFIX prov: <http://www.w3.org/ns/prov#>
PREFIX wikibase: <http://wikiba.se/ontology#>

PREFIX wd: <http://www.wikidata.org/entity/>
PREFIX wds: <http://www.wikidata.org/entity/statement/>
PREFIX wdt: <http://www.wikidata.org/prop/direct/>
PREFIX wdno: <http://www.wikidata.org/prop/novalue/>
PREFIX p: <http://www.wikidata.org/prop/>
PREFIX ps: <http://www.wikidata.org/prop/statement/>
PREFIX psv: <http://www.wikidata.org/prop/statement/value/>
PREFIX pq: <http://www.wikidata.org/prop/qualifier/>
PREFIX pqv: <http://www.wikidata.org/prop/qualifier/value/>
PREFIX pr: <http://www.wikidata.org/prop/reference/>
PREFIX prv: <http://www.wikidata.org/prop/reference/value/>

PREFIX commonsMedia: <http://commons.wikimedia.org/wiki/Special:FilePath/>
PREFIX wdr: <https://wd-reconcile.dev/ns#>

";

/// Strip `ns` off the front of `iri`, returning the local name.
///
/// `PS` is a prefix of `PSV` (and `PQ` of `PQV`, `PR` of `PRV`, `P` of all
/// of them), so callers must test the longer namespace first.
pub fn local_name<'a>(ns: &str, iri: &'a str) -> Option<&'a str> {
    iri.strip_prefix(ns)
}

/// Parse a `wikibase:*Rank` IRI.
pub fn rank_from_iri(iri: &str) -> Option<Rank> {
    match iri {
        WIKIBASE_PREFERRED_RANK => Some(Rank::Preferred),
        WIKIBASE_NORMAL_RANK => Some(Rank::Normal),
        WIKIBASE_DEPRECATED_RANK => Some(Rank::Deprecated),
        _ => None,
    }
}
