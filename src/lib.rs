//! # wd-reconcile
//!
//! Declarative statement reconciliation for Wikidata: describe the
//! statements an item should carry as RDF, and the engine computes and
//! applies the minimal set of API edits to make the live item match.
//!
//! ## Pipeline
//!
//! - **Loader** (`loader`): Turtle descriptions into per-entity desired
//!   statements, via an in-memory `oxigraph` store
//! - **Reconciler** (`reconcile`): desired vs. live statements into an edit
//!   script, pairing duplicates by qualifier overlap
//! - **Wire** (`wire`): Wikibase JSON snaks/claims and datatype handling
//! - **API** (`api`): MediaWiki Action API client with login, maxlag
//!   backoff and edit throttling
//! - **Executor & driver** (`executor`, `driver`): apply scripts with
//!   bounded retries, isolating failures per entity
//!
//! ## Library usage
//!
//! ```no_run
//! use wd_reconcile::loader::load_document;
//! use wd_reconcile::reconcile::reconcile_entity;
//!
//! let doc = load_document(r#"wd:Q42 wdt:P31 wd:Q5 ."#).unwrap();
//! for (entity, desired) in &doc.entities {
//!     // Live statements come from `api::WikidataApi::fetch_statements`.
//!     let script = reconcile_entity(desired, &[]);
//!     println!("{entity}: {} operations", script.len());
//! }
//! ```

pub mod api;
pub mod driver;
pub mod error;
pub mod executor;
pub mod loader;
pub mod model;
pub mod reconcile;
pub mod vocab;
pub mod wire;
