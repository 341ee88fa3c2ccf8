//! Runs a whole desired-state document against a remote store.
//!
//! For each entity, in id order: skip it when blocklisted, fetch its live
//! statements scoped to the properties the document mentions, compute the
//! edit script, and hand the script to the executor. A failure on one
//! entity never stops the others; everything is collected into a
//! [`RunOutcome`] the caller can render and turn into an exit code.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::api::RemoteStore;
use crate::error::ApiError;
use crate::executor::{ApplyReport, Executor, ExecutorConfig};
use crate::loader::Document;
use crate::model::EntityId;
use crate::reconcile::{self, EditOp};
use crate::wire;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Compute and report scripts without applying them.
    pub dry_run: bool,
    /// Edit summary for entities without an explicit summary directive.
    pub default_summary: String,
    pub executor: ExecutorConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            dry_run: false,
            default_summary: "reconcile statements".to_string(),
            executor: ExecutorConfig::default(),
        }
    }
}

/// What happened to one entity.
#[derive(Debug)]
pub struct EntityReport {
    pub entity: EntityId,
    /// The computed edit script. Empty when the entity was skipped or its
    /// live state could not be fetched.
    pub script: Vec<EditOp>,
    /// Entity was on the blocklist and left untouched.
    pub skipped: bool,
    pub fetch_error: Option<ApiError>,
    /// Present unless this was a dry run, a skip, or a fetch failure.
    pub apply: Option<ApplyReport>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub entities: usize,
    pub skipped: usize,
    pub fetch_failures: usize,
    pub operations: usize,
    pub applied: usize,
    pub failed_operations: usize,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.fetch_failures == 0 && self.failed_operations == 0
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub reports: Vec<EntityReport>,
    pub summary: RunSummary,
}

impl RunOutcome {
    pub fn is_clean(&self) -> bool {
        self.summary.is_clean()
    }
}

/// Reconcile every entity in `document` against `store`.
///
/// The only hard error is the datatype prefetch: without datatypes no snak
/// can be built, so nothing can proceed. Per-entity failures are recorded
/// in the outcome instead.
pub fn run<R: RemoteStore>(
    document: &mut Document,
    store: &R,
    blocklist: &BTreeSet<EntityId>,
    config: &DriverConfig,
) -> Result<RunOutcome, ApiError> {
    let datatypes = store.fetch_property_datatypes(&document.all_properties())?;
    wire::apply_datatypes(document, &datatypes);

    let executor = Executor::new(store, config.executor.clone());
    let mut reports = Vec::new();
    let mut summary = RunSummary::default();

    for (entity, desired) in &document.entities {
        summary.entities += 1;

        if blocklist.contains(entity) {
            warn!(%entity, "blocklisted, skipping");
            summary.skipped += 1;
            reports.push(EntityReport {
                entity: entity.clone(),
                script: Vec::new(),
                skipped: true,
                fetch_error: None,
                apply: None,
            });
            continue;
        }

        let mentioned = document.mentioned_properties(entity);
        let live = match store.fetch_statements(entity, &mentioned) {
            Ok(live) => live,
            Err(error) => {
                warn!(%entity, %error, "could not fetch live statements");
                summary.fetch_failures += 1;
                reports.push(EntityReport {
                    entity: entity.clone(),
                    script: Vec::new(),
                    skipped: false,
                    fetch_error: Some(error),
                    apply: None,
                });
                continue;
            }
        };

        let script = reconcile::reconcile_entity(desired, &live);
        summary.operations += script.len();
        info!(%entity, operations = script.len(), "computed edit script");

        let apply = if config.dry_run {
            None
        } else {
            let edit_summary = document
                .summaries
                .get(entity)
                .unwrap_or(&config.default_summary);
            let report = executor.apply(script.clone(), edit_summary);
            summary.applied += report.applied;
            summary.failed_operations += report.failures.len();
            Some(report)
        };

        reports.push(EntityReport {
            entity: entity.clone(),
            script,
            skipped: false,
            fetch_error: None,
            apply,
        });
    }

    Ok(RunOutcome { reports, summary })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use super::*;
    use crate::loader::load_document;
    use crate::model::{PropertyId, Qualifiers, Rank, Reference, Statement, StatementId, Value};
    use crate::wire::DataType;

    /// Fixed live state; records which edits were requested.
    struct FixedStore {
        live: BTreeMap<EntityId, Vec<Statement>>,
        datatypes: BTreeMap<PropertyId, DataType>,
        edits: RefCell<Vec<String>>,
        missing: BTreeSet<EntityId>,
    }

    impl FixedStore {
        fn new() -> Self {
            FixedStore {
                live: BTreeMap::new(),
                datatypes: [
                    (PropertyId::new("P31").unwrap(), DataType::WikibaseItem),
                    (PropertyId::new("P2699").unwrap(), DataType::Url),
                ]
                .into(),
                edits: RefCell::new(Vec::new()),
                missing: BTreeSet::new(),
            }
        }
    }

    impl RemoteStore for FixedStore {
        fn fetch_statements(
            &self,
            entity: &EntityId,
            properties: &BTreeSet<PropertyId>,
        ) -> Result<Vec<Statement>, ApiError> {
            if self.missing.contains(entity) {
                return Err(ApiError::EntityNotFound {
                    entity: entity.to_string(),
                });
            }
            Ok(self
                .live
                .get(entity)
                .map(|statements| {
                    statements
                        .iter()
                        .filter(|s| properties.contains(&s.property))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        fn fetch_property_datatypes(
            &self,
            properties: &BTreeSet<PropertyId>,
        ) -> Result<BTreeMap<PropertyId, DataType>, ApiError> {
            let mut out = self.datatypes.clone();
            out.retain(|p, _| properties.contains(p));
            Ok(out)
        }

        fn create_statement(
            &self,
            statement: &Statement,
            summary: &str,
        ) -> Result<StatementId, ApiError> {
            self.edits
                .borrow_mut()
                .push(format!("add {} [{}]", statement.subject, summary));
            Ok(StatementId::new(format!("{}$fresh", statement.subject)).unwrap())
        }

        fn set_qualifiers(
            &self,
            id: &StatementId,
            _qualifiers: &Qualifiers,
            _summary: &str,
        ) -> Result<(), ApiError> {
            self.edits.borrow_mut().push(format!("qualifiers {id}"));
            Ok(())
        }

        fn set_references(
            &self,
            id: &StatementId,
            _references: &[Reference],
            _summary: &str,
        ) -> Result<(), ApiError> {
            self.edits.borrow_mut().push(format!("references {id}"));
            Ok(())
        }

        fn set_rank(&self, id: &StatementId, _rank: Rank, _summary: &str) -> Result<(), ApiError> {
            self.edits.borrow_mut().push(format!("rank {id}"));
            Ok(())
        }

        fn delete_statement(&self, id: &StatementId, _summary: &str) -> Result<(), ApiError> {
            self.edits.borrow_mut().push(format!("remove {id}"));
            Ok(())
        }
    }

    fn no_blocklist() -> BTreeSet<EntityId> {
        BTreeSet::new()
    }

    #[test]
    fn dry_run_computes_scripts_without_editing() {
        let mut doc = load_document(r#"wd:Q42 wdt:P31 wd:Q5 ."#).unwrap();
        let store = FixedStore::new();
        let config = DriverConfig {
            dry_run: true,
            ..DriverConfig::default()
        };
        let outcome = run(&mut doc, &store, &no_blocklist(), &config).unwrap();
        assert_eq!(outcome.summary.operations, 1);
        assert!(outcome.reports[0].apply.is_none());
        assert!(store.edits.borrow().is_empty());
    }

    #[test]
    fn applies_and_counts_edits() {
        let mut doc = load_document(r#"wd:Q42 wdt:P31 wd:Q5 ."#).unwrap();
        let store = FixedStore::new();
        let outcome = run(&mut doc, &store, &no_blocklist(), &DriverConfig::default()).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.summary.applied, 1);
        assert_eq!(
            *store.edits.borrow(),
            vec!["add Q42 [reconcile statements]".to_string()]
        );
    }

    #[test]
    fn edit_summary_directive_overrides_default() {
        let mut doc = load_document(
            r#"
            wd:Q42 wdt:P31 wd:Q5 .
            wd:Q42 wdr:editSummary "import taxa" .
            "#,
        )
        .unwrap();
        let store = FixedStore::new();
        run(&mut doc, &store, &no_blocklist(), &DriverConfig::default()).unwrap();
        assert_eq!(
            *store.edits.borrow(),
            vec!["add Q42 [import taxa]".to_string()]
        );
    }

    #[test]
    fn blocklisted_entities_are_skipped() {
        let mut doc = load_document(
            r#"
            wd:Q42 wdt:P31 wd:Q5 .
            wd:Q64 wdt:P31 wd:Q515 .
            "#,
        )
        .unwrap();
        let store = FixedStore::new();
        let blocklist: BTreeSet<EntityId> = [EntityId::new("Q42").unwrap()].into();
        let outcome = run(&mut doc, &store, &blocklist, &DriverConfig::default()).unwrap();
        assert_eq!(outcome.summary.skipped, 1);
        assert_eq!(outcome.summary.entities, 2);
        // Only Q64 was touched.
        assert_eq!(store.edits.borrow().len(), 1);
        assert!(store.edits.borrow()[0].contains("Q64"));
    }

    #[test]
    fn fetch_failure_isolates_the_entity() {
        let mut doc = load_document(
            r#"
            wd:Q42 wdt:P31 wd:Q5 .
            wd:Q64 wdt:P31 wd:Q515 .
            "#,
        )
        .unwrap();
        let mut store = FixedStore::new();
        store.missing.insert(EntityId::new("Q42").unwrap());
        let outcome = run(&mut doc, &store, &no_blocklist(), &DriverConfig::default()).unwrap();
        assert!(!outcome.is_clean());
        assert_eq!(outcome.summary.fetch_failures, 1);
        // The other entity still got its edit.
        assert_eq!(store.edits.borrow().len(), 1);
    }

    #[test]
    fn matching_live_state_yields_no_edits() {
        let mut doc = load_document(r#"wd:Q42 wdt:P31 wd:Q5 ."#).unwrap();
        let mut store = FixedStore::new();
        store.live.insert(
            EntityId::new("Q42").unwrap(),
            vec![Statement::new(
                EntityId::new("Q42").unwrap(),
                PropertyId::new("P31").unwrap(),
                Value::Item(EntityId::new("Q5").unwrap()),
            )
            .with_identity(StatementId::new("Q42$live-1").unwrap())],
        );
        let outcome = run(&mut doc, &store, &no_blocklist(), &DriverConfig::default()).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.summary.operations, 0);
        assert!(store.edits.borrow().is_empty());
    }

    #[test]
    fn live_statements_outside_mentioned_properties_survive() {
        let mut doc = load_document(r#"wd:Q42 wdt:P31 wd:Q5 ."#).unwrap();
        let mut store = FixedStore::new();
        store.live.insert(
            EntityId::new("Q42").unwrap(),
            vec![Statement::new(
                EntityId::new("Q42").unwrap(),
                PropertyId::new("P2699").unwrap(),
                Value::String("https://example.com".into()),
            )
            .with_identity(StatementId::new("Q42$other").unwrap())],
        );
        let outcome = run(&mut doc, &store, &no_blocklist(), &DriverConfig::default()).unwrap();
        // One add for P31, nothing removed under P2699.
        let script = &outcome.reports[0].script;
        assert_eq!(script.len(), 1);
        assert!(matches!(script[0], EditOp::Add(_)));
    }
}
