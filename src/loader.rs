//! RDF Graph Loader: turns an input Turtle document into desired statements.
//!
//! The input uses the Wikidata RDF export vocabulary (see [`crate::vocab`]).
//! A statement's main value is attached either directly (`wdt:P…`) or via an
//! intermediate statement node (`p:P…` to a blank node or `wds:` local name)
//! that carries the value plus qualifier, reference, and rank triples.
//!
//! Statement nodes are structural grouping devices only: their labels are
//! used transiently to assemble one [`Statement`] and never leak into the
//! model as identity. A node attached to more than one entity is malformed
//! input and fails the whole load.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use oxigraph::io::RdfFormat;
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{GraphNameRef, NamedNode, NamedOrBlankNode, NamedOrBlankNodeRef, Term};
use oxigraph::store::Store;
use regex::Regex;

use crate::error::ParseError;
use crate::model::{EntityId, PropertyId, Rank, Reference, Statement, Value};
use crate::vocab;

/// Loader output: desired statements grouped per entity, plus per-entity
/// edit summaries from `wdr:editSummary` directives.
#[derive(Debug, Default)]
pub struct Document {
    pub entities: BTreeMap<EntityId, Vec<Statement>>,
    pub summaries: BTreeMap<EntityId, String>,
}

impl Document {
    /// Properties the document mentions as main properties for `entity`.
    ///
    /// The live-state fetch is scoped to exactly this set.
    pub fn mentioned_properties(&self, entity: &EntityId) -> BTreeSet<PropertyId> {
        self.entities
            .get(entity)
            .map(|statements| statements.iter().map(|s| s.property.clone()).collect())
            .unwrap_or_default()
    }

    /// Every property the document touches in any role (main value,
    /// qualifier, reference). Datatypes are prefetched for all of these.
    pub fn all_properties(&self) -> BTreeSet<PropertyId> {
        let mut out = BTreeSet::new();
        for statements in self.entities.values() {
            for st in statements {
                out.insert(st.property.clone());
                out.extend(st.qualifiers.keys().cloned());
                for reference in &st.references {
                    out.extend(reference.pairs().iter().map(|(p, _)| p.clone()));
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Parse an input document into desired statements.
///
/// The standard prefix preamble is prepended, so input may use bare qnames.
pub fn load_document(input: &str) -> Result<Document, ParseError> {
    let store = Store::new().map_err(|e| ParseError::Syntax {
        message: format!("failed to create triple store: {e}"),
    })?;
    let data = format!("{}{}", vocab::TURTLE_PREFIXES, input);
    store
        .load_from_reader(RdfFormat::Turtle, data.as_bytes())
        .map_err(|e| ParseError::Syntax {
            message: e.to_string(),
        })?;
    Loader { store }.run()
}

/// Where a statement node is attached: exactly one (entity, property).
struct Attachment {
    node: NamedOrBlankNode,
    entity: EntityId,
    property: PropertyId,
}

struct Loader {
    store: Store,
}

impl Loader {
    fn run(self) -> Result<Document, ParseError> {
        let mut doc = Document::default();
        // Keyed by the node's transient label; used only during this load.
        let mut attachments: BTreeMap<String, Attachment> = BTreeMap::new();
        let mut statement_subjects: BTreeSet<String> = BTreeSet::new();

        for quad in self.store.iter() {
            let quad = quad.map_err(storage_error)?;
            let NamedOrBlankNode::NamedNode(subject) = &quad.subject else {
                // Blank subjects are value nodes, reference nodes, or
                // statement nodes; all are reached by walking from an entity.
                continue;
            };

            if let Some(local) = vocab::local_name(vocab::WDS, subject.as_str()) {
                tracing::debug!(node = local, "document-local statement node");
                statement_subjects.insert(quad.subject.to_string());
                continue;
            }

            let Some(local) = vocab::local_name(vocab::WD, subject.as_str()) else {
                tracing::warn!(subject = subject.as_str(), "ignoring unknown subject");
                continue;
            };
            let Some(entity) = EntityId::new(local) else {
                tracing::warn!(subject = local, "ignoring non-item subject");
                continue;
            };

            self.entity_triple(&mut doc, &mut attachments, &entity, &quad.predicate, &quad.object)?;
        }

        // A wds: subject that was never attached has nothing to anchor it:
        // the input format carries no durable statement ids.
        for node in &statement_subjects {
            if !attachments.contains_key(node) {
                return Err(ParseError::DanglingStatementNode { node: node.clone() });
            }
        }

        for attachment in attachments.values() {
            let statement = self.resolve_statement_node(attachment)?;
            doc.entities
                .entry(attachment.entity.clone())
                .or_default()
                .push(statement);
        }

        // Store iteration order is an implementation detail; sort for
        // deterministic scripts.
        for statements in doc.entities.values_mut() {
            statements.sort();
        }

        Ok(doc)
    }

    /// Dispatch one triple whose subject is an entity node.
    fn entity_triple(
        &self,
        doc: &mut Document,
        attachments: &mut BTreeMap<String, Attachment>,
        entity: &EntityId,
        predicate: &NamedNode,
        object: &Term,
    ) -> Result<(), ParseError> {
        let pred = predicate.as_str();

        if let Some(p) = vocab::local_name(vocab::WDT, pred) {
            let property = PropertyId::new(p).ok_or_else(|| ParseError::InvalidId {
                id: p.to_string(),
            })?;
            let value = self.resolve_term(object)?;
            doc.entities
                .entry(entity.clone())
                .or_default()
                .push(Statement::new(entity.clone(), property, value));
            return Ok(());
        }

        if pred == vocab::WDR_EDIT_SUMMARY {
            if let Term::Literal(summary) = object {
                doc.summaries
                    .insert(entity.clone(), summary.value().to_string());
            }
            return Ok(());
        }

        // p: is a prefix of ps:/psv:/pq:/... — only accept bare property
        // local names here.
        if let Some(p) = vocab::local_name(vocab::P, pred)
            && !p.contains('/')
        {
            let property = PropertyId::new(p).ok_or_else(|| ParseError::InvalidId {
                id: p.to_string(),
            })?;
            let node = match object {
                Term::NamedNode(n) if n.as_str().starts_with(vocab::WDS) => {
                    NamedOrBlankNode::NamedNode(n.clone())
                }
                Term::BlankNode(b) => NamedOrBlankNode::BlankNode(b.clone()),
                other => {
                    return Err(ParseError::UnsupportedTerm {
                        term: other.to_string(),
                    });
                }
            };
            let key = node.to_string();
            if let Some(existing) = attachments.get(&key) {
                return Err(ParseError::AmbiguousStatementNode {
                    node: key,
                    first: format!("{} ({})", existing.entity, existing.property),
                    second: format!("{entity} ({property})"),
                });
            }
            attachments.insert(
                key,
                Attachment {
                    node,
                    entity: entity.clone(),
                    property,
                },
            );
            return Ok(());
        }

        tracing::warn!(
            entity = %entity,
            predicate = pred,
            "ignoring unknown predicate on entity node"
        );
        Ok(())
    }

    /// Resolve one statement node into a full [`Statement`].
    fn resolve_statement_node(&self, attachment: &Attachment) -> Result<Statement, ParseError> {
        let entity = &attachment.entity;
        let property = &attachment.property;

        let mut main_value: Option<Value> = None;
        let mut rank = Rank::default();
        let mut statement = Statement::new(
            entity.clone(),
            property.clone(),
            // Placeholder until the main value triple is found.
            Value::NoValue,
        );

        for (predicate, object) in self.outgoing(attachment.node.as_ref())? {
            let pred = predicate.as_str();

            // Longer namespaces first: psv: before ps:, pqv: before pq:.
            if let Some(p) = vocab::local_name(vocab::PSV, pred)
                .or_else(|| vocab::local_name(vocab::PS, pred))
            {
                if p != property.as_str() {
                    return Err(ParseError::MainValueMismatch {
                        entity: entity.to_string(),
                        property: property.to_string(),
                        found: p.to_string(),
                    });
                }
                let value = self.resolve_term(&object)?;
                match &main_value {
                    None => main_value = Some(value),
                    Some(existing) if *existing == value => {}
                    Some(_) => {
                        return Err(ParseError::Syntax {
                            message: format!(
                                "statement node for {property} on {entity} has two \
                                 different main values"
                            ),
                        });
                    }
                }
            } else if let Some(q) = vocab::local_name(vocab::PQV, pred)
                .or_else(|| vocab::local_name(vocab::PQ, pred))
            {
                let qualifier = PropertyId::new(q).ok_or_else(|| ParseError::InvalidId {
                    id: q.to_string(),
                })?;
                let value = self.resolve_term(&object)?;
                statement.add_qualifier(qualifier, value);
            } else if pred == vocab::PROV_WAS_DERIVED_FROM {
                let reference = self.resolve_reference_node(entity, property, &object)?;
                statement.add_reference(reference);
            } else if pred == vocab::WIKIBASE_RANK {
                let Term::NamedNode(rank_iri) = &object else {
                    return Err(ParseError::UnsupportedTerm {
                        term: object.to_string(),
                    });
                };
                rank = vocab::rank_from_iri(rank_iri.as_str()).ok_or_else(|| {
                    ParseError::UnsupportedTerm {
                        term: rank_iri.to_string(),
                    }
                })?;
            } else {
                tracing::warn!(
                    entity = %entity,
                    property = %property,
                    predicate = pred,
                    "ignoring unknown predicate on statement node"
                );
            }
        }

        statement.value = main_value.ok_or_else(|| ParseError::MissingMainValue {
            entity: entity.to_string(),
            property: property.to_string(),
        })?;
        statement.rank = rank;
        Ok(statement)
    }

    /// Resolve a reference node into its (property, value) pair set.
    fn resolve_reference_node(
        &self,
        entity: &EntityId,
        property: &PropertyId,
        object: &Term,
    ) -> Result<Reference, ParseError> {
        let node = match object {
            Term::NamedNode(n) => NamedOrBlankNode::NamedNode(n.clone()),
            Term::BlankNode(b) => NamedOrBlankNode::BlankNode(b.clone()),
            other => {
                return Err(ParseError::UnsupportedTerm {
                    term: other.to_string(),
                });
            }
        };

        let mut pairs = Vec::new();
        for (predicate, object) in self.outgoing(node.as_ref())? {
            let pred = predicate.as_str();
            if let Some(p) = vocab::local_name(vocab::PRV, pred)
                .or_else(|| vocab::local_name(vocab::PR, pred))
            {
                let ref_property = PropertyId::new(p).ok_or_else(|| ParseError::InvalidId {
                    id: p.to_string(),
                })?;
                pairs.push((ref_property, self.resolve_term(&object)?));
            } else if predicate.as_ref() == rdf::TYPE {
                // Reference nodes in exported RDF carry a type triple.
            } else {
                tracing::warn!(predicate = pred, "ignoring unknown predicate on reference node");
            }
        }

        if pairs.is_empty() {
            return Err(ParseError::EmptyReference {
                entity: entity.to_string(),
                property: property.to_string(),
            });
        }
        Ok(Reference::new(pairs))
    }

    /// Resolve one RDF term into a statement [`Value`].
    fn resolve_term(&self, term: &Term) -> Result<Value, ParseError> {
        match term {
            Term::NamedNode(n) => resolve_iri(n),
            Term::Literal(literal) => {
                if let Some(language) = literal.language() {
                    return Ok(Value::Monolingual {
                        language: language.to_string(),
                        text: literal.value().to_string(),
                    });
                }
                let datatype = literal.datatype();
                if datatype == xsd::STRING {
                    Ok(Value::String(literal.value().to_string()))
                } else if datatype == xsd::DECIMAL || datatype == xsd::INTEGER {
                    Ok(Value::plain_quantity(signed_decimal(literal.value())))
                } else if datatype == xsd::DATE_TIME {
                    Ok(Value::day_precision_time(signed_timestamp(literal.value())))
                } else if datatype == xsd::DATE {
                    Ok(Value::day_precision_time(format!(
                        "+{}T00:00:00Z",
                        literal.value()
                    )))
                } else if datatype.as_str() == vocab::GEO_WKT_LITERAL {
                    parse_wkt_point(literal.value())
                } else {
                    Err(ParseError::UnsupportedTerm {
                        term: term.to_string(),
                    })
                }
            }
            Term::BlankNode(b) => self.resolve_value_node(&NamedOrBlankNode::BlankNode(b.clone())),
        }
    }

    /// Resolve a typed value node (`wikibase:TimeValue` / `QuantityValue`).
    fn resolve_value_node(&self, node: &NamedOrBlankNode) -> Result<Value, ParseError> {
        let triples = self.outgoing(node.as_ref())?;
        let node_type = triples.iter().find_map(|(p, o)| {
            (p.as_ref() == rdf::TYPE).then_some(o)
        });
        let Some(Term::NamedNode(node_type)) = node_type else {
            return Err(ParseError::UnsupportedTerm {
                term: node.to_string(),
            });
        };

        match node_type.as_str() {
            vocab::WIKIBASE_TIME_VALUE => self.resolve_time_node(&triples),
            vocab::WIKIBASE_QUANTITY_VALUE => self.resolve_quantity_node(&triples),
            other => Err(ParseError::UnsupportedTerm {
                term: other.to_string(),
            }),
        }
    }

    fn resolve_time_node(&self, triples: &[(NamedNode, Term)]) -> Result<Value, ParseError> {
        let mut time = None;
        let mut precision: u8 = 11;
        let mut timezone: i64 = 0;
        let mut calendar = vocab::GREGORIAN_CALENDAR.to_string();

        for (predicate, object) in triples {
            match (predicate.as_str(), object) {
                (vocab::WIKIBASE_TIME, Term::Literal(l)) => {
                    time = Some(signed_timestamp(l.value()));
                }
                (vocab::WIKIBASE_TIME_PRECISION, Term::Literal(l)) => {
                    precision = l.value().parse().map_err(|_| ParseError::BadValueNode {
                        message: format!("time precision is not an integer: {}", l.value()),
                    })?;
                    if precision > 14 {
                        return Err(ParseError::BadValueNode {
                            message: format!("time precision out of range: {precision}"),
                        });
                    }
                }
                (vocab::WIKIBASE_TIME_TIMEZONE, Term::Literal(l)) => {
                    timezone = l.value().parse().map_err(|_| ParseError::BadValueNode {
                        message: format!("time timezone is not an integer: {}", l.value()),
                    })?;
                }
                (vocab::WIKIBASE_TIME_CALENDAR, Term::NamedNode(n)) => {
                    calendar = n.as_str().to_string();
                }
                _ => {}
            }
        }

        let time = time.ok_or_else(|| ParseError::BadValueNode {
            message: "TimeValue node missing wikibase:timeValue".into(),
        })?;
        Ok(Value::Time {
            time,
            precision,
            timezone,
            calendar,
        })
    }

    fn resolve_quantity_node(&self, triples: &[(NamedNode, Term)]) -> Result<Value, ParseError> {
        let mut amount = None;
        let mut unit = None;
        let mut lower_bound = None;
        let mut upper_bound = None;

        for (predicate, object) in triples {
            match (predicate.as_str(), object) {
                (vocab::WIKIBASE_QUANTITY_AMOUNT, Term::Literal(l)) => {
                    amount = Some(signed_decimal(l.value()));
                }
                (vocab::WIKIBASE_QUANTITY_UNIT, Term::NamedNode(n)) => {
                    unit = Some(n.as_str().to_string());
                }
                (vocab::WIKIBASE_QUANTITY_UNIT, Term::Literal(l)) if l.value() == "1" => {
                    unit = None;
                }
                (vocab::WIKIBASE_QUANTITY_LOWER, Term::Literal(l)) => {
                    lower_bound = Some(signed_decimal(l.value()));
                }
                (vocab::WIKIBASE_QUANTITY_UPPER, Term::Literal(l)) => {
                    upper_bound = Some(signed_decimal(l.value()));
                }
                _ => {}
            }
        }

        let amount = amount.ok_or_else(|| ParseError::BadValueNode {
            message: "QuantityValue node missing wikibase:quantityAmount".into(),
        })?;
        Ok(Value::Quantity {
            amount,
            unit,
            lower_bound,
            upper_bound,
        })
    }

    /// All (predicate, object) pairs leaving `subject`, sorted for
    /// deterministic processing.
    fn outgoing(&self, subject: NamedOrBlankNodeRef<'_>) -> Result<Vec<(NamedNode, Term)>, ParseError> {
        let mut out = Vec::new();
        for quad in self.store.quads_for_pattern(
            Some(subject),
            None,
            None,
            Some(GraphNameRef::DefaultGraph),
        ) {
            let quad = quad.map_err(storage_error)?;
            out.push((quad.predicate, quad.object));
        }
        out.sort_by(|a, b| {
            (a.0.as_str(), a.1.to_string()).cmp(&(b.0.as_str(), b.1.to_string()))
        });
        Ok(out)
    }
}

/// Resolve an IRI object to a value.
fn resolve_iri(node: &NamedNode) -> Result<Value, ParseError> {
    let iri = node.as_str();
    if let Some(local) = vocab::local_name(vocab::WD, iri) {
        if let Some(entity) = EntityId::new(local) {
            return Ok(Value::Item(entity));
        }
        if let Some(property) = PropertyId::new(local) {
            return Ok(Value::Property(property));
        }
        return Err(ParseError::InvalidId {
            id: local.to_string(),
        });
    }
    if let Some(local) = vocab::local_name(vocab::WDNO, iri) {
        // wdno:Pnnn marks the "no value" sentinel for that property.
        return PropertyId::new(local)
            .map(|_| Value::NoValue)
            .ok_or_else(|| ParseError::InvalidId {
                id: local.to_string(),
            });
    }
    if let Some(file) = vocab::local_name(vocab::COMMONS_MEDIA, iri) {
        return Ok(Value::String(percent_decode(file)));
    }
    Err(ParseError::UnsupportedTerm {
        term: node.to_string(),
    })
}

/// Wikibase decimal strings always carry an explicit sign.
fn signed_decimal(raw: &str) -> String {
    if raw.starts_with('+') || raw.starts_with('-') {
        raw.to_string()
    } else {
        format!("+{raw}")
    }
}

/// Normalize an xsd:dateTime literal to the `+YYYY-…Z` wire form.
fn signed_timestamp(raw: &str) -> String {
    let raw = raw.strip_suffix("+00:00").map_or(raw, |s| s);
    let mut out = if raw.starts_with('+') || raw.starts_with('-') {
        raw.to_string()
    } else {
        format!("+{raw}")
    };
    if !out.ends_with('Z') {
        out.push('Z');
    }
    out
}

static WKT_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Point\(([-0-9.]+) ([-0-9.]+)\)$").expect("valid regex")
});

/// Parse a `geo:wktLiteral` point. WKT order is (longitude latitude).
fn parse_wkt_point(raw: &str) -> Result<Value, ParseError> {
    let captures = WKT_POINT.captures(raw).ok_or_else(|| ParseError::UnsupportedTerm {
        term: raw.to_string(),
    })?;
    let longitude: f64 = captures[1].parse().map_err(|_| ParseError::UnsupportedTerm {
        term: raw.to_string(),
    })?;
    let latitude: f64 = captures[2].parse().map_err(|_| ParseError::UnsupportedTerm {
        term: raw.to_string(),
    })?;
    Ok(Value::Coordinate {
        latitude: latitude.into(),
        longitude: longitude.into(),
        precision: 0.0001.into(),
        globe: vocab::EARTH_GLOBE.to_string(),
    })
}

/// Minimal percent-decoding for Commons file names (`%20` and friends).
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn storage_error(e: oxigraph::store::StorageError) -> ParseError {
    ParseError::Syntax {
        message: format!("triple store error: {e}"),
    }
}
