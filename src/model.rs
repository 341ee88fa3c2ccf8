//! Statement model: claims, qualifiers, references, and ranks.
//!
//! One [`Statement`] represents a single property-value assertion on an
//! entity, whether it was parsed from the input document (no identity) or
//! fetched from live state (identity assigned by the remote store). The
//! reconciler only ever compares statements within one (subject, property)
//! group, so equality here is purely structural.

use std::collections::{BTreeMap, BTreeSet};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Stable identifier for a Wikidata item, e.g. `Q42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an `EntityId` from a raw string.
    ///
    /// Returns `None` unless the string matches `Q<digits>`.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        well_formed_id(&raw, 'Q').then_some(EntityId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier for a Wikidata property, e.g. `P31`.
///
/// The same property id may appear in the main-value role, the qualifier
/// role, or the reference role of one statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(String);

impl PropertyId {
    /// Create a `PropertyId` from a raw string.
    ///
    /// Returns `None` unless the string matches `P<digits>`.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        well_formed_id(&raw, 'P').then_some(PropertyId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PropertyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn well_formed_id(raw: &str, prefix: char) -> bool {
    let mut chars = raw.chars();
    chars.next() == Some(prefix) && {
        let rest = chars.as_str();
        !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
    }
}

/// Persistent statement identifier (claim GUID) assigned by the remote store,
/// e.g. `Q42$8C65BC0A-3BCA-...`.
///
/// Opaque except for ordering: the reconciler breaks similarity ties by
/// lexicographically smallest identifier so edit scripts are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatementId(String);

impl StatementId {
    /// Wrap a claim GUID. Returns `None` for an empty string.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        (!raw.is_empty()).then_some(StatementId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StatementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Statement rank. Defaults to `Normal` when the input does not specify one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Preferred,
    #[default]
    Normal,
    Deprecated,
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rank::Preferred => write!(f, "preferred"),
            Rank::Normal => write!(f, "normal"),
            Rank::Deprecated => write!(f, "deprecated"),
        }
    }
}

/// A statement value: tagged union over the value kinds Wikidata supports.
///
/// Values compare by structural equality within one kind; values of
/// different kinds are never equal. Floats are wrapped in [`OrderedFloat`]
/// so `Value` is `Eq + Ord + Hash` and can live in sets and map keys.
/// Decimal amounts stay in their signed wire form (`+1.5`) rather than
/// being parsed, matching how the API compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    /// Reference to an item, e.g. `wd:Q5`.
    Item(EntityId),
    /// Reference to a property used as a value, e.g. `wd:P31`.
    Property(PropertyId),
    /// Plain string.
    String(String),
    /// Language-tagged text.
    Monolingual { language: String, text: String },
    /// External identifier string (distinct kind: never equal to `String`).
    ExternalId(String),
    /// Quantity with optional unit IRI and bounds. Amounts are signed
    /// decimal strings, e.g. `+123.5`.
    Quantity {
        amount: String,
        unit: Option<String>,
        lower_bound: Option<String>,
        upper_bound: Option<String>,
    },
    /// Point in time, e.g. `+2023-01-01T00:00:00Z` at day precision.
    Time {
        time: String,
        precision: u8,
        timezone: i64,
        calendar: String,
    },
    /// Globe coordinate.
    Coordinate {
        latitude: OrderedFloat<f64>,
        longitude: OrderedFloat<f64>,
        precision: OrderedFloat<f64>,
        globe: String,
    },
    /// The "no value" sentinel.
    NoValue,
    /// The "unknown value" sentinel.
    SomeValue,
}

impl Value {
    /// Day-precision time in the proleptic Gregorian calendar, the default
    /// for date literals in the input document.
    pub fn day_precision_time(time: impl Into<String>) -> Self {
        Value::Time {
            time: time.into(),
            precision: 11,
            timezone: 0,
            calendar: crate::vocab::GREGORIAN_CALENDAR.to_string(),
        }
    }

    /// Unitless quantity from a signed decimal string.
    pub fn plain_quantity(amount: impl Into<String>) -> Self {
        Value::Quantity {
            amount: amount.into(),
            unit: None,
            lower_bound: None,
            upper_bound: None,
        }
    }
}

/// A reference record: provenance attached to a statement.
///
/// Equality is set equality over the (property, value) pairs; the order
/// pairs were authored in does not matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference {
    pairs: BTreeSet<(PropertyId, Value)>,
}

impl Reference {
    pub fn new(pairs: impl IntoIterator<Item = (PropertyId, Value)>) -> Self {
        Reference {
            pairs: pairs.into_iter().collect(),
        }
    }

    pub fn pairs(&self) -> &BTreeSet<(PropertyId, Value)> {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Qualifier mapping: property to the set of values held under it.
pub type Qualifiers = BTreeMap<PropertyId, BTreeSet<Value>>;

/// The unit of reconciliation: one claim on one entity.
///
/// Desired statements (from the input document) have `identity == None`;
/// live statements (from the remote store) carry their persistent claim
/// GUID. Once assigned, an identity never changes: edits to qualifiers,
/// references, or rank act on that identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Statement {
    pub subject: EntityId,
    pub property: PropertyId,
    pub value: Value,
    pub rank: Rank,
    pub qualifiers: Qualifiers,
    /// Deduplicated; order preserved for output stability, ignored for
    /// equality-as-a-set comparisons in the reconciler.
    pub references: Vec<Reference>,
    pub identity: Option<StatementId>,
}

impl Statement {
    /// New desired statement with default rank and no qualifiers/references.
    pub fn new(subject: EntityId, property: PropertyId, value: Value) -> Self {
        Statement {
            subject,
            property,
            value,
            rank: Rank::default(),
            qualifiers: Qualifiers::new(),
            references: Vec::new(),
            identity: None,
        }
    }

    pub fn with_rank(mut self, rank: Rank) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_identity(mut self, identity: StatementId) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Add one qualifier value. Multi-valued qualifiers accumulate as a set.
    pub fn add_qualifier(&mut self, property: PropertyId, value: Value) {
        self.qualifiers.entry(property).or_default().insert(value);
    }

    /// Add a reference record, keeping the list deduplicated.
    pub fn add_reference(&mut self, reference: Reference) {
        if !self.references.contains(&reference) {
            self.references.push(reference);
        }
    }

    /// Flatten the qualifier mapping into (property, value) pairs.
    ///
    /// The reconciler scores candidate pairings by how many of these pairs
    /// two statements share.
    pub fn qualifier_pairs(&self) -> BTreeSet<(PropertyId, Value)> {
        self.qualifiers
            .iter()
            .flat_map(|(p, values)| values.iter().map(|v| (p.clone(), v.clone())))
            .collect()
    }

    /// References viewed as a set, for order-insensitive comparison.
    pub fn reference_set(&self) -> BTreeSet<&Reference> {
        self.references.iter().collect()
    }
}
