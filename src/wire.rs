//! Wikibase JSON wire format: snaks, datavalues, claims, references.
//!
//! Mirrors the shapes the MediaWiki Action API produces and consumes, and
//! converts between them and the [`crate::model`] types. The wire format is
//! richer than the model in places (snak hashes, before/after time fields);
//! the extra detail is dropped on decode and defaulted on encode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::loader::Document;
use crate::model::{
    EntityId, PropertyId, Qualifiers, Rank, Reference, Statement, StatementId, Value,
};

// ---------------------------------------------------------------------------
// Datatypes
// ---------------------------------------------------------------------------

/// Property datatype. Determines which value kind a property accepts and is
/// required on every snak sent to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "commonsMedia")]
    CommonsMedia,
    #[serde(rename = "geo-shape")]
    GeoShape,
    #[serde(rename = "tabular-data")]
    TabularData,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "external-id")]
    ExternalId,
    #[serde(rename = "wikibase-item")]
    WikibaseItem,
    #[serde(rename = "wikibase-property")]
    WikibaseProperty,
    #[serde(rename = "globe-coordinate")]
    GlobeCoordinate,
    #[serde(rename = "monolingualtext")]
    Monolingualtext,
    #[serde(rename = "quantity")]
    Quantity,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "musical-notation")]
    MusicalNotation,
    #[serde(rename = "math")]
    Math,
    #[serde(rename = "wikibase-lexeme")]
    WikibaseLexeme,
    #[serde(rename = "wikibase-form")]
    WikibaseForm,
    #[serde(rename = "wikibase-sense")]
    WikibaseSense,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::CommonsMedia => "commonsMedia",
            DataType::GeoShape => "geo-shape",
            DataType::TabularData => "tabular-data",
            DataType::Url => "url",
            DataType::ExternalId => "external-id",
            DataType::WikibaseItem => "wikibase-item",
            DataType::WikibaseProperty => "wikibase-property",
            DataType::GlobeCoordinate => "globe-coordinate",
            DataType::Monolingualtext => "monolingualtext",
            DataType::Quantity => "quantity",
            DataType::String => "string",
            DataType::Time => "time",
            DataType::MusicalNotation => "musical-notation",
            DataType::Math => "math",
            DataType::WikibaseLexeme => "wikibase-lexeme",
            DataType::WikibaseForm => "wikibase-form",
            DataType::WikibaseSense => "wikibase-sense",
        }
    }

    /// Which value kinds this datatype accepts.
    pub fn allows(&self, value: &Value) -> bool {
        match self {
            DataType::CommonsMedia
            | DataType::GeoShape
            | DataType::TabularData
            | DataType::Url
            | DataType::MusicalNotation
            | DataType::Math
            | DataType::String => matches!(value, Value::String(_)),
            DataType::ExternalId => {
                matches!(value, Value::ExternalId(_) | Value::String(_))
            }
            DataType::WikibaseItem => matches!(value, Value::Item(_)),
            DataType::WikibaseProperty
            | DataType::WikibaseLexeme
            | DataType::WikibaseForm
            | DataType::WikibaseSense => matches!(value, Value::Property(_) | Value::Item(_)),
            DataType::GlobeCoordinate => matches!(value, Value::Coordinate { .. }),
            DataType::Monolingualtext => matches!(value, Value::Monolingual { .. }),
            DataType::Quantity => matches!(value, Value::Quantity { .. }),
            DataType::Time => matches!(value, Value::Time { .. }),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Datavalues and snaks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum DataValue {
    #[serde(rename = "wikibase-entityid")]
    EntityId(EntityIdValue),
    #[serde(rename = "string")]
    String(String),
    #[serde(rename = "monolingualtext")]
    Monolingual(MonolingualValue),
    #[serde(rename = "quantity")]
    Quantity(QuantityValue),
    #[serde(rename = "time")]
    Time(TimeValue),
    #[serde(rename = "globecoordinate")]
    Globe(GlobeValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityIdValue {
    #[serde(rename = "entity-type")]
    pub entity_type: String,
    #[serde(rename = "numeric-id", default, skip_serializing_if = "Option::is_none")]
    pub numeric_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonolingualValue {
    pub language: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityValue {
    pub amount: String,
    pub unit: String,
    #[serde(rename = "lowerBound", default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<String>,
    #[serde(rename = "upperBound", default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeValue {
    pub time: String,
    #[serde(default)]
    pub timezone: i64,
    #[serde(default)]
    pub before: i64,
    #[serde(default)]
    pub after: i64,
    pub precision: u8,
    pub calendarmodel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobeValue {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub precision: Option<f64>,
    pub globe: String,
}

/// One snak: a (property, value-or-sentinel) pair with its datatype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "snaktype", rename_all = "lowercase")]
pub enum Snak {
    Value {
        property: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<DataType>,
        datavalue: DataValue,
    },
    SomeValue {
        property: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<DataType>,
    },
    NoValue {
        property: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<DataType>,
    },
}

impl Snak {
    pub fn property(&self) -> &str {
        match self {
            Snak::Value { property, .. }
            | Snak::SomeValue { property, .. }
            | Snak::NoValue { property, .. } => property,
        }
    }
}

// ---------------------------------------------------------------------------
// Claims and references
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub snaks: BTreeMap<String, Vec<Snak>>,
    #[serde(rename = "snaks-order", default)]
    pub snaks_order: Vec<String>,
}

/// A full statement in wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub mainsnak: Snak,
    pub rank: Rank,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub qualifiers: BTreeMap<String, Vec<Snak>>,
    #[serde(rename = "qualifiers-order", default, skip_serializing_if = "Vec::is_empty")]
    pub qualifiers_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<WireReference>,
}

/// `wbgetentities` response shapes.
#[derive(Debug, Deserialize)]
pub struct GetEntitiesResponse {
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDoc>,
}

#[derive(Debug, Deserialize)]
pub struct EntityDoc {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub datatype: Option<DataType>,
    #[serde(default)]
    pub claims: BTreeMap<String, Vec<Claim>>,
    /// Present (as an empty string) when the entity does not exist.
    #[serde(default)]
    pub missing: Option<String>,
}

// ---------------------------------------------------------------------------
// Decoding: wire -> model
// ---------------------------------------------------------------------------

fn decode_error(message: impl Into<String>) -> ApiError {
    ApiError::Decode {
        message: message.into(),
    }
}

fn decode_datavalue(dv: &DataValue, datatype: Option<DataType>) -> Result<Value, ApiError> {
    match dv {
        DataValue::EntityId(e) => {
            let id = match (&e.id, e.numeric_id) {
                (Some(id), _) => id.clone(),
                (None, Some(n)) => match e.entity_type.as_str() {
                    "item" => format!("Q{n}"),
                    "property" => format!("P{n}"),
                    other => return Err(decode_error(format!("unknown entity type: {other}"))),
                },
                (None, None) => return Err(decode_error("entityid value without id")),
            };
            match e.entity_type.as_str() {
                "item" => EntityId::new(&id)
                    .map(Value::Item)
                    .ok_or_else(|| decode_error(format!("bad item id: {id}"))),
                "property" => PropertyId::new(&id)
                    .map(Value::Property)
                    .ok_or_else(|| decode_error(format!("bad property id: {id}"))),
                other => Err(decode_error(format!("unknown entity type: {other}"))),
            }
        }
        DataValue::String(s) => {
            if datatype == Some(DataType::ExternalId) {
                Ok(Value::ExternalId(s.clone()))
            } else {
                Ok(Value::String(s.clone()))
            }
        }
        DataValue::Monolingual(m) => Ok(Value::Monolingual {
            language: m.language.clone(),
            text: m.text.clone(),
        }),
        DataValue::Quantity(q) => Ok(Value::Quantity {
            amount: q.amount.clone(),
            unit: (q.unit != "1").then(|| q.unit.clone()),
            lower_bound: q.lower_bound.clone(),
            upper_bound: q.upper_bound.clone(),
        }),
        DataValue::Time(t) => Ok(Value::Time {
            time: t.time.clone(),
            precision: t.precision,
            timezone: t.timezone,
            calendar: t.calendarmodel.clone(),
        }),
        DataValue::Globe(g) => Ok(Value::Coordinate {
            latitude: g.latitude.into(),
            longitude: g.longitude.into(),
            precision: g.precision.unwrap_or(0.0001).into(),
            globe: g.globe.clone(),
        }),
    }
}

/// Decode one snak into a (property, value) pair.
pub fn decode_snak(snak: &Snak) -> Result<(PropertyId, Value), ApiError> {
    let property = PropertyId::new(snak.property())
        .ok_or_else(|| decode_error(format!("bad snak property: {}", snak.property())))?;
    let value = match snak {
        Snak::Value {
            datatype,
            datavalue,
            ..
        } => decode_datavalue(datavalue, *datatype)?,
        Snak::SomeValue { .. } => Value::SomeValue,
        Snak::NoValue { .. } => Value::NoValue,
    };
    Ok((property, value))
}

/// Decode a wire claim into a live [`Statement`] (identity required).
pub fn claim_to_statement(subject: &EntityId, claim: &Claim) -> Result<Statement, ApiError> {
    let (property, value) = decode_snak(&claim.mainsnak)?;
    let identity = claim
        .id
        .as_deref()
        .and_then(StatementId::new)
        .ok_or_else(|| decode_error("live claim without id"))?;

    let mut statement =
        Statement::new(subject.clone(), property, value).with_identity(identity);
    statement.rank = claim.rank;

    for snaks in claim.qualifiers.values() {
        for snak in snaks {
            let (qualifier, value) = decode_snak(snak)?;
            statement.add_qualifier(qualifier, value);
        }
    }
    for reference in &claim.references {
        let mut pairs = Vec::new();
        for snaks in reference.snaks.values() {
            for snak in snaks {
                pairs.push(decode_snak(snak)?);
            }
        }
        statement.add_reference(Reference::new(pairs));
    }
    Ok(statement)
}

// ---------------------------------------------------------------------------
// Encoding: model -> wire
// ---------------------------------------------------------------------------

fn encode_datavalue(value: &Value) -> Option<DataValue> {
    match value {
        Value::Item(q) => Some(DataValue::EntityId(EntityIdValue {
            entity_type: "item".into(),
            numeric_id: q.as_str()[1..].parse().ok(),
            id: Some(q.as_str().to_string()),
        })),
        Value::Property(p) => Some(DataValue::EntityId(EntityIdValue {
            entity_type: "property".into(),
            numeric_id: p.as_str()[1..].parse().ok(),
            id: Some(p.as_str().to_string()),
        })),
        Value::String(s) | Value::ExternalId(s) => Some(DataValue::String(s.clone())),
        Value::Monolingual { language, text } => Some(DataValue::Monolingual(MonolingualValue {
            language: language.clone(),
            text: text.clone(),
        })),
        Value::Quantity {
            amount,
            unit,
            lower_bound,
            upper_bound,
        } => Some(DataValue::Quantity(QuantityValue {
            amount: amount.clone(),
            unit: unit.clone().unwrap_or_else(|| "1".into()),
            lower_bound: lower_bound.clone(),
            upper_bound: upper_bound.clone(),
        })),
        Value::Time {
            time,
            precision,
            timezone,
            calendar,
        } => Some(DataValue::Time(TimeValue {
            time: time.clone(),
            timezone: *timezone,
            before: 0,
            after: 0,
            precision: *precision,
            calendarmodel: calendar.clone(),
        })),
        Value::Coordinate {
            latitude,
            longitude,
            precision,
            globe,
        } => Some(DataValue::Globe(GlobeValue {
            latitude: latitude.into_inner(),
            longitude: longitude.into_inner(),
            altitude: None,
            precision: Some(precision.into_inner()),
            globe: globe.clone(),
        })),
        Value::NoValue | Value::SomeValue => None,
    }
}

/// Encode one (property, value) pair into a snak, validating the value kind
/// against the property's datatype.
pub fn encode_snak(
    property: &PropertyId,
    value: &Value,
    datatypes: &BTreeMap<PropertyId, DataType>,
) -> Result<Snak, ApiError> {
    let datatype = *datatypes
        .get(property)
        .ok_or_else(|| ApiError::UnknownDatatype {
            property: property.to_string(),
        })?;

    match value {
        Value::NoValue => Ok(Snak::NoValue {
            property: property.to_string(),
            datatype: Some(datatype),
        }),
        Value::SomeValue => Ok(Snak::SomeValue {
            property: property.to_string(),
            datatype: Some(datatype),
        }),
        other => {
            if !datatype.allows(other) {
                return Err(ApiError::InvalidValue {
                    property: property.to_string(),
                    datatype: datatype.as_str().to_string(),
                    message: format!("{other:?}"),
                });
            }
            let datavalue =
                encode_datavalue(other).expect("non-sentinel values always encode");
            Ok(Snak::Value {
                property: property.to_string(),
                datatype: Some(datatype),
                datavalue,
            })
        }
    }
}

/// Encode a qualifier mapping into the wire snak map plus property order.
pub fn encode_qualifiers(
    qualifiers: &Qualifiers,
    datatypes: &BTreeMap<PropertyId, DataType>,
) -> Result<(BTreeMap<String, Vec<Snak>>, Vec<String>), ApiError> {
    let mut snaks = BTreeMap::new();
    let mut order = Vec::new();
    for (property, values) in qualifiers {
        let mut list = Vec::new();
        for value in values {
            list.push(encode_snak(property, value, datatypes)?);
        }
        order.push(property.to_string());
        snaks.insert(property.to_string(), list);
    }
    Ok((snaks, order))
}

/// Encode reference records into wire form.
pub fn encode_references(
    references: &[Reference],
    datatypes: &BTreeMap<PropertyId, DataType>,
) -> Result<Vec<WireReference>, ApiError> {
    let mut out = Vec::new();
    for reference in references {
        let mut snaks: BTreeMap<String, Vec<Snak>> = BTreeMap::new();
        let mut order = Vec::new();
        for (property, value) in reference.pairs() {
            let key = property.to_string();
            if !snaks.contains_key(&key) {
                order.push(key.clone());
            }
            snaks
                .entry(key)
                .or_default()
                .push(encode_snak(property, value, datatypes)?);
        }
        out.push(WireReference {
            hash: None,
            snaks,
            snaks_order: order,
        });
    }
    Ok(out)
}

/// Encode a full statement into a wire claim. `guid` is the claim id to
/// write under (freshly generated for creates).
pub fn statement_to_claim(
    statement: &Statement,
    guid: Option<String>,
    datatypes: &BTreeMap<PropertyId, DataType>,
) -> Result<Claim, ApiError> {
    let mainsnak = encode_snak(&statement.property, &statement.value, datatypes)?;
    let (qualifiers, qualifiers_order) = encode_qualifiers(&statement.qualifiers, datatypes)?;
    let references = encode_references(&statement.references, datatypes)?;
    Ok(Claim {
        kind: "statement".into(),
        id: guid,
        mainsnak,
        rank: statement.rank,
        qualifiers,
        qualifiers_order,
        references,
    })
}

// ---------------------------------------------------------------------------
// Datatype-driven normalization of loader output
// ---------------------------------------------------------------------------

/// Promote plain strings to external-id values wherever the property's
/// datatype says so.
///
/// The loader cannot tell `string` from `external-id` properties apart (the
/// RDF serialization is identical), so desired documents are normalized once
/// datatypes have been prefetched; live statements decode with the right
/// kind directly.
pub fn apply_datatypes(document: &mut Document, datatypes: &BTreeMap<PropertyId, DataType>) {
    let promote = |property: &PropertyId, value: Value| -> Value {
        match value {
            Value::String(s) if datatypes.get(property) == Some(&DataType::ExternalId) => {
                Value::ExternalId(s)
            }
            other => other,
        }
    };

    for statements in document.entities.values_mut() {
        for statement in statements.iter_mut() {
            statement.value = promote(&statement.property, statement.value.clone());
            statement.qualifiers = statement
                .qualifiers
                .iter()
                .map(|(p, values)| {
                    let values = values.iter().map(|v| promote(p, v.clone())).collect();
                    (p.clone(), values)
                })
                .collect();
            statement.references = statement
                .references
                .iter()
                .map(|r| {
                    Reference::new(
                        r.pairs()
                            .iter()
                            .map(|(p, v)| (p.clone(), promote(p, v.clone()))),
                    )
                })
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qid(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    fn pid(s: &str) -> PropertyId {
        PropertyId::new(s).unwrap()
    }

    #[test]
    fn decode_realistic_claim() {
        let json = r#"{
            "type": "statement",
            "id": "Q42$8C65BC0A-3BCA-4B8E-9F5D-000000000001",
            "rank": "preferred",
            "mainsnak": {
                "snaktype": "value",
                "property": "P31",
                "datatype": "wikibase-item",
                "hash": "abc123",
                "datavalue": {
                    "type": "wikibase-entityid",
                    "value": {"entity-type": "item", "numeric-id": 5, "id": "Q5"}
                }
            },
            "qualifiers": {
                "P580": [{
                    "snaktype": "value",
                    "property": "P580",
                    "datatype": "time",
                    "datavalue": {
                        "type": "time",
                        "value": {
                            "time": "+2001-01-01T00:00:00Z",
                            "timezone": 0, "before": 0, "after": 0,
                            "precision": 11,
                            "calendarmodel": "http://www.wikidata.org/entity/Q1985727"
                        }
                    }
                }]
            },
            "qualifiers-order": ["P580"],
            "references": [{
                "hash": "def",
                "snaks": {
                    "P854": [{
                        "snaktype": "value",
                        "property": "P854",
                        "datatype": "url",
                        "datavalue": {"type": "string", "value": "https://example.com"}
                    }]
                },
                "snaks-order": ["P854"]
            }]
        }"#;
        let claim: Claim = serde_json::from_str(json).unwrap();
        let statement = claim_to_statement(&qid("Q42"), &claim).unwrap();

        assert_eq!(statement.value, Value::Item(qid("Q5")));
        assert_eq!(statement.rank, Rank::Preferred);
        assert_eq!(
            statement.identity.as_ref().unwrap().as_str(),
            "Q42$8C65BC0A-3BCA-4B8E-9F5D-000000000001"
        );
        assert_eq!(statement.qualifiers.len(), 1);
        assert_eq!(statement.references.len(), 1);
    }

    #[test]
    fn sentinel_snaks_decode() {
        let json = r#"{"snaktype": "novalue", "property": "P40", "datatype": "wikibase-item"}"#;
        let snak: Snak = serde_json::from_str(json).unwrap();
        assert_eq!(decode_snak(&snak).unwrap(), (pid("P40"), Value::NoValue));

        let json = r#"{"snaktype": "somevalue", "property": "P569"}"#;
        let snak: Snak = serde_json::from_str(json).unwrap();
        assert_eq!(decode_snak(&snak).unwrap(), (pid("P569"), Value::SomeValue));
    }

    #[test]
    fn external_id_datatype_decodes_to_external_id_kind() {
        let json = r#"{
            "snaktype": "value",
            "property": "P4947",
            "datatype": "external-id",
            "datavalue": {"type": "string", "value": "123"}
        }"#;
        let snak: Snak = serde_json::from_str(json).unwrap();
        assert_eq!(
            decode_snak(&snak).unwrap(),
            (pid("P4947"), Value::ExternalId("123".into()))
        );
    }

    #[test]
    fn encode_snak_validates_value_kind() {
        let datatypes: BTreeMap<PropertyId, DataType> =
            [(pid("P31"), DataType::WikibaseItem)].into();
        assert!(encode_snak(&pid("P31"), &Value::Item(qid("Q5")), &datatypes).is_ok());
        let err = encode_snak(&pid("P31"), &Value::String("Q5".into()), &datatypes).unwrap_err();
        assert!(matches!(err, ApiError::InvalidValue { .. }));
        let err = encode_snak(&pid("P569"), &Value::NoValue, &datatypes).unwrap_err();
        assert!(matches!(err, ApiError::UnknownDatatype { .. }));
    }

    #[test]
    fn claim_roundtrip_preserves_statement_content() {
        let datatypes: BTreeMap<PropertyId, DataType> = [
            (pid("P31"), DataType::WikibaseItem),
            (pid("P580"), DataType::Time),
            (pid("P854"), DataType::Url),
        ]
        .into();

        let mut statement = Statement::new(qid("Q42"), pid("P31"), Value::Item(qid("Q5")));
        statement.add_qualifier(
            pid("P580"),
            Value::day_precision_time("+2001-01-01T00:00:00Z"),
        );
        statement.add_reference(Reference::new([(
            pid("P854"),
            Value::String("https://example.com".into()),
        )]));
        statement.rank = Rank::Deprecated;

        let claim =
            statement_to_claim(&statement, Some("Q42$guid-1".into()), &datatypes).unwrap();
        let decoded = claim_to_statement(&qid("Q42"), &claim).unwrap();

        assert_eq!(decoded.value, statement.value);
        assert_eq!(decoded.rank, statement.rank);
        assert_eq!(decoded.qualifiers, statement.qualifiers);
        assert_eq!(decoded.reference_set(), statement.reference_set());
    }

    #[test]
    fn quantity_unit_one_means_unitless() {
        let dv = DataValue::Quantity(QuantityValue {
            amount: "+12".into(),
            unit: "1".into(),
            lower_bound: None,
            upper_bound: None,
        });
        assert_eq!(
            decode_datavalue(&dv, Some(DataType::Quantity)).unwrap(),
            Value::plain_quantity("+12")
        );
    }

    #[test]
    fn apply_datatypes_promotes_strings() {
        let mut doc =
            crate::loader::load_document(r#"wd:Q42 wdt:P4947 "123" ."#).unwrap();
        let datatypes: BTreeMap<PropertyId, DataType> =
            [(pid("P4947"), DataType::ExternalId)].into();
        apply_datatypes(&mut doc, &datatypes);
        assert_eq!(
            doc.entities[&qid("Q42")][0].value,
            Value::ExternalId("123".into())
        );
    }

    #[test]
    fn missing_entity_doc_parses() {
        let json = r#"{"entities": {"Q999999999": {"id": "Q999999999", "missing": ""}}}"#;
        let resp: GetEntitiesResponse = serde_json::from_str(json).unwrap();
        assert!(resp.entities["Q999999999"].missing.is_some());
    }
}
