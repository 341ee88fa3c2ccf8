//! Rich diagnostic error types for wd-reconcile.
//!
//! Each stage defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so the operator knows
//! exactly which triple or which remote call went wrong.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the reconciliation pipeline.
///
/// Each variant wraps a stage-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum WdrError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Api(#[from] ApiError),
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors raised while loading the input RDF document.
///
/// Parse errors are fatal for the whole run: the input is a single coherent
/// authoring unit, and nothing is applied before it parses cleanly.
#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("RDF syntax error: {message}")]
    #[diagnostic(
        code(wdr::parse::syntax),
        help(
            "The input document is not valid Turtle. The standard Wikidata \
             prefixes (wd:, wdt:, p:, ps:, pq:, pr:, ...) are pre-declared \
             and do not need PREFIX directives."
        )
    )]
    Syntax { message: String },

    #[error("statement node for {property} on {entity} has no main value")]
    #[diagnostic(
        code(wdr::parse::missing_main_value),
        help(
            "Every statement node attached via p:Pnnn must carry its main \
             value via a matching ps:Pnnn (or psv:Pnnn) triple."
        )
    )]
    MissingMainValue { entity: String, property: String },

    #[error("statement node for {property} on {entity} declares a main value for {found}")]
    #[diagnostic(
        code(wdr::parse::main_value_mismatch),
        help(
            "The ps:/psv: property on a statement node must name the same \
             property the node is attached with."
        )
    )]
    MainValueMismatch {
        entity: String,
        property: String,
        found: String,
    },

    #[error("statement node {node} is attached to both {first} and {second}")]
    #[diagnostic(
        code(wdr::parse::ambiguous_statement_node),
        help(
            "A statement node groups the triples of exactly one statement on \
             one entity. Attach a separate node to each entity instead of \
             sharing one."
        )
    )]
    AmbiguousStatementNode {
        node: String,
        first: String,
        second: String,
    },

    #[error("statement node {node} is not attached to any entity")]
    #[diagnostic(
        code(wdr::parse::dangling_statement_node),
        help(
            "Statement nodes carry no durable identity. Attach the node to an \
             entity with a p:Pnnn triple so the loader knows which statement \
             it describes."
        )
    )]
    DanglingStatementNode { node: String },

    #[error("reference node on {property} of {entity} has no property-value pairs")]
    #[diagnostic(
        code(wdr::parse::empty_reference),
        help("A reference node needs at least one pr:Pnnn (or prv:Pnnn) triple.")
    )]
    EmptyReference { entity: String, property: String },

    #[error("cannot interpret {term} as a statement value")]
    #[diagnostic(
        code(wdr::parse::unsupported_term),
        help(
            "Supported value terms: wd: entity IRIs, plain and language-tagged \
             literals, xsd:decimal/xsd:integer, xsd:dateTime/xsd:date, \
             geo:wktLiteral points, commonsMedia: file IRIs, and typed \
             wikibase:TimeValue / wikibase:QuantityValue nodes."
        )
    )]
    UnsupportedTerm { term: String },

    #[error("malformed value node: {message}")]
    #[diagnostic(
        code(wdr::parse::bad_value_node),
        help(
            "Typed value nodes must carry their required predicate: \
             wikibase:timeValue for TimeValue, wikibase:quantityAmount for \
             QuantityValue."
        )
    )]
    BadValueNode { message: String },

    #[error("invalid identifier: {id}")]
    #[diagnostic(
        code(wdr::parse::invalid_id),
        help("Entity ids look like Q42, property ids like P31.")
    )]
    InvalidId { id: String },
}

// ---------------------------------------------------------------------------
// Remote API errors
// ---------------------------------------------------------------------------

/// Errors from the remote Wikibase store.
///
/// [`ApiError::is_transient`] separates failures worth retrying (network,
/// replication lag) from semantic failures that will not go away on their own.
#[derive(Debug, Error, Diagnostic)]
pub enum ApiError {
    #[error("transport failure: {message}")]
    #[diagnostic(
        code(wdr::api::transport),
        help("Network or service-level failure. The operation is safe to retry.")
    )]
    Transport { message: String },

    #[error("server lagged behind by {lag:.1}s, backing off")]
    #[diagnostic(
        code(wdr::api::maxlag),
        help(
            "The API asked clients to back off (maxlag). This resolves itself; \
             the request is retried after a pause."
        )
    )]
    Lagged { lag: f64 },

    #[error("entity {entity} does not exist")]
    #[diagnostic(
        code(wdr::api::entity_not_found),
        help("Check the QID in the input document, or whether the item was deleted.")
    )]
    EntityNotFound { entity: String },

    #[error("edit conflict: {message}")]
    #[diagnostic(
        code(wdr::api::conflict),
        help(
            "The live statement changed or disappeared between planning and \
             applying this operation. The operation is skipped; rerun the \
             patch to reconcile against the new live state."
        )
    )]
    Conflict { message: String },

    #[error("login failed: {reason}")]
    #[diagnostic(
        code(wdr::api::login),
        help("Check WIKIDATA_USERNAME / WIKIDATA_PASSWORD. Bot passwords work too.")
    )]
    LoginFailed { reason: String },

    #[error("API error [{code}] {info}")]
    #[diagnostic(
        code(wdr::api::service),
        help("The API rejected the request for a semantic reason; it is not retried.")
    )]
    Service { code: String, info: String },

    #[error("unexpected API response: {message}")]
    #[diagnostic(
        code(wdr::api::decode),
        help("The response did not match the expected Wikibase JSON shape.")
    )]
    Decode { message: String },

    #[error("no datatype known for property {property}")]
    #[diagnostic(
        code(wdr::api::unknown_datatype),
        help(
            "Every snak sent to the API needs the property's datatype. \
             Datatypes are prefetched for all properties the input mentions; \
             this property was not among them."
        )
    )]
    UnknownDatatype { property: String },

    #[error("value not valid for {property} ({datatype}): {message}")]
    #[diagnostic(
        code(wdr::api::invalid_value),
        help(
            "The property's datatype only accepts certain value kinds, \
             e.g. wikibase-item properties take entity values, \
             external-id properties take strings."
        )
    )]
    InvalidValue {
        property: String,
        datatype: String,
        message: String,
    },
}

impl ApiError {
    /// Whether the failure is worth retrying with the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport { .. } | ApiError::Lagged { .. })
    }
}

/// Convenience alias for pipeline results.
pub type WdrResult<T> = std::result::Result<T, WdrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_converts_to_wdr_error() {
        let err = ParseError::MissingMainValue {
            entity: "Q42".into(),
            property: "P31".into(),
        };
        let wdr: WdrError = err.into();
        assert!(matches!(
            wdr,
            WdrError::Parse(ParseError::MissingMainValue { .. })
        ));
    }

    #[test]
    fn transient_classification() {
        assert!(
            ApiError::Transport {
                message: "connection reset".into()
            }
            .is_transient()
        );
        assert!(ApiError::Lagged { lag: 6.2 }.is_transient());
        assert!(
            !ApiError::Conflict {
                message: "no such claim".into()
            }
            .is_transient()
        );
        assert!(
            !ApiError::Service {
                code: "badtoken".into(),
                info: "invalid CSRF token".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn error_display_carries_context() {
        let err = ParseError::AmbiguousStatementNode {
            node: "wds:local-1".into(),
            first: "Q42".into(),
            second: "Q43".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("Q42"));
        assert!(msg.contains("Q43"));
    }
}
