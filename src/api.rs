//! MediaWiki Action API client for Wikibase edits.
//!
//! [`RemoteStore`] is the seam the executor and driver work against;
//! [`WikidataApi`] is the production implementation speaking the Action API
//! over HTTP (`wbgetentities`, `wbgetclaims`, `wbsetclaim`,
//! `wbremoveclaims`). Tests substitute their own stores.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value as Json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::model::{EntityId, PropertyId, Qualifiers, Rank, Reference, Statement, StatementId};
use crate::wire::{self, Claim, DataType, GetEntitiesResponse};

/// Production Wikidata endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://www.wikidata.org/w/api.php";

/// Wikimedia asks every API consumer to identify itself.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "wd-reconcile/",
    env!("CARGO_PKG_VERSION"),
    " (https://wd-reconcile.dev)"
);

/// `wbgetentities` accepts at most 50 ids per request.
const ID_BATCH: usize = 50;

/// Bounded in-client retries when the servers report replication lag.
const LAG_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// RemoteStore
// ---------------------------------------------------------------------------

/// The operations the reconciler needs from a live statement store.
pub trait RemoteStore {
    /// Fetch the live statements of `entity`, restricted to `properties`.
    /// Statements under other properties are invisible to the reconciler.
    fn fetch_statements(
        &self,
        entity: &EntityId,
        properties: &BTreeSet<PropertyId>,
    ) -> Result<Vec<Statement>, ApiError>;

    /// Resolve property datatypes, required to build snaks for writes.
    fn fetch_property_datatypes(
        &self,
        properties: &BTreeSet<PropertyId>,
    ) -> Result<BTreeMap<PropertyId, DataType>, ApiError>;

    /// Create a new statement, returning the claim id it was stored under.
    fn create_statement(
        &self,
        statement: &Statement,
        summary: &str,
    ) -> Result<StatementId, ApiError>;

    /// Replace the qualifier set of an existing statement.
    fn set_qualifiers(
        &self,
        id: &StatementId,
        qualifiers: &Qualifiers,
        summary: &str,
    ) -> Result<(), ApiError>;

    /// Replace the reference records of an existing statement.
    fn set_references(
        &self,
        id: &StatementId,
        references: &[Reference],
        summary: &str,
    ) -> Result<(), ApiError>;

    /// Change the rank of an existing statement.
    fn set_rank(&self, id: &StatementId, rank: Rank, summary: &str) -> Result<(), ApiError>;

    /// Delete a statement by claim id.
    fn delete_statement(&self, id: &StatementId, summary: &str) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

/// Minimum-interval pacing between edits.
pub struct Throttle {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Throttle {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Block until at least `min_interval` has passed since the previous
    /// call, then mark now as the new reference point.
    pub fn wait(&self) {
        let mut last = self.last.lock().expect("throttle lock poisoned");
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let pause = self.min_interval - elapsed;
                debug!(?pause, "throttling before next edit");
                std::thread::sleep(pause);
            }
        }
        *last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub endpoint: String,
    pub user_agent: String,
    /// `maxlag` parameter sent with every request. The servers reject the
    /// request when replication lag exceeds this many seconds.
    pub maxlag: f64,
    /// Minimum pause between consecutive edits.
    pub edit_interval: Duration,
    /// Send `bot=1` and `assert=bot` with edits.
    pub bot: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            maxlag: 5.0,
            edit_interval: Duration::from_secs(1),
            bot: false,
        }
    }
}

// ---------------------------------------------------------------------------
// WikidataApi
// ---------------------------------------------------------------------------

struct Session {
    username: String,
    password: String,
    csrf_token: String,
}

/// HTTP client for one Wikibase instance. Holds the login session (cookies
/// live in the agent's jar) and a cache of property datatypes.
pub struct WikidataApi {
    agent: ureq::Agent,
    config: ApiConfig,
    throttle: Throttle,
    session: Mutex<Option<Session>>,
    datatypes: Mutex<BTreeMap<PropertyId, DataType>>,
}

impl WikidataApi {
    pub fn new(config: ApiConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        WikidataApi {
            agent,
            throttle: Throttle::new(config.edit_interval),
            config,
            session: Mutex::new(None),
            datatypes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Log in with a bot password and obtain a CSRF token for edits.
    pub fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let login_token = self.fetch_token("login")?;
        let response = self.api_post(vec![
            ("action".into(), "login".into()),
            ("lgname".into(), username.to_string()),
            ("lgpassword".into(), password.to_string()),
            ("lgtoken".into(), login_token),
        ])?;

        let result = response["login"]["result"].as_str().unwrap_or("");
        if result != "Success" {
            return Err(ApiError::LoginFailed {
                reason: response["login"]["reason"]
                    .as_str()
                    .unwrap_or(result)
                    .to_string(),
            });
        }

        let csrf_token = self.fetch_token("csrf")?;
        let mut session = self.session.lock().expect("session lock poisoned");
        *session = Some(Session {
            username: username.to_string(),
            password: password.to_string(),
            csrf_token,
        });
        debug!(username, "logged in");
        Ok(())
    }

    /// Fetch a page over plain HTTP and collect every item id mentioned in
    /// it. Used for on-wiki blocklist pages.
    pub fn fetch_page_qids(&self, url: &str) -> Result<BTreeSet<EntityId>, ApiError> {
        let body = self
            .agent
            .get(url)
            .set("User-Agent", &self.config.user_agent)
            .call()
            .map_err(transport_error)?
            .into_string()
            .map_err(|e| ApiError::Transport {
                message: e.to_string(),
            })?;
        Ok(extract_qids(&body))
    }

    // -- request plumbing --

    fn fetch_token(&self, kind: &str) -> Result<String, ApiError> {
        let response = self.api_get(&[
            ("action", "query"),
            ("meta", "tokens"),
            ("type", kind),
        ])?;
        response["query"]["tokens"][format!("{kind}token")]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode {
                message: format!("no {kind} token in response"),
            })
    }

    fn api_get(&self, params: &[(&str, &str)]) -> Result<Json, ApiError> {
        self.with_lag_retry(|| {
            let maxlag = self.config.maxlag.to_string();
            let mut request = self
                .agent
                .get(&self.config.endpoint)
                .set("User-Agent", &self.config.user_agent)
                .query("format", "json")
                .query("maxlag", &maxlag);
            for (key, value) in params {
                request = request.query(key, value);
            }
            let json: Json = request
                .call()
                .map_err(transport_error)?
                .into_json()
                .map_err(|e| ApiError::Decode {
                    message: e.to_string(),
                })?;
            check_response(json)
        })
    }

    fn api_post(&self, params: Vec<(String, String)>) -> Result<Json, ApiError> {
        self.with_lag_retry(|| {
            let mut form: Vec<(&str, &str)> = vec![("format", "json")];
            let maxlag = self.config.maxlag.to_string();
            form.push(("maxlag", &maxlag));
            for (key, value) in &params {
                form.push((key, value));
            }
            let json: Json = self
                .agent
                .post(&self.config.endpoint)
                .set("User-Agent", &self.config.user_agent)
                .send_form(&form)
                .map_err(transport_error)?
                .into_json()
                .map_err(|e| ApiError::Decode {
                    message: e.to_string(),
                })?;
            check_response(json)
        })
    }

    fn with_lag_retry<F>(&self, mut call: F) -> Result<Json, ApiError>
    where
        F: FnMut() -> Result<Json, ApiError>,
    {
        let mut attempt = 0;
        loop {
            match call() {
                Err(ApiError::Lagged { lag }) if attempt < LAG_RETRIES => {
                    attempt += 1;
                    let pause = Duration::from_secs_f64(lag.max(5.0));
                    warn!(lag, attempt, "servers lagged, backing off");
                    std::thread::sleep(pause);
                }
                other => return other,
            }
        }
    }

    /// Run an authenticated edit POST. Paced by the throttle; a dropped
    /// session (`assert*failed`) is renewed once and the edit retried.
    fn edit_post(&self, mut params: Vec<(String, String)>) -> Result<Json, ApiError> {
        self.throttle.wait();
        let token = {
            let session = self.session.lock().expect("session lock poisoned");
            session
                .as_ref()
                .map(|s| s.csrf_token.clone())
                .ok_or(ApiError::LoginFailed {
                    reason: "not logged in".to_string(),
                })?
        };
        params.push(("token".into(), token));
        if self.config.bot {
            params.push(("bot".into(), "1".into()));
            params.push(("assert".into(), "bot".into()));
        } else {
            params.push(("assert".into(), "user".into()));
        }

        match self.api_post(params.clone()) {
            Err(ApiError::Service { code, .. }) if code.starts_with("assert") => {
                warn!("session expired, logging in again");
                self.relogin()?;
                // Renew the token on the retried request.
                let token = {
                    let session = self.session.lock().expect("session lock poisoned");
                    session
                        .as_ref()
                        .map(|s| s.csrf_token.clone())
                        .ok_or(ApiError::LoginFailed {
                            reason: "relogin left no session".to_string(),
                        })?
                };
                for param in params.iter_mut() {
                    if param.0 == "token" {
                        param.1 = token.clone();
                    }
                }
                self.api_post(params)
            }
            other => other,
        }
    }

    fn relogin(&self) -> Result<(), ApiError> {
        let credentials = {
            let session = self.session.lock().expect("session lock poisoned");
            session
                .as_ref()
                .map(|s| (s.username.clone(), s.password.clone()))
        };
        match credentials {
            Some((username, password)) => self.login(&username, &password),
            None => Err(ApiError::LoginFailed {
                reason: "no stored credentials".to_string(),
            }),
        }
    }

    // -- datatype cache --

    /// Return datatypes for `properties`, fetching any not yet cached in
    /// batches of [`ID_BATCH`].
    fn ensure_datatypes(
        &self,
        properties: &BTreeSet<PropertyId>,
    ) -> Result<BTreeMap<PropertyId, DataType>, ApiError> {
        let missing: Vec<PropertyId> = {
            let cache = self.datatypes.lock().expect("datatype lock poisoned");
            properties
                .iter()
                .filter(|p| !cache.contains_key(*p))
                .cloned()
                .collect()
        };

        for batch in missing.chunks(ID_BATCH) {
            let ids = batch
                .iter()
                .map(PropertyId::as_str)
                .collect::<Vec<_>>()
                .join("|");
            debug!(count = batch.len(), "fetching property datatypes");
            let response = self.api_get(&[
                ("action", "wbgetentities"),
                ("ids", &ids),
                ("props", "datatype"),
            ])?;
            let parsed: GetEntitiesResponse =
                serde_json::from_value(response).map_err(|e| ApiError::Decode {
                    message: e.to_string(),
                })?;
            let mut cache = self.datatypes.lock().expect("datatype lock poisoned");
            for (id, doc) in parsed.entities {
                let Some(property) = PropertyId::new(&id) else {
                    continue;
                };
                match doc.datatype {
                    Some(datatype) => {
                        cache.insert(property, datatype);
                    }
                    None => {
                        return Err(ApiError::UnknownDatatype { property: id });
                    }
                }
            }
        }

        let cache = self.datatypes.lock().expect("datatype lock poisoned");
        for property in properties {
            if !cache.contains_key(property) {
                return Err(ApiError::UnknownDatatype {
                    property: property.to_string(),
                });
            }
        }
        Ok(cache.clone())
    }

    /// Fetch the current wire form of one claim.
    fn fetch_claim(&self, id: &StatementId) -> Result<Claim, ApiError> {
        #[derive(serde::Deserialize)]
        struct Resp {
            #[serde(default)]
            claims: BTreeMap<String, Vec<Claim>>,
        }
        let response = self.api_get(&[("action", "wbgetclaims"), ("claim", id.as_str())])?;
        let parsed: Resp = serde_json::from_value(response).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })?;
        parsed
            .claims
            .into_values()
            .flatten()
            .next()
            .ok_or_else(|| ApiError::Conflict {
                message: format!("claim {id} no longer exists"),
            })
    }

    fn push_claim(&self, claim: &Claim, summary: &str) -> Result<Json, ApiError> {
        let body = serde_json::to_string(claim).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })?;
        self.edit_post(vec![
            ("action".into(), "wbsetclaim".into()),
            ("claim".into(), body),
            ("summary".into(), summary.to_string()),
        ])
    }
}

impl RemoteStore for WikidataApi {
    fn fetch_statements(
        &self,
        entity: &EntityId,
        properties: &BTreeSet<PropertyId>,
    ) -> Result<Vec<Statement>, ApiError> {
        let response = self.api_get(&[
            ("action", "wbgetentities"),
            ("ids", entity.as_str()),
            ("props", "claims"),
        ])?;
        let parsed: GetEntitiesResponse =
            serde_json::from_value(response).map_err(|e| ApiError::Decode {
                message: e.to_string(),
            })?;

        let doc = parsed
            .entities
            .into_values()
            .next()
            .ok_or_else(|| ApiError::EntityNotFound {
                entity: entity.to_string(),
            })?;
        if doc.missing.is_some() {
            return Err(ApiError::EntityNotFound {
                entity: entity.to_string(),
            });
        }

        let mut statements = Vec::new();
        for (key, claims) in &doc.claims {
            let Some(property) = PropertyId::new(key.as_str()) else {
                continue;
            };
            if !properties.contains(&property) {
                continue;
            }
            for claim in claims {
                statements.push(wire::claim_to_statement(entity, claim)?);
            }
        }
        Ok(statements)
    }

    fn fetch_property_datatypes(
        &self,
        properties: &BTreeSet<PropertyId>,
    ) -> Result<BTreeMap<PropertyId, DataType>, ApiError> {
        let mut datatypes = self.ensure_datatypes(properties)?;
        datatypes.retain(|p, _| properties.contains(p));
        Ok(datatypes)
    }

    fn create_statement(
        &self,
        statement: &Statement,
        summary: &str,
    ) -> Result<StatementId, ApiError> {
        let datatypes = self.ensure_datatypes(&statement_properties(statement))?;
        let guid = format!(
            "{}${}",
            statement.subject,
            Uuid::new_v4().to_string().to_uppercase()
        );
        let claim = wire::statement_to_claim(statement, Some(guid.clone()), &datatypes)?;
        self.push_claim(&claim, summary)?;
        StatementId::new(guid).ok_or_else(|| ApiError::Decode {
            message: "generated empty claim id".to_string(),
        })
    }

    fn set_qualifiers(
        &self,
        id: &StatementId,
        qualifiers: &Qualifiers,
        summary: &str,
    ) -> Result<(), ApiError> {
        let datatypes = self.ensure_datatypes(&qualifiers.keys().cloned().collect())?;
        let mut claim = self.fetch_claim(id)?;
        let (snaks, order) = wire::encode_qualifiers(qualifiers, &datatypes)?;
        claim.qualifiers = snaks;
        claim.qualifiers_order = order;
        self.push_claim(&claim, summary)?;
        Ok(())
    }

    fn set_references(
        &self,
        id: &StatementId,
        references: &[Reference],
        summary: &str,
    ) -> Result<(), ApiError> {
        let properties = references
            .iter()
            .flat_map(|r| r.pairs().iter().map(|(p, _)| p.clone()))
            .collect();
        let datatypes = self.ensure_datatypes(&properties)?;
        let mut claim = self.fetch_claim(id)?;
        claim.references = wire::encode_references(references, &datatypes)?;
        self.push_claim(&claim, summary)?;
        Ok(())
    }

    fn set_rank(&self, id: &StatementId, rank: Rank, summary: &str) -> Result<(), ApiError> {
        let mut claim = self.fetch_claim(id)?;
        claim.rank = rank;
        self.push_claim(&claim, summary)?;
        Ok(())
    }

    fn delete_statement(&self, id: &StatementId, summary: &str) -> Result<(), ApiError> {
        self.edit_post(vec![
            ("action".into(), "wbremoveclaims".into()),
            ("claim".into(), id.as_str().to_string()),
            ("summary".into(), summary.to_string()),
        ])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

fn transport_error(error: ureq::Error) -> ApiError {
    match error {
        ureq::Error::Status(code, response) => ApiError::Transport {
            message: format!("HTTP {code} from {}", response.get_url()),
        },
        ureq::Error::Transport(t) => ApiError::Transport {
            message: t.to_string(),
        },
    }
}

/// Map the API's in-band `error` object onto [`ApiError`], and surface
/// `warnings` in the log.
fn check_response(json: Json) -> Result<Json, ApiError> {
    if let Some(warnings) = json.get("warnings") {
        warn!(%warnings, "API warnings");
    }
    let Some(error) = json.get("error") else {
        return Ok(json);
    };
    let code = error["code"].as_str().unwrap_or("unknown").to_string();
    let info = error["info"].as_str().unwrap_or("").to_string();
    Err(match code.as_str() {
        "maxlag" => ApiError::Lagged {
            lag: error["lag"].as_f64().unwrap_or(5.0),
        },
        "no-such-entity" => ApiError::EntityNotFound { entity: info },
        "no-such-claim" | "modification-failed" | "editconflict" => {
            ApiError::Conflict { message: info }
        }
        _ => ApiError::Service { code, info },
    })
}

static QID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Q[0-9]+").expect("valid regex"));

/// Every item id mentioned anywhere in `text`, in wikitext or HTML form.
fn extract_qids(text: &str) -> BTreeSet<EntityId> {
    QID.find_iter(text)
        .filter_map(|m| EntityId::new(m.as_str()))
        .collect()
}

/// Every property used anywhere in a statement: main value, qualifiers,
/// reference records.
fn statement_properties(statement: &Statement) -> BTreeSet<PropertyId> {
    let mut properties = BTreeSet::new();
    properties.insert(statement.property.clone());
    properties.extend(statement.qualifiers.keys().cloned());
    for reference in &statement.references {
        properties.extend(reference.pairs().iter().map(|(p, _)| p.clone()));
    }
    properties
}
