use crate::config::{Config, set_mode_600};
use crate::remote::{ActivitySink, RemoteActivity};
use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECONDS: i64 = 300;
const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 3600;

/// Activity log kept in a Firestore collection, written with an anonymous
/// identity token.
pub struct FirestoreSink {
    api_key: String,
    project_id: String,
    collection: String,
    auth_base_url: String,
    firestore_base_url: String,
    token_base_url: String,
    session_path: PathBuf,
    timeout_seconds: u64,
    session: Mutex<Option<RemoteSession>>,
}

/// Anonymous identity, cached on disk so repeated CLI runs reuse one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub project_id: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl RemoteSession {
    pub fn needs_refresh(&self, now: i64) -> bool {
        now + REFRESH_MARGIN_SECONDS >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
    local_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

/// Non-success HTTP status from the remote API.
#[derive(Debug)]
struct RemoteStatusError {
    status: StatusCode,
    body: String,
}

impl fmt::Display for RemoteStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Remote API error {}: {}", self.status, self.body)
    }
}

impl std::error::Error for RemoteStatusError {}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    fields: HashMap<String, FieldValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldValue {
    string_value: Option<String>,
    integer_value: Option<String>,
    double_value: Option<f64>,
}

impl FieldValue {
    fn text(&self) -> String {
        self.string_value.clone().unwrap_or_default()
    }

    fn points(&self) -> u64 {
        self.integer_value
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
            .or_else(|| self.double_value.map(|value| value as i64))
            .unwrap_or_default()
            .max(0) as u64
    }
}

impl FirestoreSink {
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .resolve_remote_api_key()
            .context("Remote API key is missing")?;
        let project_id = config
            .remote_project_id
            .clone()
            .filter(|project| !project.trim().is_empty())
            .context("Remote project id is missing")?;

        for (label, raw) in [
            ("auth", &config.remote_auth_base_url),
            ("Firestore", &config.remote_firestore_base_url),
            ("token", &config.remote_token_base_url),
        ] {
            Url::parse(raw).with_context(|| format!("Invalid remote {label} URL: {raw}"))?;
        }

        let session = load_cached_session(&config.remote_session_path, &project_id);

        Ok(Self {
            api_key,
            project_id,
            collection: config.remote_collection.clone(),
            auth_base_url: trimmed_base(&config.remote_auth_base_url),
            firestore_base_url: trimmed_base(&config.remote_firestore_base_url),
            token_base_url: trimmed_base(&config.remote_token_base_url),
            session_path: config.remote_session_path.clone(),
            timeout_seconds: config.remote_timeout_seconds.max(3),
            session: Mutex::new(session),
        })
    }

    /// A usable ID token. Reuses the cached session, refreshes it near
    /// expiry and signs in anonymously only when nothing else works.
    pub fn session_token(&self) -> Result<String> {
        let mut slot = self
            .session
            .lock()
            .map_err(|_| anyhow!("Remote session lock was poisoned"))?;
        let now = Utc::now().timestamp();

        if let Some(session) = slot.as_ref() {
            if !session.needs_refresh(now) {
                return Ok(session.id_token.clone());
            }

            match self.refresh(session, now) {
                Ok(refreshed) => {
                    let token = refreshed.id_token.clone();
                    self.store_session(&mut *slot, refreshed);
                    return Ok(token);
                }
                Err(error) => warn!(error = %error, "remote session refresh failed. signing in again"),
            }
        }

        let session = self.sign_in_anonymously(now)?;
        let token = session.id_token.clone();
        self.store_session(&mut *slot, session);
        Ok(token)
    }

    pub fn try_write(&self, record: &RemoteActivity) -> Result<()> {
        let document_id = uuid::Uuid::new_v4().simple().to_string();
        let url = self.endpoint(&self.firestore_base_url, &self.database_path(":commit"))?;
        let body = self.commit_body(record, &document_id);

        self.authorized(|token| {
            post_json(url.clone(), token, body.clone(), self.timeout_seconds).map(|_| ())
        })
    }

    pub fn try_query_since(&self, start: NaiveDate) -> Result<Vec<RemoteActivity>> {
        let url = self.endpoint(&self.firestore_base_url, &self.database_path(":runQuery"))?;
        let body = self.run_query_body(start);

        let response = self.authorized(|token| {
            post_json(url.clone(), token, body.clone(), self.timeout_seconds)
        })?;
        parse_run_query(&response)
    }

    /// Runs `call` with the current token. A rejected token is dropped and
    /// the call is retried once with a fresh session.
    fn authorized<T>(&self, call: impl Fn(Option<String>) -> Result<T>) -> Result<T> {
        match call(self.token_or_warn()) {
            Err(error) if is_unauthorized(&error) => {
                warn!("remote session rejected. retrying with a new session");
                self.clear_session();
                call(self.token_or_warn())
            }
            other => other,
        }
    }

    fn token_or_warn(&self) -> Option<String> {
        self.session_token()
            .map_err(|error| warn!(error = %error, "anonymous sign-in failed. sending API key only"))
            .ok()
    }

    fn sign_in_anonymously(&self, now: i64) -> Result<RemoteSession> {
        let url = self.endpoint(&self.auth_base_url, "accounts:signUp")?;
        let body = post_json(
            url,
            None,
            json!({ "returnSecureToken": true }),
            self.timeout_seconds,
        )?;

        let parsed: SignUpResponse = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse sign-in response: {body}"))?;
        info!(
            uid = parsed.local_id.as_deref().unwrap_or("unknown"),
            "anonymous session established"
        );

        Ok(RemoteSession {
            project_id: self.project_id.clone(),
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
            expires_at: now + lifetime_seconds(parsed.expires_in.as_deref()),
        })
    }

    fn refresh(&self, session: &RemoteSession, now: i64) -> Result<RemoteSession> {
        let url = self.endpoint(&self.token_base_url, "token")?;
        let body = post_json(
            url,
            None,
            json!({
                "grant_type": "refresh_token",
                "refresh_token": session.refresh_token,
            }),
            self.timeout_seconds,
        )?;

        let parsed: RefreshResponse = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse token refresh response: {body}"))?;
        debug!("remote session refreshed");

        Ok(RemoteSession {
            project_id: self.project_id.clone(),
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
            expires_at: now + lifetime_seconds(parsed.expires_in.as_deref()),
        })
    }

    fn store_session(&self, slot: &mut Option<RemoteSession>, session: RemoteSession) {
        if let Err(error) = save_cached_session(&self.session_path, &session) {
            warn!(error = %error, "failed to cache remote session");
        }
        *slot = Some(session);
    }

    fn clear_session(&self) {
        if let Ok(mut slot) = self.session.lock() {
            *slot = None;
        }
    }

    fn database_path(&self, suffix: &str) -> String {
        format!(
            "projects/{}/databases/(default)/documents{suffix}",
            self.project_id
        )
    }

    fn endpoint(&self, base: &str, path: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{base}/{path}"))
            .with_context(|| format!("Invalid remote endpoint: {base}/{path}"))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn commit_body(&self, record: &RemoteActivity, document_id: &str) -> Value {
        let name = format!(
            "{}/{}/{document_id}",
            self.database_path(""),
            self.collection
        );
        let display_name = if record.name.trim().is_empty() {
            "Anonymous"
        } else {
            record.name.as_str()
        };

        json!({
            "writes": [{
                "update": {
                    "name": name,
                    "fields": {
                        "name": { "stringValue": display_name },
                        "title": { "stringValue": record.title },
                        "points": { "integerValue": record.points.to_string() },
                        "category": { "stringValue": record.category },
                        "date": { "stringValue": record.date },
                    }
                },
                "updateTransforms": [{
                    "fieldPath": "createdAt",
                    "setToServerValue": "REQUEST_TIME"
                }],
                "currentDocument": { "exists": false }
            }]
        })
    }

    fn run_query_body(&self, start: NaiveDate) -> Value {
        json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "date" },
                        "op": "GREATER_THAN_OR_EQUAL",
                        "value": { "stringValue": start.format("%Y-%m-%d").to_string() }
                    }
                },
                "orderBy": [{
                    "field": { "fieldPath": "date" },
                    "direction": "ASCENDING"
                }]
            }
        })
    }
}

impl ActivitySink for FirestoreSink {
    fn write(&self, record: &RemoteActivity) {
        if let Err(error) = self.try_write(record) {
            warn!(error = %error, name = %record.name, "remote activity write failed");
        }
    }

    fn query_since(&self, start: NaiveDate) -> Vec<RemoteActivity> {
        self.try_query_since(start).unwrap_or_else(|error| {
            warn!(error = %error, start = %start, "remote leaderboard query failed");
            Vec::new()
        })
    }

    fn describe(&self) -> String {
        format!("firestore:{}/{}", self.project_id, self.collection)
    }
}

fn trimmed_base(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}

fn lifetime_seconds(raw: Option<&str>) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|seconds| *seconds > 0)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECONDS)
}

fn is_unauthorized(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<RemoteStatusError>()
        .is_some_and(|status| status.status == StatusCode::UNAUTHORIZED)
}

/// Cached session for `project_id`. Missing, unreadable or foreign caches
/// yield `None`.
fn load_cached_session(path: &Path, project_id: &str) -> Option<RemoteSession> {
    let content = fs::read_to_string(path).ok()?;

    match serde_json::from_str::<RemoteSession>(&content) {
        Ok(session) if session.project_id == project_id => Some(session),
        Ok(_) => None,
        Err(error) => {
            warn!(path = %path.display(), error = %error, "cached remote session is corrupt. ignoring it");
            None
        }
    }
}

fn save_cached_session(path: &Path, session: &RemoteSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create session directory: {}", parent.display()))?;
    }

    let content =
        serde_json::to_string_pretty(session).context("Failed to serialize remote session")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write remote session: {}", path.display()))?;
    set_mode_600(path)
}

fn parse_run_query(body: &str) -> Result<Vec<RemoteActivity>> {
    let items: Vec<RunQueryItem> = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse runQuery response: {body}"))?;

    let records = items
        .into_iter()
        .filter_map(|item| item.document)
        .map(|document| {
            let field = |key: &str| document.fields.get(key);
            RemoteActivity {
                name: field("name").map(FieldValue::text).unwrap_or_default(),
                title: field("title").map(FieldValue::text).unwrap_or_default(),
                points: field("points").map(FieldValue::points).unwrap_or_default(),
                category: field("category").map(FieldValue::text).unwrap_or_default(),
                date: field("date").map(FieldValue::text).unwrap_or_default(),
            }
        })
        .collect();

    Ok(records)
}

/// Runs a blocking POST on its own thread so callers inside a tokio
/// runtime do not trip the blocking client's runtime check.
fn post_json(url: Url, token: Option<String>, body: Value, timeout_seconds: u64) -> Result<String> {
    std::thread::spawn(move || post_json_blocking(url, token.as_deref(), &body, timeout_seconds))
        .join()
        .map_err(|_| anyhow!("remote worker thread panicked"))?
}

fn post_json_blocking(
    url: Url,
    token: Option<&str>,
    body: &Value,
    timeout_seconds: u64,
) -> Result<String> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .context("Failed to build Authorization header")?,
        );
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .default_headers(headers)
        .build()
        .context("Failed to create remote HTTP client")?;

    let response = client
        .post(url.clone())
        .json(body)
        .send()
        .with_context(|| format!("Remote request failed: {}", url.path()))?;

    let status = response.status();
    let text = response.text().context("Failed to read remote response body")?;

    if !status.is_success() {
        return Err(RemoteStatusError { status, body: text }.into());
    }

    Ok(text)
}
