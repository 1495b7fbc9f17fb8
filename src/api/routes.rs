use crate::api::get_embedded_asset;
use crate::catalog::Quest;
use crate::config::Config;
use crate::export;
use crate::leaderboard::{
    self, LeaderboardFeed, LeaderboardRange, LeaderboardRow, LeaderboardSnapshot, QueryTicket,
};
use crate::profile::store::{ProfileStore, SettingsUpdate};
use crate::profile::{ActivityEntry, ProfileState, Settings};
use crate::progress::badges::{self, Badge};
use crate::progress::{self, ProfileStats, log};
use crate::remote::ActivitySink;
use anyhow::{Context, anyhow};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub store: Arc<Mutex<ProfileStore>>,
    pub sink: Arc<dyn ActivitySink>,
    pub feed: Arc<Mutex<LeaderboardFeed>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/quests", get(quests))
        .route("/api/v1/profiles", get(profiles_list).post(profiles_add))
        .route(
            "/api/v1/profiles/:name",
            get(profile_get).delete(profiles_remove),
        )
        .route("/api/v1/profiles/:name/complete", post(profile_complete))
        .route("/api/v1/profiles/:name/settings", put(profile_settings))
        .route("/api/v1/profiles/:name/history", get(profile_history))
        .route("/api/v1/profiles/:name/export", get(profile_export))
        .route("/api/v1/leaderboard", get(leaderboard_query))
        .route(
            "/api/v1/leaderboard/selection",
            get(leaderboard_selection_get).put(leaderboard_selection_put),
        )
        .fallback(get(static_assets))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct QuestsQuery {
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    range: Option<String>,
    since: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewProfilePayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CompletePayload {
    quest_id: String,
}

#[derive(Debug, Deserialize)]
struct SelectionPayload {
    range: LeaderboardRange,
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    today: String,
    profiles: usize,
    remote_backend: String,
    api_port: u16,
}

#[derive(Debug, Serialize)]
struct QuestsPayload {
    categories: Vec<String>,
    quests: Vec<Quest>,
}

#[derive(Debug, Serialize)]
struct ProfileView {
    name: String,
    settings: Settings,
    stats: ProfileStats,
    badges: Vec<Badge>,
    today: Vec<ActivityEntry>,
    last_goal_met_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct CompletionPayload {
    entry: ActivityEntry,
    stats: ProfileStats,
}

#[derive(Debug, Serialize)]
struct HistoryPayload {
    name: String,
    count: usize,
    entries: Vec<ActivityEntry>,
}

#[derive(Debug, Serialize)]
struct LeaderboardPayload {
    since: String,
    rows: Vec<LeaderboardRow>,
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusPayload>> {
    let profiles = lock_store(&state)?.profiles()?.len();

    Ok(Json(StatusPayload {
        today: today().format("%Y-%m-%d").to_string(),
        profiles,
        remote_backend: state.sink.describe(),
        api_port: state.config.api_port,
    }))
}

async fn quests(
    State(state): State<ApiState>,
    Query(query): Query<QuestsQuery>,
) -> ApiResult<Json<QuestsPayload>> {
    let store = lock_store(&state)?;
    let catalog = store.catalog();

    Ok(Json(QuestsPayload {
        categories: catalog.categories(),
        quests: catalog
            .filtered(query.category.as_deref())
            .into_iter()
            .cloned()
            .collect(),
    }))
}

async fn profiles_list(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let profiles = lock_store(&state)?.profiles()?;
    Ok(Json(json!({ "profiles": profiles })))
}

async fn profiles_add(
    State(state): State<ApiState>,
    Json(payload): Json<NewProfilePayload>,
) -> ApiResult<Json<ProfileView>> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Profile name must not be empty".to_string()));
    }

    let profile = lock_store(&state)?.add_profile(&payload.name)?;
    Ok(Json(profile_view(&profile, today())))
}

async fn profiles_remove(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let removed = lock_store(&state)?.remove_profile(&name)?;
    if !removed {
        return Err(ApiError::NotFound(format!("Unknown profile: {name}")));
    }

    Ok(Json(json!({ "removed": true, "name": name })))
}

async fn profile_get(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ProfileView>> {
    let profile = load_known_profile(&state, &name)?;
    Ok(Json(profile_view(&profile, today())))
}

async fn profile_complete(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(payload): Json<CompletePayload>,
) -> ApiResult<Json<CompletionPayload>> {
    let date = today();
    let completion = {
        let store = lock_store(&state)?;
        if !store.is_known(&name)? {
            return Err(ApiError::NotFound(format!("Unknown profile: {name}")));
        }
        if store.load(&name)?.find_quest(&payload.quest_id).is_none()
            && store.catalog().find(&payload.quest_id).is_none()
        {
            return Err(ApiError::BadRequest(format!(
                "Unknown quest: {}",
                payload.quest_id
            )));
        }
        store.complete_quest(&name, &payload.quest_id, date)?
    };

    let record = completion.remote_activity();
    let sink = Arc::clone(&state.sink);
    let feed = Arc::clone(&state.feed);
    tokio::spawn(async move {
        let writer = Arc::clone(&sink);
        if let Err(error) = tokio::task::spawn_blocking(move || writer.write(&record)).await {
            warn!(error = %error, "remote write task failed");
        }
        if let Err(error) = refresh_leaderboard(sink, feed, None) {
            warn!(error = %error, "leaderboard refresh after completion failed");
        }
    });

    Ok(Json(CompletionPayload {
        stats: progress::stats(&completion.state, date),
        entry: completion.entry,
    }))
}

async fn profile_settings(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<Settings>> {
    let store = lock_store(&state)?;
    if !store.is_known(&name)? {
        return Err(ApiError::NotFound(format!("Unknown profile: {name}")));
    }

    let profile = store.update_settings(&name, &update)?;
    Ok(Json(profile.settings))
}

async fn profile_history(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryPayload>> {
    let profile = load_known_profile(&state, &name)?;
    let entries = match query.date.as_deref() {
        Some(raw) => log::entries_on(&profile.history, parse_date(raw)?),
        None => profile.history,
    };

    Ok(Json(HistoryPayload {
        name,
        count: entries.len(),
        entries,
    }))
}

async fn profile_export(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let profile = load_known_profile(&state, &name)?;
    let content = export::history_csv(&name, &profile.history);
    let filename = export::export_file_name(&name, today());

    let mut response = Response::new(content.into_response().into_body());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))?,
    );

    Ok(response)
}

async fn leaderboard_query(
    State(state): State<ApiState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<LeaderboardPayload>> {
    let start = match (query.since.as_deref(), query.range.as_deref()) {
        (Some(since), _) => parse_date(since)?,
        (None, Some(range)) => range
            .parse::<LeaderboardRange>()
            .map_err(|error| ApiError::BadRequest(error.to_string()))?
            .start_date(today()),
        (None, None) => LeaderboardRange::default().start_date(today()),
    };

    let sink = Arc::clone(&state.sink);
    let rows = tokio::task::spawn_blocking(move || leaderboard::leaderboard_since(sink.as_ref(), start))
        .await
        .context("Leaderboard worker failed")?;

    Ok(Json(LeaderboardPayload {
        since: start.format("%Y-%m-%d").to_string(),
        rows,
    }))
}

async fn leaderboard_selection_get(
    State(state): State<ApiState>,
) -> ApiResult<Json<LeaderboardSnapshot>> {
    Ok(Json(lock_feed(&state.feed)?.snapshot()))
}

async fn leaderboard_selection_put(
    State(state): State<ApiState>,
    Json(payload): Json<SelectionPayload>,
) -> ApiResult<Json<LeaderboardSnapshot>> {
    let (snapshot, _) = refresh_leaderboard(
        Arc::clone(&state.sink),
        Arc::clone(&state.feed),
        Some(payload.range),
    )?;

    Ok(Json(snapshot))
}

/// Issues a ticket for `range`, or for the current selection when `None`,
/// and resolves it in the background.
pub(crate) fn refresh_leaderboard(
    sink: Arc<dyn ActivitySink>,
    feed: Arc<Mutex<LeaderboardFeed>>,
    range: Option<LeaderboardRange>,
) -> anyhow::Result<(LeaderboardSnapshot, JoinHandle<()>)> {
    let (ticket, snapshot) = {
        let mut guard = feed
            .lock()
            .map_err(|_| anyhow!("Leaderboard feed lock was poisoned"))?;
        let range = range.unwrap_or_else(|| guard.range());
        let ticket = guard.select(range);
        (ticket, guard.snapshot())
    };

    let task = tokio::spawn(resolve_leaderboard(sink, feed, ticket));
    Ok((snapshot, task))
}

async fn resolve_leaderboard(
    sink: Arc<dyn ActivitySink>,
    feed: Arc<Mutex<LeaderboardFeed>>,
    ticket: QueryTicket,
) {
    let start = ticket.range.start_date(today());
    let rows =
        tokio::task::spawn_blocking(move || leaderboard::leaderboard_since(sink.as_ref(), start))
            .await;

    match rows {
        Ok(rows) => match feed.lock() {
            Ok(mut feed) => {
                feed.resolve(ticket, rows);
            }
            Err(_) => warn!("leaderboard feed lock poisoned"),
        },
        Err(error) => warn!(error = %error, "leaderboard refresh task failed"),
    }
}

async fn static_assets(uri: Uri) -> ApiResult<Response> {
    let path = uri.path();

    match get_embedded_asset(path) {
        Some((bytes, mime)) => {
            let mut response = Response::new(bytes.into_response().into_body());
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_str(&mime)?);
            Ok(response)
        }
        None => Err(ApiError::NotFound("Static asset not found".to_string())),
    }
}

fn profile_view(profile: &ProfileState, date: NaiveDate) -> ProfileView {
    ProfileView {
        name: profile.name.clone(),
        settings: profile.settings.clone(),
        stats: progress::stats(profile, date),
        badges: badges::evaluate(profile),
        today: log::entries_on(&profile.history, date),
        last_goal_met_date: profile.last_goal_met_date,
    }
}

fn load_known_profile(state: &ApiState, name: &str) -> ApiResult<ProfileState> {
    let store = lock_store(state)?;
    if !store.is_known(name)? {
        return Err(ApiError::NotFound(format!("Unknown profile: {name}")));
    }

    Ok(store.load(name)?)
}

fn lock_store(state: &ApiState) -> ApiResult<MutexGuard<'_, ProfileStore>> {
    state
        .store
        .lock()
        .map_err(|_| ApiError::Internal(anyhow!("Profile store lock was poisoned")))
}

fn lock_feed(feed: &Mutex<LeaderboardFeed>) -> ApiResult<MutexGuard<'_, LeaderboardFeed>> {
    feed.lock()
        .map_err(|_| ApiError::Internal(anyhow!("Leaderboard feed lock was poisoned")))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn parse_date(input: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("Invalid date format: {input}. Example: 2024-01-31"))
    })
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl From<axum::http::header::InvalidHeaderValue> for ApiError {
    fn from(value: axum::http::header::InvalidHeaderValue) -> Self {
        Self::Internal(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiError, ApiState, CompletePayload, parse_date, profile_complete, profile_view};
    use crate::catalog::QuestCatalog;
    use crate::config::Config;
    use crate::leaderboard::{LeaderboardFeed, LeaderboardRow};
    use crate::profile::ProfileState;
    use crate::profile::store::ProfileStore;
    use crate::progress::apply_completion_at;
    use crate::remote::MemorySink;
    use axum::Json;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn invalid_dates_are_bad_requests() {
        let error = parse_date("31/01/2024").expect_err("rejected");
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn view_only_lists_today_newest_first() {
        let catalog = QuestCatalog::default();
        let quest = catalog.find("book-meeting").expect("quest").clone();
        let yesterday = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        let today = NaiveDate::from_ymd_opt(2024, 1, 2).expect("date");

        let state = ProfileState::fresh("ana", &catalog.quests, 100);
        let state = apply_completion_at(&state, &quest, yesterday, 1);
        let state = apply_completion_at(&state, &quest, today, 2);
        let state = apply_completion_at(&state, &quest, today, 3);

        let view = profile_view(&state, today);
        assert_eq!(view.today.len(), 2);
        assert_eq!(view.today[0].timestamp, 3);
        assert_eq!(view.stats.today_points, 30);
        assert_eq!(view.badges.iter().filter(|badge| badge.earned).count(), 1);
    }

    #[tokio::test]
    async fn completion_reaches_the_dashboard_leaderboard() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ProfileStore::open(
            &dir.path().join("profiles.db"),
            QuestCatalog::default(),
            100,
        )
        .expect("store opened");
        store.add_profile("ana").expect("added");

        let state = ApiState {
            config: Arc::new(Config::default()),
            store: Arc::new(Mutex::new(store)),
            sink: Arc::new(MemorySink::default()),
            feed: Arc::new(Mutex::new(LeaderboardFeed::default())),
        };

        profile_complete(
            State(state.clone()),
            Path("ana".to_string()),
            Json(CompletePayload {
                quest_id: "close-deal".to_string(),
            }),
        )
        .await
        .expect("completed");

        let mut rows = Vec::new();
        for _ in 0..100 {
            let snapshot = state.feed.lock().expect("feed").snapshot();
            if !snapshot.pending && !snapshot.rows.is_empty() {
                rows = snapshot.rows;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(
            rows,
            vec![LeaderboardRow {
                name: "ana".to_string(),
                points: 75,
            }]
        );
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError::NotFound("missing".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
