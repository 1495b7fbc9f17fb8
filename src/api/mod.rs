pub mod routes;

use crate::config::Config;
use crate::leaderboard::{LeaderboardFeed, LeaderboardRange};
use crate::profile::store::ProfileStore;
use crate::remote::ActivitySink;
use anyhow::{Context, Result, anyhow};
use axum::Router;
use rust_embed::RustEmbed;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(RustEmbed)]
#[folder = "assets/web"]
struct DashboardAssets;

/// Serves the dashboard until Ctrl+C, then closes the profile store.
pub async fn run_server(
    config: Arc<Config>,
    store: ProfileStore,
    sink: Arc<dyn ActivitySink>,
) -> Result<()> {
    let port = config.api_port;
    let store = Arc::new(Mutex::new(store));
    let (state, _) = dashboard_state(config, Arc::clone(&store), sink)?;
    let app: Router = routes::router(state);

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard server: {addr}"))?;

    info!(address = %addr, "QuestLog dashboard started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("Dashboard server failed")?;

    match Arc::try_unwrap(store) {
        Ok(store) => store
            .into_inner()
            .map_err(|_| anyhow!("Profile store lock was poisoned"))?
            .close(),
        Err(_) => {
            warn!("profile store still shared at shutdown. dropping without explicit close");
            Ok(())
        }
    }
}

/// Shared handler state. The default leaderboard selection is already being
/// queried when this returns.
fn dashboard_state(
    config: Arc<Config>,
    store: Arc<Mutex<ProfileStore>>,
    sink: Arc<dyn ActivitySink>,
) -> Result<(routes::ApiState, JoinHandle<()>)> {
    let state = routes::ApiState {
        config,
        store,
        sink,
        feed: Arc::new(Mutex::new(LeaderboardFeed::default())),
    };

    let (_, initial_query) = routes::refresh_leaderboard(
        Arc::clone(&state.sink),
        Arc::clone(&state.feed),
        Some(LeaderboardRange::default()),
    )?;

    Ok((state, initial_query))
}

pub fn get_embedded_asset(path: &str) -> Option<(Vec<u8>, String)> {
    let normalized = path.trim_start_matches('/');
    let requested = if normalized.is_empty() {
        "index.html"
    } else {
        normalized
    };

    DashboardAssets::get(requested)
        .map(|content| (content, requested))
        .or_else(|| DashboardAssets::get("index.html").map(|content| (content, "index.html")))
        .map(|(content, served)| {
            let mime = mime_guess::from_path(served)
                .first_or_octet_stream()
                .to_string();
            (content.data.into_owned(), mime)
        })
}
