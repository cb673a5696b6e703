/**
 * DICTATE KERNEL - Point d'entrée du serveur de dictats couleur
 *
 * RÔLE : Orchestration de tous les modules : config, palette, registre,
 * rafraîchisseur idle, HTTP. Bootstrap complet avec logging et arrêt propre.
 *
 * ARCHITECTURE : les contrôleurs LED interrogent GET /status, les opérateurs
 * imposent des couleurs via POST /update, une tâche de fond évite les dictats périmés.
 */

mod codec;
mod config;
mod http;
mod models;
mod palette;
mod refresher;
mod registry;

use crate::config::load_config;
use crate::http::AppState;
use crate::models::now_nanos;
use crate::palette::Palette;
use crate::refresher::spawn_idle_refresher;
use crate::registry::Registry;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dictate_kernel=info,tower_http=info")),
        )
        .init();

    let cfg = load_config().await?;

    let palette = Arc::new(Palette::from_config(cfg.palette.clone()).context("invalid palette")?);
    info!("palette ready ({} colors)", palette.len());

    // tous les endpoints démarrent en blanc pour tester les LEDs d'un coup d'oeil
    let registry = Arc::new(
        Registry::from_config(&cfg.endpoints, now_nanos()).context("invalid endpoint table")?,
    );
    info!("{} endpoints registered", registry.len());
    for ep in registry.iter() {
        info!("endpoint {} ({}) at {:?}", ep.name(), ep.id(), ep.location());
    }

    spawn_idle_refresher(registry.clone(), palette.clone(), cfg.idle_window(), cfg.scan_interval());

    let app_state = AppState {
        registry,
        palette,
        idle: cfg.idle_window(),
    };
    let app = http::build_router(app_state, &cfg.static_dir);

    let addr = cfg.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
