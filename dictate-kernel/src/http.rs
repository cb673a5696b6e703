/**
 * API HTTP DICTATE - Protocole entre contrôleurs LED et opérateurs
 *
 * RÔLE :
 * Ce module expose les routes lues par le firmware des contrôleurs (/status)
 * et celles utilisées par les opérateurs pour imposer une couleur (/update).
 *
 * FONCTIONNEMENT :
 * - GET  /status?id=&leds=&len=   → dictat sérialisé, enregistre le câblage rapporté
 * - POST /update/basic/{id}       → couleur aléatoire de la palette
 * - POST /update/rgbtime/{id}     → séquence RGB packée + durées ms
 * - POST /update/hsvtime/{id}     → séquence HSV + durées ms
 * - GET  /endpoints, /health      → inspection et liveness
 * - GET  /, /static/...           → page du sélecteur de couleurs
 *
 * ERREURS :
 * - 400 : paramètre manquant/invalide, id inconnu, chemin mal formé, corps illisible
 * - 415 : Content-Type non JSON sur un corps de mise à jour
 * - 404 : chemin inconnu
 * - 500 : échec de sérialisation ou durée d'étape nulle côté contrôleur
 * Aucune erreur ne modifie l'état du registre.
 */

use crate::codec::{CodecError, HsvTimeRequest, RgbTimeRequest};
use crate::models::{now_nanos, Location, MAX_LEDS};
use crate::palette::Palette;
use crate::refresher::apply_random_dictate;
use crate::registry::{Endpoint, Registry, RegistryError};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unknown client id: {0}")]
    UnknownEndpoint(String),
    #[error("unsupported content type: {0}")]
    UnsupportedMediaType(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::UnknownEndpoint(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Codec(e) if e.is_configuration() => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Codec(_) => StatusCode::BAD_REQUEST,
            ApiError::Registry(RegistryError::EmptyDictate) => StatusCode::BAD_REQUEST,
            ApiError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{status}: {self}");
        } else {
            warn!("{status}: {self}");
        }
        (status, self.to_string()).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub palette: Arc<Palette>,
    pub idle: Duration,
}

pub fn build_router(app_state: AppState, static_dir: impl AsRef<FsPath>) -> Router {
    let static_dir = static_dir.as_ref();
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/endpoints", get(list_endpoints))
        .route("/update", any(update_without_kind))
        .route("/update/", any(update_without_kind))
        .route("/update/{*rest}", post(update))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir.join("static")))
        .fallback(not_found)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

/// Les trois formes de mise à jour, avec l'id brut tiré du chemin
#[derive(Debug, PartialEq, Eq)]
enum UpdateRoute<'a> {
    Basic(&'a str),
    RgbTime(&'a str),
    HsvTime(&'a str),
}

impl<'a> UpdateRoute<'a> {
    /// `rest` = tout ce qui suit "/update/"
    fn parse(rest: &'a str) -> Result<Self, ApiError> {
        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            ["basic", id] if !id.is_empty() => Ok(UpdateRoute::Basic(*id)),
            ["rgbtime", id] if !id.is_empty() => Ok(UpdateRoute::RgbTime(*id)),
            ["hsvtime", id] if !id.is_empty() => Ok(UpdateRoute::HsvTime(*id)),
            ["basic" | "rgbtime" | "hsvtime", ..] => {
                Err(ApiError::BadRequest(format!("invalid url: /update/{rest}")))
            }
            [kind, ..] => Err(ApiError::BadRequest(format!("unknown update kind: {kind}"))),
            [] => Err(ApiError::BadRequest("invalid url: /update".into())),
        }
    }

    fn id(&self) -> &'a str {
        match *self {
            UpdateRoute::Basic(id) | UpdateRoute::RgbTime(id) | UpdateRoute::HsvTime(id) => id,
        }
    }
}

fn resolve<'r>(registry: &'r Registry, id: &str) -> Result<&'r Endpoint, ApiError> {
    registry
        .resolve(id)
        .ok_or_else(|| ApiError::UnknownEndpoint(id.to_string()))
}

fn parse_param<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    key: &str,
    msg: &str,
) -> Result<T, ApiError> {
    params
        .get(key)
        .and_then(|v| v.parse::<T>().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("{msg}: {:?}", params.get(key))))
}

// Content-Type absent accepté (firmware, curl), non JSON refusé en 415
fn decode_body<T: DeserializeOwned>(headers: &HeaderMap, body: &Bytes) -> Result<T, ApiError> {
    if let Some(ct) = headers.get(header::CONTENT_TYPE) {
        let ct = ct.to_str().unwrap_or_default();
        if !ct.to_ascii_lowercase().starts_with("application/json") {
            return Err(ApiError::UnsupportedMediaType(ct.to_string()));
        }
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("failed to unmarshal request body: {e}")))
}

// GET /status?id=<mac>&leds=<n>&len=<ms>
async fn status(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let id = params
        .get("id")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("no client ID".into()))?;
    let leds: usize = parse_param(&params, "leds", "invalid led count")?;
    let step_len_ms: u32 = parse_param(&params, "len", "invalid steplen")?;
    if leds > MAX_LEDS {
        return Err(ApiError::BadRequest(format!("invalid led count: {leds} (max {MAX_LEDS})")));
    }
    let endpoint = resolve(&app.registry, id)?;

    let body = endpoint.report_status(leds, step_len_ms);
    info!("status from {} ({}) leds={} len={}ms", endpoint.name(), endpoint.id(), leds, step_len_ms);
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

// POST /update/{kind}/{id}
async fn update(
    State(app): State<AppState>,
    Path(rest): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let route = UpdateRoute::parse(&rest)?;
    let endpoint = resolve(&app.registry, route.id())?;

    match route {
        UpdateRoute::Basic(_) => {
            let name = apply_random_dictate(endpoint, &app.palette, &mut rand::thread_rng(), None)?;
            info!("updated {} ({}) with color {}", endpoint.name(), endpoint.id(), name);
            Ok("success SetColor")
        }
        UpdateRoute::RgbTime(_) => {
            let req: RgbTimeRequest = decode_body(&headers, &body)?;
            let steps = req.into_steps(endpoint.wire_params())?;
            let n = steps.len();
            endpoint.apply_dictate(steps, None)?;
            info!("updated {} ({}) with {} rgb steps", endpoint.name(), endpoint.id(), n);
            Ok("ok")
        }
        UpdateRoute::HsvTime(_) => {
            let req: HsvTimeRequest = decode_body(&headers, &body)?;
            let steps = req.into_steps(endpoint.wire_params())?;
            let n = steps.len();
            endpoint.apply_dictate(steps, None)?;
            info!("updated {} ({}) with {} hsv steps", endpoint.name(), endpoint.id(), n);
            Ok("ok")
        }
    }
}

async fn update_without_kind(uri: Uri) -> ApiError {
    ApiError::BadRequest(format!("invalid url: {}", uri.path()))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

#[derive(serde::Serialize)]
struct EndpointView {
    id: String,
    name: String,
    location: Location,
    leds: usize,
    step_len_ms: u32,
    last_update: String,    // format RFC3339 pour l'API
    stale: bool,            // true si plus vieux que la fenêtre idle
    stale_for_seconds: i64, // âge en secondes
}

fn to_view(ep: &Endpoint, idle: Duration, now: i64) -> EndpointView {
    let snap = ep.snapshot();
    let age = now.saturating_sub(snap.ts).max(0);
    EndpointView {
        id: ep.id().to_string(),
        name: ep.name().to_string(),
        location: ep.location(),
        leds: snap.params.leds,
        step_len_ms: snap.params.step_len_ms,
        last_update: OffsetDateTime::from_unix_timestamp_nanos(snap.ts as i128)
            .ok()
            .and_then(|t| t.format(&Rfc3339).ok())
            .unwrap_or_default(),
        stale: age as u128 > idle.as_nanos(),
        stale_for_seconds: age / 1_000_000_000,
    }
}

// GET /endpoints (liste)
async fn list_endpoints(State(app): State<AppState>) -> Json<Vec<EndpointView>> {
    let now = now_nanos();
    let list = app.registry.iter().map(|ep| to_view(ep, app.idle, now)).collect();
    Json(list)
}
