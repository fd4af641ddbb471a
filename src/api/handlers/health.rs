use crate::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" when every dependency answered, otherwise "degraded"
    pub status: String,
    pub database: String,
    pub video_storage: String,
    pub thumbnail_storage: String,
    /// Whether the probe executable can be started
    pub probe: String,
    pub max_video_size: u64,
    pub max_thumbnail_size: u64,
    pub version: String,
}

fn label(up: bool, ok: &'static str, down: &'static str) -> String {
    (if up { ok } else { down }).to_string()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "All upload dependencies reachable", body = HealthResponse),
        (status = 503, description = "At least one dependency is down", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let uploads = &state.upload_service;
    let (db_up, videos_up, thumbnails_up, probe_up) = tokio::join!(
        async { state.db.ping().await.is_ok() },
        state.video_store.health_check(),
        uploads.thumbnail_store().health_check(),
        uploads.classifier().is_available(),
    );

    let healthy = db_up && videos_up && thumbnails_up && probe_up;
    if !healthy {
        tracing::warn!(
            db_up,
            videos_up,
            thumbnails_up,
            probe_up,
            "Health check found unavailable dependencies"
        );
    }

    let body = HealthResponse {
        status: label(healthy, "ok", "degraded"),
        database: label(db_up, "connected", "disconnected"),
        video_storage: label(videos_up, "connected", "unreachable"),
        thumbnail_storage: label(thumbnails_up, "connected", "unreachable"),
        probe: label(probe_up, "available", "missing"),
        max_video_size: state.config.max_video_size,
        max_thumbnail_size: state.config.max_thumbnail_size,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
