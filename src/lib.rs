pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::storage::ObjectStore;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Headroom over the file ceiling for multipart boundaries and headers
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::videos::get_video,
        api::handlers::videos::upload_video,
        api::handlers::videos::upload_thumbnail,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::videos::VideoResponse,
        )
    ),
    tags(
        (name = "videos", description = "Video asset uploads"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub video_store: Arc<dyn ObjectStore>,
    pub upload_service: Arc<UploadService>,
    pub config: AppConfig,
}

fn body_limit(max_file_size: u64) -> DefaultBodyLimit {
    let limit = max_file_size.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/videos/:video_id",
            get(api::handlers::videos::get_video).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/videos/:video_id/video",
            post(api::handlers::videos::upload_video)
                .layer(body_limit(state.config.max_video_size))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/videos/:video_id/thumbnail",
            post(api::handlers::videos::upload_thumbnail)
                .layer(body_limit(state.config.max_thumbnail_size))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .nest_service("/assets", ServeDir::new(&state.config.assets_root))
        .layer(from_fn(
            api::middleware::request_id::request_id_middleware,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
