use crate::AppState;
use crate::api::error::AppError;
use crate::entities::videos;
use crate::services::bounded::SizeLimitExceeded;
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{
        Multipart, Path, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VideoResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<videos::Model> for VideoResponse {
    fn from(video: videos::Model) -> Self {
        Self {
            id: video.id,
            user_id: video.user_id,
            title: video.title,
            description: video.description,
            thumbnail_url: video.thumbnail_url,
            video_url: video.video_url,
            created_at: video.created_at,
            updated_at: video.updated_at,
        }
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// Turns a multipart field into a byte reader; a body-limit hit in the transport
/// surfaces as [`SizeLimitExceeded`] like the pipeline's own ceiling.
fn field_reader<'a>(field: Field<'a>, limit: u64) -> impl AsyncRead + Unpin + Send + 'a {
    StreamReader::new(field.map_err(move |e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            SizeLimitExceeded { limit }.into_io()
        } else {
            std::io::Error::other(e)
        }
    }))
}

/// Most bytes read past a failure before answering anyway
const DRAIN_BUDGET: usize = 1024 * 1024;

/// Reads what is left of a small body so the client receives the error response
/// instead of a connection reset. Stops after [`DRAIN_BUDGET`] bytes.
async fn drain(multipart: &mut Multipart) -> usize {
    let mut drained = 0;
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(chunk)) = field.chunk().await {
            drained += chunk.len();
            if drained > DRAIN_BUDGET {
                tracing::debug!("Gave up draining after {} bytes", drained);
                return drained;
            }
        }
    }
    drained
}

#[utoipa::path(
    get,
    path = "/videos/{video_id}",
    params(("video_id" = Uuid, Path, description = "Video record id")),
    responses(
        (status = 200, description = "Video metadata", body = VideoResponse),
        (status = 400, description = "Invalid video id"),
        (status = 401, description = "Unauthorized or not the owner")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn get_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<Uuid>,
) -> Result<Json<VideoResponse>, AppError> {
    let video = state.upload_service.authorize(&claims.sub, video_id).await?;
    Ok(Json(video.into()))
}

#[utoipa::path(
    post,
    path = "/videos/{video_id}/video",
    params(("video_id" = Uuid, Path, description = "Video record id")),
    request_body(content = Multipart, description = "MP4 file in the `video` field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video uploaded", body = VideoResponse),
        (status = 400, description = "Missing field or unsupported content type"),
        (status = 401, description = "Unauthorized or not the owner"),
        (status = 413, description = "Video exceeds the size ceiling"),
        (status = 500, description = "Staging, probe, commit or persistence failure")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<VideoResponse>, AppError> {
    tracing::info!("Uploading video {} by user {}", video_id, claims.sub);

    let result: Result<Json<VideoResponse>, AppError> = async {
        let video = state
            .upload_service
            .authorize(&claims.sub, video_id)
            .await?;

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() != Some("video") {
                continue;
            }

            let content_type = field.content_type().map(str::to_string);
            let reader = field_reader(field, state.config.max_video_size);
            let updated = state
                .upload_service
                .upload_video(video, content_type.as_deref(), reader)
                .await?;
            return Ok(Json(updated.into()));
        }

        Err(AppError::BadRequest(
            "Couldn't get 'video' form file".to_string(),
        ))
    }
    .await;

    if let Err(e) = &result {
        tracing::warn!("Video upload for {} failed: {}", video_id, e);
        drain(&mut multipart).await;
    }
    result
}

#[utoipa::path(
    post,
    path = "/videos/{video_id}/thumbnail",
    params(("video_id" = Uuid, Path, description = "Video record id")),
    request_body(content = Multipart, description = "JPEG or PNG file in the `thumbnail` field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Thumbnail uploaded", body = VideoResponse),
        (status = 400, description = "Missing field or unsupported content type"),
        (status = 401, description = "Unauthorized or not the owner"),
        (status = 413, description = "Thumbnail exceeds the size ceiling"),
        (status = 500, description = "Staging, commit or persistence failure")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<VideoResponse>, AppError> {
    tracing::info!("Uploading thumbnail for video {} by user {}", video_id, claims.sub);

    let result: Result<Json<VideoResponse>, AppError> = async {
        let video = state
            .upload_service
            .authorize(&claims.sub, video_id)
            .await?;

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() != Some("thumbnail") {
                continue;
            }

            let content_type = field.content_type().map(str::to_string);
            let reader = field_reader(field, state.config.max_thumbnail_size);
            let updated = state
                .upload_service
                .upload_thumbnail(video, content_type.as_deref(), reader)
                .await?;
            return Ok(Json(updated.into()));
        }

        Err(AppError::BadRequest(
            "Unable to parse form file".to_string(),
        ))
    }
    .await;

    if let Err(e) = &result {
        tracing::warn!("Thumbnail upload for {} failed: {}", video_id, e);
        drain(&mut multipart).await;
    }
    result
}
