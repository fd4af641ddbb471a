use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set, Unchanged};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait};
use uuid::Uuid;

use crate::api::error::AppError;
use crate::entities::{prelude::*, videos};

/// Read/write access to video metadata records
#[derive(Clone)]
pub struct VideoService {
    db: DatabaseConnection,
}

impl VideoService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_video(&self, id: Uuid) -> Result<Option<videos::Model>, AppError> {
        Ok(Videos::find_by_id(id.to_string()).one(&self.db).await?)
    }

    /// Writes every mutable field of `video` back by id.
    pub async fn update_video(&self, video: videos::Model) -> Result<videos::Model, AppError> {
        let active = videos::ActiveModel {
            id: Unchanged(video.id),
            user_id: Set(video.user_id),
            title: Set(video.title),
            description: Set(video.description),
            thumbnail_url: Set(video.thumbnail_url),
            video_url: Set(video.video_url),
            created_at: NotSet,
            updated_at: Set(Utc::now()),
        };

        Ok(active.update(&self.db).await?)
    }

    /// Inserts a new record. Upload paths never call this.
    pub async fn create_video(
        &self,
        user_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<videos::Model, AppError> {
        let now = Utc::now();
        let video = videos::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            title: Set(title.to_string()),
            description: Set(description.map(str::to_string)),
            thumbnail_url: Set(None),
            video_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(video.insert(&self.db).await?)
    }
}
