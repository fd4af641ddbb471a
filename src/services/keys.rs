use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;

use crate::api::error::AppError;
use crate::services::probe::AspectClass;

/// Random bytes behind every generated key (256 bits)
const KEY_ENTROPY_BYTES: usize = 32;

/// Object-store key for a committed asset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates `[<namespace>/]<base64url(32 random bytes)>.<extension>`.
///
/// Passing `AspectClass::Invalid` is a caller bug and is reported as `Internal`.
pub fn derive_key(class: Option<AspectClass>, extension: &str) -> Result<StorageKey, AppError> {
    let mut random = [0u8; KEY_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut random);
    let name = URL_SAFE_NO_PAD.encode(random);

    let key = match class {
        None => format!("{}.{}", name, extension),
        Some(class) => {
            let namespace = class.namespace().ok_or_else(|| {
                AppError::Internal(format!("invalid aspect ratio: {}", class))
            })?;
            format!("{}/{}.{}", namespace, name, extension)
        }
    };

    Ok(StorageKey(key))
}

/// File extension for an accepted thumbnail content type
pub fn thumbnail_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

/// Deterministic thumbnail key: `<videoID>.<ext>`
pub fn thumbnail_key(video_id: &str, content_type: &str) -> Result<StorageKey, AppError> {
    let ext = thumbnail_extension(content_type).ok_or_else(|| {
        AppError::UnsupportedMediaType(format!(
            "Thumbnail must be image/jpeg or image/png, got {}",
            content_type
        ))
    })?;
    Ok(StorageKey(format!("{}.{}", video_id, ext)))
}
