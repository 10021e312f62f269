//! Uploaded images on local disk, plus avatar URL resolution.

use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::User;
use crate::store::{StoreError, StoreResult};

/// Writes uploads as `<uuid>.<ext>` under one directory
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, max_bytes })
    }

    /// Persist an image and return its filename. The file is fully written
    /// before the caller records it anywhere.
    pub fn save(&self, bytes: &[u8], content_type: &str) -> StoreResult<String> {
        if bytes.is_empty() {
            return Err(StoreError::InvalidInput("empty upload".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(StoreError::InvalidInput(format!(
                "upload exceeds {} bytes",
                self.max_bytes
            )));
        }
        let ext = extension_for(content_type).ok_or_else(|| {
            StoreError::InvalidInput(format!("unsupported image type: {}", content_type))
        })?;

        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        fs::write(self.dir.join(&filename), bytes)?;
        log::debug!("Stored upload {} ({} bytes)", filename, bytes.len());
        Ok(filename)
    }

    /// Read back an upload with its content type
    pub fn open(&self, filename: &str) -> StoreResult<(Vec<u8>, &'static str)> {
        if filename.is_empty() || filename.contains(|c: char| c == '/' || c == '\\') || filename.contains("..") {
            return Err(StoreError::NotFound("file not found".to_string()));
        }
        let content_type = filename
            .rsplit_once('.')
            .and_then(|(_, ext)| content_type_for(ext))
            .ok_or_else(|| StoreError::NotFound("file not found".to_string()))?;

        match fs::read(self.dir.join(filename)) {
            Ok(bytes) => Ok((bytes, content_type)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound("file not found".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    match mime.to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

fn content_type_for(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// How a user's avatar URL is produced
#[derive(Debug, Clone)]
pub enum AvatarProvider {
    /// Uploaded file served from `base_url`, placeholder when none
    Uploads { base_url: String },
    /// Always the generated placeholder
    Placeholder,
}

impl AvatarProvider {
    pub fn url_for(&self, user: &User) -> String {
        match (self, &user.avatar) {
            (AvatarProvider::Uploads { base_url }, Some(file)) => {
                format!("{}/{}", base_url.trim_end_matches('/'), file)
            }
            _ => placeholder_url(&user.username),
        }
    }
}

/// Initials placeholder, rendered client side from the query string
fn placeholder_url(username: &str) -> String {
    let initials: String = username
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(2)
        .collect::<String>()
        .to_uppercase();
    format!("/static/avatar.svg?initials={}", initials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(avatar: Option<&str>) -> User {
        User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            password_hash: String::new(),
            bio: String::new(),
            avatar: avatar.map(String::from),
            dark_mode: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path(), 1024).unwrap();

        let name = media.save(&[0x89, 0x50, 0x4E, 0x47], "image/png").unwrap();
        assert!(name.ends_with(".png"));

        let (bytes, content_type) = media.open(&name).unwrap();
        assert_eq!(bytes, vec![0x89, 0x50, 0x4E, 0x47]);
        assert_eq!(content_type, "image/png");
    }

    #[test]
    fn test_rejects_bad_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path(), 4).unwrap();

        assert!(matches!(media.save(b"", "image/png"), Err(StoreError::InvalidInput(_))));
        assert!(matches!(media.save(b"12345", "image/png"), Err(StoreError::InvalidInput(_))));
        assert!(matches!(media.save(b"1", "text/html"), Err(StoreError::InvalidInput(_))));
        assert!(matches!(media.open("../secret.png"), Err(StoreError::NotFound(_))));
        assert!(matches!(media.open("missing.png"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_avatar_urls() {
        let uploads = AvatarProvider::Uploads {
            base_url: "/uploads/".to_string(),
        };
        assert_eq!(uploads.url_for(&user(Some("a.png"))), "/uploads/a.png");
        assert_eq!(
            uploads.url_for(&user(None)),
            "/static/avatar.svg?initials=AL"
        );
        assert_eq!(
            AvatarProvider::Placeholder.url_for(&user(Some("a.png"))),
            "/static/avatar.svg?initials=AL"
        );
    }
}
