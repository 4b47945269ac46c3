//! Storage key layout.
//!
//! ```text
//! uploads/{inspection_id}_{slotField}{ext}   media objects
//! meta/{inspection_id}.json                  inspection records
//! ```

use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::MediaSlot;

/// Prefix of uploaded media.
pub const UPLOAD_PREFIX: &str = "uploads/";

/// Prefix of persisted records.
pub const RECORD_PREFIX: &str = "meta/";

/// Key of the media object for one slot of an inspection.
pub fn media_key(id: Uuid, slot: MediaSlot) -> String {
    format!(
        "{}{}_{}{}",
        UPLOAD_PREFIX,
        id,
        slot.field_name(),
        slot.extension()
    )
}

/// Key of the JSON record of an inspection.
pub fn record_key(id: Uuid) -> String {
    format!("{}{}.json", RECORD_PREFIX, id)
}

/// Inverse of [`record_key`].
pub fn record_id_from_key(key: &str) -> Option<Uuid> {
    key.strip_prefix(RECORD_PREFIX)?
        .strip_suffix(".json")
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// Reject keys that could escape the bucket layout.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!("{} is not relative", key)));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidKey(format!(
            "{} has an empty or relative segment",
            key
        )));
    }
    Ok(())
}

/// Whether a key may be written through the upload proxy.
pub fn is_upload_key(key: &str) -> bool {
    key.starts_with(UPLOAD_PREFIX) && validate_key(key).is_ok()
}

/// Content type for a stored key, from its extension.
pub fn content_type_for_key(key: &str) -> &'static str {
    match key.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "mp4" => "video/mp4",
        Some(ext) if ext == "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_key_layout() {
        let id = Uuid::parse_str("8f14e45f-ceea-4e7a-9b1c-0123456789ab").unwrap();
        assert_eq!(
            media_key(id, MediaSlot::VideoFile),
            "uploads/8f14e45f-ceea-4e7a-9b1c-0123456789ab_videoFile.mp4"
        );
        assert_eq!(
            media_key(id, MediaSlot::CrlvPhoto),
            "uploads/8f14e45f-ceea-4e7a-9b1c-0123456789ab_crlvPhoto.jpg"
        );
    }

    #[test]
    fn test_record_key_round_trip() {
        let id = Uuid::new_v4();
        assert_eq!(record_id_from_key(&record_key(id)), Some(id));
        assert_eq!(record_id_from_key("meta/readme.txt"), None);
        assert_eq!(record_id_from_key("uploads/x.json"), None);
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        assert!(validate_key("uploads/a.jpg").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("uploads/../meta/x.json").is_err());
        assert!(validate_key("uploads//a.jpg").is_err());
        assert!(validate_key("uploads\\a.jpg").is_err());
    }

    #[test]
    fn test_upload_keys_cannot_target_records() {
        assert!(is_upload_key("uploads/a_videoFile.mp4"));
        assert!(!is_upload_key("meta/a.json"));
        assert!(!is_upload_key("uploads/../meta/a.json"));
    }

    #[test]
    fn test_content_type_for_key() {
        assert_eq!(content_type_for_key("uploads/a.MP4"), "video/mp4");
        assert_eq!(content_type_for_key("uploads/a.jpg"), "image/jpeg");
        assert_eq!(content_type_for_key("uploads/a"), "application/octet-stream");
    }
}
