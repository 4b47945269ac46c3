//! Locally persisted submission state.
//!
//! A draft file holds everything needed to resume an interrupted
//! submission: the answers, a local file per media slot, the id and upload
//! URLs issued by the server, and the slots already uploaded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::models::MediaSlot;
use crate::validation::validate_answers;

/// Upload URLs are re-requested when they expire within this margin.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Server-issued state for an unfinished submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmission {
    pub id: Uuid,
    #[serde(default)]
    pub upload_urls: BTreeMap<MediaSlot, String>,
    #[serde(default)]
    pub public_urls: BTreeMap<MediaSlot, String>,
    pub expires_at: DateTime<Utc>,
}

impl PendingSubmission {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + chrono::Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

/// Form answers plus local media and upload progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    /// Answers keyed by form field name (`ownerName`, `hasTiresDamage`, ...).
    pub fields: Map<String, Value>,

    /// Local file per slot. Relative paths resolve against the draft file.
    #[serde(default)]
    pub files: BTreeMap<MediaSlot, PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission: Option<PendingSubmission>,

    /// Public URL of every slot already uploaded.
    #[serde(default)]
    pub uploaded: BTreeMap<MediaSlot, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Draft {
    pub fn load(path: &Path) -> ClientResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ClientError::Draft(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the draft through a temporary file so a crash never leaves a
    /// truncated draft behind.
    pub fn save(&self, path: &Path) -> ClientResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// A blank draft to fill in by hand.
    pub fn template() -> Self {
        let fields = json!({
            "ownerName": "",
            "email": "",
            "phone": "",
            "licensePlate": "",
            "currentKm": 0,
            "modelYear": 2020,
            "hasChassisNumber": "sim",
            "hasSecondKey": "nao",
            "vehicleConditions": ["none"],
            "safetyItems": ["wrench", "spare", "triangle"],
            "hasAirConditioner": "nao",
            "hasWindshieldDamage": "nao",
            "hasLightsDamage": "nao",
            "hasTiresDamage": "nao",
            "hasOriginalSoundSystem": "nao"
        });

        let mut files = BTreeMap::new();
        files.insert(MediaSlot::CrlvPhoto, PathBuf::from("photos/crlv.jpg"));
        files.insert(MediaSlot::SafetyItemsPhoto, PathBuf::from("photos/safety-items.jpg"));
        files.insert(MediaSlot::VideoFile, PathBuf::from("video/walkaround.mp4"));

        Self {
            fields: fields.as_object().cloned().unwrap_or_default(),
            files,
            submission: None,
            uploaded: BTreeMap::new(),
            finalized_at: None,
        }
    }

    fn answer_is_yes(&self, field: &str) -> bool {
        self.fields.get(field).and_then(Value::as_str) == Some("sim")
    }

    /// Slots the current answers require.
    pub fn required_slots(&self) -> Vec<MediaSlot> {
        MediaSlot::ALL
            .into_iter()
            .filter(|slot| match slot {
                MediaSlot::WindshieldPhoto => self.answer_is_yes("hasWindshieldDamage"),
                MediaSlot::LightsPhoto => self.answer_is_yes("hasLightsDamage"),
                MediaSlot::TiresPhoto => self.answer_is_yes("hasTiresDamage"),
                _ => true,
            })
            .collect()
    }

    /// Required slots not uploaded yet.
    pub fn missing_uploads(&self) -> Vec<MediaSlot> {
        self.required_slots()
            .into_iter()
            .filter(|slot| !self.uploaded.contains_key(slot))
            .collect()
    }

    /// Resolve a slot's file against the draft location.
    pub fn file_for(&self, slot: MediaSlot, draft_path: &Path) -> Option<PathBuf> {
        let file = self.files.get(&slot)?;
        if file.is_absolute() {
            return Some(file.clone());
        }
        let base = draft_path.parent().unwrap_or_else(|| Path::new("."));
        Some(base.join(file))
    }

    /// Check answers and that every required slot still to upload has a
    /// readable file.
    pub fn validate(&self, draft_path: &Path) -> ClientResult<()> {
        let mut errors = match validate_answers(&Value::Object(self.fields.clone())) {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        for slot in self.missing_uploads() {
            match self.file_for(slot, draft_path) {
                None => errors.push(format!("no file given for {}", slot)),
                Some(path) if !path.is_file() => {
                    errors.push(format!("{}: {} does not exist", slot, path.display()))
                }
                Some(_) => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Invalid(errors))
        }
    }

    /// Final submission body: answers, id and uploaded URLs.
    pub fn payload(&self) -> ClientResult<Value> {
        let submission = self
            .submission
            .as_ref()
            .ok_or_else(|| ClientError::Draft("no inspection id issued yet".to_string()))?;

        let mut body = self.fields.clone();
        body.insert("id".to_string(), Value::String(submission.id.to_string()));
        for (slot, url) in &self.uploaded {
            body.insert(slot.url_field().to_string(), Value::String(url.clone()));
        }
        Ok(Value::Object(body))
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}
