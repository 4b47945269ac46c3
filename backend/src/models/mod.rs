//! Domain models for vehicle inspections.
//!
//! - [`InspectionRecord`] - A submitted, persisted inspection
//! - [`InspectionForm`] - Owner and vehicle answers collected by the wizard
//! - [`MediaSlot`] - The five photo slots and the video slot
//! - [`MediaUrls`] - One uploaded URL per slot
//! - [`ReviewStatus`] - Reviewer flag on a record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Media Slots
// =============================================================================

/// A media attachment position on the inspection form.
///
/// Serialized with the form field name (`crlvPhoto`, `videoFile`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaSlot {
    /// Vehicle registration document (CRLV).
    CrlvPhoto,
    SafetyItemsPhoto,
    WindshieldPhoto,
    LightsPhoto,
    TiresPhoto,
    /// Walk-around video.
    VideoFile,
}

impl MediaSlot {
    /// All slots in form order.
    pub const ALL: [MediaSlot; 6] = [
        MediaSlot::CrlvPhoto,
        MediaSlot::SafetyItemsPhoto,
        MediaSlot::WindshieldPhoto,
        MediaSlot::LightsPhoto,
        MediaSlot::TiresPhoto,
        MediaSlot::VideoFile,
    ];

    /// Form field name of the file input.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::CrlvPhoto => "crlvPhoto",
            Self::SafetyItemsPhoto => "safetyItemsPhoto",
            Self::WindshieldPhoto => "windshieldPhoto",
            Self::LightsPhoto => "lightsPhoto",
            Self::TiresPhoto => "tiresPhoto",
            Self::VideoFile => "videoFile",
        }
    }

    /// Record field holding the uploaded URL.
    pub fn url_field(&self) -> &'static str {
        match self {
            Self::CrlvPhoto => "crlvPhotoUrl",
            Self::SafetyItemsPhoto => "safetyItemsPhotoUrl",
            Self::WindshieldPhoto => "windshieldPhotoUrl",
            Self::LightsPhoto => "lightsPhotoUrl",
            Self::TiresPhoto => "tiresPhotoUrl",
            Self::VideoFile => "videoFileUrl",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::VideoFile)
    }

    /// Extension of the stored object, including the dot.
    pub fn extension(&self) -> &'static str {
        if self.is_video() {
            ".mp4"
        } else {
            ".jpg"
        }
    }

    /// Content type the upload URL is issued for.
    pub fn content_type(&self) -> &'static str {
        if self.is_video() {
            "video/mp4"
        } else {
            "image/jpeg"
        }
    }
}

impl fmt::Display for MediaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

impl FromStr for MediaSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaSlot::ALL
            .into_iter()
            .find(|slot| slot.field_name() == s)
            .ok_or_else(|| s.to_string())
    }
}

// =============================================================================
// Form Answers
// =============================================================================

/// Yes/no radio answer. The wizard posts `sim` / `nao`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YesNo {
    #[serde(rename = "sim")]
    Yes,
    #[serde(rename = "nao")]
    No,
}

impl YesNo {
    pub fn is_yes(&self) -> bool {
        matches!(self, Self::Yes)
    }

    /// Spreadsheet rendering.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Yes => "Sí",
            Self::No => "No",
        }
    }
}

/// Vehicle history and condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleCondition {
    /// Theft history.
    Theft,
    Armored,
    /// Natural-gas conversion kit.
    Gas,
    Structural,
    Auction,
    Crash,
    Modified,
    Lowered,
    /// Exhaust, remap, intake or similar changes.
    Performance,
    /// None of the above.
    None,
}

impl VehicleCondition {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Theft => "theft",
            Self::Armored => "armored",
            Self::Gas => "gas",
            Self::Structural => "structural",
            Self::Auction => "auction",
            Self::Crash => "crash",
            Self::Modified => "modified",
            Self::Lowered => "lowered",
            Self::Performance => "performance",
            Self::None => "none",
        }
    }
}

/// Mandatory safety equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyItem {
    Wrench,
    Spare,
    Triangle,
}

impl SafetyItem {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Wrench => "wrench",
            Self::Spare => "spare",
            Self::Triangle => "triangle",
        }
    }
}

/// Owner and vehicle answers collected across the wizard steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionForm {
    // General information
    pub owner_name: String,
    pub email: String,
    pub phone: String,
    pub license_plate: String,
    pub current_km: u32,
    pub model_year: u16,
    pub has_chassis_number: YesNo,
    pub has_second_key: YesNo,

    // Vehicle condition
    pub vehicle_conditions: Vec<VehicleCondition>,
    pub safety_items: Vec<SafetyItem>,
    pub has_air_conditioner: YesNo,
    pub has_windshield_damage: YesNo,
    pub has_lights_damage: YesNo,
    pub has_tires_damage: YesNo,
    pub has_original_sound_system: YesNo,
}

impl InspectionForm {
    /// Slots that must carry media for these answers.
    ///
    /// Damage photos are only required when the matching damage answer is yes.
    pub fn required_slots(&self) -> Vec<MediaSlot> {
        MediaSlot::ALL
            .into_iter()
            .filter(|slot| match slot {
                MediaSlot::WindshieldPhoto => self.has_windshield_damage.is_yes(),
                MediaSlot::LightsPhoto => self.has_lights_damage.is_yes(),
                MediaSlot::TiresPhoto => self.has_tires_damage.is_yes(),
                _ => true,
            })
            .collect()
    }
}

// =============================================================================
// Media URLs
// =============================================================================

/// Uploaded media location per slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crlv_photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_items_photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windshield_photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lights_photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tires_photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_file_url: Option<String>,
}

impl MediaUrls {
    pub fn get(&self, slot: MediaSlot) -> Option<&str> {
        match slot {
            MediaSlot::CrlvPhoto => self.crlv_photo_url.as_deref(),
            MediaSlot::SafetyItemsPhoto => self.safety_items_photo_url.as_deref(),
            MediaSlot::WindshieldPhoto => self.windshield_photo_url.as_deref(),
            MediaSlot::LightsPhoto => self.lights_photo_url.as_deref(),
            MediaSlot::TiresPhoto => self.tires_photo_url.as_deref(),
            MediaSlot::VideoFile => self.video_file_url.as_deref(),
        }
    }

    pub fn set(&mut self, slot: MediaSlot, url: impl Into<String>) {
        let url = Some(url.into());
        match slot {
            MediaSlot::CrlvPhoto => self.crlv_photo_url = url,
            MediaSlot::SafetyItemsPhoto => self.safety_items_photo_url = url,
            MediaSlot::WindshieldPhoto => self.windshield_photo_url = url,
            MediaSlot::LightsPhoto => self.lights_photo_url = url,
            MediaSlot::TiresPhoto => self.tires_photo_url = url,
            MediaSlot::VideoFile => self.video_file_url = url,
        }
    }

    /// Present URLs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (MediaSlot, &str)> + '_ {
        MediaSlot::ALL
            .into_iter()
            .filter_map(move |slot| self.get(slot).map(|url| (slot, url)))
    }
}

// =============================================================================
// Review Status
// =============================================================================

/// Reviewer flag on an inspection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    /// Freshly submitted.
    Pending,
    /// Reviewer has looked at it.
    Checked,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Checked => "checked",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "checked" => Ok(Self::Checked),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!(
                "unknown status '{}', expected one of: pending, checked, approved, rejected",
                other
            )),
        }
    }
}

/// One entry of a record's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ReviewStatus,
    pub date: DateTime<Utc>,
}

// =============================================================================
// Inspection Record
// =============================================================================

/// A persisted inspection. Written once at submission; only the review
/// fields change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRecord {
    pub id: Uuid,

    #[serde(flatten)]
    pub form: InspectionForm,

    #[serde(flatten)]
    pub media: MediaUrls,

    /// Storage key of every slot issued for this inspection.
    #[serde(default)]
    pub file_keys: BTreeMap<MediaSlot, String>,

    pub status: ReviewStatus,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub status_history: Vec<StatusChange>,
}

impl InspectionRecord {
    /// Build a fresh `pending` record.
    pub fn new(
        id: Uuid,
        form: InspectionForm,
        media: MediaUrls,
        file_keys: BTreeMap<MediaSlot, String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            form,
            media,
            file_keys,
            status: ReviewStatus::Pending,
            created_at,
            checked_at: None,
            reviewed_at: None,
            status_history: vec![StatusChange {
                status: ReviewStatus::Pending,
                date: created_at,
            }],
        }
    }

    /// Slots required by the form answers.
    pub fn required_slots(&self) -> Vec<MediaSlot> {
        self.form.required_slots()
    }

    /// Apply a reviewer status. `pending` is only valid at creation.
    pub fn apply_status(&mut self, status: ReviewStatus, at: DateTime<Utc>) -> Result<(), String> {
        match status {
            ReviewStatus::Pending => {
                return Err("a record cannot be moved back to pending".to_string())
            }
            ReviewStatus::Checked => self.checked_at = Some(at),
            ReviewStatus::Approved | ReviewStatus::Rejected => self.reviewed_at = Some(at),
        }
        self.status = status;
        self.status_history.push(StatusChange { status, date: at });
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A complete form with no reported damage.
    pub fn sample_form() -> InspectionForm {
        InspectionForm {
            owner_name: "Maria Souza".into(),
            email: "maria@example.com".into(),
            phone: "+55 11 91234-5678".into(),
            license_plate: "ABC1D23".into(),
            current_km: 48_200,
            model_year: 2019,
            has_chassis_number: YesNo::Yes,
            has_second_key: YesNo::No,
            vehicle_conditions: vec![VehicleCondition::None],
            safety_items: vec![SafetyItem::Wrench, SafetyItem::Spare, SafetyItem::Triangle],
            has_air_conditioner: YesNo::Yes,
            has_windshield_damage: YesNo::No,
            has_lights_damage: YesNo::No,
            has_tires_damage: YesNo::No,
            has_original_sound_system: YesNo::Yes,
        }
    }
}
