//! JSON Schema validation for inspection submissions.
//!
//! The embedded schema (`schemas/inspection.json`, draft 7) is the server-side
//! copy of the wizard's step rules:
//!
//! - owner name, phone and plate are non-empty, e-mail is well formed
//! - mileage is `>= 0`, model year is `>= 1900`
//! - at least one vehicle condition and one safety item
//! - every yes/no question is answered with `sim` or `nao`
//! - CRLV, safety-items and video URLs are present
//! - windshield, lights and tires photos are required when the matching
//!   damage answer is `sim`
//!
//! The upper bound on the model year depends on the current date, so it is
//! checked in code after the schema pass.
//!
//! # Example
//!
//! ```rust,ignore
//! use intake::validation::validate_inspection;
//!
//! if let Err(errors) = validate_inspection(&payload) {
//!     for e in errors {
//!         eprintln!("- {}", e);
//!     }
//! }
//! ```

use chrono::{Datelike, Utc};
use jsonschema::Validator;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::models::MediaSlot;

/// Compiled inspection schema.
static INSPECTION_VALIDATOR: Lazy<Validator> = Lazy::new(|| {
    let schema: Value = serde_json::from_str(include_str!("../../schemas/inspection.json"))
        .expect("Invalid embedded schema");
    jsonschema::draft7::new(&schema).expect("Embedded schema does not compile")
});

/// URL used in place of media that has not been uploaded yet.
const PLACEHOLDER_MEDIA_URL: &str = "https://pending.invalid/media";

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every violation otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Boolean form of [`validate`].
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate a complete submission (answers and media URLs).
pub fn validate_inspection(data: &Value) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = INSPECTION_VALIDATOR
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if let Some(year) = data.get("modelYear").and_then(Value::as_i64) {
        let max_year = i64::from(Utc::now().year()) + 1;
        if year > max_year {
            errors.push(format!("modelYear {} is after {}", year, max_year));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check with [`validate_inspection`].
pub fn is_valid_inspection(data: &Value) -> bool {
    validate_inspection(data).is_ok()
}

/// Validate only the form answers, before any media is uploaded.
///
/// Missing URL fields are filled with a placeholder so that only answer
/// errors are reported.
pub fn validate_answers(data: &Value) -> Result<(), Vec<String>> {
    let mut data = data.clone();
    if let Some(obj) = data.as_object_mut() {
        for slot in MediaSlot::ALL {
            obj.entry(slot.url_field())
                .or_insert_with(|| Value::String(PLACEHOLDER_MEDIA_URL.to_string()));
        }
    }
    validate_inspection(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_payload() -> Value {
        json!({
            "ownerName": "Maria Souza",
            "email": "maria@example.com",
            "phone": "11912345678",
            "licensePlate": "ABC1D23",
            "currentKm": 48200,
            "modelYear": 2019,
            "hasChassisNumber": "sim",
            "hasSecondKey": "nao",
            "vehicleConditions": ["none"],
            "safetyItems": ["wrench", "spare"],
            "hasAirConditioner": "sim",
            "hasWindshieldDamage": "nao",
            "hasLightsDamage": "nao",
            "hasTiresDamage": "nao",
            "hasOriginalSoundSystem": "sim",
            "crlvPhotoUrl": "https://bucket.s3.sa-east-1.amazonaws.com/uploads/a_crlvPhoto.jpg",
            "safetyItemsPhotoUrl": "https://bucket.s3.sa-east-1.amazonaws.com/uploads/a_safetyItemsPhoto.jpg",
            "videoFileUrl": "https://bucket.s3.sa-east-1.amazonaws.com/uploads/a_videoFile.mp4"
        })
    }

    #[test]
    fn test_valid_inspection() {
        assert!(is_valid_inspection(&complete_payload()));
    }

    #[test]
    fn test_missing_fields_are_all_reported() {
        let mut payload = complete_payload();
        let obj = payload.as_object_mut().unwrap();
        obj.remove("email");
        obj.remove("videoFileUrl");

        let errors = validate_inspection(&payload).unwrap_err();
        assert!(errors.len() >= 2);
        assert!(errors.iter().any(|e| e.contains("email")));
        assert!(errors.iter().any(|e| e.contains("videoFileUrl")));
    }

    #[test]
    fn test_damage_photo_required_when_damage_reported() {
        let mut payload = complete_payload();
        payload["hasWindshieldDamage"] = json!("sim");

        let errors = validate_inspection(&payload).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("windshieldPhotoUrl")));

        payload["windshieldPhotoUrl"] = json!("https://cdn.example.com/w.jpg");
        assert!(is_valid_inspection(&payload));
    }

    #[test]
    fn test_rejects_bad_answers() {
        let mut payload = complete_payload();
        payload["email"] = json!("not-an-email");
        payload["currentKm"] = json!(-5);
        payload["modelYear"] = json!(1850);
        payload["hasSecondKey"] = json!("maybe");
        payload["safetyItems"] = json!([]);

        let errors = validate_inspection(&payload).unwrap_err();
        assert!(errors.len() >= 5, "errors: {:?}", errors);
    }

    #[test]
    fn test_future_model_year_rejected() {
        let mut payload = complete_payload();
        payload["modelYear"] = json!(Utc::now().year() + 3);
        let errors = validate_inspection(&payload).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("modelYear")));
    }

    #[test]
    fn test_blank_owner_name_rejected() {
        let mut payload = complete_payload();
        payload["ownerName"] = json!("   ");
        assert!(!is_valid_inspection(&payload));
    }

    #[test]
    fn test_answers_only_ignores_missing_media() {
        let mut payload = complete_payload();
        let obj = payload.as_object_mut().unwrap();
        obj.remove("crlvPhotoUrl");
        obj.remove("videoFileUrl");

        assert!(validate_answers(&payload).is_ok());
        assert!(validate_inspection(&payload).is_err());
    }

    #[test]
    fn test_generic_validate() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });
        assert!(validate(&schema, &json!({ "name": "x" })).is_ok());
        assert!(validate(&schema, &json!({ "age": 42 })).is_err());
        assert!(!is_valid(&schema, &json!({})));
    }
}
