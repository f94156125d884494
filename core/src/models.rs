use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::NutritionError;

/// Largest image accepted by `validate_image`.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Wire format of `FoodEntry::timestamp`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A food item recognized in a model response, before it is logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    pub calories: Option<f64>,
    pub carbs: Option<f64>,
    pub proteins: Option<f64>,
    pub fats: Option<f64>,
}

impl FoodItem {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calories: None,
            carbs: None,
            proteins: None,
            fats: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEntry {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub name: String,
    pub calories: Option<f64>,
    pub carbs: Option<f64>,
    pub proteins: Option<f64>,
    pub fats: Option<f64>,
}

impl FoodEntry {
    #[must_use]
    pub fn new(item: FoodItem, timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            name: item.name,
            calories: item.calories,
            carbs: item.carbs,
            proteins: item.proteins,
            fats: item.fats,
        }
    }
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// One user message and the model's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(rename = "user")]
    pub user_message: String,
    #[serde(rename = "bot")]
    pub bot_reply: String,
}

/// Nutrient totals over every entry in the food log.
///
/// Not scoped to a calendar day: the log lives for the process lifetime and
/// the totals cover all of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub total_calories: f64,
    pub total_carbs: f64,
    pub total_proteins: f64,
    pub total_fats: f64,
}

impl DailySummary {
    #[must_use]
    pub fn from_entries(entries: &[FoodEntry]) -> Self {
        entries.iter().fold(Self::default(), |acc, e| Self {
            total_calories: acc.total_calories + e.calories.unwrap_or(0.0),
            total_carbs: acc.total_carbs + e.carbs.unwrap_or(0.0),
            total_proteins: acc.total_proteins + e.proteins.unwrap_or(0.0),
            total_fats: acc.total_fats + e.fats.unwrap_or(0.0),
        })
    }
}

/// The food log and the totals computed from that same read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodLogSnapshot {
    pub food_log: Vec<FoodEntry>,
    pub summary: DailySummary,
}

impl FoodLogSnapshot {
    #[must_use]
    pub fn from_entries(food_log: Vec<FoodEntry>) -> Self {
        let summary = DailySummary::from_entries(&food_log);
        Self { food_log, summary }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis: String,
    /// Entries added by this analysis only.
    pub food_items: Vec<FoodEntry>,
    pub food_log: Vec<FoodEntry>,
    pub summary: DailySummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    pub chat_history: Vec<ChatTurn>,
}

// --- Validation ---

/// An uploaded file as received, before validation.
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

/// Image bytes that sniffed as a supported format and decode in full.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub bytes: Vec<u8>,
    /// MIME type of the detected format, not the one the client declared.
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Check an upload is a real image of acceptable size.
///
/// A declared content type must be `image/*`, but the format sent on to the
/// model is always the one sniffed from the bytes. The whole image is decoded,
/// so this is CPU-bound; async callers should run it on a blocking thread.
pub fn validate_image(upload: ImageUpload) -> Result<ValidatedImage, NutritionError> {
    if upload.bytes.is_empty() {
        return Err(NutritionError::validation("Uploaded file is empty."));
    }
    if upload.bytes.len() > MAX_IMAGE_BYTES {
        return Err(NutritionError::validation("Image size exceeds 5MB limit."));
    }
    if let Some(content_type) = upload.content_type.as_deref() {
        if !content_type.starts_with("image/") {
            return Err(NutritionError::validation(format!(
                "Invalid file type '{content_type}'. Please upload an image (jpg, jpeg, png)."
            )));
        }
    }

    let format = image::guess_format(&upload.bytes)
        .map_err(|_| NutritionError::validation("File is not a recognizable image."))?;
    let decoded = image::load_from_memory_with_format(&upload.bytes, format)
        .map_err(|e| NutritionError::validation(format!("Image could not be decoded: {e}")))?;

    Ok(ValidatedImage {
        mime_type: format.to_mime_type(),
        width: decoded.width(),
        height: decoded.height(),
        bytes: upload.bytes,
    })
}

/// Reject messages that are empty once whitespace is trimmed.
pub fn validate_chat_message(message: &str) -> Result<(), NutritionError> {
    if message.trim().is_empty() {
        return Err(NutritionError::validation("Message cannot be empty"));
    }
    Ok(())
}
