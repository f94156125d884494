use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use crate::models::{FoodEntry, ValidatedImage};

// --- Prompts ---

pub const ANALYSIS_PROMPT: &str = "\
You are an expert nutritionist. Analyze the food items in the uploaded image and provide:
1. A list of identified food items with their estimated calories and macronutrients (carbs, proteins, fats) in the format:
   - Item: [Name] - Calories: [X kcal], Carbs: [X g], Proteins: [X g], Fats: [X g]
2. Total calories and macronutrient breakdown for the meal.
3. A brief assessment of the meal's healthiness and suggestions for improvement.
";

/// Build the nutritionist prompt for a chat message, with the food log inlined as JSON.
#[must_use]
pub fn chat_prompt(message: &str, food_log: &[FoodEntry]) -> String {
    let log = serde_json::to_string(food_log).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are an expert nutritionist. Provide accurate and helpful nutritional advice \
         based on the following user input: {message}. \
         If relevant, refer to the user's food log: {log}"
    )
}

// --- generateContent wire types ---

#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl GenerateContentRequest {
    #[must_use]
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part::Text {
                    text: prompt.into(),
                }],
            }],
        }
    }

    #[must_use]
    pub fn with_image(prompt: impl Into<String>, image: &ValidatedImage) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: prompt.into(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type.to_string(),
                            data: general_purpose::STANDARD.encode(&image.bytes),
                        },
                    },
                ],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, with its parts joined. `None` if there is no text.
    #[must_use]
    pub fn response_text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.trim().is_empty()).then_some(text)
    }

    #[must_use]
    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }
}
