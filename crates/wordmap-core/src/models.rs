//! Catalog of chat models offered for selection

use serde::Serialize;

pub const DEFAULT_MODEL_ID: &str = "google/gemma-3n-e4b-it:free";

/// A selectable chat model
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
}

const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: DEFAULT_MODEL_ID,
        name: "Gemma 3n E4B (free)",
    },
    ModelInfo {
        id: "openai/gpt-3.5-turbo",
        name: "GPT-3.5 Turbo",
    },
    ModelInfo {
        id: "deepseek/deepseek-r1-0528:free",
        name: "DeepSeek R1 0528 (free)",
    },
];

/// All catalog models, default first
pub fn available_models() -> &'static [ModelInfo] {
    MODELS
}

pub fn get_model(id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == id)
}
