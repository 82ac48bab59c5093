use serde::{Deserialize, Serialize};

/// Structured context extracted from one screen frame by the vision model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenAnalysis {
    pub current_focus: String,
    pub active_software: String,
    #[serde(default)]
    pub context_keywords: Vec<String>,
}
