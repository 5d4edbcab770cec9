use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Confidence, IntentCategory, Mode};

/// One handled utterance and what came of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: i64,
    pub raw_text: String,
    pub mode: Mode,
    pub category: IntentCategory,
    pub parameters: BTreeMap<String, String>,
    pub confidence: Confidence,
    pub success: bool,
    pub message: String,
    pub created_at: i64,
}
