// Closed-vocabulary constraint applied to a recognizer at construction time.

use serde::{Deserialize, Serialize};

/// Marker the engine uses for out-of-vocabulary speech.
pub const UNKNOWN_TOKEN: &str = "[unk]";

/// Ordered set of literal phrases a recognizer is allowed to produce.
///
/// Immutable once built; duplicates and blank entries are dropped while
/// keeping first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    tokens: Vec<String>,
}

impl Grammar {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for token in tokens {
            let token = token.into();
            let trimmed = token.trim();
            if trimmed.is_empty() || out.iter().any(|t| t == trimmed) {
                continue;
            }
            out.push(trimmed.to_string());
        }
        Self { tokens: out }
    }

    /// Same grammar with the unknown-token marker appended (once).
    pub fn with_unknown(mut self) -> Self {
        if !self.has_unknown() {
            self.tokens.push(UNKNOWN_TOKEN.to_string());
        }
        self
    }

    pub fn has_unknown(&self) -> bool {
        self.tokens.iter().any(|t| t == UNKNOWN_TOKEN)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Engine literal-array form: `["yes", "no", "[unk]"]`.
    pub fn to_engine_string(&self) -> String {
        // A Vec<String> always serializes
        serde_json::to_string(&self.tokens).unwrap_or_else(|_| "[]".to_string())
    }
}
