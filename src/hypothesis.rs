// Turns engine result records into hypothesis text.
//
// Records look like `{"text": "hello world"}` or `{"partial": "hel"}`.
// Malformed or empty records are expected on silence and are dropped
// rather than reported.

/// Field holding a complete or final result.
pub const TEXT_FIELD: &str = "text";
/// Field holding an in-progress result.
pub const PARTIAL_FIELD: &str = "partial";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HypothesisKind {
    Partial,
    Final,
}

impl HypothesisKind {
    /// Record field this kind of hypothesis is read from.
    pub fn field(self) -> &'static str {
        match self {
            HypothesisKind::Partial => PARTIAL_FIELD,
            HypothesisKind::Final => TEXT_FIELD,
        }
    }
}

/// Extract the string value of `field` from the record.
///
/// Returns `None` when the record is not a JSON object, the field is
/// missing or not a string, or the text is blank. Non-blank text is
/// returned as the engine wrote it.
pub fn decode(raw: &str, field: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let text = value.get(field)?.as_str()?;
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
