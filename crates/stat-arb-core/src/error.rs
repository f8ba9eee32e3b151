use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatArbError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Degenerate regression: {context}")]
    DegenerateRegression { context: String },

    #[error("Degenerate spread: {context}")]
    DegenerateSpread { context: String },

    #[error("Invalid configuration: {field} ({reason})")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Numeric overflow in {context}")]
    NumericOverflow { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for StatArbError {
    fn from(e: serde_json::Error) -> Self {
        StatArbError::SerializationError(e.to_string())
    }
}
