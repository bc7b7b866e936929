use serde::{Deserialize, Serialize};

/// Error body returned by every integration endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
