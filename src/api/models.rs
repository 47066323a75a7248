//! Wire types for the HTTP front-end.

use serde::{Deserialize, Serialize};

/// Successful recognition payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub language: String,
    pub text: String,
}

/// Error payload. The `detail` key is what upload clients expect.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
