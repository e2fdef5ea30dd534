use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub thingsboard_accessible: bool,
    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
}
