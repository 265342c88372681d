use serde::{ Serialize, Deserialize };
use serde_json::Value;

#[derive(Deserialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Serialize, Debug)]
pub struct ClearResponse {
    pub message: String,
}

#[derive(Serialize, Debug)]
pub struct ProfileResponse {
    pub success: bool,
    pub data: ProfileData,
}

#[derive(Serialize, Debug)]
pub struct ProfileData {
    pub user: Value,
}

#[derive(Serialize, Debug)]
pub struct BannerResponse {
    pub message: String,
    pub service: String,
    pub time: String,
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub model: String,
    pub auth_backend: String,
    pub frontend_allowed: Vec<String>,
    pub timestamp: String,
}

#[derive(Serialize, Debug)]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: String,
}
