use actix_web::{HttpResponse, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Health check endpoint
///
/// # Errors
/// Returns an error if health status cannot be determined
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        message: "passgate relying party is running".to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}
