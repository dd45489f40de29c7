//! HTTP response helpers
//!
//! Every ceremony failure leaves the server as a `400 Bad Request` with a
//! `{"code", "message"}` JSON body; successes are JSON options or a short
//! plain-text confirmation.

use actix_web::{cookie::Cookie, http::header, HttpResponse};
use serde::{Deserialize, Serialize};

/// Error body returned for every failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// `400 Bad Request` with a JSON error body
    #[must_use]
    pub fn bad_request(error: &ErrorResponse) -> HttpResponse {
        HttpResponse::BadRequest()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .json(error)
    }

    /// `200 OK` with a JSON body and an optional cookie
    #[must_use]
    pub fn json_with_cookie<T: Serialize>(body: &T, cookie: Option<Cookie<'static>>) -> HttpResponse {
        let mut response = HttpResponse::Ok();
        response.insert_header((header::CACHE_CONTROL, "no-store"));
        if let Some(cookie) = cookie {
            response.cookie(cookie);
        }
        response.json(body)
    }

    /// `200 OK` with a plain-text body, clearing `cookie`
    #[must_use]
    pub fn text_clearing_cookie(body: &'static str, cookie: Cookie<'static>) -> HttpResponse {
        HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, "text/plain; charset=utf-8"))
            .cookie(cookie)
            .body(body)
    }
}
