//! Passkey request handlers
//!
//! Begin handlers return the options JSON and set a sealed ceremony ticket
//! cookie. Finish handlers open the ticket, verify the posted credential
//! and clear the cookie.

use actix_web::{error::ErrorInternalServerError, web, HttpRequest, HttpResponse, Result};
use serde::de::DeserializeOwned;

use crate::passkey::{CeremonyKind, ChallengeError, PasskeyError, PasskeyService};
use crate::session::{CeremonyCookieFactory, CeremonyTicket};
use crate::utils::responses::ResponseBuilder;
use crate::webauthn::{PublicKeyCredential, RegisterPublicKeyCredential};

const REGISTRATION_SUCCESS: &str = "Registration Success";
const LOGIN_SUCCESS: &str = "Login Success";

/// `GET /register/begin/{username}`
///
/// # Errors
///
/// Returns an error if the username is invalid or the ticket cannot be sealed
pub async fn begin_registration(
    path: web::Path<String>,
    passkeys: web::Data<PasskeyService>,
    cookies: web::Data<CeremonyCookieFactory>,
) -> Result<HttpResponse> {
    let username = path.into_inner();
    let start = passkeys.begin_registration(&username)?;
    ticket_response(
        &cookies,
        CeremonyTicket::new(start.token, &username, CeremonyKind::Registration),
        &start.options,
    )
}

/// `POST /register/finish/{username}`
///
/// # Errors
///
/// Returns a 400 response for a missing or bad ticket, a malformed body or a
/// failed verification
pub async fn finish_registration(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    passkeys: web::Data<PasskeyService>,
    cookies: web::Data<CeremonyCookieFactory>,
) -> Result<HttpResponse> {
    let username = path.into_inner();
    let ticket = open_ticket(&req, &cookies, CeremonyKind::Registration)?;
    let response: RegisterPublicKeyCredential = parse_body(&body)?;

    passkeys.finish_registration(&username, &ticket.token, &response)?;

    Ok(ResponseBuilder::text_clearing_cookie(
        REGISTRATION_SUCCESS,
        cookies.clear_cookie(CeremonyKind::Registration),
    ))
}

/// `GET /login/begin/{username}`
///
/// # Errors
///
/// Returns a 400 response for unknown users, before any challenge exists
pub async fn begin_login(
    path: web::Path<String>,
    passkeys: web::Data<PasskeyService>,
    cookies: web::Data<CeremonyCookieFactory>,
) -> Result<HttpResponse> {
    let username = path.into_inner();
    let start = passkeys.begin_login(&username)?;
    ticket_response(
        &cookies,
        CeremonyTicket::new(start.token, &username, CeremonyKind::Authentication),
        &start.options,
    )
}

/// `POST /login/finish/{username}`
///
/// # Errors
///
/// Returns a 400 response for a missing or bad ticket, a malformed body or a
/// failed verification
pub async fn finish_login(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    passkeys: web::Data<PasskeyService>,
    cookies: web::Data<CeremonyCookieFactory>,
) -> Result<HttpResponse> {
    let username = path.into_inner();
    let ticket = open_ticket(&req, &cookies, CeremonyKind::Authentication)?;
    let response: PublicKeyCredential = parse_body(&body)?;

    passkeys.finish_login(&username, &ticket.token, &response)?;

    Ok(ResponseBuilder::text_clearing_cookie(
        LOGIN_SUCCESS,
        cookies.clear_cookie(CeremonyKind::Authentication),
    ))
}

fn ticket_response<T: serde::Serialize>(
    cookies: &CeremonyCookieFactory,
    ticket: CeremonyTicket,
    options: &T,
) -> Result<HttpResponse> {
    let cookie = cookies.create_ticket_cookie(&ticket).map_err(|e| {
        log::error!("Failed to seal ceremony ticket: {e}");
        ErrorInternalServerError("failed to create ceremony session")
    })?;
    Ok(ResponseBuilder::json_with_cookie(options, Some(cookie)))
}

fn open_ticket(
    req: &HttpRequest,
    cookies: &CeremonyCookieFactory,
    kind: CeremonyKind,
) -> Result<CeremonyTicket, PasskeyError> {
    cookies
        .read_ticket(req, kind)?
        .ok_or(PasskeyError::Challenge(ChallengeError::NotFound))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, PasskeyError> {
    serde_json::from_slice(body)
        .map_err(|e| PasskeyError::InvalidInput(format!("malformed credential JSON: {e}")))
}
