// HTTP request handlers for the passkey relying party
pub mod health;
pub mod passkey;

use actix_web::web;

pub use health::health;
pub use passkey::{begin_login, begin_registration, finish_login, finish_registration};

/// Register every route on an app or scope
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg
        // Passkey endpoints
        .route("/register/begin/{username}", web::get().to(begin_registration))
        .route("/register/finish/{username}", web::post().to(finish_registration))
        .route("/login/begin/{username}", web::get().to(begin_login))
        .route("/login/finish/{username}", web::post().to(finish_login))
        // Health endpoint
        .route("/ping", web::get().to(health));
}
