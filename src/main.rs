#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use passgate::{
    configure_services, settings::PassgateSettings, utils::logging::LoggingHelper,
    CeremonyCookieFactory, PasskeyService,
};

/// How often abandoned ceremonies are swept from memory
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Also loads the .env file and initializes the logger
    let settings = PassgateSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let passkeys = PasskeyService::from_settings(&settings).map_err(|e| {
        std::io::Error::other(format!("Failed to initialize relying party: {e}"))
    })?;
    let cookies = CeremonyCookieFactory::from_settings(&settings);

    LoggingHelper::log_relying_party(
        &settings.relying_party.rp_id,
        &settings.relying_party.rp_origin,
        &settings.relying_party.algorithms,
    );

    start_server(settings, passkeys, cookies).await
}

/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    settings: PassgateSettings,
    passkeys: PasskeyService,
    cookies: CeremonyCookieFactory,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    let passkeys = web::Data::new(passkeys);
    let cookies = web::Data::new(cookies);
    spawn_challenge_purge(passkeys.clone());

    let cors_origins = settings.get_cors_origins();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Content-Type", "Accept"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(passkeys.clone())
            .app_data(cookies.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn spawn_challenge_purge(passkeys: web::Data<PasskeyService>) {
    actix_web::rt::spawn(async move {
        let mut ticker = actix_web::rt::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = passkeys.challenges().purge_expired();
            if purged > 0 {
                log::debug!("Purged {purged} expired ceremony sessions");
            }
        }
    });
}

fn print_startup_info(bind_address: &str, settings: &PassgateSettings) {
    println!("🚀 Starting passgate v{} on {bind_address}", passgate::VERSION);
    println!(
        "🔑 Relying party: {} ({}) at {}",
        settings.relying_party.rp_name, settings.relying_party.rp_id, settings.relying_party.rp_origin
    );
    println!(
        "⏱  Challenge TTL: {}s, secure cookies: {}",
        settings.session.challenge_ttl_seconds, settings.cookies.secure
    );
    println!("📝 Log level: {}", settings.logging.level);
    println!("🌐 CORS origins: {}", settings.application.cors_origins);
}
