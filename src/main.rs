#[macro_use]
extern crate lazy_static;

use std::str::FromStr;

use actix_files::{Files, NamedFile};
use actix_identity::IdentityMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    cookie::Key,
    http::{Method, StatusCode},
    middleware,
    web::{self, Data},
    App, Either, HttpResponse, HttpServer, Responder,
};
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
    SqlitePool,
};
use tera::Tera;

mod api;
mod config;
mod dashboard;
mod db;
mod errors;
mod forms;
mod images;
mod routes;
mod share;
mod structs;
mod subscription;
#[cfg(test)]
mod test_support;
mod utils;

use config::{AppConfig, Settings};

#[derive(Debug, Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub settings: Settings,
}

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        let mut tera = match Tera::new("templates/**/*") {
            Ok(t) => t,
            Err(e) => {
                log::error!("Parsing error(s): {}", e);
                ::std::process::exit(1);
            }
        };
        tera.autoescape_on(vec![".html"]);
        tera.register_filter("price", utils::price_filter);
        tera
    };
}

/// Every route of the application. Shared by the server and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(Files::new("/static", "static"))
        .service(routes::index_handler)
        .service(routes::agreement_handler)
        .service(routes::privacy_handler)
        .service(routes::register_handler)
        .service(routes::register_form_handler)
        .service(routes::login_handler)
        .service(routes::login_form_handler)
        .service(routes::logout_handler)
        .service(routes::profile_handler)
        .service(routes::profile_form_handler)
        .service(routes::change_pwd_handler)
        .service(routes::change_pwd_form_handler)
        .service(routes::subscription_handler)
        .service(dashboard::dashboard_handler)
        .service(dashboard::create_collection_handler)
        .service(dashboard::collection_handler)
        .service(dashboard::update_collection_handler)
        .service(dashboard::delete_collection_handler)
        .service(dashboard::add_property_handler)
        .service(dashboard::edit_property_handler)
        .service(dashboard::update_property_handler)
        .service(dashboard::delete_property_handler)
        .service(dashboard::approve_comment_handler)
        .service(dashboard::delete_comment_handler)
        // must precede the /share/{share_id} pattern
        .service(share::expired_handler)
        .service(share::collection_v1_handler)
        .service(share::collection_v2_handler)
        .service(share::property_v1_handler)
        .service(share::property_v2_handler)
        .service(share::comment_form_handler)
        .service(api::check_share_access_handler)
        .service(api::user_session_handler)
        .default_service(web::to(default_handler));
}

async fn connect_db(database_url: &str) -> std::io::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .read_only(false)
        .busy_timeout(std::time::Duration::from_secs(5));

    SqlitePool::connect_with(opts)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("FATAL: {}", e);
        e
    })?;

    let db_pool = connect_db(&config.database_url).await?;
    sqlx::migrate!()
        .run(&db_pool)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    info!("Database migrated successfully");

    // Fail now rather than on the first request.
    lazy_static::initialize(&TEMPLATES);

    let state = AppState {
        db_pool,
        settings: config.settings.clone(),
    };
    let session_key = Key::from(&config.session_key);
    let cookie_secure = config.cookie_secure;

    info!(
        "Starting HTTP server on http://{}:{}/ (trial {} days)",
        config.host, config.port, state.settings.trial_days
    );

    HttpServer::new(move || {
        App::new()
            // enable automatic response compression - usually register this first
            .wrap(middleware::Compress::default())
            .wrap(IdentityMiddleware::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
                    .cookie_secure(cookie_secure)
                    .build(),
            )
            // enable logger - always register Actix Web Logger middleware last
            .wrap(middleware::Logger::default())
            .app_data(Data::new(state.clone()))
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

async fn default_handler(req_method: Method) -> Result<impl Responder, std::io::Error> {
    match req_method {
        Method::GET => {
            let file = NamedFile::open("static/404.html")?
                .customize()
                .with_status(StatusCode::NOT_FOUND);
            Ok(Either::Left(file))
        }
        _ => Ok(Either::Right(HttpResponse::MethodNotAllowed().finish())),
    }
}
