use sqlx::sqlite::SqlitePoolOptions;

use crate::{
    config::Settings,
    db::{self, NewUser},
    forms::{PropertyForm, PropertyInput},
    structs::User,
    AppState,
};

pub const TEST_PASSWORD: &str = "s3cret-pass";

/// Fresh in-memory database. A single connection keeps every query on the
/// same memory database.
pub async fn test_state() -> AppState {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    AppState {
        db_pool: pool,
        settings: Settings::default(),
    }
}

pub async fn seed_user(state: &AppState, email: &str) -> User {
    db::create_user(
        state,
        NewUser {
            name: "Ирина Петрова".into(),
            email: email.into(),
            phone: Some("+7 900 000-00-00".into()),
            password: TEST_PASSWORD.into(),
        },
    )
    .await
    .expect("seed user")
}

pub async fn expire_access(state: &AppState, user_id: i64) {
    let past = (chrono::Utc::now() - chrono::Duration::days(1)).to_rfc3339();
    sqlx::query("UPDATE users SET trial_ends_at = $1, subscription_ends_at = NULL WHERE id = $2")
        .bind(past)
        .bind(user_id)
        .execute(&state.db_pool)
        .await
        .expect("expire access");
}

pub fn property_form() -> PropertyForm {
    PropertyForm {
        property_type: "apartment".into(),
        address: "Санкт-Петербург, Невский пр., 28".into(),
        rooms: "3".into(),
        area: "78.4".into(),
        price: "21000000".into(),
        description: "Светлая квартира с видом на канал".into(),
        image_urls: "https://img.example.com/a.jpg\nhttps://img.example.com/b.jpg".into(),
        floor_plan_urls: "https://img.example.com/plan.jpg".into(),
        interior_urls: "https://img.example.com/i1.jpg\nhttps://img.example.com/i2.jpg".into(),
        floor: "4".into(),
        total_floors: "6".into(),
        status: "available".into(),
        ..Default::default()
    }
}

pub fn property_input() -> PropertyInput {
    property_form().validate().expect("valid property form")
}

/// Builds the full application around `state` with a throwaway session key.
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(actix_identity::IdentityMiddleware::default())
                .wrap(
                    actix_session::SessionMiddleware::builder(
                        actix_session::storage::CookieSessionStore::default(),
                        actix_web::cookie::Key::generate(),
                    )
                    .cookie_secure(false)
                    .build(),
                )
                .app_data(actix_web::web::Data::new($state.clone()))
                .configure(crate::configure),
        )
        .await
    };
}

/// Logs in through the form and returns the session cookie.
macro_rules! login {
    ($app:expr, $email:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri("/login")
            .set_form(&[
                ("email", $email),
                ("password", crate::test_support::TEST_PASSWORD),
            ])
            .to_request();
        let resp = actix_web::test::call_service(&$app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SEE_OTHER);
        resp.response()
            .cookies()
            .find(|c| c.name() == "id")
            .expect("session cookie")
            .into_owned()
    }};
}

pub(crate) use login;
pub(crate) use test_app;
