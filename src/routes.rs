use actix_identity::Identity;
use actix_web::{
    get,
    http::StatusCode,
    post,
    web::{self, Data},
    HttpMessage, HttpRequest, HttpResponse, Responder, ResponseError,
};
use chrono::Utc;
use serde::Deserialize;
use tera::Context;
use validator::Validate;

use crate::{
    db::{self, NewUser},
    errors::AppError,
    forms::{self, ProfileForm},
    structs::User,
    subscription,
    utils::{self, redirect, render, render_status},
    AppState,
};

/// User id stored in the identity cookie. Anonymous requests are
/// `Unauthorized`, which redirects to the login page.
pub fn require_user(identity: Option<Identity>) -> Result<i64, AppError> {
    let identity = identity.ok_or(AppError::Unauthorized)?;
    let raw = identity.id()?;
    raw.parse().map_err(|_| {
        log::warn!("Identity cookie carries a non-numeric id: {:?}", raw);
        AppError::Unauthorized
    })
}

/// Loads the logged-in user. A session pointing at a deleted account is
/// treated as anonymous.
pub async fn current_user(state: &AppState, identity: Option<Identity>) -> Result<User, AppError> {
    let user_id = require_user(identity)?;
    match db::get_user_by_id(state, user_id).await {
        Err(AppError::NotFound) => {
            log::warn!("Session refers to missing user {}", user_id);
            Err(AppError::Unauthorized)
        }
        other => other,
    }
}

/// Context every page starts from.
pub fn page_context(title: &str, user: Option<&User>) -> Context {
    let mut context = Context::new();
    context.insert("title", title);
    context.insert("version", env!("CARGO_PKG_VERSION"));
    context.insert("current_user", &user);
    context
}

/// Dashboard pages also carry the agent's access state for the banner and
/// the session poller.
pub fn agent_context(title: &str, user: &User, state: &AppState) -> Context {
    let mut context = page_context(title, Some(user));
    context.insert(
        "subscription",
        &subscription::subscription_status(user, Utc::now()),
    );
    context.insert("poll_secs", &state.settings.access_poll_secs);
    context
}

#[get("/")]
pub async fn index_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = match identity {
        Some(identity) => current_user(&state, Some(identity)).await.ok(),
        None => None,
    };

    let mut context = page_context("РиелторПро — подборки недвижимости для клиентов", user.as_ref());
    context.insert("trial_days", &state.settings.trial_days);
    render("index.html", &context)
}

#[get("/agreement")]
pub async fn agreement_handler() -> Result<impl Responder, AppError> {
    render("agreement.html", &page_context("Пользовательское соглашение", None))
}

#[get("/privacy")]
pub async fn privacy_handler() -> Result<impl Responder, AppError> {
    render(
        "privacy.html",
        &page_context("Политика обработки персональных данных", None),
    )
}

#[derive(Deserialize)]
pub struct Login {
    email: String,
    password: String,
}

#[get("/login")]
pub async fn login_handler() -> Result<impl Responder, AppError> {
    render("login.html", &page_context("Вход", None))
}

#[post("/login")]
pub async fn login_form_handler(
    web::Form(form): web::Form<Login>,
    state: Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let fail = |status: StatusCode, message: &str| {
        let mut context = page_context("Вход", None);
        context.insert("error", message);
        context.insert("email", &form.email);
        render_status(status, "login.html", &context)
    };

    if form.email.trim().is_empty() || form.password.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Заполните все поля");
    }

    let Some(user) = db::find_user_by_email(&state, &form.email).await? else {
        log::info!("Login attempt for unknown email");
        return fail(StatusCode::UNAUTHORIZED, "Неверный email или пароль");
    };

    if !utils::verify_password(&form.password, &user.pwd_hash)? {
        log::warn!("Wrong password for user ID: {}", user.id);
        return fail(StatusCode::UNAUTHORIZED, "Неверный email или пароль");
    }

    Identity::login(&request.extensions(), user.id.to_string())?;
    log::info!("User {} logged in", user.id);
    Ok(redirect("/dashboard"))
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct Register {
    name: String,
    email: String,
    phone: String,
    password: String,
    password2: String,
    agree: Option<String>,
}

impl Register {
    fn validate(&self) -> Result<NewUser, AppError> {
        let account = forms::AccountInput::new(&self.name, &self.email, &self.phone);
        account.validate()?;
        forms::validate_new_password(&self.password, &self.password2)?;
        if self.agree.is_none() {
            return Err(AppError::validation(
                "Необходимо принять пользовательское соглашение",
            ));
        }
        Ok(NewUser {
            name: account.name,
            email: account.email,
            phone: account.phone,
            password: self.password.clone(),
        })
    }
}

#[get("/register")]
pub async fn register_handler(state: Data<AppState>) -> Result<impl Responder, AppError> {
    let mut context = page_context("Регистрация", None);
    context.insert("trial_days", &state.settings.trial_days);
    render("register.html", &context)
}

#[post("/register")]
pub async fn register_form_handler(
    web::Form(form): web::Form<Register>,
    state: Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let created = match form.validate() {
        Ok(new_user) => db::create_user(&state, new_user).await,
        Err(e) => Err(e),
    };
    let user = match created {
        Ok(user) => user,
        Err(e) => {
            let Some(message) = e.form_alert() else {
                return Err(e);
            };
            let mut context = page_context("Регистрация", None);
            context.insert("trial_days", &state.settings.trial_days);
            context.insert("error", &message);
            context.insert("name", &form.name);
            context.insert("email", &form.email);
            context.insert("phone", &form.phone);
            return render_status(e.status_code(), "register.html", &context);
        }
    };

    Identity::login(&request.extensions(), user.id.to_string())?;
    Ok(redirect("/dashboard"))
}

#[post("/logout")]
pub async fn logout_handler(identity: Option<Identity>) -> impl Responder {
    if let Some(identity) = identity {
        identity.logout();
    }
    redirect("/")
}

#[get("/profile")]
pub async fn profile_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let context = agent_context("Профиль", &user, &state);
    render("profile.html", &context)
}

#[post("/profile")]
pub async fn profile_form_handler(
    web::Form(form): web::Form<ProfileForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&state, identity).await?;

    let saved = match form.validate() {
        Ok(profile) => db::update_profile(&state, user.id, profile).await,
        Err(e) => Err(e),
    };
    match saved {
        Ok(_) => Ok(redirect("/profile")),
        Err(e) => {
            let Some(message) = e.form_alert() else {
                return Err(e);
            };
            let mut context = agent_context("Профиль", &user, &state);
            context.insert("error", &message);
            render_status(e.status_code(), "profile.html", &context)
        }
    }
}

#[get("/change-pwd")]
pub async fn change_pwd_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    render(
        "change-pwd.html",
        &agent_context("Смена пароля", &user, &state),
    )
}

#[derive(Deserialize)]
pub struct ChangePwdForm {
    old_password: String,
    password: String,
    password2: String,
}

#[post("/change-pwd")]
pub async fn change_pwd_form_handler(
    web::Form(form): web::Form<ChangePwdForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&state, identity).await?;
    let fail = |status: StatusCode, message: &str| {
        let mut context = agent_context("Смена пароля", &user, &state);
        context.insert("error", message);
        render_status(status, "change-pwd.html", &context)
    };

    if !utils::verify_password(&form.old_password, &user.pwd_hash)? {
        log::warn!("Old password verification failed for user ID: {}", user.id);
        return fail(StatusCode::UNAUTHORIZED, "Текущий пароль указан неверно");
    }
    if let Err(e) = forms::validate_new_password(&form.password, &form.password2) {
        return fail(StatusCode::BAD_REQUEST, &e.public_message());
    }

    db::update_password(&state, user.id, &form.password).await?;
    Ok(redirect("/dashboard"))
}

#[get("/subscription")]
pub async fn subscription_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    render("subscription.html", &agent_context("Подписка", &user, &state))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};

    use crate::{
        db,
        test_support::{login, seed_user, test_app, test_state, TEST_PASSWORD},
        utils,
    };

    #[actix_web::test]
    async fn landing_and_legal_pages_render() {
        let state = test_state().await;
        let app = test_app!(state);

        for uri in ["/", "/agreement", "/privacy", "/login", "/register"] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK, "GET {}", uri);
        }
    }

    #[actix_web::test]
    async fn register_creates_trial_account_and_logs_in() {
        let state = test_state().await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/register")
            .set_form(&[
                ("name", "Олег Смирнов"),
                ("email", "Oleg@Example.com"),
                ("phone", ""),
                ("password", "passw0rd-1"),
                ("password2", "passw0rd-1"),
                ("agree", "on"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get("Location").unwrap(), "/dashboard");
        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == "id")
            .unwrap()
            .into_owned();

        let user = db::find_user_by_email(&state, "oleg@example.com")
            .await
            .unwrap()
            .expect("user stored lowercase");
        assert_eq!(user.phone, None);
        assert!(utils::verify_password("passw0rd-1", &user.pwd_hash).unwrap());

        let req = test::TestRequest::get()
            .uri("/dashboard")
            .cookie(cookie)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn register_rejects_duplicates_and_missing_agreement() {
        let state = test_state().await;
        seed_user(&state, "taken@example.com").await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/register")
            .set_form(&[
                ("name", "Двойник"),
                ("email", "taken@example.com"),
                ("password", "passw0rd-1"),
                ("password2", "passw0rd-1"),
                ("agree", "on"),
            ])
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert!(String::from_utf8_lossy(&body).contains("уже зарегистрирован"));

        let req = test::TestRequest::post()
            .uri("/register")
            .set_form(&[
                ("name", "Новый агент"),
                ("email", "new@example.com"),
                ("password", "passw0rd-1"),
                ("password2", "passw0rd-1"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(db::find_user_by_email(&state, "new@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[actix_web::test]
    async fn login_with_wrong_password_is_rejected() {
        let state = test_state().await;
        seed_user(&state, "agent@example.com").await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/login")
            .set_form(&[("email", "agent@example.com"), ("password", "nope-nope-1")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn protected_pages_redirect_anonymous_visitors() {
        let state = test_state().await;
        let app = test_app!(state);

        for uri in ["/dashboard", "/profile", "/change-pwd", "/subscription"] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::SEE_OTHER, "GET {}", uri);
            assert_eq!(resp.headers().get("Location").unwrap(), "/login");
        }
    }

    #[actix_web::test]
    async fn profile_update_and_password_change() {
        let state = test_state().await;
        let user = seed_user(&state, "agent@example.com").await;
        let app = test_app!(state);
        let cookie = login!(app, "agent@example.com");

        let req = test::TestRequest::post()
            .uri("/profile")
            .cookie(cookie.clone())
            .set_form(&[
                ("name", "Ирина П."),
                ("phone", "+7 911 111-11-11"),
                ("description", "Вторичный рынок, центр"),
                ("avatar_url", "https://img.example.com/me.jpg"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let updated = db::get_user_by_id(&state, user.id).await.unwrap();
        assert_eq!(updated.name, "Ирина П.");
        assert_eq!(updated.avatar_url.as_deref(), Some("https://img.example.com/me.jpg"));

        let req = test::TestRequest::post()
            .uri("/change-pwd")
            .cookie(cookie.clone())
            .set_form(&[
                ("old_password", "wrong-old-1"),
                ("password", "brand-new-2"),
                ("password2", "brand-new-2"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/change-pwd")
            .cookie(cookie)
            .set_form(&[
                ("old_password", TEST_PASSWORD),
                ("password", "brand-new-2"),
                ("password2", "brand-new-2"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let updated = db::get_user_by_id(&state, user.id).await.unwrap();
        assert!(utils::verify_password("brand-new-2", &updated.pwd_hash).unwrap());
    }

    #[actix_web::test]
    async fn logout_clears_the_session() {
        let state = test_state().await;
        seed_user(&state, "agent@example.com").await;
        let app = test_app!(state);
        let cookie = login!(app, "agent@example.com");

        let req = test::TestRequest::post()
            .uri("/logout")
            .cookie(cookie)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let cleared = resp
            .response()
            .cookies()
            .find(|c| c.name() == "id")
            .map(|c| c.into_owned());

        let mut req = test::TestRequest::get().uri("/dashboard");
        if let Some(cookie) = cleared {
            req = req.cookie(cookie);
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }
}
