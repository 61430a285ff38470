//! JSON endpoints polled by the browser.

use actix_identity::Identity;
use actix_web::{
    get,
    web::{self, Data},
    HttpResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{AppError, ErrorBody},
    routes::current_user,
    subscription::{self, SubscriptionStatus},
    AppState,
};

fn json_error(err: AppError) -> HttpResponse {
    use actix_web::ResponseError;

    let status = match err {
        AppError::Unauthorized => actix_web::http::StatusCode::UNAUTHORIZED,
        ref other => other.status_code(),
    };
    if status.is_server_error() {
        log::error!("API request failed: {}", err);
    }
    HttpResponse::build(status).json(ErrorBody {
        error: err.public_message(),
    })
}

#[derive(Deserialize)]
pub struct CheckShareAccessQuery {
    #[serde(rename = "shareId")]
    share_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareAccess {
    has_access: bool,
}

#[get("/api/check-share-access")]
pub async fn check_share_access_handler(
    query: web::Query<CheckShareAccessQuery>,
    state: Data<AppState>,
) -> HttpResponse {
    let share_id = match query.share_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => return json_error(AppError::validation("shareId is required")),
    };

    match subscription::has_share_access(&state, share_id).await {
        Ok(has_access) => HttpResponse::Ok().json(ShareAccess { has_access }),
        Err(e) => json_error(e),
    }
}

#[derive(Serialize)]
pub struct SessionUser {
    id: i64,
    name: String,
    email: String,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum SessionInfo {
    Anonymous {
        authenticated: bool,
    },
    Authenticated {
        authenticated: bool,
        user: SessionUser,
        subscription: SubscriptionStatus,
    },
}

#[get("/api/user-session")]
pub async fn user_session_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> HttpResponse {
    if identity.is_none() {
        return HttpResponse::Ok().json(SessionInfo::Anonymous {
            authenticated: false,
        });
    }

    match current_user(&state, identity).await {
        Ok(user) => HttpResponse::Ok().json(SessionInfo::Authenticated {
            authenticated: true,
            subscription: subscription::subscription_status(&user, Utc::now()),
            user: SessionUser {
                id: user.id,
                name: user.name,
                email: user.email,
            },
        }),
        Err(AppError::Unauthorized) => HttpResponse::Ok().json(SessionInfo::Anonymous {
            authenticated: false,
        }),
        Err(e) => json_error(e),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    use crate::{
        db,
        test_support::{expire_access, login, seed_user, test_app, test_state},
    };

    #[actix_web::test]
    async fn share_access_reports_owner_state() {
        let state = test_state().await;
        let user = seed_user(&state, "agent@example.com").await;
        let collection = db::create_collection(&state, user.id, "Подборка".into(), None)
            .await
            .unwrap();
        let app = test_app!(state);

        let uri = format!("/api/check-share-access?shareId={}", collection.share_id);
        let req = test::TestRequest::get().uri(&uri).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["hasAccess"], Value::Bool(true));

        expire_access(&state, user.id).await;
        let req = test::TestRequest::get().uri(&uri).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["hasAccess"], Value::Bool(false));

        let req = test::TestRequest::get()
            .uri("/api/check-share-access?shareId=unknown")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["hasAccess"], Value::Bool(false));
    }

    #[actix_web::test]
    async fn share_access_requires_share_id() {
        let state = test_state().await;
        let app = test_app!(state);

        let req = test::TestRequest::get()
            .uri("/api/check-share-access")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn user_session_for_anonymous_and_logged_in() {
        let state = test_state().await;
        let user = seed_user(&state, "agent@example.com").await;
        let app = test_app!(state);

        let req = test::TestRequest::get().uri("/api/user-session").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, serde_json::json!({ "authenticated": false }));

        let cookie = login!(app, "agent@example.com");
        let req = test::TestRequest::get()
            .uri("/api/user-session")
            .cookie(cookie)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["authenticated"], Value::Bool(true));
        assert_eq!(body["user"]["id"], Value::from(user.id));
        assert_eq!(body["subscription"]["active"], Value::Bool(true));
        assert_eq!(body["subscription"]["onTrial"], Value::Bool(true));
        assert!(body["subscription"]["expiresAt"].is_string());
    }
}
