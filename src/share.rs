//! Public share pages in the two visual themes.

use actix_web::{
    get,
    http::StatusCode,
    post,
    web::{self, Data},
    HttpResponse, Responder, ResponseError,
};
use chrono::Utc;
use serde::Deserialize;
use tera::Context;

use crate::{
    db,
    errors::AppError,
    forms::CommentForm,
    routes::page_context,
    structs::{Collection, PropertyView, User},
    subscription,
    utils::{redirect, render, render_status},
    AppState,
};

pub const EXPIRED_PATH: &str = "/share/expired";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    V1,
    V2,
}

impl Theme {
    pub fn from_form(raw: &str) -> Self {
        match raw {
            "v2" => Theme::V2,
            _ => Theme::V1,
        }
    }

    fn key(&self) -> &'static str {
        match self {
            Theme::V1 => "v1",
            Theme::V2 => "v2",
        }
    }

    fn template(&self, page: &str) -> String {
        format!("share/{}/{}.html", self.key(), page)
    }

    fn collection_path(&self, share_id: &str) -> String {
        match self {
            Theme::V1 => format!("/share/{}", share_id),
            Theme::V2 => format!("/share/v2/{}", share_id),
        }
    }

    fn property_prefix(&self) -> &'static str {
        match self {
            Theme::V1 => "/share/property/",
            Theme::V2 => "/share/v2/property/",
        }
    }

    fn property_path(&self, public_id: &str) -> String {
        format!("{}{}", self.property_prefix(), public_id)
    }
}

/// Owner of a shared collection, if their access is still active.
async fn active_owner(state: &AppState, collection: &Collection) -> Result<Option<User>, AppError> {
    let owner = db::get_user_by_id(state, collection.user_id).await?;
    if subscription::subscription_status(&owner, Utc::now()).active {
        Ok(Some(owner))
    } else {
        log::info!(
            "Share {} blocked: access of user {} has lapsed",
            collection.share_id,
            owner.id
        );
        Ok(None)
    }
}

fn share_context(
    state: &AppState,
    theme: Theme,
    title: &str,
    collection: &Collection,
    agent: &User,
) -> Context {
    let mut context = page_context(title, None);
    context.insert("theme", theme.key());
    context.insert("collection", collection);
    context.insert("agent", agent);
    context.insert("share_id", &collection.share_id);
    context.insert("collection_path", &theme.collection_path(&collection.share_id));
    context.insert("poll_secs", &state.settings.access_poll_secs);
    context.insert("expired_path", EXPIRED_PATH);
    context
}

async fn collection_page(
    state: &AppState,
    share_id: &str,
    theme: Theme,
) -> Result<HttpResponse, AppError> {
    let collection = db::get_collection_by_share_id(state, share_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let Some(agent) = active_owner(state, &collection).await? else {
        return Ok(redirect(EXPIRED_PATH));
    };

    let properties: Vec<PropertyView> = db::list_properties(state, collection.id)
        .await?
        .into_iter()
        .map(|(property, images)| PropertyView::new(property, images))
        .collect();

    let mut context = share_context(state, theme, &collection.name, &collection, &agent);
    context.insert("properties", &properties);
    context.insert("property_prefix", theme.property_prefix());
    render(&theme.template("collection"), &context)
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct PropertyPageQuery {
    comment: Option<String>,
}

/// Re-render state after a rejected comment.
struct CommentAttempt {
    form: CommentForm,
    error: String,
    status: StatusCode,
}

async fn property_page(
    state: &AppState,
    public_id: &str,
    theme: Theme,
    comment_sent: bool,
    attempt: Option<CommentAttempt>,
) -> Result<HttpResponse, AppError> {
    let (property, images) = db::get_property_by_public_id(state, public_id).await?;
    let collection = db::get_collection(state, property.collection_id).await?;
    let Some(agent) = active_owner(state, &collection).await? else {
        return Ok(redirect(EXPIRED_PATH));
    };
    let comments = db::list_comments(state, property.id, true).await?;
    let view = PropertyView::new(property, images);

    let title = format!("{}, {}", view.type_label, view.property.address);
    let mut context = share_context(state, theme, &title, &collection, &agent);
    context.insert("item", &view);
    context.insert("comments", &comments);
    context.insert("comment_sent", &comment_sent);
    context.insert(
        "comment_action",
        &format!("/share/property/{}/comments", view.property.public_id),
    );

    let status = match attempt {
        Some(attempt) => {
            context.insert("comment_form", &attempt.form);
            context.insert("error", &attempt.error);
            attempt.status
        }
        None => {
            context.insert("comment_form", &CommentForm::default());
            StatusCode::OK
        }
    };
    render_status(status, &theme.template("property"), &context)
}

#[get("/share/expired")]
pub async fn expired_handler() -> Result<impl Responder, AppError> {
    render(
        "share/expired.html",
        &page_context("Подборка недоступна", None),
    )
}

#[get("/share/{share_id}")]
pub async fn collection_v1_handler(
    path: web::Path<String>,
    state: Data<AppState>,
) -> Result<HttpResponse, AppError> {
    collection_page(&state, &path.into_inner(), Theme::V1).await
}

#[get("/share/v2/{share_id}")]
pub async fn collection_v2_handler(
    path: web::Path<String>,
    state: Data<AppState>,
) -> Result<HttpResponse, AppError> {
    collection_page(&state, &path.into_inner(), Theme::V2).await
}

#[get("/share/property/{public_id}")]
pub async fn property_v1_handler(
    path: web::Path<String>,
    query: web::Query<PropertyPageQuery>,
    state: Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let sent = query.comment.as_deref() == Some("sent");
    property_page(&state, &path.into_inner(), Theme::V1, sent, None).await
}

#[get("/share/v2/property/{public_id}")]
pub async fn property_v2_handler(
    path: web::Path<String>,
    query: web::Query<PropertyPageQuery>,
    state: Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let sent = query.comment.as_deref() == Some("sent");
    property_page(&state, &path.into_inner(), Theme::V2, sent, None).await
}

#[post("/share/property/{public_id}/comments")]
pub async fn comment_form_handler(
    path: web::Path<String>,
    web::Form(form): web::Form<CommentForm>,
    state: Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let public_id = path.into_inner();
    let theme = Theme::from_form(&form.theme);

    let (property, _) = db::get_property_by_public_id(&state, &public_id).await?;
    let collection = db::get_collection(&state, property.collection_id).await?;
    if active_owner(&state, &collection).await?.is_none() {
        return Ok(redirect(EXPIRED_PATH));
    }

    let saved = match form.validate() {
        Ok(input) => db::add_comment(&state, &property, input).await,
        Err(e) => Err(e),
    };
    match saved {
        Ok(_) => Ok(redirect(&format!(
            "{}?comment=sent#comments",
            theme.property_path(&public_id)
        ))),
        Err(e) => {
            let Some(error) = e.form_alert() else {
                return Err(e);
            };
            let attempt = CommentAttempt {
                form,
                error,
                status: e.status_code(),
            };
            property_page(&state, &public_id, theme, false, Some(attempt)).await
        }
    }
}
