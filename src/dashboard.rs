//! Agent dashboard: collections, their listings and visitor comments.

use std::collections::HashMap;

use actix_identity::Identity;
use actix_web::{
    get,
    http::StatusCode,
    post,
    web::{self, Data},
    HttpResponse, Responder, ResponseError,
};
use serde::Serialize;

use crate::{
    db,
    errors::AppError,
    forms::{CollectionForm, Parking, PropertyForm, PropertyKind, PropertyStatus, Renovation},
    routes::{agent_context, current_user},
    structs::{Collection, PropertyComment, PropertyView, User},
    utils::{redirect, render, render_status},
    AppState,
};

fn insert_choices(context: &mut tera::Context) {
    context.insert("type_options", &PropertyKind::options());
    context.insert("status_options", &PropertyStatus::options());
    context.insert("renovation_options", &Renovation::options());
    context.insert("parking_options", &Parking::options());
}

fn collection_url(id: i64) -> String {
    format!("/dashboard/collections/{}", id)
}

/// A listing as the agent sees it, with every visitor comment.
#[derive(Serialize)]
struct ManagedProperty {
    #[serde(flatten)]
    view: PropertyView,
    comments: Vec<PropertyComment>,
}

/// What a re-rendered collection page should keep from a rejected submission.
#[derive(Default)]
struct CollectionPage {
    error: Option<String>,
    collection_form: Option<CollectionForm>,
    property_form: Option<PropertyForm>,
}

async fn render_collection_page(
    state: &AppState,
    user: &User,
    collection: &Collection,
    page: CollectionPage,
    status: StatusCode,
) -> Result<HttpResponse, AppError> {
    let mut comments: HashMap<i64, Vec<PropertyComment>> = HashMap::new();
    for comment in db::list_collection_comments(state, collection.id).await? {
        comments.entry(comment.property_id).or_default().push(comment);
    }
    let pending = comments
        .values()
        .flatten()
        .filter(|c| !c.is_approved)
        .count();

    let properties: Vec<ManagedProperty> = db::list_properties(state, collection.id)
        .await?
        .into_iter()
        .map(|(property, images)| ManagedProperty {
            comments: comments.remove(&property.id).unwrap_or_default(),
            view: PropertyView::new(property, images),
        })
        .collect();

    let base = &state.settings.public_base_url;
    let mut context = agent_context(&collection.name, user, state);
    context.insert("collection", collection);
    context.insert("properties", &properties);
    context.insert("pending_comments", &pending);
    context.insert(
        "share_url_v1",
        &format!("{}/share/{}", base, collection.share_id),
    );
    context.insert(
        "share_url_v2",
        &format!("{}/share/v2/{}", base, collection.share_id),
    );
    context.insert("error", &page.error);
    context.insert(
        "collection_form",
        &page.collection_form.unwrap_or_else(|| CollectionForm {
            name: collection.name.clone(),
            description: collection.description.clone().unwrap_or_default(),
        }),
    );
    context.insert("form", &page.property_form.unwrap_or_default());
    insert_choices(&mut context);

    render_status(status, "collection.html", &context)
}

#[get("/dashboard")]
pub async fn dashboard_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let collections = db::list_collections(&state, user.id).await?;

    let mut context = agent_context("Мои подборки", &user, &state);
    context.insert("collections", &collections);
    context.insert("form", &CollectionForm::default());
    render("dashboard.html", &context)
}

#[post("/dashboard/collections")]
pub async fn create_collection_handler(
    web::Form(form): web::Form<CollectionForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&state, identity).await?;

    let saved = match form.validate() {
        Ok((name, description)) => db::create_collection(&state, user.id, name, description).await,
        Err(e) => Err(e),
    };
    match saved {
        Ok(collection) => Ok(redirect(&collection_url(collection.id))),
        Err(e) => {
            let Some(message) = e.form_alert() else {
                return Err(e);
            };
            let collections = db::list_collections(&state, user.id).await?;
            let mut context = agent_context("Мои подборки", &user, &state);
            context.insert("collections", &collections);
            context.insert("form", &form);
            context.insert("error", &message);
            render_status(e.status_code(), "dashboard.html", &context)
        }
    }
}

#[get("/dashboard/collections/{id}")]
pub async fn collection_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let collection = db::get_owned_collection(&state, path.into_inner(), user.id).await?;
    render_collection_page(
        &state,
        &user,
        &collection,
        CollectionPage::default(),
        StatusCode::OK,
    )
    .await
}

#[post("/dashboard/collections/{id}")]
pub async fn update_collection_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<CollectionForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&state, identity).await?;
    let collection = db::get_owned_collection(&state, path.into_inner(), user.id).await?;

    let saved = match form.validate() {
        Ok((name, description)) => {
            db::update_collection(&state, collection.id, name, description).await
        }
        Err(e) => Err(e),
    };
    match saved {
        Ok(_) => Ok(redirect(&collection_url(collection.id))),
        Err(e) => {
            let Some(message) = e.form_alert() else {
                return Err(e);
            };
            let page = CollectionPage {
                error: Some(message),
                collection_form: Some(form),
                property_form: None,
            };
            render_collection_page(&state, &user, &collection, page, e.status_code()).await
        }
    }
}

#[post("/dashboard/collections/{id}/delete")]
pub async fn delete_collection_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&state, identity).await?;
    let collection = db::get_owned_collection(&state, path.into_inner(), user.id).await?;
    db::delete_collection(&state, collection.id).await?;
    Ok(redirect("/dashboard"))
}

#[post("/dashboard/collections/{id}/properties")]
pub async fn add_property_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<PropertyForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&state, identity).await?;
    let collection = db::get_owned_collection(&state, path.into_inner(), user.id).await?;

    let saved = match form.validate() {
        Ok(input) => db::add_property(&state, collection.id, &input).await,
        Err(e) => Err(e),
    };
    match saved {
        Ok(property) => Ok(redirect(&format!(
            "{}#property-{}",
            collection_url(collection.id),
            property.id
        ))),
        Err(e) => {
            let Some(message) = e.form_alert() else {
                return Err(e);
            };
            let page = CollectionPage {
                error: Some(message),
                collection_form: None,
                property_form: Some(form),
            };
            render_collection_page(&state, &user, &collection, page, e.status_code()).await
        }
    }
}

#[get("/dashboard/properties/{id}/edit")]
pub async fn edit_property_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let (property, images, collection) =
        db::get_owned_property(&state, path.into_inner(), user.id).await?;

    let mut context = agent_context("Редактирование объекта", &user, &state);
    context.insert("collection", &collection);
    context.insert("property_id", &property.id);
    context.insert("form", &PropertyForm::from_existing(&property, &images));
    insert_choices(&mut context);
    render("property_edit.html", &context)
}

#[post("/dashboard/properties/{id}")]
pub async fn update_property_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<PropertyForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&state, identity).await?;
    let (property, _, collection) =
        db::get_owned_property(&state, path.into_inner(), user.id).await?;

    let saved = match form.validate() {
        Ok(input) => db::update_property(&state, property.id, &input).await,
        Err(e) => Err(e),
    };
    match saved {
        Ok(_) => Ok(redirect(&format!(
            "{}#property-{}",
            collection_url(collection.id),
            property.id
        ))),
        Err(e) => {
            let Some(message) = e.form_alert() else {
                return Err(e);
            };
            let mut context = agent_context("Редактирование объекта", &user, &state);
            context.insert("collection", &collection);
            context.insert("property_id", &property.id);
            context.insert("form", &form);
            context.insert("error", &message);
            insert_choices(&mut context);
            render_status(e.status_code(), "property_edit.html", &context)
        }
    }
}

#[post("/dashboard/properties/{id}/delete")]
pub async fn delete_property_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&state, identity).await?;
    let (property, _, collection) =
        db::get_owned_property(&state, path.into_inner(), user.id).await?;
    db::delete_property(&state, property.id).await?;
    Ok(redirect(&collection_url(collection.id)))
}

async fn owned_comment(
    state: &AppState,
    comment_id: i64,
    user_id: i64,
) -> Result<PropertyComment, AppError> {
    let comment = db::get_comment(state, comment_id).await?;
    db::get_owned_collection(state, comment.collection_id, user_id).await?;
    Ok(comment)
}

#[post("/dashboard/comments/{id}/approve")]
pub async fn approve_comment_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&state, identity).await?;
    let comment = owned_comment(&state, path.into_inner(), user.id).await?;
    db::set_comment_approved(&state, comment.id, true).await?;
    Ok(redirect(&format!(
        "{}#property-{}",
        collection_url(comment.collection_id),
        comment.property_id
    )))
}

#[post("/dashboard/comments/{id}/delete")]
pub async fn delete_comment_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&state, identity).await?;
    let comment = owned_comment(&state, path.into_inner(), user.id).await?;
    db::delete_comment(&state, comment.id).await?;
    Ok(redirect(&format!(
        "{}#property-{}",
        collection_url(comment.collection_id),
        comment.property_id
    )))
}
