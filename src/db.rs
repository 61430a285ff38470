use std::collections::HashMap;

use sqlx::{
    query::QueryAs,
    sqlite::{Sqlite, SqliteArguments},
};

use crate::{
    errors::AppError,
    forms::{CommentInput, ProfileInput, PropertyInput},
    structs::{Collection, CollectionSummary, Property, PropertyComment, PropertyImage, User},
    subscription, utils, AppState,
};

/// Attempts at finding an unused public slug before giving up.
const SLUG_ATTEMPTS: usize = 5;

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
}

pub async fn get_user_by_id(state: &AppState, id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn find_user_by_email(state: &AppState, email: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email.trim().to_lowercase())
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(user)
}

pub async fn create_user(state: &AppState, new_user: NewUser) -> Result<User, AppError> {
    let now = chrono::Utc::now();
    let created_at = now.to_rfc3339();
    let trial_ends_at = subscription::trial_end(now, state.settings.trial_days)?.to_rfc3339();
    let pwd_hash = utils::hash_password(&new_user.password)?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (name, email, phone, pwd_hash, trial_ends_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(new_user.name)
    .bind(new_user.email.trim().to_lowercase())
    .bind(new_user.phone)
    .bind(pwd_hash)
    .bind(trial_ends_at)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(&state.db_pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            log::info!("Registration with an email that is already taken");
            AppError::validation("Пользователь с таким email уже зарегистрирован")
        }
        other => AppError::DatabaseError(other),
    })?;
    log::info!("User created: id={} trial_ends_at={}", user.id, user.trial_ends_at);
    Ok(user)
}

pub async fn update_profile(
    state: &AppState,
    id: i64,
    profile: ProfileInput,
) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET name = $1, phone = $2, description = $3, avatar_url = $4, updated_at = $5
         WHERE id = $6 RETURNING *",
    )
    .bind(profile.name)
    .bind(profile.phone)
    .bind(profile.description)
    .bind(profile.avatar_url)
    .bind(utils::now_rfc3339())
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or(AppError::NotFound)?;
    log::info!("Profile updated for user {}", id);
    Ok(user)
}

pub async fn update_password(state: &AppState, id: i64, password: &str) -> Result<(), AppError> {
    let pwd_hash = utils::hash_password(password)?;
    sqlx::query("UPDATE users SET pwd_hash = $1, updated_at = $2 WHERE id = $3")
        .bind(pwd_hash)
        .bind(utils::now_rfc3339())
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    log::info!("Password changed for user {}", id);
    Ok(())
}

pub async fn create_collection(
    state: &AppState,
    user_id: i64,
    name: String,
    description: Option<String>,
) -> Result<Collection, AppError> {
    let created_at = utils::now_rfc3339();

    for _ in 0..SLUG_ATTEMPTS {
        let share_id = utils::generate_share_id();
        let res = sqlx::query_as::<_, Collection>(
            "INSERT INTO collections (user_id, name, description, share_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(user_id)
        .bind(&name)
        .bind(&description)
        .bind(&share_id)
        .bind(&created_at)
        .bind(&created_at)
        .fetch_one(&state.db_pool)
        .await;

        match res {
            Ok(collection) => {
                log::info!(
                    "Collection {} created for user {} (share_id {})",
                    collection.id,
                    user_id,
                    collection.share_id
                );
                return Ok(collection);
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                log::warn!("Share id collision on {}, retrying", share_id);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::InternalServerError(
        "could not allocate a unique share id".into(),
    ))
}

pub async fn list_collections(
    state: &AppState,
    user_id: i64,
) -> Result<Vec<CollectionSummary>, AppError> {
    let collections = sqlx::query_as::<_, CollectionSummary>(
        "SELECT c.id, c.name, c.description, c.share_id, c.created_at, COUNT(p.id) AS property_count
         FROM collections c
         LEFT JOIN properties p ON p.collection_id = c.id
         WHERE c.user_id = $1
         GROUP BY c.id
         ORDER BY c.created_at DESC, c.id DESC",
    )
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(collections)
}

pub async fn get_collection(state: &AppState, id: i64) -> Result<Collection, AppError> {
    sqlx::query_as::<_, Collection>("SELECT * FROM collections WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or(AppError::NotFound)
}

/// Loads a collection and checks that `user_id` owns it.
pub async fn get_owned_collection(
    state: &AppState,
    id: i64,
    user_id: i64,
) -> Result<Collection, AppError> {
    let collection = get_collection(state, id).await?;
    if collection.user_id != user_id {
        log::warn!(
            "User {} tried to access collection {} owned by {}",
            user_id,
            id,
            collection.user_id
        );
        return Err(AppError::Forbidden);
    }
    Ok(collection)
}

pub async fn get_collection_by_share_id(
    state: &AppState,
    share_id: &str,
) -> Result<Option<Collection>, AppError> {
    let collection = sqlx::query_as::<_, Collection>("SELECT * FROM collections WHERE share_id = $1")
        .bind(share_id)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(collection)
}

pub async fn update_collection(
    state: &AppState,
    id: i64,
    name: String,
    description: Option<String>,
) -> Result<Collection, AppError> {
    let collection = sqlx::query_as::<_, Collection>(
        "UPDATE collections SET name = $1, description = $2, updated_at = $3 WHERE id = $4 RETURNING *",
    )
    .bind(name)
    .bind(description)
    .bind(utils::now_rfc3339())
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or(AppError::NotFound)?;
    log::info!("Collection {} updated", id);
    Ok(collection)
}

pub async fn delete_collection(state: &AppState, id: i64) -> Result<(), AppError> {
    sqlx::query("DELETE FROM collections WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    log::info!("Collection with id {} deleted", id);
    Ok(())
}

/// Columns written from a `PropertyInput`, in bind order.
const PROPERTY_FIELDS: [&str; 26] = [
    "property_type",
    "address",
    "rooms",
    "area",
    "price",
    "description",
    "agent_comment",
    "floor_plan_url_1",
    "floor_plan_url_2",
    "floor_plan_url_3",
    "window_view_url_1",
    "window_view_url_2",
    "window_view_url_3",
    "interior_url_1",
    "interior_url_2",
    "interior_url_3",
    "floor",
    "total_floors",
    "year_built",
    "renovation",
    "bathrooms",
    "balcony",
    "parking",
    "status",
    "updated_at",
    "created_at",
];

fn bind_property<'q>(
    query: QueryAs<'q, Sqlite, Property, SqliteArguments<'q>>,
    input: &PropertyInput,
    updated_at: &str,
) -> QueryAs<'q, Sqlite, Property, SqliteArguments<'q>> {
    let mut q = query
        .bind(input.kind.as_str())
        .bind(input.address.clone())
        .bind(input.rooms)
        .bind(input.area)
        .bind(input.price)
        .bind(input.description.clone())
        .bind(input.agent_comment.clone());
    for slots in [
        &input.slots.floor_plan,
        &input.slots.window_view,
        &input.slots.interior,
    ] {
        for slot in slots {
            q = q.bind(slot.clone());
        }
    }
    q.bind(input.floor)
        .bind(input.total_floors)
        .bind(input.year_built)
        .bind(input.renovation.map(|r| r.as_str()))
        .bind(input.bathrooms)
        .bind(input.balcony)
        .bind(input.parking.map(|p| p.as_str()))
        .bind(input.status.map(|s| s.as_str()))
        .bind(updated_at.to_owned())
}

/// Inserts gallery images in order. Failures are logged and skipped so the
/// already stored property survives.
async fn insert_images(state: &AppState, property_id: i64, urls: &[String]) {
    let created_at = utils::now_rfc3339();
    for (position, url) in urls.iter().enumerate() {
        let res = sqlx::query(
            "INSERT INTO property_images (property_id, image_url, position, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(property_id)
        .bind(url)
        .bind(position as i64)
        .bind(&created_at)
        .execute(&state.db_pool)
        .await;
        if let Err(e) = res {
            log::error!(
                "Failed to insert image {} for property {}: {}",
                url,
                property_id,
                e
            );
        }
    }
}

fn numbered_placeholders(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|n| format!("${}", n)).collect()
}

pub async fn add_property(
    state: &AppState,
    collection_id: i64,
    input: &PropertyInput,
) -> Result<Property, AppError> {
    let columns = PROPERTY_FIELDS.join(", ");
    let placeholders = numbered_placeholders(1..=PROPERTY_FIELDS.len() + 2).join(", ");
    let sql = format!(
        "INSERT INTO properties ({}, collection_id, public_id) VALUES ({}) RETURNING *",
        columns, placeholders
    );

    let now = utils::now_rfc3339();
    for _ in 0..SLUG_ATTEMPTS {
        let public_id = utils::generate_share_id();
        let res = bind_property(sqlx::query_as::<_, Property>(&sql), input, &now)
            .bind(now.clone())
            .bind(collection_id)
            .bind(&public_id)
            .fetch_one(&state.db_pool)
            .await;

        match res {
            Ok(property) => {
                insert_images(state, property.id, &input.images).await;
                log::info!(
                    "Property {} added to collection {} with {} images",
                    property.id,
                    collection_id,
                    input.images.len()
                );
                return Ok(property);
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                log::warn!("Property public id collision on {}, retrying", public_id);
            }
            Err(e) => {
                log::error!("Failed to insert property into collection {}: {}", collection_id, e);
                return Err(e.into());
            }
        }
    }

    Err(AppError::InternalServerError(
        "could not allocate a unique property public id".into(),
    ))
}

pub async fn update_property(
    state: &AppState,
    id: i64,
    input: &PropertyInput,
) -> Result<Property, AppError> {
    // created_at is the last field and is never rewritten.
    let updated = &PROPERTY_FIELDS[..PROPERTY_FIELDS.len() - 1];
    let assignments = updated
        .iter()
        .zip(numbered_placeholders(1..=updated.len()))
        .map(|(column, placeholder)| format!("{} = {}", column, placeholder))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE properties SET {} WHERE id = ${} RETURNING *",
        assignments,
        updated.len() + 1
    );

    let property = bind_property(sqlx::query_as::<_, Property>(&sql), input, &utils::now_rfc3339())
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await
        .map_err(|e| {
            log::error!("Failed to update property {}: {}", id, e);
            AppError::DatabaseError(e)
        })?
        .ok_or(AppError::NotFound)?;

    if let Err(e) = sqlx::query("DELETE FROM property_images WHERE property_id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await
    {
        log::error!("Failed to clear images of property {}: {}", id, e);
        return Ok(property);
    }
    insert_images(state, id, &input.images).await;

    log::info!("Property {} updated", id);
    Ok(property)
}

pub async fn delete_property(state: &AppState, id: i64) -> Result<(), AppError> {
    let mut tx = state.db_pool.begin().await?;
    sqlx::query("DELETE FROM property_images WHERE property_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM property_comments WHERE property_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let res = sqlx::query("DELETE FROM properties WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    tx.commit().await?;
    log::info!("Property with id {} deleted", id);
    Ok(())
}

async fn property_images(state: &AppState, property_id: i64) -> Result<Vec<PropertyImage>, AppError> {
    let images = sqlx::query_as::<_, PropertyImage>(
        "SELECT * FROM property_images WHERE property_id = $1 ORDER BY position, id",
    )
    .bind(property_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(images)
}

pub async fn get_property_by_id(
    state: &AppState,
    id: i64,
) -> Result<(Property, Vec<PropertyImage>), AppError> {
    let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or(AppError::NotFound)?;
    let images = property_images(state, property.id).await?;
    Ok((property, images))
}

/// Lookup for the public pages, which never expose row ids.
pub async fn get_property_by_public_id(
    state: &AppState,
    public_id: &str,
) -> Result<(Property, Vec<PropertyImage>), AppError> {
    let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE public_id = $1")
        .bind(public_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or(AppError::NotFound)?;
    let images = property_images(state, property.id).await?;
    Ok((property, images))
}

/// Loads a property together with its collection, checking that `user_id`
/// owns the collection.
pub async fn get_owned_property(
    state: &AppState,
    id: i64,
    user_id: i64,
) -> Result<(Property, Vec<PropertyImage>, Collection), AppError> {
    let (property, images) = get_property_by_id(state, id).await?;
    let collection = get_owned_collection(state, property.collection_id, user_id).await?;
    Ok((property, images, collection))
}

/// Properties of a collection with their gallery images, oldest first.
pub async fn list_properties(
    state: &AppState,
    collection_id: i64,
) -> Result<Vec<(Property, Vec<PropertyImage>)>, AppError> {
    let properties = sqlx::query_as::<_, Property>(
        "SELECT * FROM properties WHERE collection_id = $1 ORDER BY created_at, id",
    )
    .bind(collection_id)
    .fetch_all(&state.db_pool)
    .await?;

    let images = sqlx::query_as::<_, PropertyImage>(
        "SELECT i.* FROM property_images i
         JOIN properties p ON p.id = i.property_id
         WHERE p.collection_id = $1
         ORDER BY i.position, i.id",
    )
    .bind(collection_id)
    .fetch_all(&state.db_pool)
    .await?;

    let mut by_property: HashMap<i64, Vec<PropertyImage>> = HashMap::new();
    for image in images {
        by_property.entry(image.property_id).or_default().push(image);
    }

    Ok(properties
        .into_iter()
        .map(|p| {
            let images = by_property.remove(&p.id).unwrap_or_default();
            (p, images)
        })
        .collect())
}

pub async fn add_comment(
    state: &AppState,
    property: &Property,
    comment: CommentInput,
) -> Result<PropertyComment, AppError> {
    // Next position within the property, taken in the same statement.
    let comment = sqlx::query_as::<_, PropertyComment>(
        "INSERT INTO property_comments
            (property_id, collection_id, author_name, author_email, content, position, is_approved, created_at)
         SELECT $1, $2, $3, $4, $5, COALESCE(MAX(position), 0) + 1, 0, $6
         FROM property_comments WHERE property_id = $1
         RETURNING *",
    )
    .bind(property.id)
    .bind(property.collection_id)
    .bind(comment.author_name)
    .bind(comment.author_email)
    .bind(comment.content)
    .bind(utils::now_rfc3339())
    .fetch_one(&state.db_pool)
    .await?;
    log::info!(
        "Comment {} left on property {} awaiting approval",
        comment.id,
        comment.property_id
    );
    Ok(comment)
}

pub async fn list_comments(
    state: &AppState,
    property_id: i64,
    approved_only: bool,
) -> Result<Vec<PropertyComment>, AppError> {
    let comments = sqlx::query_as::<_, PropertyComment>(
        "SELECT * FROM property_comments
         WHERE property_id = $1 AND (is_approved = 1 OR $2 = 0)
         ORDER BY position, id",
    )
    .bind(property_id)
    .bind(approved_only)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(comments)
}

pub async fn list_collection_comments(
    state: &AppState,
    collection_id: i64,
) -> Result<Vec<PropertyComment>, AppError> {
    let comments = sqlx::query_as::<_, PropertyComment>(
        "SELECT * FROM property_comments WHERE collection_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(collection_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(comments)
}

pub async fn get_comment(state: &AppState, id: i64) -> Result<PropertyComment, AppError> {
    sqlx::query_as::<_, PropertyComment>("SELECT * FROM property_comments WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn set_comment_approved(
    state: &AppState,
    id: i64,
    approved: bool,
) -> Result<(), AppError> {
    sqlx::query("UPDATE property_comments SET is_approved = $1 WHERE id = $2")
        .bind(approved)
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    log::info!("Comment {} approval set to {}", id, approved);
    Ok(())
}

pub async fn delete_comment(state: &AppState, id: i64) -> Result<(), AppError> {
    sqlx::query("DELETE FROM property_comments WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    log::info!("Comment with id {} deleted", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{property_input, seed_user, test_state, TEST_PASSWORD};

    #[actix_web::test]
    async fn property_survives_failed_image_inserts() {
        let state = test_state().await;
        let user = seed_user(&state, "agent@example.com").await;
        let collection = create_collection(&state, user.id, "Подборка".into(), None)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_images BEFORE INSERT ON property_images
             BEGIN SELECT RAISE(ABORT, 'images offline'); END",
        )
        .execute(&state.db_pool)
        .await
        .unwrap();

        let input = property_input();
        assert!(!input.images.is_empty());
        let property = add_property(&state, collection.id, &input).await.unwrap();

        let (stored, images) = get_property_by_id(&state, property.id).await.unwrap();
        assert_eq!(stored.address, input.address);
        assert!(images.is_empty());

        let updated = update_property(&state, property.id, &input).await.unwrap();
        assert_eq!(updated.id, property.id);
    }

    #[actix_web::test]
    async fn duplicate_email_is_a_validation_error() {
        let state = test_state().await;
        seed_user(&state, "agent@example.com").await;

        let err = create_user(
            &state,
            NewUser {
                name: "Двойник".into(),
                email: "Agent@Example.com".into(),
                phone: None,
                password: TEST_PASSWORD.into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(&err, AppError::Validation(msg) if msg.contains("уже зарегистрирован")));
    }

    #[actix_web::test]
    async fn comment_positions_count_per_property() {
        let state = test_state().await;
        let user = seed_user(&state, "agent@example.com").await;
        let collection = create_collection(&state, user.id, "Подборка".into(), None)
            .await
            .unwrap();
        let first = add_property(&state, collection.id, &property_input())
            .await
            .unwrap();
        let second = add_property(&state, collection.id, &property_input())
            .await
            .unwrap();
        assert_ne!(first.public_id, second.public_id);

        let comment = |text: &str| CommentInput {
            author_name: "Гость".into(),
            author_email: None,
            content: text.into(),
        };
        let a = add_comment(&state, &first, comment("раз")).await.unwrap();
        let b = add_comment(&state, &first, comment("два")).await.unwrap();
        let c = add_comment(&state, &second, comment("три")).await.unwrap();
        assert_eq!((a.position, b.position, c.position), (1, 2, 1));
        assert!(!a.is_approved);
    }
}
