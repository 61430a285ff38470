use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::images::{ImageCategory, ImageSlots};

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing)]
    pub pwd_hash: String,
    pub trial_ends_at: String,
    pub subscription_ends_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Collection {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub share_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Collection row plus the number of listings in it, for the dashboard.
#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct CollectionSummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub share_id: String,
    pub created_at: String,
    pub property_count: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Property {
    pub id: i64,
    pub collection_id: i64,
    /// Slug used by the public pages instead of the row id.
    pub public_id: String,
    pub property_type: String,
    pub address: String,
    pub rooms: i64,
    pub area: f64,
    pub price: i64,
    pub description: Option<String>,
    pub agent_comment: Option<String>,
    pub floor_plan_url_1: Option<String>,
    pub floor_plan_url_2: Option<String>,
    pub floor_plan_url_3: Option<String>,
    pub window_view_url_1: Option<String>,
    pub window_view_url_2: Option<String>,
    pub window_view_url_3: Option<String>,
    pub interior_url_1: Option<String>,
    pub interior_url_2: Option<String>,
    pub interior_url_3: Option<String>,
    pub floor: Option<i64>,
    pub total_floors: Option<i64>,
    pub year_built: Option<i64>,
    pub renovation: Option<String>,
    pub bathrooms: Option<i64>,
    pub balcony: Option<bool>,
    pub parking: Option<String>,
    pub status: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Property {
    pub fn image_slots(&self) -> ImageSlots {
        ImageSlots {
            floor_plan: [
                self.floor_plan_url_1.clone(),
                self.floor_plan_url_2.clone(),
                self.floor_plan_url_3.clone(),
            ],
            window_view: [
                self.window_view_url_1.clone(),
                self.window_view_url_2.clone(),
                self.window_view_url_3.clone(),
            ],
            interior: [
                self.interior_url_1.clone(),
                self.interior_url_2.clone(),
                self.interior_url_3.clone(),
            ],
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct PropertyImage {
    pub id: i64,
    pub property_id: i64,
    pub image_url: String,
    pub position: i64,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct PropertyComment {
    pub id: i64,
    pub property_id: i64,
    pub collection_id: i64,
    pub author_name: String,
    pub author_email: Option<String>,
    pub content: String,
    pub position: i64,
    pub is_approved: bool,
    pub created_at: String,
}

/// A property with everything the templates render for it.
#[derive(Serialize, Debug, Clone)]
pub struct PropertyView {
    pub property: Property,
    pub type_label: &'static str,
    pub status_label: Option<&'static str>,
    pub renovation_label: Option<&'static str>,
    pub parking_label: Option<&'static str>,
    pub images: Vec<String>,
    pub cover_url: Option<String>,
    pub galleries: Vec<Gallery>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Gallery {
    pub key: &'static str,
    pub label: &'static str,
    pub urls: Vec<String>,
}

impl PropertyView {
    pub fn new(property: Property, images: Vec<PropertyImage>) -> Self {
        use crate::forms::{Parking, PropertyKind, PropertyStatus, Renovation};

        let images: Vec<String> = images.into_iter().map(|i| i.image_url).collect();
        let slots = property.image_slots();
        let galleries = ImageCategory::ALL
            .iter()
            .map(|category| Gallery {
                key: category.key(),
                label: category.label(),
                urls: slots.urls(*category),
            })
            .filter(|g| !g.urls.is_empty())
            .collect::<Vec<_>>();
        let cover_url = images
            .first()
            .cloned()
            .or_else(|| galleries.iter().find_map(|g| g.urls.first().cloned()));

        Self {
            type_label: property
                .property_type
                .parse::<PropertyKind>()
                .map(|k| k.label())
                .unwrap_or("Объект"),
            status_label: property
                .status
                .as_deref()
                .and_then(|s| s.parse::<PropertyStatus>().ok())
                .map(|s| s.label()),
            renovation_label: property
                .renovation
                .as_deref()
                .and_then(|s| s.parse::<Renovation>().ok())
                .map(|r| r.label()),
            parking_label: property
                .parking
                .as_deref()
                .and_then(|s| s.parse::<Parking>().ok())
                .map(|p| p.label()),
            property,
            images,
            cover_url,
            galleries,
        }
    }
}
