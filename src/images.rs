//! Auxiliary image categories stored as three fixed columns each.

use url::Url;

use crate::errors::AppError;

pub const SLOTS_PER_CATEGORY: usize = 3;

pub type Slots = [Option<String>; SLOTS_PER_CATEGORY];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCategory {
    FloorPlan,
    WindowView,
    Interior,
}

impl ImageCategory {
    pub const ALL: [ImageCategory; 3] = [
        ImageCategory::FloorPlan,
        ImageCategory::WindowView,
        ImageCategory::Interior,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ImageCategory::FloorPlan => "floor_plan",
            ImageCategory::WindowView => "window_view",
            ImageCategory::Interior => "interior",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImageCategory::FloorPlan => "Планировка",
            ImageCategory::WindowView => "Вид из окна",
            ImageCategory::Interior => "Интерьер",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageSlots {
    pub floor_plan: Slots,
    pub window_view: Slots,
    pub interior: Slots,
}

impl ImageSlots {
    pub fn slots(&self, category: ImageCategory) -> &Slots {
        match category {
            ImageCategory::FloorPlan => &self.floor_plan,
            ImageCategory::WindowView => &self.window_view,
            ImageCategory::Interior => &self.interior,
        }
    }

    pub fn set(&mut self, category: ImageCategory, slots: Slots) {
        match category {
            ImageCategory::FloorPlan => self.floor_plan = slots,
            ImageCategory::WindowView => self.window_view = slots,
            ImageCategory::Interior => self.interior = slots,
        }
    }

    pub fn urls(&self, category: ImageCategory) -> Vec<String> {
        unpack_slots(self.slots(category))
    }

    /// Newline separated URLs of one category, as the edit form shows them.
    pub fn form_text(&self, category: ImageCategory) -> String {
        self.urls(category).join("\n")
    }
}

/// Places non-blank URLs into the fixed slots in order.
pub fn pack_slots(category: ImageCategory, urls: &[String]) -> Result<Slots, AppError> {
    let urls: Vec<&str> = urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .collect();
    if urls.len() > SLOTS_PER_CATEGORY {
        return Err(AppError::validation(format!(
            "{}: не более {} изображений",
            category.label(),
            SLOTS_PER_CATEGORY
        )));
    }

    let mut slots: Slots = Default::default();
    for (slot, url) in slots.iter_mut().zip(urls) {
        *slot = Some(url.to_owned());
    }
    Ok(slots)
}

pub fn unpack_slots(slots: &Slots) -> Vec<String> {
    slots
        .iter()
        .filter_map(|s| s.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Splits a textarea value into URLs, one per line.
pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Absolute http(s) URL with a host, safe to put into `<img src>`.
pub fn is_http_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}
