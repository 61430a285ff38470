//! Form payloads posted by the dashboard and public pages, and their validation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::errors::AppError;
use crate::images::{self, ImageCategory, ImageSlots};
use crate::structs::{Property, PropertyImage};

#[derive(Serialize, Debug, Clone)]
pub struct SelectOption {
    pub value: &'static str,
    pub label: &'static str,
}

macro_rules! choice_enum {
    ($name:ident, $err:literal, { $($variant:ident => ($value:literal, $label:literal)),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn options() -> Vec<SelectOption> {
                Self::ALL
                    .iter()
                    .map(|v| SelectOption { value: v.as_str(), label: v.label() })
                    .collect()
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($value => Ok($name::$variant),)+
                    _ => Err(AppError::validation($err)),
                }
            }
        }
    };
}

choice_enum!(PropertyKind, "Неизвестный тип объекта", {
    Apartment => ("apartment", "Квартира"),
    House => ("house", "Дом"),
    Townhouse => ("townhouse", "Таунхаус"),
    Commercial => ("commercial", "Коммерческая недвижимость"),
    Land => ("land", "Участок"),
});

choice_enum!(PropertyStatus, "Неизвестный статус объекта", {
    Available => ("available", "В продаже"),
    Reserved => ("reserved", "Забронирован"),
    Sold => ("sold", "Продан"),
});

choice_enum!(Renovation, "Неизвестный тип ремонта", {
    Rough => ("none", "Без ремонта"),
    Cosmetic => ("cosmetic", "Косметический"),
    Euro => ("euro", "Евроремонт"),
    Designer => ("designer", "Дизайнерский"),
});

choice_enum!(Parking, "Неизвестный тип парковки", {
    Absent => ("none", "Нет"),
    Street => ("street", "Наземная"),
    Underground => ("underground", "Подземная"),
    Garage => ("garage", "Гараж"),
});

/// Trimmed copy of a text input.
pub fn trimmed(raw: &str) -> String {
    raw.trim().to_owned()
}

/// Trimmed text input, with blank mapped to `None`.
pub fn non_blank(raw: &str) -> Option<String> {
    let value = raw.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn optional_int(raw: &str, field: &str) -> Result<Option<i64>, AppError> {
    let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() {
        return Ok(None);
    }
    digits
        .parse()
        .map(Some)
        .map_err(|_| AppError::validation(format!("{}: введите целое число", field)))
}

fn required_int(raw: &str, field: &str) -> Result<i64, AppError> {
    optional_int(raw, field)?
        .ok_or_else(|| AppError::validation(format!("{}: обязательное поле", field)))
}

fn required_decimal(raw: &str, field: &str) -> Result<f64, AppError> {
    let normalized: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if normalized.is_empty() {
        return Err(AppError::validation(format!("{}: обязательное поле", field)));
    }
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AppError::validation(format!("{}: введите число", field)))
}

fn optional_choice<T: FromStr<Err = AppError>>(raw: &str) -> Result<Option<T>, AppError> {
    if raw.trim().is_empty() {
        Ok(None)
    } else {
        raw.parse().map(Some)
    }
}

fn http_url(url: &str) -> Result<(), ValidationError> {
    if images::is_http_url(url) {
        Ok(())
    } else {
        Err(ValidationError::new("http_url")
            .with_message(format!("Некорректная ссылка на изображение: {}", url).into()))
    }
}

fn http_urls(urls: &[String]) -> Result<(), ValidationError> {
    urls.iter().try_for_each(|u| http_url(u))
}

fn has_letter_and_digit(password: &str) -> Result<(), ValidationError> {
    if password.chars().any(|c| c.is_ascii_digit()) && password.chars().any(char::is_alphabetic) {
        Ok(())
    } else {
        Err(ValidationError::new("password_strength").with_message(
            "Пароль должен содержать хотя бы одну букву и одну цифру".into(),
        ))
    }
}

/// Raw property form as posted. Every field arrives as text so a rejected
/// submission can be rendered back unchanged.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct PropertyForm {
    pub property_type: String,
    pub address: String,
    pub rooms: String,
    pub area: String,
    pub price: String,
    pub description: String,
    pub agent_comment: String,
    pub image_urls: String,
    pub floor_plan_urls: String,
    pub window_view_urls: String,
    pub interior_urls: String,
    pub floor: String,
    pub total_floors: String,
    pub year_built: String,
    pub renovation: String,
    pub bathrooms: String,
    pub balcony: String,
    pub parking: String,
    pub status: String,
}

/// Property form after parsing numbers and splitting URL lists, before the
/// field rules run.
#[derive(Debug, Validate)]
#[validate(schema(function = "floor_within_building"))]
struct PropertyDraft {
    #[validate(length(min = 1, max = 500, message = "Адрес: обязательное поле, не более 500 символов"))]
    address: String,
    #[validate(range(min = 0, message = "Комнаты: значение не может быть отрицательным"))]
    rooms: i64,
    #[validate(range(exclusive_min = 0.0, message = "Площадь должна быть больше нуля"))]
    area: f64,
    #[validate(range(min = 1, message = "Цена должна быть больше нуля"))]
    price: i64,
    #[validate(length(max = 5000, message = "Описание: не более 5000 символов"))]
    description: Option<String>,
    #[validate(length(max = 5000, message = "Комментарий агента: не более 5000 символов"))]
    agent_comment: Option<String>,
    floor: Option<i64>,
    #[validate(range(min = 1, message = "Этажность должна быть больше нуля"))]
    total_floors: Option<i64>,
    #[validate(range(min = 1800, max = 2100, message = "Год постройки должен быть между 1800 и 2100"))]
    year_built: Option<i64>,
    #[validate(range(min = 0, message = "Санузлы: значение не может быть отрицательным"))]
    bathrooms: Option<i64>,
    #[validate(custom(function = "http_urls"))]
    images: Vec<String>,
    #[validate(
        length(max = 3, message = "Планировка: не более 3 изображений"),
        custom(function = "http_urls")
    )]
    floor_plan: Vec<String>,
    #[validate(
        length(max = 3, message = "Вид из окна: не более 3 изображений"),
        custom(function = "http_urls")
    )]
    window_view: Vec<String>,
    #[validate(
        length(max = 3, message = "Интерьер: не более 3 изображений"),
        custom(function = "http_urls")
    )]
    interior: Vec<String>,
}

impl PropertyDraft {
    fn category_urls(&self, category: ImageCategory) -> &[String] {
        match category {
            ImageCategory::FloorPlan => &self.floor_plan,
            ImageCategory::WindowView => &self.window_view,
            ImageCategory::Interior => &self.interior,
        }
    }
}

fn floor_within_building(draft: &PropertyDraft) -> Result<(), ValidationError> {
    match (draft.floor, draft.total_floors) {
        (Some(floor), Some(total)) if floor > total => Err(ValidationError::new("floor")
            .with_message("Этаж не может быть выше этажности дома".into())),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInput {
    pub kind: PropertyKind,
    pub address: String,
    pub rooms: i64,
    pub area: f64,
    pub price: i64,
    pub description: Option<String>,
    pub agent_comment: Option<String>,
    pub slots: ImageSlots,
    pub images: Vec<String>,
    pub floor: Option<i64>,
    pub total_floors: Option<i64>,
    pub year_built: Option<i64>,
    pub renovation: Option<Renovation>,
    pub bathrooms: Option<i64>,
    pub balcony: Option<bool>,
    pub parking: Option<Parking>,
    pub status: Option<PropertyStatus>,
}

impl PropertyForm {
    pub fn from_existing(property: &Property, images: &[PropertyImage]) -> Self {
        let slots = property.image_slots();
        let int = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();
        Self {
            property_type: property.property_type.clone(),
            address: property.address.clone(),
            rooms: property.rooms.to_string(),
            area: property.area.to_string(),
            price: property.price.to_string(),
            description: property.description.clone().unwrap_or_default(),
            agent_comment: property.agent_comment.clone().unwrap_or_default(),
            image_urls: images
                .iter()
                .map(|i| i.image_url.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            floor_plan_urls: slots.form_text(ImageCategory::FloorPlan),
            window_view_urls: slots.form_text(ImageCategory::WindowView),
            interior_urls: slots.form_text(ImageCategory::Interior),
            floor: int(property.floor),
            total_floors: int(property.total_floors),
            year_built: int(property.year_built),
            renovation: property.renovation.clone().unwrap_or_default(),
            bathrooms: int(property.bathrooms),
            balcony: match property.balcony {
                Some(true) => "yes".to_owned(),
                Some(false) => "no".to_owned(),
                None => String::new(),
            },
            parking: property.parking.clone().unwrap_or_default(),
            status: property.status.clone().unwrap_or_default(),
        }
    }

    pub fn validate(&self) -> Result<PropertyInput, AppError> {
        let kind: PropertyKind = self.property_type.parse()?;
        let balcony = match self.balcony.trim() {
            "" => None,
            "yes" => Some(true),
            "no" => Some(false),
            _ => return Err(AppError::validation("Балкон: недопустимое значение")),
        };

        let draft = PropertyDraft {
            address: trimmed(&self.address),
            rooms: required_int(&self.rooms, "Комнаты")?,
            area: required_decimal(&self.area, "Площадь")?,
            price: required_int(&self.price, "Цена")?,
            description: non_blank(&self.description),
            agent_comment: non_blank(&self.agent_comment),
            floor: optional_int(&self.floor, "Этаж")?,
            total_floors: optional_int(&self.total_floors, "Этажность")?,
            year_built: optional_int(&self.year_built, "Год постройки")?,
            bathrooms: optional_int(&self.bathrooms, "Санузлы")?,
            images: images::parse_url_list(&self.image_urls),
            floor_plan: images::parse_url_list(&self.floor_plan_urls),
            window_view: images::parse_url_list(&self.window_view_urls),
            interior: images::parse_url_list(&self.interior_urls),
        };
        draft.validate()?;

        let mut slots = ImageSlots::default();
        for category in ImageCategory::ALL {
            slots.set(
                category,
                images::pack_slots(category, draft.category_urls(category))?,
            );
        }

        Ok(PropertyInput {
            kind,
            address: draft.address,
            rooms: draft.rooms,
            area: draft.area,
            price: draft.price,
            description: draft.description,
            agent_comment: draft.agent_comment,
            slots,
            images: draft.images,
            floor: draft.floor,
            total_floors: draft.total_floors,
            year_built: draft.year_built,
            renovation: optional_choice(&self.renovation)?,
            bathrooms: draft.bathrooms,
            balcony,
            parking: optional_choice(&self.parking)?,
            status: optional_choice(&self.status)?,
        })
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct CollectionForm {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Validate)]
struct CollectionInput {
    #[validate(length(min = 1, max = 200, message = "Название: обязательное поле, не более 200 символов"))]
    name: String,
    #[validate(length(max = 5000, message = "Описание: не более 5000 символов"))]
    description: Option<String>,
}

impl CollectionForm {
    pub fn validate(&self) -> Result<(String, Option<String>), AppError> {
        let input = CollectionInput {
            name: trimmed(&self.name),
            description: non_blank(&self.description),
        };
        input.validate()?;
        Ok((input.name, input.description))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct CommentForm {
    pub author_name: String,
    pub author_email: String,
    pub content: String,
    pub theme: String,
}

#[derive(Debug, Validate)]
pub struct CommentInput {
    #[validate(length(min = 1, max = 200, message = "Имя: обязательное поле, не более 200 символов"))]
    pub author_name: String,
    #[validate(email(message = "Некорректный email"))]
    pub author_email: Option<String>,
    #[validate(length(min = 1, max = 2000, message = "Комментарий: обязательное поле, не более 2000 символов"))]
    pub content: String,
}

impl CommentForm {
    pub fn validate(&self) -> Result<CommentInput, AppError> {
        let input = CommentInput {
            author_name: trimmed(&self.author_name),
            author_email: non_blank(&self.author_email),
            content: trimmed(&self.content),
        };
        input.validate()?;
        Ok(input)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ProfileForm {
    pub name: String,
    pub phone: String,
    pub description: String,
    pub avatar_url: String,
}

#[derive(Debug, Validate)]
pub struct ProfileInput {
    #[validate(length(min = 1, max = 200, message = "Имя: обязательное поле, не более 200 символов"))]
    pub name: String,
    #[validate(length(max = 50, message = "Телефон: не более 50 символов"))]
    pub phone: Option<String>,
    #[validate(length(max = 5000, message = "О себе: не более 5000 символов"))]
    pub description: Option<String>,
    #[validate(
        length(max = 1000, message = "Аватар: не более 1000 символов"),
        custom(function = "http_url")
    )]
    pub avatar_url: Option<String>,
}

impl ProfileForm {
    pub fn validate(&self) -> Result<ProfileInput, AppError> {
        let input = ProfileInput {
            name: trimmed(&self.name),
            phone: non_blank(&self.phone),
            description: non_blank(&self.description),
            avatar_url: non_blank(&self.avatar_url),
        };
        input.validate()?;
        Ok(input)
    }
}

/// Identity fields of a new account, normalized: trimmed, email lowercased.
#[derive(Debug, Validate)]
pub struct AccountInput {
    #[validate(length(min = 1, max = 200, message = "Имя: обязательное поле, не более 200 символов"))]
    pub name: String,
    #[validate(
        email(message = "Некорректный email"),
        length(max = 200, message = "Email: не более 200 символов")
    )]
    pub email: String,
    #[validate(length(max = 50, message = "Телефон: не более 50 символов"))]
    pub phone: Option<String>,
}

impl AccountInput {
    pub fn new(name: &str, email: &str, phone: &str) -> Self {
        Self {
            name: trimmed(name),
            email: email.trim().to_lowercase(),
            phone: non_blank(phone),
        }
    }
}

#[derive(Debug, Validate)]
struct NewPassword {
    #[validate(
        must_match(other = "repeated", message = "Пароли не совпадают"),
        length(min = 8, max = 128, message = "Пароль должен быть от 8 до 128 символов"),
        custom(function = "has_letter_and_digit")
    )]
    password: String,
    repeated: String,
}

pub fn validate_new_password(password: &str, repeated: &str) -> Result<(), AppError> {
    NewPassword {
        password: password.to_owned(),
        repeated: repeated.to_owned(),
    }
    .validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> PropertyForm {
        PropertyForm {
            property_type: "apartment".into(),
            address: "Москва, ул. Тверская, 1".into(),
            rooms: "2".into(),
            area: "54,5".into(),
            price: "12 500 000".into(),
            floor_plan_urls: "https://img.example.com/plan.jpg".into(),
            image_urls: "https://img.example.com/1.jpg\nhttps://img.example.com/2.jpg".into(),
            floor: "5".into(),
            total_floors: "9".into(),
            balcony: "yes".into(),
            status: "available".into(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_property_form_parses() {
        let input = valid_form().validate().unwrap();
        assert_eq!(input.kind, PropertyKind::Apartment);
        assert_eq!(input.area, 54.5);
        assert_eq!(input.price, 12_500_000);
        assert_eq!(input.balcony, Some(true));
        assert_eq!(input.status, Some(PropertyStatus::Available));
        assert_eq!(input.renovation, None);
        assert_eq!(input.images.len(), 2);
        assert_eq!(
            input.slots.floor_plan[0].as_deref(),
            Some("https://img.example.com/plan.jpg")
        );
    }

    #[test]
    fn rejects_unknown_type() {
        let form = PropertyForm {
            property_type: "castle".into(),
            ..valid_form()
        };
        assert!(matches!(form.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_non_positive_price_and_area() {
        let form = PropertyForm {
            price: "0".into(),
            ..valid_form()
        };
        assert!(form.validate().is_err());
        let form = PropertyForm {
            area: "-3".into(),
            ..valid_form()
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn rejects_floor_above_total() {
        let form = PropertyForm {
            floor: "12".into(),
            total_floors: "9".into(),
            ..valid_form()
        };
        let err = form.validate().unwrap_err();
        assert!(err.public_message().contains("Этаж"));
    }

    #[test]
    fn rejects_too_many_interior_images() {
        let form = PropertyForm {
            interior_urls: "https://a/1\nhttps://a/2\nhttps://a/3\nhttps://a/4".into(),
            ..valid_form()
        };
        let err = form.validate().unwrap_err();
        assert!(err.public_message().contains("Интерьер"));
    }

    #[test]
    fn rejects_non_http_gallery_url() {
        let form = PropertyForm {
            image_urls: "data:image/png;base64,AAAA".into(),
            ..valid_form()
        };
        assert!(form.validate().is_err());
        let form = PropertyForm {
            window_view_urls: "https://%%%".into(),
            ..valid_form()
        };
        let err = form.validate().unwrap_err();
        assert!(err.public_message().contains("https://%%%"));
    }

    #[test]
    fn comment_requires_name_and_content() {
        let form = CommentForm {
            author_name: " ".into(),
            content: "Интересный вариант".into(),
            ..Default::default()
        };
        assert!(form.validate().is_err());

        let form = CommentForm {
            author_name: "Анна".into(),
            author_email: "anna-at-mail".into(),
            content: "Интересный вариант".into(),
            ..Default::default()
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn collection_name_is_trimmed() {
        let form = CollectionForm {
            name: "  Для семьи Ивановых ".into(),
            description: "".into(),
        };
        assert_eq!(
            form.validate().unwrap(),
            ("Для семьи Ивановых".to_owned(), None)
        );
    }

    #[test]
    fn password_policy() {
        assert!(validate_new_password("abc12345", "abc12345").is_ok());
        assert!(validate_new_password("abc12345", "abc12346").is_err());
        assert!(validate_new_password("a1", "a1").is_err());
        assert!(validate_new_password("onlyletters", "onlyletters").is_err());
        assert!(validate_new_password("1234567890", "1234567890").is_err());
    }

    #[test]
    fn account_email_is_normalized() {
        let account = AccountInput::new(" Олег ", " Agent@Mail.RU ", "  ");
        assert!(account.validate().is_ok());
        assert_eq!(account.email, "agent@mail.ru");
        assert_eq!(account.name, "Олег");
        assert_eq!(account.phone, None);

        assert!(AccountInput::new("Олег", "agent.mail.ru", "").validate().is_err());
        assert!(AccountInput::new("Олег", "@mail.ru", "").validate().is_err());
        assert!(AccountInput::new("", "agent@mail.ru", "").validate().is_err());
    }

    #[test]
    fn profile_avatar_must_be_a_web_url() {
        let form = ProfileForm {
            name: "Ирина".into(),
            avatar_url: "http://[".into(),
            ..Default::default()
        };
        assert!(matches!(form.validate(), Err(AppError::Validation(_))));

        let form = ProfileForm {
            name: "Ирина".into(),
            avatar_url: " https://img.example.com/me.jpg ".into(),
            ..Default::default()
        };
        let input = form.validate().unwrap();
        assert_eq!(input.avatar_url.as_deref(), Some("https://img.example.com/me.jpg"));
    }

    #[test]
    fn several_broken_fields_are_reported_together() {
        let form = PropertyForm {
            price: "0".into(),
            year_built: "1700".into(),
            ..valid_form()
        };
        let message = form.validate().unwrap_err().public_message();
        assert!(message.contains("Цена"));
        assert!(message.contains("Год постройки"));
    }

    #[test]
    fn choice_options_cover_all_variants() {
        assert_eq!(Parking::options().len(), Parking::ALL.len());
        assert_eq!("underground".parse::<Parking>().unwrap(), Parking::Underground);
    }
}
