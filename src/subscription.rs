use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{db, errors::AppError, structs::User, AppState};

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub active: bool,
    pub on_trial: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            log::warn!("Ignoring unparseable timestamp {:?}: {}", raw, e);
            None
        }
    }
}

pub fn trial_end(now: DateTime<Utc>, trial_days: i64) -> Result<DateTime<Utc>, AppError> {
    Duration::try_days(trial_days)
        .and_then(|trial| now.checked_add_signed(trial))
        .ok_or_else(|| {
            AppError::ConfigError(format!("trial of {} days is out of range", trial_days))
        })
}

/// Access lasts until the later of the trial end and the paid period end.
pub fn subscription_status(user: &User, now: DateTime<Utc>) -> SubscriptionStatus {
    let trial = parse_ts(&user.trial_ends_at);
    let paid = user.subscription_ends_at.as_deref().and_then(parse_ts);
    let expires_at = trial.max(paid);
    let active = matches!(expires_at, Some(end) if now < end);
    let paid_active = matches!(paid, Some(end) if now < end);

    SubscriptionStatus {
        active,
        on_trial: active && !paid_active,
        expires_at,
    }
}

/// Whether the public share page behind `share_id` may be shown right now.
pub async fn has_share_access(state: &AppState, share_id: &str) -> Result<bool, AppError> {
    let Some(collection) = db::get_collection_by_share_id(state, share_id).await? else {
        return Ok(false);
    };
    let owner = db::get_user_by_id(state, collection.user_id).await?;
    Ok(subscription_status(&owner, Utc::now()).active)
}
