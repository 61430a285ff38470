use std::env;
use std::str::FromStr;

use crate::errors::AppError;

/// Minimum length accepted by `actix_web::cookie::Key::from`.
const MIN_SESSION_KEY_LEN: usize = 64;

const MAX_TRIAL_DAYS: i64 = 3650;

/// Runtime knobs handlers need on every request.
#[derive(Debug, Clone)]
pub struct Settings {
    pub trial_days: i64,
    pub access_poll_secs: u64,
    pub public_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trial_days: 14,
            access_poll_secs: 60,
            public_base_url: "http://localhost:8080".to_owned(),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub session_key: Vec<u8>,
    pub cookie_secure: bool,
    pub settings: Settings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let session_key = env::var("SESSION_KEY").map_err(|_| {
            AppError::ConfigError("SESSION_KEY environment variable not set".into())
        })?;
        if session_key.len() < MIN_SESSION_KEY_LEN {
            return Err(AppError::ConfigError(format!(
                "SESSION_KEY must be at least {} bytes long",
                MIN_SESSION_KEY_LEN
            )));
        }

        let defaults = Settings::default();
        let trial_days = check_trial_days(parse_var("TRIAL_DAYS", defaults.trial_days)?)?;
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or(defaults.public_base_url)
            .trim_end_matches('/')
            .to_owned();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://rieltorpro.db".to_owned()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_owned()),
            port: parse_var("PORT", 8080)?,
            session_key: session_key.into_bytes(),
            cookie_secure: parse_var("COOKIE_SECURE", true)?,
            settings: Settings {
                trial_days,
                access_poll_secs: parse_var("ACCESS_POLL_SECS", defaults.access_poll_secs)?,
                public_base_url,
            },
        })
    }
}

fn check_trial_days(days: i64) -> Result<i64, AppError> {
    if (0..=MAX_TRIAL_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(AppError::ConfigError(format!(
            "TRIAL_DAYS must be between 0 and {}, got {}",
            MAX_TRIAL_DAYS, days
        )))
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::ConfigError(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_falls_back_to_default() {
        let port: u16 = parse_var("RIELTORPRO_TEST_UNSET_PORT", 8080).unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn trial_days_are_bounded() {
        assert_eq!(check_trial_days(14).unwrap(), 14);
        assert_eq!(check_trial_days(0).unwrap(), 0);
        assert!(matches!(check_trial_days(-1), Err(AppError::ConfigError(_))));
        assert!(matches!(
            check_trial_days(i64::MAX / 1000),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn parse_var_rejects_garbage() {
        env::set_var("RIELTORPRO_TEST_BAD_DAYS", "fourteen");
        let res: Result<i64, _> = parse_var("RIELTORPRO_TEST_BAD_DAYS", 14);
        assert!(matches!(res, Err(AppError::ConfigError(_))));
    }
}
