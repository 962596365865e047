use anyhow::{anyhow, Context, Result};
use std::{env, fmt::Display, str::FromStr};
use tracing::info;

use crate::checkout::CheckoutUrls;

pub const DEFAULT_CALENDAR_API_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Runtime settings, read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Present only when both the BaaS URL and service key are set
    pub baas: Option<BaasConfig>,
    pub calendar: CalendarConfig,
    pub checkout: CheckoutUrls,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BaasConfig {
    pub url: String,
    pub service_key: String,
}

#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub api_url: String,
    pub calendar_id: String,
    pub time_zone: String,
    pub reminder_minutes: i64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        CalendarConfig {
            api_url: DEFAULT_CALENDAR_API_URL.to_string(),
            calendar_id: "primary".to_string(),
            time_zone: "America/Sao_Paulo".to_string(),
            reminder_minutes: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production, a map in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let baas = match (var("BAAS_URL"), var("BAAS_SERVICE_KEY")) {
            (Some(url), Some(service_key)) => Some(BaasConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            }),
            (Some(_), None) | (None, Some(_)) => {
                return Err(anyhow!("BAAS_URL and BAAS_SERVICE_KEY must be set together"));
            }
            (None, None) => {
                info!("BAAS_URL not set, webhook provisioning uses the local database");
                None
            }
        };

        let defaults = CalendarConfig::default();
        let reminder_minutes = try_load(&var, "REMINDER_DURATION_MINUTES", defaults.reminder_minutes)?;
        if reminder_minutes <= 0 {
            return Err(anyhow!(
                "Invalid REMINDER_DURATION_MINUTES value: {reminder_minutes} (must be positive)"
            ));
        }

        Ok(Config {
            port: try_load(&var, "PORT", 3000)?,
            database_path: load_or(&var, "DATABASE_PATH", "financeiro.db"),
            baas,
            calendar: CalendarConfig {
                api_url: load_or(&var, "CALENDAR_API_URL", &defaults.api_url)
                    .trim_end_matches('/')
                    .to_string(),
                calendar_id: load_or(&var, "CALENDAR_ID", &defaults.calendar_id),
                time_zone: load_or(&var, "CALENDAR_TIMEZONE", &defaults.time_zone),
                reminder_minutes,
            },
            checkout: CheckoutUrls {
                monthly: var("CHECKOUT_MONTHLY_URL"),
                quarterly: var("CHECKOUT_QUARTERLY_URL"),
                annual: var("CHECKOUT_ANNUAL_URL"),
            },
            webhook_secret: var("WEBHOOK_SECRET"),
        })
    }
}

fn load_or<F>(var: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn try_load<F, T>(var: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {raw}")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_path, "financeiro.db");
        assert!(config.baas.is_none());
        assert_eq!(config.calendar.calendar_id, "primary");
        assert_eq!(config.calendar.reminder_minutes, 30);
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("BAAS_URL", "https://abc.example.co/"),
            ("BAAS_SERVICE_KEY", "service-key"),
            ("CHECKOUT_ANNUAL_URL", "https://pay.example.com/anual"),
            ("WEBHOOK_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        let baas = config.baas.unwrap();
        assert_eq!(baas.url, "https://abc.example.co");
        assert_eq!(config.checkout.annual.as_deref(), Some("https://pay.example.com/anual"));
        assert!(config.checkout.monthly.is_none());
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(Config::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BAAS_URL", "https://abc.example.co")])).is_err());
    }

    #[test]
    fn test_reminder_duration_must_be_positive() {
        for raw in ["0", "-15"] {
            let err = Config::from_lookup(lookup(&[("REMINDER_DURATION_MINUTES", raw)])).unwrap_err();
            assert!(err.to_string().contains("REMINDER_DURATION_MINUTES"));
        }

        let config = Config::from_lookup(lookup(&[("REMINDER_DURATION_MINUTES", "45")])).unwrap();
        assert_eq!(config.calendar.reminder_minutes, 45);
    }
}
