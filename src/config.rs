//! Application-level configuration loading: subscription policy and the seeded plans table.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::PlanEntity;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PLAYDESK_CONFIG_PATH";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub subscription: SubscriptionPolicy,
    /// Plans seeded into the subscription store at startup.
    pub plans: Vec<PlanEntity>,
}

/// Knobs of the lazy subscription status computation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubscriptionPolicy {
    pub grace_period_days: u32,
    /// A stored status older than this is recomputed and written back even when unchanged.
    pub recheck_interval_secs: u64,
    /// Plan code that identifies free trials (no grace period).
    pub trial_plan_code: String,
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self {
            grace_period_days: 3,
            recheck_interval_secs: 3600,
            trial_plan_code: "free_trial".into(),
        }
    }
}

impl SubscriptionPolicy {
    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval_secs)
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        plans = app_config.plans.len(),
                        grace_period_days = app_config.subscription.grace_period_days,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document. Omitted sections keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            subscription: SubscriptionPolicy::default(),
            plans: default_plans(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    subscription: SubscriptionPolicy,
    plans: Option<Vec<RawPlan>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let plans = value
            .plans
            .map(|plans| plans.into_iter().map(Into::into).collect())
            .unwrap_or_else(default_plans);
        Self {
            subscription: value.subscription,
            plans,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single plan inside the configuration file.
struct RawPlan {
    code: String,
    name: String,
    #[serde(default)]
    price_cents: i64,
    duration_days: u32,
    #[serde(default)]
    features: IndexMap<String, bool>,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

impl From<RawPlan> for PlanEntity {
    fn from(value: RawPlan) -> Self {
        Self {
            code: value.code,
            name: value.name,
            price_cents: value.price_cents,
            duration_days: value.duration_days,
            features: value.features,
            is_active: value.is_active,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn plan(code: &str, name: &str, price_cents: i64, duration_days: u32, all: bool) -> PlanEntity {
    let mut features = IndexMap::new();
    features.insert("stations".to_owned(), true);
    features.insert("invoices".to_owned(), true);
    features.insert("reports".to_owned(), all);
    features.insert("sms".to_owned(), all);
    PlanEntity {
        code: code.to_owned(),
        name: name.to_owned(),
        price_cents,
        duration_days,
        features,
        is_active: true,
    }
}

/// Built-in plans shipped with the binary.
fn default_plans() -> Vec<PlanEntity> {
    vec![
        plan("free_trial", "Free trial", 0, 14, false),
        plan("monthly", "Monthly", 99_900, 30, true),
        plan("quarterly", "Quarterly", 269_900, 90, true),
        plan("yearly", "Yearly", 999_900, 365, true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.subscription.grace_period_days, 3);
        assert_eq!(config.subscription.trial_plan_code, "free_trial");
        assert_eq!(config.plans.len(), 4);
    }

    #[test]
    fn partial_policy_keeps_other_defaults() {
        let config =
            AppConfig::from_json(r#"{"subscription": {"grace_period_days": 7}}"#).unwrap();
        assert_eq!(config.subscription.grace_period_days, 7);
        assert_eq!(config.subscription.recheck_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn configured_plans_replace_the_defaults() {
        let config = AppConfig::from_json(
            r#"{"plans": [{"code": "weekly", "name": "Weekly", "price_cents": 15000,
                "duration_days": 7, "features": {"sms": false}}]}"#,
        )
        .unwrap();
        assert_eq!(config.plans.len(), 1);
        let weekly = &config.plans[0];
        assert_eq!(weekly.code, "weekly");
        assert!(weekly.is_active);
        assert_eq!(weekly.features.get("sms"), Some(&false));
    }

    #[test]
    fn malformed_document_is_rejected() {
        assert!(AppConfig::from_json(r#"{"plans": 3}"#).is_err());
    }
}
