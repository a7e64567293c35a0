#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! The subscription strategy is chosen once, when a [`Runtime`](crate::Runtime)
//! is built, instead of being re-detected at every call site.
//!
//! # Environment
//!
//! | Variable            | Values                          | Default            |
//! |---------------------|---------------------------------|--------------------|
//! | `PRIM_SUBSCRIPTION` | `fast`, `legacy`                | `fast`             |
//! | `PRIM_DEV_CHECKS`   | `1/true/yes/on`, `0/false/no/off` | debug assertions |
//!
//! Unrecognized values keep the default and log a warning.

/// How `use_store` subscribes a rendering unit to stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubscriptionStrategy {
    /// One combined subscription per unit across every store it reads.
    #[default]
    Fast,
    /// One subscription per `use_store` call.
    Legacy,
}

impl SubscriptionStrategy {
    /// Parse a strategy name (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fast" | "batched" => Some(Self::Fast),
            "legacy" | "per-call" => Some(Self::Legacy),
            _ => None,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Legacy => "legacy",
        }
    }
}

/// Settings fixed for the lifetime of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Subscription path used by `use_store`.
    pub subscription: SubscriptionStrategy,
    /// Report development diagnostics (controlled switches, unstable keys,
    /// hook order drift).
    pub dev_checks: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            subscription: SubscriptionStrategy::default(),
            dev_checks: cfg!(debug_assertions),
        }
    }
}

impl RuntimeConfig {
    /// Set the subscription strategy.
    #[must_use]
    pub fn with_subscription(mut self, subscription: SubscriptionStrategy) -> Self {
        self.subscription = subscription;
        self
    }

    /// Enable or disable development diagnostics.
    #[must_use]
    pub fn with_dev_checks(mut self, dev_checks: bool) -> Self {
        self.dev_checks = dev_checks;
        self
    }

    /// Defaults overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through a custom environment lookup.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = get_env("PRIM_SUBSCRIPTION") {
            match SubscriptionStrategy::parse(&value) {
                Some(strategy) => config.subscription = strategy,
                None => tracing::warn!(
                    value = %value,
                    "ignoring unknown PRIM_SUBSCRIPTION value"
                ),
            }
        }
        if let Some(value) = get_env("PRIM_DEV_CHECKS") {
            match env_flag(&value) {
                Some(flag) => config.dev_checks = flag,
                None => tracing::warn!(value = %value, "ignoring unknown PRIM_DEV_CHECKS value"),
            }
        }
        config
    }
}

fn env_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.subscription, SubscriptionStrategy::Fast);
        assert_eq!(config.dev_checks, cfg!(debug_assertions));
    }

    #[test]
    fn builders() {
        let config = RuntimeConfig::default()
            .with_subscription(SubscriptionStrategy::Legacy)
            .with_dev_checks(false);
        assert_eq!(config.subscription, SubscriptionStrategy::Legacy);
        assert!(!config.dev_checks);
    }

    #[test]
    fn env_overrides() {
        let config = RuntimeConfig::from_env_with(env(&[
            ("PRIM_SUBSCRIPTION", " Legacy "),
            ("PRIM_DEV_CHECKS", "off"),
        ]));
        assert_eq!(config.subscription, SubscriptionStrategy::Legacy);
        assert!(!config.dev_checks);

        let config = RuntimeConfig::from_env_with(env(&[("PRIM_DEV_CHECKS", "YES")]));
        assert!(config.dev_checks);
        assert_eq!(config.subscription, SubscriptionStrategy::Fast);
    }

    #[test]
    fn unknown_env_values_keep_defaults() {
        let config = RuntimeConfig::from_env_with(env(&[
            ("PRIM_SUBSCRIPTION", "turbo"),
            ("PRIM_DEV_CHECKS", "maybe"),
        ]));
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn strategy_names_round_trip() {
        for strategy in [SubscriptionStrategy::Fast, SubscriptionStrategy::Legacy] {
            assert_eq!(SubscriptionStrategy::parse(strategy.as_str()), Some(strategy));
        }
        assert_eq!(SubscriptionStrategy::parse("per-call"), Some(SubscriptionStrategy::Legacy));
    }
}
