use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub reservations: ReservationRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Empty url disables the availability cache and rate limiting.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    #[serde(default)]
    pub url: String,
}

/// Empty brokers disables event publishing.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    #[serde(default)]
    pub brokers: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    /// Shared secret for the processor's callback signatures.
    pub webhook_secret: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Timing knobs for the reservation subsystem. The hold duration is fixed
/// per deployment; the debounce window is deliberately configurable since
/// its size is a heuristic, not a proven bound.
#[derive(Debug, Deserialize, Clone)]
pub struct ReservationRules {
    #[serde(default = "default_hold_seconds")]
    pub hold_seconds: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_reconcile_interval_seconds")]
    pub reconcile_interval_seconds: u64,
    #[serde(default = "default_countdown_tick_millis")]
    pub countdown_tick_millis: u64,
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,
    #[serde(default = "default_warn_below_seconds")]
    pub warn_below_seconds: u64,
    #[serde(default = "default_critical_below_seconds")]
    pub critical_below_seconds: u64,
}

fn default_hold_seconds() -> u64 {
    900
}
fn default_sweep_interval_seconds() -> u64 {
    120
}
fn default_reconcile_interval_seconds() -> u64 {
    45
}
fn default_countdown_tick_millis() -> u64 {
    1000
}
fn default_debounce_seconds() -> u64 {
    5
}
fn default_warn_below_seconds() -> u64 {
    300
}
fn default_critical_below_seconds() -> u64 {
    120
}

impl Default for ReservationRules {
    fn default() -> Self {
        Self {
            hold_seconds: default_hold_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            reconcile_interval_seconds: default_reconcile_interval_seconds(),
            countdown_tick_millis: default_countdown_tick_millis(),
            debounce_seconds: default_debounce_seconds(),
            warn_below_seconds: default_warn_below_seconds(),
            critical_below_seconds: default_critical_below_seconds(),
        }
    }
}

impl ReservationRules {
    pub fn hold_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hold_seconds as i64)
    }

    pub fn debounce(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.debounce_seconds as i64)
    }

    pub fn warn_below(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.warn_below_seconds as i64)
    }

    pub fn critical_below(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.critical_below_seconds as i64)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn reconcile_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reconcile_interval_seconds)
    }

    pub fn countdown_tick(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.countdown_tick_millis)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overrides are optional.
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides stay out of version control.
            .add_source(config::File::with_name("config/local").required(false))
            // `ATELIER_SERVER__PORT=8080` style environment settings.
            .add_source(config::Environment::with_prefix("ATELIER").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_default_to_the_documented_timings() {
        let rules: ReservationRules = serde_json::from_str("{}").unwrap();
        assert_eq!(rules.hold_seconds, 900);
        assert_eq!(rules.sweep_interval_seconds, 120);
        assert_eq!(rules.debounce_seconds, 5);
        assert_eq!(rules.hold_duration(), chrono::Duration::minutes(15));
        assert_eq!(rules.warn_below(), chrono::Duration::minutes(5));
        assert_eq!(rules.critical_below(), chrono::Duration::minutes(2));
    }
}
