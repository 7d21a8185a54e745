//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use rummy_engine::{
    db::DatabaseConfig,
    format::{DeclarePolicy, PoolLoserScoring, RulesConfig, TossOrder, WrongDeclarePolicy},
    security::DEFAULT_THROTTLE_WINDOW,
    table::{DEFAULT_RECONNECT_GRACE, TableConfig},
    timer::{TimeoutAction, TimerMode},
};
use std::{net::SocketAddr, str::FromStr, time::Duration};

const DEFAULT_PORT: u16 = 6969;
const MIN_JWT_SECRET_LEN: usize = 32;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// `None` keeps wallets and snapshots in memory
    pub database: Option<DatabaseConfig>,
    /// Secret shared with the auth service that issues event tokens
    pub jwt_secret: String,
    /// Rules and per-table settings
    pub table: TableConfig,
    /// Minimum spacing of throttled socket events
    pub throttle_window: Duration,
    /// Mounts the admin advance/declare routes
    pub admin_enabled: bool,
    /// Prometheus scrape listener
    pub metrics_bind: Option<SocketAddr>,
    /// How often orphaned holds are swept
    pub hold_sweep_interval: Duration,
    /// Age after which a hold at a stopped table is released
    pub stale_hold_age: Duration,
}

/// Command-line values that take precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<SocketAddr>,
    pub database_url: Option<String>,
    /// Ignore `DATABASE_URL` and keep everything in memory
    pub memory: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(overrides: Overrides) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F, overrides: Overrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let bind = match overrides.bind {
            Some(bind) => bind,
            None => env.parse_or("SERVER_BIND", SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))?,
        };

        let database_url = overrides
            .database_url
            .clone()
            .or_else(|| env.get("DATABASE_URL"));
        let database = match database_url {
            Some(database_url) if !overrides.memory => Some(DatabaseConfig {
                database_url,
                ..env.database_pool()?
            }),
            _ => None,
        };

        let jwt_secret = env.get("JWT_SECRET").ok_or_else(|| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use the signing secret of the auth service that issues tokens".to_string(),
        })?;

        let defaults = RulesConfig::default();
        let rules = RulesConfig {
            point_value: env.parse_or("POINT_VALUE", defaults.point_value)?,
            max_points: env.parse_or("MAX_POINTS", defaults.max_points)?,
            first_drop: env.parse_or("FIRST_DROP", defaults.first_drop)?,
            middle_drop: env.parse_or("MIDDLE_DROP", defaults.middle_drop)?,
            deals_count: env.parse_or("DEALS_COUNT", defaults.deals_count)?,
            pool_threshold: env.parse_or("POOL_THRESHOLD", defaults.pool_threshold)?,
            rake_percent: env.parse_or("RAKE_PERCENT", defaults.rake_percent)?,
            max_missed_turns: env.parse_or("MAX_MISSED_TURNS", defaults.max_missed_turns)?,
            turn_duration: env.secs_or("TURN_DURATION_SECS", defaults.turn_duration)?,
            declare_window: env.secs_or("DECLARE_WINDOW_SECS", defaults.declare_window)?,
            timer_mode: env.choice(
                "TIMER_MODE",
                &[("enabled", TimerMode::Enabled), ("disabled", TimerMode::Disabled)],
                defaults.timer_mode,
            )?,
            timeout_action: env.choice(
                "TIMEOUT_ACTION",
                &[
                    ("auto_discard", TimeoutAction::AutoDiscard),
                    ("auto_pack", TimeoutAction::AutoPack),
                ],
                defaults.timeout_action,
            )?,
            declare_policy: env.choice(
                "DECLARE_POLICY",
                &[("strict", DeclarePolicy::Strict), ("loose", DeclarePolicy::Loose)],
                defaults.declare_policy,
            )?,
            wrong_declare_policy: env.choice(
                "WRONG_DECLARE_POLICY",
                &[
                    ("reject", WrongDeclarePolicy::Reject),
                    ("discard_finish_card", WrongDeclarePolicy::DiscardFinishCard),
                ],
                defaults.wrong_declare_policy,
            )?,
            pool_loser_scoring: env.choice(
                "POOL_LOSER_SCORING",
                &[
                    ("middle_drop", PoolLoserScoring::MiddleDrop),
                    ("hand_points", PoolLoserScoring::HandPoints),
                ],
                defaults.pool_loser_scoring,
            )?,
            toss_order: env.choice(
                "TOSS_ORDER",
                &[("seatzero", TossOrder::SeatZero), ("random", TossOrder::Random)],
                defaults.toss_order,
            )?,
            ..defaults
        };

        let table = TableConfig {
            rules,
            reconnect_grace: env.secs_or("RECONNECT_GRACE_SECS", DEFAULT_RECONNECT_GRACE)?,
            inbox_capacity: env.parse_or("TABLE_INBOX_CAPACITY", 100)?,
        };

        let metrics_bind = match env.get("METRICS_BIND") {
            Some(raw) => Some(raw.trim().parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("{raw:?} is not an IP:PORT address"),
            })?),
            None => None,
        };

        Ok(ServerConfig {
            bind,
            database,
            jwt_secret,
            table,
            throttle_window: Duration::from_millis(
                env.parse_or("RATE_LIMIT_WINDOW_MS", DEFAULT_THROTTLE_WINDOW.as_millis() as u64)?,
            ),
            admin_enabled: env.parse_or("ADMIN_ENDPOINTS", false)?,
            metrics_bind,
            hold_sweep_interval: env.secs_or("HOLD_SWEEP_SECS", Duration::from_secs(300))?,
            stale_hold_age: env.secs_or("STALE_HOLD_SECS", Duration::from_secs(600))?,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: format!("Must be at least {MIN_JWT_SECRET_LEN} characters"),
            });
        }

        if self.throttle_window.is_zero() {
            return Err(ConfigError::Invalid {
                var: "RATE_LIMIT_WINDOW_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.hold_sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "HOLD_SWEEP_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        // Holds younger than one turn may belong to a table that is still dealing
        if self.stale_hold_age < self.table.rules.turn_duration {
            return Err(ConfigError::Invalid {
                var: "STALE_HOLD_SECS".to_string(),
                reason: "Must not be shorter than the turn duration".to_string(),
            });
        }

        self.table.validate().map_err(|e| ConfigError::Invalid {
            var: "rules".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Unset falls back to `default`; set but unparsable is an error.
    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!("{raw:?} does not parse"),
            }),
            None => Ok(default),
        }
    }

    fn secs_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse_or(key, default.as_secs()).map(Duration::from_secs)
    }

    fn choice<T: Copy>(&self, key: &str, options: &[(&str, T)], default: T) -> Result<T, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        let wanted = raw.trim().to_lowercase();
        options
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, value)| *value)
            .ok_or_else(|| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!(
                    "{raw:?} is not one of {}",
                    options.iter().map(|(n, _)| *n).collect::<Vec<_>>().join(", ")
                ),
            })
    }

    fn database_pool(&self) -> Result<DatabaseConfig, ConfigError> {
        let defaults = DatabaseConfig::development();
        Ok(DatabaseConfig {
            max_connections: self.parse_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: self.parse_or("DB_MIN_CONNECTIONS", defaults.min_connections)?,
            connection_timeout_secs: self
                .parse_or("DB_CONNECTION_TIMEOUT", defaults.connection_timeout_secs)?,
            idle_timeout_secs: self.parse_or("DB_IDLE_TIMEOUT", defaults.idle_timeout_secs)?,
            ..defaults
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)], overrides: Overrides) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned(), overrides)
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use the auth secret".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("JWT_SECRET"));
        assert!(msg.contains("Use the auth secret"));
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("JWT_SECRET", SECRET)], Overrides::default()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bind.port(), DEFAULT_PORT);
        assert!(config.database.is_none());
        assert!(!config.admin_enabled);
        assert_eq!(config.throttle_window, Duration::from_millis(500));
        assert_eq!(config.table.reconnect_grace, Duration::from_secs(30));
        assert_eq!(config.table.rules, RulesConfig::default());
    }

    #[test]
    fn test_missing_secret() {
        let err = load(&[], Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn test_rule_knobs_from_env() {
        let config = load(
            &[
                ("JWT_SECRET", SECRET),
                ("POINT_VALUE", "5"),
                ("RAKE_PERCENT", "15"),
                ("POOL_THRESHOLD", "201"),
                ("TIMER_MODE", "Disabled"),
                ("TIMEOUT_ACTION", "auto_pack"),
                ("DECLARE_POLICY", "loose"),
                ("TURN_DURATION_SECS", "45"),
                ("RATE_LIMIT_WINDOW_MS", "250"),
                ("ADMIN_ENDPOINTS", "true"),
            ],
            Overrides::default(),
        )
        .unwrap();
        let rules = &config.table.rules;
        assert_eq!(rules.point_value, 5);
        assert_eq!(rules.rake_percent, 15);
        assert_eq!(rules.pool_threshold, 201);
        assert_eq!(rules.timer_mode, TimerMode::Disabled);
        assert_eq!(rules.timeout_action, TimeoutAction::AutoPack);
        assert_eq!(rules.declare_policy, DeclarePolicy::Loose);
        assert_eq!(rules.turn_duration, Duration::from_secs(45));
        assert_eq!(config.throttle_window, Duration::from_millis(250));
        assert!(config.admin_enabled);
    }

    #[test]
    fn test_unparsable_values_are_errors() {
        for (var, value) in [
            ("POINT_VALUE", "ten"),
            ("TIMER_MODE", "sometimes"),
            ("METRICS_BIND", "nowhere"),
        ] {
            let err = load(&[("JWT_SECRET", SECRET), (var, value)], Overrides::default())
                .unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { var: v, .. } if v == var),
                "{var}: {err}"
            );
        }
    }

    #[test]
    fn test_overrides_win() {
        let overrides = Overrides {
            bind: Some("0.0.0.0:9000".parse().unwrap()),
            database_url: Some("postgres://cli@localhost/rummy".to_string()),
            memory: false,
        };
        let config = load(
            &[
                ("JWT_SECRET", SECRET),
                ("SERVER_BIND", "127.0.0.1:1"),
                ("DATABASE_URL", "postgres://env@localhost/rummy"),
                ("DB_MAX_CONNECTIONS", "7"),
            ],
            overrides,
        )
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        let database = config.database.unwrap();
        assert_eq!(database.database_url, "postgres://cli@localhost/rummy");
        assert_eq!(database.max_connections, 7);

        let memory = load(
            &[("JWT_SECRET", SECRET), ("DATABASE_URL", "postgres://env@localhost/rummy")],
            Overrides {
                memory: true,
                ..Overrides::default()
            },
        )
        .unwrap();
        assert!(memory.database.is_none());
    }

    #[test]
    fn test_validation_rejects_short_secret() {
        let config = load(&[("JWT_SECRET", "short")], Overrides::default()).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var, .. } if var == "JWT_SECRET"));
    }

    #[test]
    fn test_validation_rejects_bad_rules() {
        let config = load(
            &[("JWT_SECRET", SECRET), ("FIRST_DROP", "60"), ("MIDDLE_DROP", "40")],
            Overrides::default(),
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("first drop"));
    }
}
