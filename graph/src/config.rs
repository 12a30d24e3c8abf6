//! The configuration surface recognised by the bridge.

use std::time::Duration;

use serde::Deserialize;

/// Bridge configuration. Deserialised from a TOML file with environment
/// variables overlaid on top (env wins), then filled out with defaults for
/// anything neither source specifies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nats_url: String,
    pub memgraph_host: String,
    pub memgraph_port: u16,

    pub rolling_window_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub max_cleanup_time_ms: u64,

    pub batch_interval_ms: u64,
    pub max_batch_size: usize,

    pub connection_pool_size: usize,
    pub connection_timeout_ms: u64,
    pub query_timeout_ms: u64,
    pub connect_retries: u32,
    pub connect_retry_delay_ms: u64,

    /// Venue id used for the bootstrapped `Scene_Descriptor`.
    pub venue_id: String,

    /// Unused; kept only so existing deployments' config files keep
    /// parsing (see DESIGN.md). Read into the struct but never
    /// consulted by any component.
    pub cleanup_tick_window: Option<u64>,
    pub cleanup_tick_interval: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            nats_url: "nats://127.0.0.1:4222".to_string(),
            memgraph_host: "127.0.0.1".to_string(),
            memgraph_port: 7687,

            rolling_window_seconds: 30,
            cleanup_interval_seconds: 1,
            max_cleanup_time_ms: 50,

            batch_interval_ms: 5,
            max_batch_size: 200,

            connection_pool_size: 15,
            connection_timeout_ms: 5_000,
            query_timeout_ms: 10_000,
            connect_retries: 10,
            connect_retry_delay_ms: 500,

            venue_id: "ozsports".to_string(),

            cleanup_tick_window: None,
            cleanup_tick_interval: None,
        }
    }
}

impl Config {
    /// Loads configuration from an optional TOML file overlaid with
    /// `SKG_`-prefixed environment variables; any key absent from both
    /// falls back to [`Config::default`].
    pub fn load(toml_path: Option<&std::path::Path>) -> Result<Config, base::Error> {
        use base::ResultExt;

        let mut cfg = match toml_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).err_kind(base::ErrorKind::NotFound)?;
                toml::from_str(&text).err_kind(base::ErrorKind::InvalidArgument)?
            }
            None => Config::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        macro_rules! env_str {
            ($key:literal, $field:expr) => {
                if let Ok(v) = std::env::var($key) {
                    $field = v;
                }
            };
        }
        macro_rules! env_parse {
            ($key:literal, $field:expr) => {
                if let Ok(v) = std::env::var($key) {
                    if let Ok(parsed) = v.parse() {
                        $field = parsed;
                    }
                }
            };
        }

        env_str!("SKG_NATS_URL", self.nats_url);
        env_str!("SKG_MEMGRAPH_HOST", self.memgraph_host);
        env_parse!("SKG_MEMGRAPH_PORT", self.memgraph_port);
        env_parse!("SKG_ROLLING_WINDOW_SECONDS", self.rolling_window_seconds);
        env_parse!(
            "SKG_CLEANUP_INTERVAL_SECONDS",
            self.cleanup_interval_seconds
        );
        env_parse!("SKG_MAX_CLEANUP_TIME_MS", self.max_cleanup_time_ms);
        env_parse!("SKG_BATCH_INTERVAL_MS", self.batch_interval_ms);
        env_parse!("SKG_MAX_BATCH_SIZE", self.max_batch_size);
        env_parse!("SKG_CONNECTION_POOL_SIZE", self.connection_pool_size);
        env_parse!("SKG_CONNECTION_TIMEOUT_MS", self.connection_timeout_ms);
        env_parse!("SKG_QUERY_TIMEOUT_MS", self.query_timeout_ms);
        env_str!("SKG_VENUE_ID", self.venue_id);
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn rolling_window(&self) -> Duration {
        Duration::from_secs(self.rolling_window_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.rolling_window_seconds, 30);
        assert_eq!(cfg.cleanup_interval_seconds, 1);
        assert_eq!(cfg.max_cleanup_time_ms, 50);
        assert_eq!(cfg.batch_interval_ms, 5);
        assert_eq!(cfg.max_batch_size, 200);
        assert_eq!(cfg.connection_pool_size, 15);
    }
}
