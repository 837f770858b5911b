use serde::{Deserialize, Serialize};

use crate::endpoint::ProtoFamily;

/// Top-level configuration for a listen acceptor instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptorConfig {
    pub listen: ListenConfig,
    pub cookie: CookieConfig,
    pub logging: LoggingConfig,
}

/// Listener-facing settings: what to bind, how deep the accept queue is,
/// and where the SYN-cookie threshold sits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Bind address, e.g. "0.0.0.0".
    pub bind_address: String,
    pub bind_port: u16,
    /// Protocol family this listener serves: "v4", "v6", or "dual".
    pub protocol: String,
    /// When `protocol` is "v6", restrict to IPv6-only sockets.
    pub v6_only: bool,
    /// Advertised receive window.
    pub rcv_wnd: u16,
    /// Maximum connections permitted to sit in SYN-RECEIVED before the
    /// acceptor switches to stateless cookies.
    pub half_open_threshold: u32,
    /// Bound on the accept queue depth.
    pub accept_queue_capacity: usize,
}

/// Cookie-path specific tuning, separated out so it can be overridden
/// independently of the rest of the listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    /// How many 64-second quanta a minted cookie remains valid for. The
    /// codec itself hardcodes the quantum width; this only controls the
    /// number of quanta tolerated, for environments with unusually high
    /// round-trip latency.
    pub max_timestamp_diff: u32,
}

/// Logging configuration, matching the platform's existing
/// `tracing`-based setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive string, e.g. "info".
    pub level: String,
    pub json: bool,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig {
                bind_address: "0.0.0.0".to_string(),
                bind_port: 443,
                protocol: "v4".to_string(),
                v6_only: false,
                rcv_wnd: 65535,
                half_open_threshold: crate::counter::DEFAULT_THRESHOLD,
                accept_queue_capacity: 1024,
            },
            cookie: CookieConfig { max_timestamp_diff: 2 },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

impl AcceptorConfig {
    /// Load configuration from a file, overlaid with any `ACCEPTOR_`-prefixed
    /// environment variables.
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ACCEPTOR").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen.bind_port == 0 {
            return Err("listen.bind_port cannot be 0".to_string());
        }
        if self.listen.half_open_threshold == 0 {
            return Err("listen.half_open_threshold must be at least 1".to_string());
        }
        if self.listen.accept_queue_capacity == 0 {
            return Err("listen.accept_queue_capacity must be at least 1".to_string());
        }
        self.protocol_family()?;
        Ok(())
    }

    /// Render the effective configuration back to TOML, e.g. for logging
    /// what was actually loaded after the environment overlay.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn protocol_family(&self) -> Result<ProtoFamily, String> {
        match self.listen.protocol.as_str() {
            "v4" => Ok(ProtoFamily::V4),
            "v6" => Ok(ProtoFamily::V6),
            "dual" => Ok(ProtoFamily::Dual),
            other => Err(format!("unknown listen.protocol: {other}")),
        }
    }
}
