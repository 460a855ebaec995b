use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

// =============================================================================
// Unified config (figment-deserialized from defaults / relay.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   relay.toml:      [server]
//                    port = 9090
//
//   env var:         RELAY_SERVER__PORT=9090   (double underscore = nesting)
//
//   CLI flag:        --port 9090               (highest priority)

/// Reference default port of the original relay.
pub const DEFAULT_PORT: u16 = 8080;

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub websocket: WebsocketFileConfig,
}

/// Bind tunables (lives under `[server]` in relay.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// WebSocket tunables (lives under `[websocket]` in relay.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebsocketFileConfig {
    /// Outbound queue depth per peer. A peer whose queue fills up is treated
    /// as stalled and disconnected rather than retried.
    #[serde(default = "default_send_queue_len")]
    pub send_queue_len: usize,
}

impl Default for WebsocketFileConfig {
    fn default() -> Self {
        Self {
            send_queue_len: default_send_queue_len(),
        }
    }
}

fn default_send_queue_len() -> usize {
    64
}

/// Build a figment that layers: defaults → relay.toml → RELAY_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `RELAY_SERVER__PORT=9090`  →  `server.port = 9090`
///   `RELAY_WEBSOCKET__SEND_QUEUE_LEN=128`  →  `websocket.send_queue_len = 128`
pub fn load_config(config_path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let toml = match config_path {
        Some(path) => Toml::file(path),
        None => Toml::file("relay.toml"),
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(toml)
        .merge(Env::prefixed("RELAY_").split("__"))
}

/// Resolved runtime configuration. CLI flags sit above file/env values.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub send_queue_len: usize,
}

impl ServerConfig {
    pub fn resolve(
        file: &FileConfig,
        cli_host: Option<String>,
        cli_port: Option<u16>,
    ) -> Result<Self> {
        let host = cli_host
            .or_else(|| file.server.host.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = cli_port.or(file.server.port).unwrap_or(DEFAULT_PORT);
        let bind = format!("{}:{}", host, port)
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        Ok(Self {
            bind,
            send_queue_len: file.websocket.send_queue_len,
        })
    }
}
