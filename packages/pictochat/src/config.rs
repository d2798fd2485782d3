use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use stroke_sync::{ClientConfig, DEFAULT_PORT, HostConfig, SessionConfig};

// =============================================================================
// File config (figment-deserialized from defaults / picto.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   picto.toml:      [client]
//                    host = "192.168.1.113"
//
//   env var:         PICTO_CLIENT__HOST=192.168.1.113   (double underscore = nesting)
//
//   CLI:             picto join --host 192.168.1.113    (join/host flags only)

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "picto.toml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub host: HostFileConfig,
    #[serde(default)]
    pub client: ClientFileConfig,
    #[serde(default)]
    pub canvas: CanvasFileConfig,
}

/// Room hosting (lives under `[host]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostFileConfig {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_host_outbox")]
    pub outbox_capacity: usize,
}

impl Default for HostFileConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            outbox_capacity: default_host_outbox(),
        }
    }
}

/// Joining a room (lives under `[client]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientFileConfig {
    #[serde(default = "default_client_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_client_outbox")]
    pub outbox_capacity: usize,
}

impl Default for ClientFileConfig {
    fn default() -> Self {
        Self {
            host: default_client_host(),
            port: default_port(),
            connect_attempts: default_connect_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            outbox_capacity: default_client_outbox(),
        }
    }
}

/// Drawing surface (lives under `[canvas]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanvasFileConfig {
    #[serde(default = "default_brush_radius")]
    pub brush_radius: f32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

impl Default for CanvasFileConfig {
    fn default() -> Self {
        Self {
            brush_radius: default_brush_radius(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl CanvasFileConfig {
    /// Time between frames. A zero frame rate runs at one frame per second.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_shutdown_grace_ms() -> u64 {
    1000
}
fn default_host_outbox() -> usize {
    64
}
fn default_client_host() -> String {
    "127.0.0.1".to_string()
}
fn default_connect_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    300
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_client_outbox() -> usize {
    8
}
fn default_brush_radius() -> f32 {
    10.0
}
fn default_frame_rate() -> u32 {
    60
}

/// Build a figment that layers: defaults → picto.toml (or `path`) → PICTO_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `PICTO_CLIENT__HOST=10.0.0.2`  →  `client.host = "10.0.0.2"`
///   `PICTO_CANVAS__FRAME_RATE=30`  →  `canvas.frame_rate = 30`
pub fn load_config(path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let file = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed("PICTO_").split("__"))
}

// =============================================================================
// Runtime config (what the sync core consumes)
// =============================================================================

pub fn host_from_file(fc: &HostFileConfig) -> HostConfig {
    HostConfig {
        bind_addr: SocketAddr::new(fc.bind, fc.port),
        shutdown_grace: Duration::from_millis(fc.shutdown_grace_ms),
        outbox_capacity: fc.outbox_capacity,
    }
}

pub fn client_from_file(fc: &ClientFileConfig) -> ClientConfig {
    ClientConfig {
        host: fc.host.clone(),
        port: fc.port,
        connect_attempts: fc.connect_attempts,
        retry_delay: Duration::from_millis(fc.retry_delay_ms),
        connect_timeout: Duration::from_millis(fc.connect_timeout_ms),
        outbox_capacity: fc.outbox_capacity,
    }
}

pub fn session_from_file(fc: &FileConfig) -> SessionConfig {
    SessionConfig {
        host: host_from_file(&fc.host),
        client: client_from_file(&fc.client),
        brush_radius: fc.canvas.brush_radius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.host.bind.to_string(), "0.0.0.0");
        assert_eq!(fc.host.port, 8000);
        assert_eq!(fc.client.host, "127.0.0.1");
        assert_eq!(fc.client.connect_attempts, 3);
        assert_eq!(fc.canvas.brush_radius, 10.0);
        assert_eq!(fc.canvas.frame_rate, 60);
    }

    #[test]
    fn test_session_from_file_defaults() {
        let session = session_from_file(&FileConfig::default());
        assert_eq!(session.host.bind_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(session.host.shutdown_grace, Duration::from_secs(1));
        assert_eq!(session.client.ws_url(), "ws://127.0.0.1:8000/ws");
        assert_eq!(session.client.retry_delay, Duration::from_millis(300));
        assert_eq!(session.client.connect_timeout, Duration::from_secs(2));
        assert_eq!(session.brush_radius, 10.0);
    }

    #[test]
    fn test_frame_period() {
        let mut canvas = CanvasFileConfig::default();
        canvas.frame_rate = 50;
        assert_eq!(canvas.frame_period(), Duration::from_millis(20));
        canvas.frame_rate = 0;
        assert_eq!(canvas.frame_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(Some(&tmp.path().join("nope.toml")))
            .extract()
            .unwrap();
        assert_eq!(fc.client.port, 8000);
        assert_eq!(fc.host.outbox_capacity, 64);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("room.toml");
        std::fs::write(
            &path,
            "[client]\nhost = \"192.168.1.113\"\nconnect_attempts = 5\n\n[canvas]\nbrush_radius = 4.0\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(Some(&path)).extract().unwrap();
        assert_eq!(fc.client.host, "192.168.1.113");
        assert_eq!(fc.client.connect_attempts, 5);
        // Untouched fields keep their defaults.
        assert_eq!(fc.client.retry_delay_ms, 300);
        assert_eq!(fc.canvas.brush_radius, 4.0);
        assert_eq!(fc.canvas.frame_rate, 60);
    }

    #[test]
    fn test_load_config_rejects_bad_bind() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("room.toml");
        std::fs::write(&path, "[host]\nbind = \"not-an-ip\"\n").unwrap();
        assert!(load_config(Some(&path)).extract::<FileConfig>().is_err());
    }

    #[test]
    fn test_env_overrides_default_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                "[client]\nhost = \"10.0.0.2\"\nport = 9000\n",
            )?;
            jail.set_env("PICTO_CLIENT__HOST", "192.168.1.113");
            jail.set_env("PICTO_HOST__SHUTDOWN_GRACE_MS", "250");

            let fc: FileConfig = load_config(None).extract()?;
            assert_eq!(fc.client.host, "192.168.1.113");
            assert_eq!(fc.client.port, 9000);

            let session = session_from_file(&fc);
            assert_eq!(session.client.ws_url(), "ws://192.168.1.113:9000/ws");
            assert_eq!(session.host.shutdown_grace, Duration::from_millis(250));
            Ok(())
        });
    }
}
