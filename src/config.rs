//! Broker and client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Both structs also implement
//! [`Default`] with the well-known ports and timings of the protocol.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Well-known port of the loopback/emulator handshake listener.
pub const LOOPBACK_PORT: u16 = 5001;

/// Well-known port of the physical-device handshake listener.
pub const LAN_PORT: u16 = 5002;

/// Well-known UDP port of the discovery responder.
pub const DISCOVERY_PORT: u16 = 5002;

/// Default WebSocket path for channel handshakes.
pub const DEFAULT_HUB_PATH: &str = "/hub";

/// Broker-side configuration.
///
/// Loaded once at startup via [`BrokerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Loopback/emulator handshake listener (e.g. `127.0.0.1:5001`).
    pub loopback_addr: SocketAddr,

    /// Physical-device handshake listener (e.g. `0.0.0.0:5002`).
    pub lan_addr: SocketAddr,

    /// UDP discovery responder address (e.g. `0.0.0.0:5002`).
    pub discovery_addr: SocketAddr,

    /// WebSocket path served on both listeners.
    pub hub_path: String,

    /// Emit logs as JSON instead of human-readable text.
    pub json_logs: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            loopback_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), LOOPBACK_PORT),
            lan_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), LAN_PORT),
            discovery_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DISCOVERY_PORT),
            hub_path: DEFAULT_HUB_PATH.to_string(),
            json_logs: false,
        }
    }
}

impl BrokerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to the defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the `RELAY_*_ADDR` variables is set but
    /// cannot be parsed as a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            loopback_addr: parse_addr("RELAY_LOOPBACK_ADDR", defaults.loopback_addr)?,
            lan_addr: parse_addr("RELAY_LAN_ADDR", defaults.lan_addr)?,
            discovery_addr: parse_addr("RELAY_DISCOVERY_ADDR", defaults.discovery_addr)?,
            hub_path: std::env::var("RELAY_HUB_PATH").unwrap_or(defaults.hub_path),
            json_logs: std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }
}

/// Client-side configuration shared by the tool and the application.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Emulator/virtual loopback hosts in priority order.
    pub emulator_hosts: Vec<IpAddr>,

    /// How many of `emulator_hosts` are probed eagerly; the rest are reserved.
    pub eager_hosts: usize,

    /// Handshake port probed on emulator hosts and on local loopback.
    pub loopback_port: u16,

    /// Handshake port on a broker found by broadcast.
    pub lan_port: u16,

    /// UDP port the broadcast probe targets.
    pub discovery_port: u16,

    /// Address the broadcast probe is sent to.
    pub broadcast_addr: IpAddr,

    /// WebSocket path used for handshakes.
    pub hub_path: String,

    /// Total time budget of one discovery round.
    pub discovery_budget: Duration,

    /// Bound applied to raw connect probes and to each datagram wait.
    pub probe_timeout: Duration,

    /// Fixed wait between discovery retries and between reconnect polls.
    pub retry_interval: Duration,

    /// Marker file recording the broker's process identifier.
    pub pid_file: PathBuf,

    /// Broker executable the tool launches on start, if any.
    pub broker_executable: Option<PathBuf>,

    /// Time given to a freshly launched broker before the first handshake.
    pub broker_launch_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            emulator_hosts: vec![
                IpAddr::V4(Ipv4Addr::new(10, 0, 2, 2)),
                IpAddr::V4(Ipv4Addr::new(10, 0, 3, 2)),
                IpAddr::V4(Ipv4Addr::new(169, 254, 80, 80)),
            ],
            eager_hosts: 1,
            loopback_port: LOOPBACK_PORT,
            lan_port: LAN_PORT,
            discovery_port: DISCOVERY_PORT,
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            hub_path: DEFAULT_HUB_PATH.to_string(),
            discovery_budget: Duration::from_millis(5_000),
            probe_timeout: Duration::from_millis(300),
            retry_interval: Duration::from_millis(5_000),
            pid_file: std::env::temp_dir().join("live-relay-broker.pid"),
            broker_executable: None,
            broker_launch_delay: Duration::from_millis(1_500),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Unparseable values fall back to the defaults; unparseable entries in
    /// `RELAY_EMULATOR_HOSTS` are skipped.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let emulator_hosts = std::env::var("RELAY_EMULATOR_HOSTS")
            .ok()
            .map(|v| parse_host_list(&v))
            .filter(|hosts| !hosts.is_empty())
            .unwrap_or(defaults.emulator_hosts);

        Self {
            emulator_hosts,
            eager_hosts: parse_env("RELAY_EAGER_HOSTS", defaults.eager_hosts),
            loopback_port: parse_env("RELAY_LOOPBACK_PORT", defaults.loopback_port),
            lan_port: parse_env("RELAY_LAN_PORT", defaults.lan_port),
            discovery_port: parse_env("RELAY_DISCOVERY_PORT", defaults.discovery_port),
            broadcast_addr: parse_env("RELAY_BROADCAST_ADDR", defaults.broadcast_addr),
            hub_path: std::env::var("RELAY_HUB_PATH").unwrap_or(defaults.hub_path),
            discovery_budget: parse_millis("RELAY_DISCOVERY_BUDGET_MS", defaults.discovery_budget),
            probe_timeout: parse_millis("RELAY_PROBE_TIMEOUT_MS", defaults.probe_timeout),
            retry_interval: parse_millis("RELAY_RETRY_INTERVAL_MS", defaults.retry_interval),
            pid_file: std::env::var_os("RELAY_PID_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.pid_file),
            broker_executable: std::env::var_os("RELAY_BROKER_EXECUTABLE").map(PathBuf::from),
            broker_launch_delay: parse_millis(
                "RELAY_BROKER_LAUNCH_DELAY_MS",
                defaults.broker_launch_delay,
            ),
        }
    }
}

/// Parses an environment variable as a [`SocketAddr`], returning `default`
/// when it is not set.
fn parse_addr(key: &str, default: SocketAddr) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    match std::env::var(key) {
        Ok(v) => Ok(v.parse()?),
        Err(_) => Ok(default),
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable holding milliseconds.
fn parse_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

/// Parses a comma-separated list of IP addresses, skipping invalid entries.
fn parse_host_list(value: &str) -> Vec<IpAddr> {
    value
        .split(',')
        .filter_map(|h| h.trim().parse().ok())
        .collect()
}
