// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Connection settings (§3 Data Model, §6 closed configuration set), plus
//! the proxy/TLS/auth surface supplemented from `ruo::connect_options`.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use codec::utils::random_string;
use codec::ProtocolLevel;

#[derive(Clone, Debug)]
pub struct HttpProxy {
    pub hostname: String,
    pub port: u16,
    pub login: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct Socks5Proxy {
    pub hostname: String,
    pub port: u16,
    pub login: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub enum Proxy {
    None,
    Http(HttpProxy),
    Socks5(Socks5Proxy),
}

/// Contract for a pluggable credential provider. Concrete implementations
/// (host-integrated keychains, token refreshers, etc.) are out of scope for
/// the CORE; only this trait boundary is specified.
pub trait Authentication: Send + Sync {
    fn username(&self) -> Option<&str>;
    fn password(&self) -> Option<&[u8]>;
}

#[derive(Clone, Debug)]
pub struct UsernameAuth {
    pub username: String,
    pub password: String,
}

impl Authentication for UsernameAuth {
    fn username(&self) -> Option<&str> {
        Some(&self.username)
    }

    fn password(&self) -> Option<&[u8]> {
        Some(self.password.as_bytes())
    }
}

#[derive(Clone, Debug)]
pub struct SelfSignedTls {
    pub root_ca: String,
    pub cert: String,
}

#[derive(Clone, Debug)]
pub enum TlsType {
    /// Signed by a public root CA (webpki-roots trust store).
    CaSigned,

    /// Single self-signed CA file, trusted explicitly.
    SelfSigned(SelfSignedTls),
}

#[derive(Clone, Debug, Default)]
pub struct MqttConnect {}

#[derive(Clone, Debug)]
pub struct MqttsConnect {
    pub domain: String,
    pub tls_type: TlsType,
}

#[derive(Clone, Debug)]
pub struct WsConnect {
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct WssConnect {
    pub domain: String,
    pub tls_type: TlsType,
    pub path: String,
}

/// The four URL schemes `mqtt`/`mqtts`/`ws`/`wss` (§6) carry different
/// per-scheme connection parameters (TLS domain for SNI, WebSocket path).
#[derive(Clone, Debug)]
pub enum ConnectType {
    Mqtt(MqttConnect),
    Mqtts(MqttsConnect),
    Ws(WsConnect),
    Wss(WssConnect),
}

impl ConnectType {
    /// The URL scheme this variant was built from (§6 connection URL
    /// grammar): `mqtt`/`mqtts`/`ws`/`wss`.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Mqtt(_) => "mqtt",
            Self::Mqtts(_) => "mqtts",
            Self::Ws(_) => "ws",
            Self::Wss(_) => "wss",
        }
    }

    /// WebSocket path, applicable to `Ws`/`Wss` only (§6).
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Mqtt(_) | Self::Mqtts(_) => None,
            Self::Ws(ws) => Some(&ws.path),
            Self::Wss(wss) => Some(&wss.path),
        }
    }
}

/// How the client's tick loop is driven (§5).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ThreadMode {
    /// Driven cooperatively from the host's own `tokio::select!` loop.
    HostLoop,
    /// A background task drives ticks and marshals callbacks back onto a
    /// channel the host polls.
    BackgroundWithCallbackMarshalling,
    /// A background task drives ticks and invokes callbacks directly from
    /// its own task.
    #[default]
    BackgroundWithoutCallbackMarshalling,
}

/// The closed configuration set (§6). Builder-style `set_*` methods return
/// `&mut Self`; `Default` matches the documented defaults.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    address: SocketAddr,
    connect_type: ConnectType,
    client_id: String,
    proxy: Proxy,
    auth: Option<Arc<dyn Authentication>>,

    packet_retry_interval: Duration,
    socket_connection_timeout: Duration,
    keep_alive_interval: Duration,
    mqtt_connection_timeout: Duration,
    initial_retry_connection_interval: Duration,
    max_connection_retries: u8,
    max_packet_retries: u8,
    max_packet_size: u32,
    protocol_version: ProtocolLevel,
    should_verify_certificate: bool,
    thread_mode: ThreadMode,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 1883)),
            connect_type: ConnectType::Mqtt(MqttConnect::default()),
            client_id: random_string(8),
            proxy: Proxy::None,
            auth: None,
            packet_retry_interval: Duration::from_secs(5),
            socket_connection_timeout: Duration::from_secs(10),
            keep_alive_interval: Duration::from_secs(120),
            mqtt_connection_timeout: Duration::from_secs(10),
            initial_retry_connection_interval: Duration::from_secs(3),
            max_connection_retries: 5,
            max_packet_retries: 5,
            max_packet_size: 1 << 20,
            protocol_version: ProtocolLevel::V5,
            should_verify_certificate: true,
            thread_mode: ThreadMode::default(),
        }
    }
}

impl ConnectOptions {
    /// # Errors
    ///
    /// Returns error if `address` does not resolve to at least one socket
    /// address.
    pub fn new<A: ToSocketAddrs>(address: A) -> io::Result<Self> {
        let mut addrs = address.to_socket_addrs()?;
        let address = addrs
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address resolved"))?;
        Ok(Self {
            address,
            ..Self::default()
        })
    }

    /// # Errors
    ///
    /// Returns error if `address` does not resolve.
    pub fn set_address<A: ToSocketAddrs>(&mut self, address: A) -> io::Result<&mut Self> {
        let mut address = address.to_socket_addrs()?;
        self.address = address
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address resolved"))?;
        Ok(self)
    }

    #[must_use]
    pub const fn address(&self) -> &SocketAddr {
        &self.address
    }

    pub fn set_connect_type(&mut self, connect_type: ConnectType) -> &mut Self {
        self.connect_type = connect_type;
        self
    }

    #[must_use]
    pub const fn connect_type(&self) -> &ConnectType {
        &self.connect_type
    }

    pub fn set_client_id(&mut self, client_id: &str) -> &mut Self {
        self.client_id = client_id.to_string();
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_proxy(&mut self, proxy: Proxy) -> &mut Self {
        self.proxy = proxy;
        self
    }

    #[must_use]
    pub const fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    /// Install a credential provider consulted for CONNECT's username/
    /// password fields (§6 `credentials provider`). Password rotation is
    /// the one setting mutable after construction (§4.6): swap in a new
    /// provider here rather than mutating the old one in place.
    pub fn set_auth(&mut self, auth: Option<Arc<dyn Authentication>>) -> &mut Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn auth(&self) -> Option<&Arc<dyn Authentication>> {
        self.auth.as_ref()
    }

    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.auth.as_ref().and_then(|a| a.username().map(str::to_string))
    }

    pub fn set_packet_retry_interval(&mut self, interval: Duration) -> &mut Self {
        self.packet_retry_interval = interval;
        self
    }

    #[must_use]
    pub const fn packet_retry_interval(&self) -> Duration {
        self.packet_retry_interval
    }

    pub fn set_socket_connection_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.socket_connection_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn socket_connection_timeout(&self) -> Duration {
        self.socket_connection_timeout
    }

    pub fn set_keep_alive_interval(&mut self, interval: Duration) -> &mut Self {
        self.keep_alive_interval = interval;
        self
    }

    #[must_use]
    pub const fn keep_alive_interval(&self) -> Duration {
        self.keep_alive_interval
    }

    pub fn set_mqtt_connection_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.mqtt_connection_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn mqtt_connection_timeout(&self) -> Duration {
        self.mqtt_connection_timeout
    }

    pub fn set_initial_retry_connection_interval(&mut self, interval: Duration) -> &mut Self {
        self.initial_retry_connection_interval = interval;
        self
    }

    #[must_use]
    pub const fn initial_retry_connection_interval(&self) -> Duration {
        self.initial_retry_connection_interval
    }

    pub fn set_max_connection_retries(&mut self, retries: u8) -> &mut Self {
        self.max_connection_retries = retries;
        self
    }

    #[must_use]
    pub const fn max_connection_retries(&self) -> u8 {
        self.max_connection_retries
    }

    pub fn set_max_packet_retries(&mut self, retries: u8) -> &mut Self {
        self.max_packet_retries = retries;
        self
    }

    #[must_use]
    pub const fn max_packet_retries(&self) -> u8 {
        self.max_packet_retries
    }

    pub fn set_max_packet_size(&mut self, max_packet_size: u32) -> &mut Self {
        self.max_packet_size = max_packet_size;
        self
    }

    #[must_use]
    pub const fn max_packet_size(&self) -> u32 {
        self.max_packet_size
    }

    pub fn set_protocol_version(&mut self, version: ProtocolLevel) -> &mut Self {
        self.protocol_version = version;
        self
    }

    #[must_use]
    pub const fn protocol_version(&self) -> ProtocolLevel {
        self.protocol_version
    }

    pub fn set_should_verify_certificate(&mut self, verify: bool) -> &mut Self {
        self.should_verify_certificate = verify;
        self
    }

    #[must_use]
    pub const fn should_verify_certificate(&self) -> bool {
        self.should_verify_certificate
    }

    pub fn set_thread_mode(&mut self, mode: ThreadMode) -> &mut Self {
        self.thread_mode = mode;
        self
    }

    #[must_use]
    pub const fn thread_mode(&self) -> ThreadMode {
        self.thread_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_closed_set() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.packet_retry_interval(), Duration::from_secs(5));
        assert_eq!(opts.keep_alive_interval(), Duration::from_secs(120));
        assert_eq!(opts.max_connection_retries(), 5);
        assert_eq!(opts.max_packet_retries(), 5);
        assert_eq!(opts.max_packet_size(), 1 << 20);
        assert_eq!(opts.protocol_version(), ProtocolLevel::V5);
        assert!(opts.should_verify_certificate());
    }
}
