// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Real [`Transport`] over plain TCP, TLS (`tokio-rustls`), or WebSocket
//! (`tokio-tungstenite`), selected from a parsed [`ConnectType`]. Grounded
//! in `ruo::stream::Stream`'s per-scheme enum, rebuilt against an async,
//! event-driven `Transport` contract instead of a blocking `read_buf` loop.

use std::fs::File;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::MaybeTlsStream;

use crate::connect_options::{ConnectType, TlsType};
use crate::transport::{Transport, TransportEvent};

enum Conn {
    Tcp(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
    Ws(tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>),
}

/// Socket-carrying [`Transport`] implementation. `connect`/`disconnect` are
/// fire-and-forget: each spawns a task that reports back through the
/// channel registered by [`Transport::bind`].
pub struct NetTransport {
    address: SocketAddr,
    connect_type: ConnectType,
    should_verify_certificate: bool,
    socket_connection_timeout: Duration,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    connected: Arc<std::sync::atomic::AtomicBool>,
}

impl NetTransport {
    #[must_use]
    pub fn new(
        address: SocketAddr,
        connect_type: ConnectType,
        should_verify_certificate: bool,
        socket_connection_timeout: Duration,
    ) -> Self {
        Self {
            address,
            connect_type,
            should_verify_certificate,
            socket_connection_timeout,
            events: None,
            outbound: None,
            connected: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    fn tls_connector(root_ca_pem: Option<&str>) -> io::Result<TlsConnector> {
        let mut roots = rustls::RootCertStore::empty();
        if let Some(path) = root_ca_pem {
            let mut fd = File::open(path)?;
            let mut buf = Vec::new();
            fd.read_to_end(&mut buf)?;
            let mut cursor = io::Cursor::new(buf);
            let der_certs = rustls_pemfile::certs(&mut cursor)?;
            for der in der_certs {
                roots
                    .add(&rustls::Certificate(der))
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            }
        } else {
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
        }
        let config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(TlsConnector::from(Arc::new(config)))
    }

    async fn dial(
        address: SocketAddr,
        connect_type: ConnectType,
        should_verify_certificate: bool,
    ) -> io::Result<Conn> {
        match connect_type {
            ConnectType::Mqtt(_) => Ok(Conn::Tcp(TcpStream::connect(address).await?)),
            ConnectType::Mqtts(mqtts) => {
                let root_ca = match (&mqtts.tls_type, should_verify_certificate) {
                    (TlsType::SelfSigned(self_signed), _) => Some(self_signed.root_ca.clone()),
                    (TlsType::CaSigned, _) => None,
                };
                let connector = Self::tls_connector(root_ca.as_deref())?;
                let socket = TcpStream::connect(address).await?;
                let domain = rustls::ServerName::try_from(mqtts.domain.as_str())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
                let socket = connector.connect(domain, socket).await?;
                Ok(Conn::Tls(socket))
            }
            ConnectType::Ws(ws) => {
                let url = format!("ws://{address}{}", ws.path);
                let socket = TcpStream::connect(address).await?;
                let (stream, _response) =
                    tokio_tungstenite::client_async(url, MaybeTlsStream::Plain(socket))
                        .await
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
                Ok(Conn::Ws(stream))
            }
            ConnectType::Wss(wss) => {
                let root_ca = match &wss.tls_type {
                    TlsType::SelfSigned(self_signed) => Some(self_signed.root_ca.clone()),
                    TlsType::CaSigned => None,
                };
                let connector = Self::tls_connector(root_ca.as_deref())?;
                let socket = TcpStream::connect(address).await?;
                let domain = rustls::ServerName::try_from(wss.domain.as_str())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
                let tls_socket = connector.connect(domain, socket).await?;
                let url = format!("wss://{}{}", wss.domain, wss.path);
                let (stream, _response) =
                    tokio_tungstenite::client_async(url, MaybeTlsStream::Rustls(tls_socket))
                        .await
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
                Ok(Conn::Ws(stream))
            }
        }
    }

    async fn pump(mut conn: Conn, events: mpsc::UnboundedSender<TransportEvent>, mut outbound: mpsc::UnboundedReceiver<Vec<u8>>) {
        let mut buf = [0_u8; 4096];
        loop {
            tokio::select! {
                to_send = outbound.recv() => {
                    let Some(bytes) = to_send else { break };
                    if Self::write_all(&mut conn, &bytes).await.is_err() {
                        break;
                    }
                }
                read = Self::read_some(&mut conn, &mut buf) => {
                    match read {
                        Ok(0) => break,
                        Ok(n) => {
                            if events.send(TransportEvent::Bytes(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
        }
        let _ = events.send(TransportEvent::Disconnected);
    }

    async fn read_some(conn: &mut Conn, buf: &mut [u8]) -> io::Result<usize> {
        match conn {
            Conn::Tcp(socket) => socket.read(buf).await,
            Conn::Tls(socket) => socket.read(buf).await,
            Conn::Ws(ws) => match ws.next().await {
                Some(Ok(msg)) => {
                    let data = msg.into_data();
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
                None => Ok(0),
            },
        }
    }

    async fn write_all(conn: &mut Conn, bytes: &[u8]) -> io::Result<()> {
        match conn {
            Conn::Tcp(socket) => socket.write_all(bytes).await,
            Conn::Tls(socket) => socket.write_all(bytes).await,
            Conn::Ws(ws) => ws
                .send(WsMessage::binary(bytes.to_vec()))
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string())),
        }
    }
}

impl Transport for NetTransport {
    fn connect(&mut self) {
        let Some(events) = self.events.clone() else {
            return;
        };
        let address = self.address;
        let connect_type = self.connect_type.clone();
        let should_verify_certificate = self.should_verify_certificate;
        let socket_connection_timeout = self.socket_connection_timeout;
        let connected = Arc::clone(&self.connected);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);

        tokio::spawn(async move {
            let dial = Self::dial(address, connect_type, should_verify_certificate);
            match tokio::time::timeout(socket_connection_timeout, dial).await {
                Ok(Ok(conn)) => {
                    connected.store(true, std::sync::atomic::Ordering::SeqCst);
                    let _ = events.send(TransportEvent::Connected { success: true });
                    Self::pump(conn, events, outbound_rx).await;
                    connected.store(false, std::sync::atomic::Ordering::SeqCst);
                }
                Ok(Err(err)) => {
                    log::warn!("NetTransport: connect failed: {err}");
                    let _ = events.send(TransportEvent::Connected { success: false });
                }
                Err(_) => {
                    log::warn!("NetTransport: connect timed out after {socket_connection_timeout:?}");
                    let _ = events.send(TransportEvent::Connected { success: false });
                }
            }
        });
    }

    fn disconnect(&mut self) {
        self.outbound = None;
        self.connected.store(false, std::sync::atomic::Ordering::SeqCst);
        if let Some(events) = &self.events {
            let _ = events.send(TransportEvent::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        match &self.outbound {
            Some(tx) => tx
                .send(bytes.to_vec())
                .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "transport not connected")),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "transport not connected")),
        }
    }

    fn bind(&mut self, events: mpsc::UnboundedSender<TransportEvent>) {
        self.events = Some(events);
    }
}
