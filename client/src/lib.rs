// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! An MQTT v3.1.1/v5.0 client library: wire codec in [`codec`], and here the
//! client-side state machine, in-flight command engine, packet identifier
//! pool, and client pool described in the crate's design notes (`DESIGN.md`).

pub mod client;
pub mod clock;
pub mod command;
pub mod connect_options;
pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod id_pool;
pub mod in_flight;
pub mod message;
pub mod net_transport;
pub mod pool;
pub mod session;
pub mod signals;
pub mod state;
pub mod subscription;
pub mod transport;

pub use client::Client;
pub use dispatch::MessageDelegate;
pub use connect_options::{
    Authentication, ConnectOptions, ConnectType, HttpProxy, MqttConnect, MqttsConnect, Proxy,
    SelfSignedTls, Socks5Proxy, ThreadMode, TlsType, UsernameAuth, WsConnect, WssConnect,
};
pub use error::{Error, ErrorKind, Result};
pub use fingerprint::Fingerprint;
pub use message::Message;
pub use net_transport::NetTransport;
pub use pool::ClientPool;
pub use subscription::{SubscribeResult, TopicFilter, UnsubscribeResult};
pub use transport::Transport;
