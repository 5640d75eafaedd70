// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! §4.9: fingerprint-keyed client cache with shared ticking. Deduplicates
//! `Client` instances so repeated `get_or_create` calls with equivalent
//! connection parameters (§3 `Fingerprint`) reuse one open connection
//! instead of opening a second one to the same broker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::client::Client;
use crate::connect_options::{ConnectOptions, ThreadMode};
use crate::fingerprint::Fingerprint;
use crate::transport::Transport;

const TICK_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / 60);

struct Inner {
    clients: HashMap<Fingerprint, Weak<Client>>,
    ticker: Option<JoinHandle<()>>,
}

/// A weak `fingerprint -> Client` map plus the ~60 Hz background ticker
/// that drives every live client's retry/keep-alive timers (§4.9, §5).
/// The ticker is spawned lazily on first use and stops itself once the
/// last client is dropped.
pub struct ClientPool {
    inner: Mutex<Inner>,
}

impl ClientPool {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                clients: HashMap::new(),
                ticker: None,
            }),
        })
    }

    /// Returns the existing client for `options`'s fingerprint if its weak
    /// reference is still alive, otherwise builds one via `make_transport`
    /// and registers it.
    pub fn get_or_create<F>(self: &Arc<Self>, options: ConnectOptions, make_transport: F) -> Arc<Client>
    where
        F: FnOnce(&ConnectOptions) -> Box<dyn Transport>,
    {
        let fingerprint = Fingerprint::new(&options);
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .clients
            .get(&fingerprint)
            .and_then(Weak::upgrade)
        {
            return existing;
        }
        let transport = make_transport(&options);
        let client = Arc::new(Client::new(options, transport));
        inner.clients.insert(fingerprint, Arc::downgrade(&client));
        let needs_ticker = inner.ticker.is_none();
        drop(inner);
        if needs_ticker {
            self.spawn_ticker();
        }
        client
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_ticker(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                let now = Instant::now();
                let mut inner = pool.inner.lock().unwrap();
                inner.clients.retain(|_, weak| match weak.upgrade() {
                    Some(client) => {
                        if client.thread_mode() != ThreadMode::HostLoop {
                            client.tick(now);
                        }
                        true
                    }
                    None => false,
                });
                let empty = inner.clients.is_empty();
                if empty {
                    inner.ticker = None;
                    break;
                }
            }
        });
        self.inner.lock().unwrap().ticker = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Transport, TransportEvent};
    use tokio::sync::mpsc;

    struct NullTransport;

    impl Transport for NullTransport {
        fn connect(&mut self) {}
        fn disconnect(&mut self) {}
        fn is_connected(&self) -> bool {
            false
        }
        fn send(&mut self, _bytes: &[u8]) -> std::io::Result<()> {
            Ok(())
        }
        fn bind(&mut self, _events: mpsc::UnboundedSender<TransportEvent>) {}
    }

    #[tokio::test]
    async fn equivalent_settings_reuse_the_same_client() {
        let pool = ClientPool::new();
        let a = pool.get_or_create(ConnectOptions::default(), |_| Box::new(NullTransport));
        let b = pool.get_or_create(ConnectOptions::default(), |_| Box::new(NullTransport));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn differing_settings_create_distinct_clients() {
        let pool = ClientPool::new();
        let mut other = ConnectOptions::default();
        other.set_address(("127.0.0.1", 18830)).unwrap();
        let a = pool.get_or_create(ConnectOptions::default(), |_| Box::new(NullTransport));
        let b = pool.get_or_create(other, |_| Box::new(NullTransport));
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(pool.len(), 2);
    }
}
