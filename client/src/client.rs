// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! §6 PublicApi: the user-facing handle wrapping the `Driver` task (§4.7)
//! and `SessionContext` (§4.6). This is the type applications hold and the
//! type `ClientPool` (§4.9) deduplicates by fingerprint.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::clock::{Clock, SystemClock};
use crate::connect_options::{ConnectOptions, ThreadMode};
use crate::dispatch::MessageDelegate;
use crate::error::{Error, ErrorKind, Result};
use crate::fingerprint::Fingerprint;
use crate::message::Message;
use crate::session::SessionContext;
use crate::signals::{
    ConnectSignal, DisconnectSignal, PublishSignal, Signals, SubscribeSignal, UnsubscribeSignal,
};
use crate::state::{ClientRequest, Driver};
use crate::subscription::{SubscribeResult, TopicFilter, UnsubscribeResult};
use crate::transport::{Transport, TransportAdapter};

/// A single MQTT session handle. Cloning a `Client` shares the same driver
/// task, session state, and signal registrations -- it is a cheap handle,
/// not a second connection.
#[derive(Clone)]
pub struct Client {
    session: Arc<SessionContext>,
    signals: Arc<Mutex<Signals>>,
    requests: mpsc::UnboundedSender<ClientRequest>,
    ticks: mpsc::UnboundedSender<Instant>,
    fingerprint: Fingerprint,
}

impl Client {
    /// Build a client over `transport` and spawn its driver task. `options`
    /// is consumed into the session; `fingerprint()` is captured from it
    /// beforehand so `ClientPool` can key on it without re-reading options
    /// back out through the session lock.
    #[must_use]
    pub fn new(options: ConnectOptions, transport: Box<dyn Transport>) -> Self {
        Self::with_clock(options, transport, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(options: ConnectOptions, transport: Box<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let fingerprint = Fingerprint::new(&options);
        let max_packet_size = options.max_packet_size() as usize;
        let session = Arc::new(SessionContext::new(options));
        let signals = Arc::new(Mutex::new(Signals::default()));
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let adapter = TransportAdapter::new(transport, max_packet_size);
        let driver = Driver::new(
            Arc::clone(&session),
            adapter,
            clock,
            Arc::clone(&signals),
            req_rx,
            tick_rx,
        );
        tokio::spawn(driver.run());
        Self {
            session,
            signals,
            requests: req_tx,
            ticks: tick_tx,
            fingerprint,
        }
    }

    #[must_use]
    pub const fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    #[must_use]
    pub fn thread_mode(&self) -> ThreadMode {
        self.session.options.lock().unwrap().thread_mode()
    }

    /// Drive the client's retry/keep-alive/reconnect timers one step (§5).
    /// Called by `ClientPool`'s shared ticker under the `Background*`
    /// thread modes, or directly by the host's own loop under
    /// `ThreadMode::HostLoop`.
    pub fn tick(&self, now: Instant) {
        let _ = self.ticks.send(now);
    }

    /// The `on_connect` signal (§6) fires from the driver task itself as
    /// part of the CONNACK/retry-exhaustion transition, not from here --
    /// firing it again after this call's own promise resolves would signal
    /// the same lifecycle event twice.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::TransportUnavailable`] if the driver task has
    /// already exited.
    pub async fn connect(&self, clean_session: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientRequest::Connect { clean_session, reply })?;
        rx.await.map_err(|_| dropped())?
    }

    /// See [`Self::connect`]'s note on `on_disconnect` firing from the
    /// driver task, not here.
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientRequest::Disconnect { reply })?;
        rx.await.map_err(|_| dropped())?
    }

    /// # Errors
    ///
    /// See [`Self::connect`]; also fails with [`ErrorKind::InvalidInput`]
    /// for a malformed topic and [`ErrorKind::IdPoolExhausted`] at QoS>0
    /// when no packet identifier is free.
    pub async fn publish(&self, message: Message) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientRequest::Publish { message, reply })?;
        let result = rx.await.map_err(|_| dropped())?;
        self.signals.lock().unwrap().fire_publish(result.is_ok());
        result
    }

    /// Registers each filter's delegate with the dispatcher (§4.5/§4.6)
    /// before issuing SUBSCRIBE, so no inbound PUBLISH can race ahead of
    /// dispatch wiring once the broker's SUBACK arrives.
    ///
    /// # Errors
    ///
    /// See [`Self::connect`]; also fails with [`ErrorKind::InvalidInput`]
    /// if `filters` is empty or any filter is malformed.
    pub async fn subscribe(
        &self,
        filters: Vec<(TopicFilter, MessageDelegate)>,
    ) -> Result<Vec<SubscribeResult>> {
        if filters.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "no filters given"));
        }
        let mut names = Vec::with_capacity(filters.len());
        for (filter, delegate) in filters {
            self.session.register_delegate(filter.filter(), delegate)?;
            names.push(filter);
        }
        let (reply, rx) = oneshot::channel();
        self.send(ClientRequest::Subscribe { filters: names, reply })?;
        let result = rx.await.map_err(|_| dropped())?;
        if let Ok(results) = &result {
            self.signals.lock().unwrap().fire_subscribe(results);
        }
        result
    }

    /// # Errors
    ///
    /// See [`Self::subscribe`].
    pub async fn unsubscribe(&self, filters: Vec<TopicFilter>) -> Result<Vec<UnsubscribeResult>> {
        if filters.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "no filters given"));
        }
        let (reply, rx) = oneshot::channel();
        self.send(ClientRequest::Unsubscribe { filters, reply })?;
        let result = rx.await.map_err(|_| dropped())?;
        if let Ok(results) = &result {
            self.signals.lock().unwrap().fire_unsubscribe(results);
        }
        result
    }

    pub fn set_on_connect(&self, f: ConnectSignal) {
        self.signals.lock().unwrap().on_connect = Some(f);
    }

    pub fn set_on_disconnect(&self, f: DisconnectSignal) {
        self.signals.lock().unwrap().on_disconnect = Some(f);
    }

    pub fn set_on_publish(&self, f: PublishSignal) {
        self.signals.lock().unwrap().on_publish = Some(f);
    }

    pub fn set_on_subscribe(&self, f: SubscribeSignal) {
        self.signals.lock().unwrap().on_subscribe = Some(f);
    }

    pub fn set_on_unsubscribe(&self, f: UnsubscribeSignal) {
        self.signals.lock().unwrap().on_unsubscribe = Some(f);
    }

    /// Registers the union delegate fired for every delivered message in
    /// addition to any per-filter delegate registered through
    /// [`Self::subscribe`] (§4.6 `deliver`).
    pub fn set_on_message(&self, f: MessageDelegate) {
        self.session.set_on_message(Some(f));
    }

    fn send(&self, request: ClientRequest) -> Result<()> {
        self.requests.send(request).map_err(|_| dropped())
    }
}

fn dropped() -> Error {
    Error::new(ErrorKind::TransportUnavailable, "client driver task has exited")
}
