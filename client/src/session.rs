// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! §4.6: per-client shared state the `ClientStateMachine` and its
//! `Command`s operate on: settings, the in-flight registry, the id pool,
//! topic dispatch, and the pending connect/disconnect promise slots.

use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::oneshot;

use codec::PacketId;

use crate::command::{Command, Inbound, RetryPolicy};
use crate::connect_options::ConnectOptions;
use crate::dispatch::{Dispatcher, MessageDelegate};
use crate::error::{ErrorKind, Result};
use crate::id_pool::IdPool;
use crate::in_flight::InFlightRegistry;
use crate::message::Message;

pub struct SessionContext {
    pub options: Mutex<ConnectOptions>,
    pub id_pool: IdPool,
    pub in_flight: InFlightRegistry,
    dispatcher: Mutex<Dispatcher>,
    on_message: Mutex<Option<MessageDelegate>>,
    pending_connect: Mutex<Vec<oneshot::Sender<Result<()>>>>,
    pending_disconnect: Mutex<Vec<oneshot::Sender<Result<()>>>>,
}

impl SessionContext {
    #[must_use]
    pub fn new(options: ConnectOptions) -> Self {
        Self {
            options: Mutex::new(options),
            id_pool: IdPool::new(),
            in_flight: InFlightRegistry::new(),
            dispatcher: Mutex::new(Dispatcher::new()),
            on_message: Mutex::new(None),
            pending_connect: Mutex::new(Vec::new()),
            pending_disconnect: Mutex::new(Vec::new()),
        }
    }

    /// # Errors
    ///
    /// Returns [`ErrorKind::IdPoolExhausted`] if every identifier is
    /// currently in use.
    pub fn next_id(&self) -> Result<PacketId> {
        self.id_pool.allocate().map_err(|_| {
            crate::error::Error::new(ErrorKind::IdPoolExhausted, "packet identifier pool exhausted")
        })
    }

    pub fn release(&self, id: PacketId) {
        self.id_pool.release(id);
    }

    pub fn add_outbound(&self, cmd: Box<dyn Command>) {
        self.in_flight.insert_outbound(cmd);
    }

    pub fn add_inbound(&self, id: PacketId, cmd: Box<dyn Command>) {
        self.in_flight.insert_inbound(id, cmd);
    }

    #[must_use]
    pub fn has_inbound(&self, id: PacketId) -> bool {
        self.in_flight.contains_inbound(id)
    }

    pub fn acknowledge(&self, id: PacketId, inbound: &Inbound<'_>) {
        for released in self.in_flight.acknowledge(id, inbound) {
            self.release(released);
        }
    }

    pub fn tick_commands(&self, now: Instant, policy: RetryPolicy) -> Vec<Vec<u8>> {
        self.in_flight.tick_all(now, policy, &self.id_pool)
    }

    pub fn abandon_all(&self, reason: ErrorKind) {
        self.in_flight.abandon_all(reason, &self.id_pool);
    }

    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidInput`] if `filter` is malformed.
    pub fn register_delegate(&self, filter: &str, delegate: MessageDelegate) -> Result<()> {
        self.dispatcher
            .lock()
            .unwrap()
            .register(filter, delegate)
            .map_err(|e| crate::error::Error::new(ErrorKind::InvalidInput, format!("{e:?}")))
    }

    pub fn clear_delegates(&self, filters: &[String]) {
        self.dispatcher.lock().unwrap().clear(filters);
    }

    pub fn set_on_message(&self, delegate: Option<MessageDelegate>) {
        *self.on_message.lock().unwrap() = delegate;
    }

    #[must_use]
    pub fn get_message_delegate(&self, filter: &str) -> Option<MessageDelegate> {
        self.dispatcher.lock().unwrap().get(filter)
    }

    /// Invoke every filter delegate matching `message`'s topic plus the
    /// union `on_message` delegate, if registered (§4.6).
    pub fn deliver(&self, message: &Message) {
        let matching = self.dispatcher.lock().unwrap().matching(message.topic());
        for delegate in matching {
            delegate(message);
        }
        if let Some(delegate) = self.on_message.lock().unwrap().as_ref() {
            delegate(message);
        }
    }

    pub fn push_pending_connect(&self, tx: oneshot::Sender<Result<()>>) {
        self.pending_connect.lock().unwrap().push(tx);
    }

    pub fn push_pending_disconnect(&self, tx: oneshot::Sender<Result<()>>) {
        self.pending_disconnect.lock().unwrap().push(tx);
    }

    pub fn complete_connect(&self, result: Result<()>) {
        for tx in self.pending_connect.lock().unwrap().drain(..) {
            let _ = tx.send(result.clone());
        }
    }

    pub fn complete_disconnect(&self, result: Result<()>) {
        for tx in self.pending_disconnect.lock().unwrap().drain(..) {
            let _ = tx.send(result.clone());
        }
    }
}
