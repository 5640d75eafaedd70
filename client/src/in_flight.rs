// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! §4.3: maps a 32-bit key to a pending [`Command`], routing inbound
//! acknowledgements to the command awaiting them.
//!
//! The key encodes direction so outbound and inbound-QoS2 bookkeeping can
//! share one map without colliding: outbound commands key on `packet_id`
//! directly; inbound-QoS2 records (the client's own PUBREC/PUBREL exchange
//! for a PUBLISH it received) key on `packet_id << 16` (§9 open question --
//! a cleaner implementation might use two disjoint maps instead, which is
//! equivalent only as long as this shift is applied consistently on both
//! sides).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use codec::PacketId;

use crate::command::{Command, Inbound, RetryPolicy, TickOutcome};
use crate::error::ErrorKind;
use crate::id_pool::IdPool;

fn outbound_key(id: PacketId) -> u32 {
    u32::from(id.value())
}

fn inbound_key(id: PacketId) -> u32 {
    u32::from(id.value()) << 16
}

/// Outbound keys fit in the low 16 bits; inbound keys never do. Used to
/// decide whether a finished command's id came out of our own `IdPool` (and
/// so must be released back to it) or was assigned by the broker.
fn is_outbound_key(key: u32) -> bool {
    key < (1 << 16)
}

pub struct InFlightRegistry {
    commands: Mutex<HashMap<u32, Box<dyn Command>>>,
}

impl InFlightRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(HashMap::new()),
        }
    }

    /// Register an outbound command (PUBLISH QoS>0, SUBSCRIBE, UNSUBSCRIBE,
    /// PINGREQ), keyed on its own packet id.
    pub fn insert_outbound(&self, cmd: Box<dyn Command>) {
        let key = outbound_key(cmd.packet_id());
        self.commands.lock().unwrap().insert(key, cmd);
    }

    /// Register an inbound-QoS2 bookkeeping record, keyed with the `<<16`
    /// shift so it cannot collide with an outbound command on the same id.
    pub fn insert_inbound(&self, id: PacketId, cmd: Box<dyn Command>) {
        self.commands.lock().unwrap().insert(inbound_key(id), cmd);
    }

    #[must_use]
    pub fn contains_inbound(&self, id: PacketId) -> bool {
        self.commands.lock().unwrap().contains_key(&inbound_key(id))
    }

    /// Route an inbound ack/response to the command awaiting it. PUBREL is
    /// remapped through the inbound-QoS2 key space; everything else is
    /// looked up directly by packet id (PINGRESP has no id and is routed by
    /// the caller against whichever `PingReq` is outstanding).
    pub fn acknowledge(&self, id: PacketId, inbound: &Inbound<'_>) -> Vec<PacketId> {
        let key = if matches!(inbound, Inbound::PubRel(_)) {
            inbound_key(id)
        } else {
            outbound_key(id)
        };
        let mut commands = self.commands.lock().unwrap();
        let mut released = Vec::new();
        if let Some(cmd) = commands.get_mut(&key) {
            if cmd.acknowledge(inbound) == TickOutcome::Done {
                commands.remove(&key);
                if is_outbound_key(key) {
                    released.push(id);
                }
            }
        }
        released
    }

    /// Drive every in-flight command's retry timer, removing (and
    /// returning the bytes to send for) commands still in progress, and
    /// releasing the identifiers of those that just terminated.
    pub fn tick_all(&self, now: Instant, policy: RetryPolicy, id_pool: &IdPool) -> Vec<Vec<u8>> {
        let mut commands = self.commands.lock().unwrap();
        let mut to_send = Vec::new();
        let mut finished = Vec::new();
        for (key, cmd) in commands.iter_mut() {
            let result = cmd.tick(now, policy);
            if let Some(bytes) = result.to_send {
                to_send.push(bytes);
            }
            if result.outcome == Some(TickOutcome::Done) {
                finished.push(*key);
            }
        }
        for key in finished {
            if let Some(cmd) = commands.remove(&key) {
                if is_outbound_key(key) {
                    id_pool.release(cmd.packet_id());
                }
            }
        }
        to_send
    }

    /// Terminal failure for every command still pending, e.g. on
    /// disconnect; each command's promise resolves with `reason`. Only
    /// outbound commands release an id back to the pool -- inbound-QoS2
    /// bookkeeping never held one of ours to begin with.
    pub fn abandon_all(&self, reason: ErrorKind, id_pool: &IdPool) {
        let mut commands = self.commands.lock().unwrap();
        for (key, mut cmd) in commands.drain() {
            cmd.abandon(reason);
            if is_outbound_key(key) {
                id_pool.release(cmd.packet_id());
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InFlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}
