// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! §4.4: the abstract retry-capable operation and its concrete sub-state
//! machines. Each `Command` owns exactly one outstanding wire exchange for
//! one packet identifier; `SessionContext`/`InFlightRegistry` own the
//! `Command` trait objects and drive them from the tick loop.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::oneshot;

use codec::{
    EncodePacket, PacketId, ProtocolLevel, PublishAckPacket, PublishCompletePacket, PublishPacket,
    PublishReceivedPacket, PublishReleasePacket, ReasonCode, SubscribeAckPacket, SubscribePacket,
    UnsubscribeAckPacket, UnsubscribePacket,
};

use crate::error::{Error, ErrorKind, Result};
use crate::subscription::{SubscribeResult, UnsubscribeResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Busy,
    Done,
}

/// Outcome of a single [`Command::tick`] invocation.
#[derive(Debug, Default)]
pub struct TickResult {
    pub outcome: Option<TickOutcome>,
    pub to_send: Option<Vec<u8>>,
}

impl TickResult {
    fn busy(to_send: Option<Vec<u8>>) -> Self {
        Self {
            outcome: Some(TickOutcome::Busy),
            to_send,
        }
    }

    fn done(to_send: Option<Vec<u8>>) -> Self {
        Self {
            outcome: Some(TickOutcome::Done),
            to_send,
        }
    }

    fn idle() -> Self {
        Self {
            outcome: Some(TickOutcome::Busy),
            to_send: None,
        }
    }
}

/// Shared retry discipline (§4.4): `now + min(base * 2^attempt, max) +
/// uniform(0,1)` jitter, `max_retries` bounding the command's lifetime.
/// `base` comes from `initial_retry_connection_interval`; `PingReq`'s flat,
/// non-exponential keep-alive deadline is not built from this type (see its
/// own `tick`, sourced from `packet_retry_interval` instead).
///
/// The backoff multiplier (2.0) and interval cap are fixed constants rather
/// than configuration: §6's closed configuration set names
/// `initial_retry_connection_interval_seconds` and `max_packet_retries`
/// only.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub base_interval: Duration,
    pub max_retries: u8,
}

const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(60);

impl RetryPolicy {
    fn deadline_after(self, now: Instant, attempt: u8) -> Instant {
        let exp = 2u32.saturating_pow(u32::from(attempt.saturating_sub(1)));
        let backoff = self
            .base_interval
            .saturating_mul(exp)
            .min(MAX_RETRY_INTERVAL);
        let jitter = Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..1.0));
        now + backoff + jitter
    }
}

/// The set of inbound packets a `Command` may be asked to acknowledge.
pub enum Inbound<'a> {
    PubAck(&'a PublishAckPacket),
    PubRec(&'a PublishReceivedPacket),
    PubRel(&'a PublishReleasePacket),
    PubComp(&'a PublishCompletePacket),
    SubAck(&'a SubscribeAckPacket),
    UnsubAck(&'a UnsubscribeAckPacket),
    PingResp,
}

pub trait Command: Send {
    fn packet_id(&self) -> PacketId;

    /// Called periodically; sends (or resends) the current wire packet once
    /// the retry deadline has passed, including on the very first call.
    fn tick(&mut self, now: Instant, policy: RetryPolicy) -> TickResult;

    /// Called when an inbound packet's id matches this command.
    fn acknowledge(&mut self, inbound: &Inbound<'_>) -> TickOutcome;

    /// Terminal failure: fulfills the command's promise with `reason`.
    fn abandon(&mut self, reason: ErrorKind);
}

fn fulfil<T>(promise: &mut Option<oneshot::Sender<Result<T>>>, value: Result<T>) {
    if let Some(tx) = promise.take() {
        let _ = tx.send(value);
    }
}

/// QoS 1 PUBLISH handshake (§4.4): `Unacknowledged -> Complete` on PUBACK.
pub struct PublishQos1 {
    packet: PublishPacket,
    attempts: u8,
    deadline: Option<Instant>,
    complete: bool,
    promise: Option<oneshot::Sender<Result<()>>>,
}

impl PublishQos1 {
    #[must_use]
    pub fn new(packet: PublishPacket, promise: oneshot::Sender<Result<()>>) -> Self {
        Self {
            packet,
            attempts: 0,
            deadline: None,
            complete: false,
            promise: Some(promise),
        }
    }
}

impl Command for PublishQos1 {
    fn packet_id(&self) -> PacketId {
        self.packet.packet_id()
    }

    fn tick(&mut self, now: Instant, policy: RetryPolicy) -> TickResult {
        if self.complete {
            return TickResult::done(None);
        }
        if matches!(self.deadline, Some(d) if now < d) {
            return TickResult::idle();
        }
        if self.attempts >= policy.max_retries {
            self.abandon(ErrorKind::RetryExhausted);
            return TickResult::done(None);
        }
        if self.attempts > 0 {
            let _ = self.packet.set_dup(true);
        }
        self.attempts += 1;
        self.deadline = Some(policy.deadline_after(now, self.attempts));
        let mut buf = Vec::new();
        let _ = self.packet.encode(&mut buf);
        TickResult::busy(Some(buf))
    }

    fn acknowledge(&mut self, inbound: &Inbound<'_>) -> TickOutcome {
        match inbound {
            Inbound::PubAck(ack) if ack.packet_id() == self.packet.packet_id() => {
                self.complete = true;
                fulfil(&mut self.promise, Ok(()));
                TickOutcome::Done
            }
            _ => {
                self.abandon(ErrorKind::ProtocolViolation);
                TickOutcome::Done
            }
        }
    }

    fn abandon(&mut self, reason: ErrorKind) {
        self.complete = true;
        fulfil(&mut self.promise, Err(Error::new(reason, "publish qos1 abandoned")));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Qos2State {
    Unacknowledged,
    Received,
    Complete,
}

/// QoS 2 PUBLISH handshake (§4.4): `Unacknowledged -> Received -> Complete`.
/// The user promise resolves on PUBREC -- ownership of the message has
/// passed to the broker -- not on the later PUBCOMP (§9 open question,
/// resolved in favor of the source's existing behavior).
pub struct PublishQos2 {
    publish: PublishPacket,
    release: PublishReleasePacket,
    state: Qos2State,
    attempts: u8,
    deadline: Option<Instant>,
    promise: Option<oneshot::Sender<Result<()>>>,
}

impl PublishQos2 {
    #[must_use]
    pub fn new(publish: PublishPacket, level: ProtocolLevel, promise: oneshot::Sender<Result<()>>) -> Self {
        let release = PublishReleasePacket::new(publish.packet_id(), level);
        Self {
            publish,
            release,
            state: Qos2State::Unacknowledged,
            attempts: 0,
            deadline: None,
            promise: Some(promise),
        }
    }
}

impl Command for PublishQos2 {
    fn packet_id(&self) -> PacketId {
        self.publish.packet_id()
    }

    fn tick(&mut self, now: Instant, policy: RetryPolicy) -> TickResult {
        match self.state {
            Qos2State::Complete => TickResult::done(None),
            Qos2State::Unacknowledged => {
                if matches!(self.deadline, Some(d) if now < d) {
                    return TickResult::idle();
                }
                if self.attempts >= policy.max_retries {
                    self.abandon(ErrorKind::RetryExhausted);
                    return TickResult::done(None);
                }
                if self.attempts > 0 {
                    let _ = self.publish.set_dup(true);
                }
                self.attempts += 1;
                self.deadline = Some(policy.deadline_after(now, self.attempts));
                let mut buf = Vec::new();
                let _ = self.publish.encode(&mut buf);
                TickResult::busy(Some(buf))
            }
            Qos2State::Received => {
                if matches!(self.deadline, Some(d) if now < d) {
                    return TickResult::idle();
                }
                if self.attempts >= policy.max_retries {
                    self.abandon(ErrorKind::RetryExhausted);
                    return TickResult::done(None);
                }
                self.attempts += 1;
                self.deadline = Some(policy.deadline_after(now, self.attempts));
                let mut buf = Vec::new();
                let _ = self.release.encode(&mut buf);
                TickResult::busy(Some(buf))
            }
        }
    }

    fn acknowledge(&mut self, inbound: &Inbound<'_>) -> TickOutcome {
        match (self.state, inbound) {
            (Qos2State::Unacknowledged, Inbound::PubRec(rec))
                if rec.packet_id() == self.publish.packet_id() =>
            {
                self.state = Qos2State::Received;
                self.attempts = 0;
                self.deadline = None;
                fulfil(&mut self.promise, Ok(()));
                TickOutcome::Busy
            }
            // A dropped reconnection can make the broker replay PUBCOMP
            // straight at us without us ever seeing the PUBREC again.
            (Qos2State::Unacknowledged | Qos2State::Received, Inbound::PubComp(comp))
                if comp.packet_id() == self.publish.packet_id() =>
            {
                self.state = Qos2State::Complete;
                TickOutcome::Done
            }
            _ => {
                self.abandon(ErrorKind::ProtocolViolation);
                TickOutcome::Done
            }
        }
    }

    fn abandon(&mut self, reason: ErrorKind) {
        let already_resolved = self.promise.is_none();
        self.state = Qos2State::Complete;
        if !already_resolved {
            fulfil(&mut self.promise, Err(Error::new(reason, "publish qos2 abandoned")));
        }
    }
}

/// One-shot SUBSCRIBE (§4.4). `acknowledge` resolves the promise with the
/// per-filter outcomes carried by SUBACK.
pub struct Subscribe {
    packet: SubscribePacket,
    filters: Vec<String>,
    attempts: u8,
    deadline: Option<Instant>,
    done: bool,
    promise: Option<oneshot::Sender<Result<Vec<SubscribeResult>>>>,
}

impl Subscribe {
    #[must_use]
    pub fn new(
        packet: SubscribePacket,
        filters: Vec<String>,
        promise: oneshot::Sender<Result<Vec<SubscribeResult>>>,
    ) -> Self {
        Self {
            packet,
            filters,
            attempts: 0,
            deadline: None,
            done: false,
            promise: Some(promise),
        }
    }
}

impl Command for Subscribe {
    fn packet_id(&self) -> PacketId {
        self.packet.packet_id()
    }

    fn tick(&mut self, now: Instant, policy: RetryPolicy) -> TickResult {
        if self.done {
            return TickResult::done(None);
        }
        if matches!(self.deadline, Some(d) if now < d) {
            return TickResult::idle();
        }
        if self.attempts >= policy.max_retries {
            self.abandon(ErrorKind::RetryExhausted);
            return TickResult::done(None);
        }
        self.attempts += 1;
        self.deadline = Some(policy.deadline_after(now, self.attempts));
        let mut buf = Vec::new();
        let _ = self.packet.encode(&mut buf);
        TickResult::busy(Some(buf))
    }

    fn acknowledge(&mut self, inbound: &Inbound<'_>) -> TickOutcome {
        match inbound {
            Inbound::SubAck(ack) if ack.packet_id() == self.packet.packet_id() => {
                self.done = true;
                let results = self
                    .filters
                    .iter()
                    .zip(ack.reasons().iter())
                    .map(|(filter, reason)| SubscribeResult {
                        filter: filter.clone(),
                        success: reason.is_success(),
                        granted_qos: reason_to_granted_qos(*reason),
                    })
                    .collect();
                fulfil(&mut self.promise, Ok(results));
                TickOutcome::Done
            }
            _ => {
                self.abandon(ErrorKind::ProtocolViolation);
                TickOutcome::Done
            }
        }
    }

    fn abandon(&mut self, reason: ErrorKind) {
        self.done = true;
        fulfil(&mut self.promise, Err(Error::new(reason, "subscribe abandoned")));
    }
}

fn reason_to_granted_qos(reason: ReasonCode) -> Option<codec::QoS> {
    match reason {
        ReasonCode::Success => Some(codec::QoS::AtMostOnce),
        ReasonCode::GrantedQos1 => Some(codec::QoS::AtLeastOnce),
        ReasonCode::GrantedQos2 => Some(codec::QoS::ExactOnce),
        _ => None,
    }
}

/// One-shot UNSUBSCRIBE (§4.4).
pub struct Unsubscribe {
    packet: UnsubscribePacket,
    filters: Vec<String>,
    attempts: u8,
    deadline: Option<Instant>,
    done: bool,
    promise: Option<oneshot::Sender<Result<Vec<UnsubscribeResult>>>>,
}

impl Unsubscribe {
    #[must_use]
    pub fn new(
        packet: UnsubscribePacket,
        filters: Vec<String>,
        promise: oneshot::Sender<Result<Vec<UnsubscribeResult>>>,
    ) -> Self {
        Self {
            packet,
            filters,
            attempts: 0,
            deadline: None,
            done: false,
            promise: Some(promise),
        }
    }
}

impl Command for Unsubscribe {
    fn packet_id(&self) -> PacketId {
        self.packet.packet_id()
    }

    fn tick(&mut self, now: Instant, policy: RetryPolicy) -> TickResult {
        if self.done {
            return TickResult::done(None);
        }
        if matches!(self.deadline, Some(d) if now < d) {
            return TickResult::idle();
        }
        if self.attempts >= policy.max_retries {
            self.abandon(ErrorKind::RetryExhausted);
            return TickResult::done(None);
        }
        self.attempts += 1;
        self.deadline = Some(policy.deadline_after(now, self.attempts));
        let mut buf = Vec::new();
        let _ = self.packet.encode(&mut buf);
        TickResult::busy(Some(buf))
    }

    fn acknowledge(&mut self, inbound: &Inbound<'_>) -> TickOutcome {
        match inbound {
            Inbound::UnsubAck(ack) if ack.packet_id() == self.packet.packet_id() => {
                self.done = true;
                let results = if ack.reasons().is_empty() {
                    // 3.1.1 UNSUBACK carries no reasons; every requested
                    // filter is unconditionally removed.
                    self.filters
                        .iter()
                        .map(|f| UnsubscribeResult {
                            filter: f.clone(),
                            success: true,
                        })
                        .collect()
                } else {
                    self.filters
                        .iter()
                        .zip(ack.reasons().iter())
                        .map(|(filter, reason)| UnsubscribeResult {
                            filter: filter.clone(),
                            success: reason.is_success(),
                        })
                        .collect()
                };
                fulfil(&mut self.promise, Ok(results));
                TickOutcome::Done
            }
            _ => {
                self.abandon(ErrorKind::ProtocolViolation);
                TickOutcome::Done
            }
        }
    }

    fn abandon(&mut self, reason: ErrorKind) {
        self.done = true;
        fulfil(&mut self.promise, Err(Error::new(reason, "unsubscribe abandoned")));
    }
}

/// One-shot PINGREQ (§4.4), used by the `Connected` state's keep-alive
/// timer. Failure to see PINGRESP before the next tick after its deadline
/// is read by the state machine as a dead connection.
pub struct PingReq {
    sent: bool,
    acked: bool,
    deadline: Option<Instant>,
}

impl PingReq {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sent: false,
            acked: false,
            deadline: None,
        }
    }

    #[must_use]
    pub const fn is_overdue(&self, now: Instant) -> bool {
        !self.acked && matches!(self.deadline, Some(d) if now >= d)
    }

    /// Sends the PINGREQ on first call; a no-op (idle, or done once PINGRESP
    /// has arrived) afterwards. `retry_interval` is `packet_retry_interval`
    /// (§8 Scenario 5) and, unlike the other `Command` impls, is passed
    /// directly rather than through a shared `RetryPolicy`: keep-alive has no
    /// backoff/retry-count of its own, just a single flat deadline.
    pub fn tick(&mut self, now: Instant, retry_interval: Duration) -> TickResult {
        if self.sent {
            return if self.acked {
                TickResult::done(None)
            } else {
                TickResult::idle()
            };
        }
        self.sent = true;
        self.deadline = Some(now + retry_interval);
        let packet = codec::PingRequestPacket::new();
        let mut buf = Vec::new();
        let _ = packet.encode(&mut buf);
        TickResult::busy(Some(buf))
    }

    pub fn acknowledge(&mut self, inbound: &Inbound<'_>) -> TickOutcome {
        if matches!(inbound, Inbound::PingResp) {
            self.acked = true;
            TickOutcome::Done
        } else {
            TickOutcome::Busy
        }
    }
}

impl Default for PingReq {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping for an inbound QoS 2 PUBLISH the client itself must
/// acknowledge (§4.7): `Unacknowledged -> Released -> Complete`. Tracks that
/// PUBREC has been sent so a duplicate delivery of the same id is not
/// redelivered to user handlers, and sends PUBCOMP itself once the matching
/// PUBREL arrives -- the handshake is not complete (and the record not
/// retired) until that PUBCOMP has actually gone out.
pub struct InboundPublishQos2 {
    packet_id: PacketId,
    received: PublishReceivedPacket,
    complete_packet: PublishCompletePacket,
    pubrec_sent: bool,
    released: bool,
    complete: bool,
}

impl InboundPublishQos2 {
    #[must_use]
    pub fn new(packet_id: PacketId, level: ProtocolLevel) -> Self {
        Self {
            packet_id,
            received: PublishReceivedPacket::new(packet_id, level),
            complete_packet: PublishCompletePacket::new(packet_id, level),
            pubrec_sent: false,
            released: false,
            complete: false,
        }
    }
}

impl Command for InboundPublishQos2 {
    fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    fn tick(&mut self, _now: Instant, _policy: RetryPolicy) -> TickResult {
        if self.complete {
            return TickResult::done(None);
        }
        if self.released {
            self.complete = true;
            let mut buf = Vec::new();
            let _ = self.complete_packet.encode(&mut buf);
            return TickResult::done(Some(buf));
        }
        if self.pubrec_sent {
            return TickResult::idle();
        }
        self.pubrec_sent = true;
        let mut buf = Vec::new();
        let _ = self.received.encode(&mut buf);
        TickResult::busy(Some(buf))
    }

    fn acknowledge(&mut self, inbound: &Inbound<'_>) -> TickOutcome {
        if let Inbound::PubRel(rel) = inbound {
            if rel.packet_id() == self.packet_id {
                self.released = true;
            }
        }
        // Never Done from here: PUBCOMP still needs to go out on the next
        // tick, and only that tick retires the record.
        TickOutcome::Busy
    }

    fn abandon(&mut self, _reason: ErrorKind) {
        self.complete = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{ProtocolLevel, PubTopic, QoS};
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_interval: Duration::from_millis(10),
            max_retries: 3,
        }
    }

    #[test]
    fn first_publish_carries_dup_zero_retransmission_carries_dup_one() {
        let packet = PublishPacket::new("a/b", QoS::AtLeastOnce, b"x", ProtocolLevel::V4)
            .unwrap();
        let mut packet = packet;
        packet.set_packet_id(PacketId::new(1));
        let (tx, _rx) = oneshot::channel();
        let mut cmd = PublishQos1::new(packet, tx);
        let now = Instant::now();
        let r1 = cmd.tick(now, policy());
        assert_eq!(r1.outcome, Some(TickOutcome::Busy));
        assert!(!cmd.packet.dup());

        let later = now + Duration::from_secs(5);
        let r2 = cmd.tick(later, policy());
        assert_eq!(r2.outcome, Some(TickOutcome::Busy));
        assert!(cmd.packet.dup());
    }

    #[test]
    fn retry_exhaustion_abandons() {
        let packet = PublishPacket::new("a/b", QoS::AtLeastOnce, b"x", ProtocolLevel::V4)
            .unwrap();
        let mut packet = packet;
        packet.set_packet_id(PacketId::new(1));
        let (tx, mut rx) = oneshot::channel();
        let mut cmd = PublishQos1::new(packet, tx);
        let mut now = Instant::now();
        for _ in 0..3 {
            let r = cmd.tick(now, policy());
            assert_eq!(r.outcome, Some(TickOutcome::Busy));
            now += Duration::from_secs(120);
        }
        let r = cmd.tick(now, policy());
        assert_eq!(r.outcome, Some(TickOutcome::Done));
        let result = rx.try_recv().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn qos2_resolves_promise_on_pubrec_not_pubcomp() {
        let packet = PublishPacket::new("a/b", QoS::ExactOnce, b"x", ProtocolLevel::V4).unwrap();
        let mut packet = packet;
        packet.set_packet_id(PacketId::new(9));
        let (tx, mut rx) = oneshot::channel();
        let mut cmd = PublishQos2::new(packet, ProtocolLevel::V4, tx);
        let _ = cmd.tick(Instant::now(), policy());
        let rec = PublishReceivedPacket::new(PacketId::new(9), ProtocolLevel::V4);
        let outcome = cmd.acknowledge(&Inbound::PubRec(&rec));
        assert_eq!(outcome, TickOutcome::Busy);
        assert!(rx.try_recv().unwrap().is_ok());

        let comp = PublishCompletePacket::new(PacketId::new(9), ProtocolLevel::V4);
        let outcome = cmd.acknowledge(&Inbound::PubComp(&comp));
        assert_eq!(outcome, TickOutcome::Done);
    }

    #[test]
    fn inbound_qos2_sends_pubrec_then_pubcomp_after_pubrel() {
        let id = PacketId::new(3);
        let mut cmd = InboundPublishQos2::new(id, ProtocolLevel::V4);

        let r1 = cmd.tick(Instant::now(), policy());
        assert_eq!(r1.outcome, Some(TickOutcome::Busy));
        let mut ba = codec::ByteArray::new(r1.to_send.as_ref().unwrap());
        let rec = PublishReceivedPacket::decode_with_level(&mut ba, ProtocolLevel::V4).unwrap();
        assert_eq!(rec.packet_id(), id);

        // Ticking again before PUBREL arrives must not resend PUBREC.
        let r2 = cmd.tick(Instant::now(), policy());
        assert_eq!(r2.to_send, None);

        let rel = codec::PublishReleasePacket::new(id, ProtocolLevel::V4);
        let outcome = cmd.acknowledge(&Inbound::PubRel(&rel));
        // Not yet Done: PUBCOMP still needs to be sent on the next tick.
        assert_eq!(outcome, TickOutcome::Busy);

        let r3 = cmd.tick(Instant::now(), policy());
        assert_eq!(r3.outcome, Some(TickOutcome::Done));
        let mut ba = codec::ByteArray::new(r3.to_send.as_ref().unwrap());
        let comp = PublishCompletePacket::decode_with_level(&mut ba, ProtocolLevel::V4).unwrap();
        assert_eq!(comp.packet_id(), id);
    }
}
