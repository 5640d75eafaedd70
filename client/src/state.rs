// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! §4.7: the four-state client lifecycle and the single task that drives
//! it -- the "one logical owner task" of §5, fed by user requests,
//! transport events, and periodic ticks.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use codec::{
    AuthPacket, ByteArray, ConnectAckPacket, ConnectPacket, DecodePacket, DisconnectPacket,
    EncodePacket, PacketType, PingResponsePacket, ProtocolLevel,
    PublishAckPacket, PublishCompletePacket, PublishPacket, PublishReceivedPacket,
    PublishReleasePacket, QoS, SubscribeAckPacket, SubscribePacket, SubscribeTopic,
    UnsubscribeAckPacket, UnsubscribePacket,
};

use crate::clock::Clock;
use crate::command::{
    Command, Inbound, InboundPublishQos2, PingReq, PublishQos1, PublishQos2, RetryPolicy,
    Subscribe, Unsubscribe,
};
use crate::connect_options::Authentication;
use crate::error::{Error, ErrorKind, Result};
use crate::fingerprint::{derive_client_id, Fingerprint};
use crate::message::Message;
use crate::session::SessionContext;
use crate::signals::Signals;
use crate::subscription::{SubscribeResult, TopicFilter, UnsubscribeResult};
use crate::transport::{AdapterEvent, TransportAdapter};

/// One request issued by the public API to the driver task.
pub enum ClientRequest {
    Connect {
        clean_session: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Publish {
        message: Message,
        reply: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        filters: Vec<TopicFilter>,
        reply: oneshot::Sender<Result<Vec<SubscribeResult>>>,
    },
    Unsubscribe {
        filters: Vec<TopicFilter>,
        reply: oneshot::Sender<Result<Vec<UnsubscribeResult>>>,
    },
}

#[derive(Debug)]
enum State {
    Disconnected,
    Connecting { attempt: u8, clean_session: bool },
    Connected { clean_session: bool },
    Disconnecting,
}

/// Drives one client's lifecycle (§4.7). Owns the transport and the
/// session context; runs as a single spawned task per client (§5).
pub struct Driver {
    state: State,
    session: Arc<SessionContext>,
    transport: TransportAdapter,
    clock: Arc<dyn Clock>,
    signals: Arc<Mutex<Signals>>,
    requests: mpsc::UnboundedReceiver<ClientRequest>,
    tick_rx: mpsc::UnboundedReceiver<Instant>,
    protocol_level: ProtocolLevel,
    last_packet_sent: Instant,
    ping: Option<PingReq>,
    connect_deadline: Option<Instant>,
    reconnect_deadline: Option<Instant>,
    /// Set right before a `transport.disconnect()` call issued as part of
    /// our own teardown-then-reconnect sequence, so the `Disconnected`
    /// event that call produces is swallowed once instead of being
    /// misread by `on_transport_disconnected` as an unexpected drop of the
    /// *new* attempt the same handler already transitioned into.
    expect_teardown: bool,
}

impl Driver {
    #[must_use]
    pub fn new(
        session: Arc<SessionContext>,
        transport: TransportAdapter,
        clock: Arc<dyn Clock>,
        signals: Arc<Mutex<Signals>>,
        requests: mpsc::UnboundedReceiver<ClientRequest>,
        tick_rx: mpsc::UnboundedReceiver<Instant>,
    ) -> Self {
        let protocol_level = session.options.lock().unwrap().protocol_version();
        let now = clock.now();
        Self {
            state: State::Disconnected,
            session,
            transport,
            clock,
            signals,
            requests,
            tick_rx,
            protocol_level,
            last_packet_sent: now,
            ping: None,
            connect_deadline: None,
            reconnect_deadline: None,
            expect_teardown: false,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        let options = self.session.options.lock().unwrap();
        RetryPolicy {
            base_interval: options.initial_retry_connection_interval(),
            max_retries: options.max_packet_retries(),
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.handle_request(request),
                        None => break,
                    }
                }
                event = self.transport.next_event() => {
                    match event {
                        Some(event) => self.handle_transport_event(event),
                        None => break,
                    }
                }
                tick = self.tick_rx.recv() => {
                    match tick {
                        Some(now) => self.handle_tick(now),
                        None => break,
                    }
                }
            }
            if matches!(self.state, State::Disconnected) && self.transport_idle() {
                // Nothing left to drive; the task exits once the owning
                // `Client`/`ClientPool` handle is dropped, via `requests`
                // and `tick_rx` both closing.
            }
        }
    }

    fn transport_idle(&self) -> bool {
        !self.transport.is_connected()
    }

    fn handle_request(&mut self, request: ClientRequest) {
        match request {
            ClientRequest::Connect { clean_session, reply } => self.on_connect_request(clean_session, reply),
            ClientRequest::Disconnect { reply } => self.on_disconnect_request(reply),
            ClientRequest::Publish { message, reply } => self.on_publish_request(message, reply),
            ClientRequest::Subscribe { filters, reply } => self.on_subscribe_request(filters, reply),
            ClientRequest::Unsubscribe { filters, reply } => self.on_unsubscribe_request(filters, reply),
        }
    }

    fn on_connect_request(&mut self, clean_session: bool, reply: oneshot::Sender<Result<()>>) {
        match &self.state {
            State::Disconnected => {
                self.session.push_pending_connect(reply);
                self.begin_connecting(clean_session, 0);
            }
            State::Connecting { .. } => {
                let _ = reply.send(Err(Error::new(
                    ErrorKind::ProtocolViolation,
                    "cannot clean-reconnect while connecting",
                )));
            }
            State::Connected { .. } => {
                if clean_session {
                    self.session.push_pending_connect(reply);
                    self.expect_teardown = true;
                    self.transport.disconnect();
                    self.state = State::Connecting { attempt: 0, clean_session: true };
                } else {
                    let _ = reply.send(Ok(()));
                }
            }
            State::Disconnecting => {
                let _ = reply.send(Err(Error::new(
                    ErrorKind::Cancelled,
                    "client is disconnecting",
                )));
            }
        }
    }

    fn begin_connecting(&mut self, clean_session: bool, attempt: u8) {
        self.state = State::Connecting { attempt, clean_session };
        self.transport.connect();
    }

    fn on_disconnect_request(&mut self, reply: oneshot::Sender<Result<()>>) {
        match &self.state {
            State::Disconnected => {
                let _ = reply.send(Ok(()));
            }
            _ => {
                self.session.push_pending_disconnect(reply);
                self.enter_disconnecting();
            }
        }
    }

    fn enter_disconnecting(&mut self) {
        self.state = State::Disconnecting;
        if self.transport.is_connected() {
            let disconnect = DisconnectPacket::new(self.protocol_level);
            let mut buf = Vec::new();
            let _ = disconnect.encode(&mut buf);
            let _ = self.transport.send(&buf);
            self.transport.disconnect();
        } else {
            self.finish_disconnecting();
        }
    }

    fn finish_disconnecting(&mut self) {
        self.session.abandon_all(ErrorKind::Cancelled);
        self.session.complete_disconnect(Ok(()));
        self.signals.lock().unwrap().fire_disconnect();
        self.state = State::Disconnected;
    }

    fn on_publish_request(&mut self, message: Message, reply: oneshot::Sender<Result<()>>) {
        if !matches!(self.state, State::Connected { .. }) {
            let _ = reply.send(Err(Error::new(
                ErrorKind::TransportUnavailable,
                "not connected",
            )));
            return;
        }
        let packet = match PublishPacket::new(message.topic(), message.qos(), message.payload(), self.protocol_level) {
            Ok(mut packet) => {
                packet.set_retain(message.retain());
                packet
            }
            Err(err) => {
                let _ = reply.send(Err(Error::new(ErrorKind::InvalidInput, format!("{err:?}"))));
                return;
            }
        };

        match message.qos() {
            QoS::AtMostOnce => {
                let mut buf = Vec::new();
                let _ = packet.encode(&mut buf);
                let result = self.send_bytes(&buf);
                let _ = reply.send(result);
            }
            QoS::AtLeastOnce => {
                let id = match self.session.next_id() {
                    Ok(id) => id,
                    Err(err) => {
                        let _ = reply.send(Err(err));
                        return;
                    }
                };
                let mut packet = packet;
                packet.set_packet_id(id);
                let cmd: Box<dyn Command> = Box::new(PublishQos1::new(packet, reply));
                self.session.add_outbound(cmd);
                self.tick_commands_now();
            }
            QoS::ExactOnce => {
                let id = match self.session.next_id() {
                    Ok(id) => id,
                    Err(err) => {
                        let _ = reply.send(Err(err));
                        return;
                    }
                };
                let mut packet = packet;
                packet.set_packet_id(id);
                let cmd: Box<dyn Command> = Box::new(PublishQos2::new(packet, self.protocol_level, reply));
                self.session.add_outbound(cmd);
                self.tick_commands_now();
            }
        }
    }

    fn on_subscribe_request(
        &mut self,
        filters: Vec<TopicFilter>,
        reply: oneshot::Sender<Result<Vec<SubscribeResult>>>,
    ) {
        if !matches!(self.state, State::Connected { .. }) {
            let _ = reply.send(Err(Error::new(
                ErrorKind::TransportUnavailable,
                "not connected",
            )));
            return;
        }
        if filters.is_empty() {
            let _ = reply.send(Err(Error::new(ErrorKind::InvalidInput, "no filters given")));
            return;
        }
        let id = match self.session.next_id() {
            Ok(id) => id,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };
        let mut topics = Vec::with_capacity(filters.len());
        for filter in &filters {
            let mut topic = match SubscribeTopic::new(filter.filter(), filter.qos()) {
                Ok(topic) => topic,
                Err(err) => {
                    let _ = reply.send(Err(Error::new(ErrorKind::InvalidInput, format!("{err:?}"))));
                    return;
                }
            };
            topic.set_no_local(filter.no_local());
            topic.set_retain_as_published(filter.retain_as_published());
            topic.set_retain_handling(filter.retain_handling());
            topics.push(topic);
        }
        let mut packet = match SubscribePacket::new(filters[0].filter(), filters[0].qos(), id, self.protocol_level) {
            Ok(packet) => packet,
            Err(err) => {
                let _ = reply.send(Err(Error::new(ErrorKind::InvalidInput, format!("{err:?}"))));
                return;
            }
        };
        packet.set_topics(&topics);
        let filter_names: Vec<String> = filters.iter().map(|f| f.filter().to_string()).collect();
        let cmd: Box<dyn Command> = Box::new(Subscribe::new(packet, filter_names, reply));
        self.session.add_outbound(cmd);
        self.tick_commands_now();
    }

    fn on_unsubscribe_request(
        &mut self,
        filters: Vec<TopicFilter>,
        reply: oneshot::Sender<Result<Vec<UnsubscribeResult>>>,
    ) {
        if !matches!(self.state, State::Connected { .. }) {
            let _ = reply.send(Err(Error::new(
                ErrorKind::TransportUnavailable,
                "not connected",
            )));
            return;
        }
        if filters.is_empty() {
            let _ = reply.send(Err(Error::new(ErrorKind::InvalidInput, "no filters given")));
            return;
        }
        let id = match self.session.next_id() {
            Ok(id) => id,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };
        let mut names: Vec<&str> = filters.iter().map(TopicFilter::filter).collect();
        let first = names.remove(0);
        let mut packet = match UnsubscribePacket::new(first, id, self.protocol_level) {
            Ok(packet) => packet,
            Err(err) => {
                let _ = reply.send(Err(Error::new(ErrorKind::InvalidInput, format!("{err:?}"))));
                return;
            }
        };
        for name in names {
            if let Err(err) = packet.add_topic(name) {
                let _ = reply.send(Err(Error::new(ErrorKind::InvalidInput, format!("{err:?}"))));
                return;
            }
        }
        let filter_names: Vec<String> = filters.iter().map(|f| f.filter().to_string()).collect();
        self.session.clear_delegates(&filter_names);
        let cmd: Box<dyn Command> = Box::new(Unsubscribe::new(packet, filter_names, reply));
        self.session.add_outbound(cmd);
        self.tick_commands_now();
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.send(bytes).map_err(|err| {
            Error::new(ErrorKind::TransportUnavailable, format!("send failed: {err}"))
        })?;
        self.last_packet_sent = self.clock.now();
        Ok(())
    }

    fn tick_commands_now(&mut self) {
        let now = self.clock.now();
        let policy = self.retry_policy();
        let frames = self.session.tick_commands(now, policy);
        for frame in frames {
            let _ = self.send_bytes(&frame);
        }
    }

    fn handle_tick(&mut self, now: Instant) {
        match &self.state {
            State::Connecting { attempt, clean_session } => {
                let attempt = *attempt;
                let clean_session = *clean_session;
                if matches!(self.connect_deadline, Some(d) if now >= d) {
                    self.retry_or_give_up(clean_session, attempt);
                } else if matches!(self.reconnect_deadline, Some(d) if now >= d) {
                    self.reconnect_deadline = None;
                    self.begin_connecting(clean_session, attempt);
                }
            }
            State::Connected { .. } => {
                self.tick_keep_alive(now);
                self.tick_commands_now();
            }
            State::Disconnected | State::Disconnecting => {}
        }
    }

    fn tick_keep_alive(&mut self, now: Instant) {
        let keep_alive = self.session.options.lock().unwrap().keep_alive_interval();
        if keep_alive.is_zero() {
            return;
        }
        if self.ping.is_none() && now.duration_since(self.last_packet_sent) >= keep_alive {
            self.ping = Some(PingReq::new());
        }
        if let Some(ping) = &mut self.ping {
            if ping.is_overdue(now) {
                log::warn!("keep-alive ping overdue, reconnecting");
                self.ping = None;
                self.reconnect_from_connected();
                return;
            }
            let retry_interval = self.session.options.lock().unwrap().packet_retry_interval();
            let result = ping.tick(now, retry_interval);
            if let Some(bytes) = result.to_send {
                let _ = self.send_bytes(&bytes);
            }
            if result.outcome == Some(crate::command::TickOutcome::Done) {
                self.ping = None;
            }
        }
    }

    fn retry_or_give_up(&mut self, clean_session: bool, attempt: u8) {
        let (max_retries, base) = {
            let options = self.session.options.lock().unwrap();
            (options.max_connection_retries(), options.packet_retry_interval())
        };
        self.connect_deadline = None;
        if attempt + 1 >= max_retries {
            self.session.complete_connect(Err(Error::new(
                ErrorKind::RetryExhausted,
                "max connection retries exceeded",
            )));
            self.signals.lock().unwrap().fire_connect(false);
            self.enter_disconnecting();
            return;
        }
        let wait = base.saturating_mul(u32::from(attempt) + 1);
        self.reconnect_deadline = Some(self.clock.now() + wait);
        self.expect_teardown = true;
        self.transport.disconnect();
        self.state = State::Connecting { attempt: attempt + 1, clean_session };
    }

    fn reconnect_from_connected(&mut self) {
        self.session.abandon_all(ErrorKind::TransportUnavailable);
        self.expect_teardown = true;
        self.transport.disconnect();
        self.begin_connecting(false, 0);
    }

    fn handle_transport_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::Connected { success } => self.on_transport_connected(success),
            AdapterEvent::Disconnected => self.on_transport_disconnected(),
            AdapterEvent::Packet(bytes) => self.on_packet(&bytes),
            AdapterEvent::Malformed(err) => {
                log::warn!("malformed inbound frame: {err:?}");
                self.on_protocol_violation();
            }
        }
    }

    fn on_transport_connected(&mut self, success: bool) {
        let State::Connecting { attempt, clean_session } = &self.state else {
            return;
        };
        let attempt = *attempt;
        let clean_session = *clean_session;
        if !success {
            self.retry_or_give_up(clean_session, attempt);
            return;
        }
        let (client_id, keep_alive, auth) = {
            let options = self.session.options.lock().unwrap();
            let client_id = if options.client_id().is_empty() {
                derive_client_id(Fingerprint::new(&options))
            } else {
                options.client_id().to_string()
            };
            (client_id, options.keep_alive_interval(), options.auth().cloned())
        };
        let mut connect = match ConnectPacket::new(&client_id, self.protocol_level) {
            Ok(connect) => connect,
            Err(err) => {
                self.session.complete_connect(Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("{err:?}"),
                )));
                self.enter_disconnecting();
                return;
            }
        };
        connect.set_clean_session(clean_session);
        connect.set_keep_alive(u16::try_from(keep_alive.as_secs()).unwrap_or(u16::MAX));
        if let Some(auth) = auth {
            if connect.set_username(auth.username()).is_err() || connect.set_password(auth.password()).is_err() {
                self.session.complete_connect(Err(Error::new(
                    ErrorKind::InvalidInput,
                    "username/password rejected by CONNECT encoder",
                )));
                self.enter_disconnecting();
                return;
            }
        }
        let mut buf = Vec::new();
        let _ = connect.encode(&mut buf);
        if self.send_bytes(&buf).is_err() {
            self.retry_or_give_up(clean_session, attempt);
            return;
        }
        let timeout = self.session.options.lock().unwrap().mqtt_connection_timeout();
        self.connect_deadline = Some(self.clock.now() + timeout);
    }

    fn on_transport_disconnected(&mut self) {
        if self.expect_teardown {
            self.expect_teardown = false;
            return;
        }
        match &self.state {
            State::Disconnecting => self.finish_disconnecting(),
            State::Connected { .. } => self.reconnect_from_connected(),
            State::Connecting { attempt, clean_session } => {
                let attempt = *attempt;
                let clean_session = *clean_session;
                self.retry_or_give_up(clean_session, attempt);
            }
            State::Disconnected => {}
        }
    }

    fn on_protocol_violation(&mut self) {
        match self.state {
            State::Connected { .. } => self.reconnect_from_connected(),
            State::Connecting { .. } => {
                self.transport.disconnect();
            }
            _ => {}
        }
    }

    fn on_packet(&mut self, bytes: &[u8]) {
        let Some(&first) = bytes.first() else {
            return;
        };
        let packet_type = match PacketType::try_from(first) {
            Ok(t) => t,
            Err(_) => {
                self.on_protocol_violation();
                return;
            }
        };
        match (&self.state, packet_type) {
            (State::Connecting { .. }, PacketType::ConnectAck) => self.on_connack(bytes),
            (State::Connected { .. }, PacketType::Publish { .. }) => self.on_publish_inbound(bytes),
            (State::Connected { .. }, PacketType::PublishAck) => self.on_inbound_ack(bytes),
            (State::Connected { .. }, PacketType::PublishReceived) => self.on_inbound_ack(bytes),
            (State::Connected { .. }, PacketType::PublishRelease) => self.on_inbound_pubrel(bytes),
            (State::Connected { .. }, PacketType::PublishComplete) => self.on_inbound_ack(bytes),
            (State::Connected { .. }, PacketType::SubscribeAck) => self.on_inbound_ack(bytes),
            (State::Connected { .. }, PacketType::UnsubscribeAck) => self.on_inbound_ack(bytes),
            (State::Connected { .. }, PacketType::PingResponse) => self.on_pingresp(bytes),
            (State::Connected { .. }, PacketType::Auth) => self.on_auth(bytes),
            (State::Connected { .. }, PacketType::Disconnect) => self.reconnect_from_connected(),
            _ => self.on_protocol_violation(),
        }
    }

    fn on_connack(&mut self, bytes: &[u8]) {
        let mut ba = ByteArray::new(bytes);
        let ack = match ConnectAckPacket::decode_with_level(&mut ba, self.protocol_level) {
            Ok(ack) => ack,
            Err(err) => {
                log::warn!("CONNACK decode failed: {err:?}");
                self.on_protocol_violation();
                return;
            }
        };
        self.connect_deadline = None;
        let State::Connecting { clean_session, .. } = self.state else {
            return;
        };
        if ack.reason_code().is_success() {
            self.state = State::Connected { clean_session };
            self.last_packet_sent = self.clock.now();
            self.session.complete_connect(Ok(()));
            self.signals.lock().unwrap().fire_connect(true);
        } else {
            log::warn!("CONNACK rejected: {:?}", ack.reason_code());
            self.session.complete_connect(Err(Error::new(
                ErrorKind::ReasonCode,
                format!("{:?}", ack.reason_code()),
            )));
            self.signals.lock().unwrap().fire_connect(false);
            self.transport.disconnect();
        }
    }

    fn on_publish_inbound(&mut self, bytes: &[u8]) {
        let mut ba = ByteArray::new(bytes);
        let publish = match PublishPacket::decode_with_level(&mut ba, self.protocol_level) {
            Ok(p) => p,
            Err(err) => {
                log::warn!("PUBLISH decode failed: {err:?}");
                self.on_protocol_violation();
                return;
            }
        };
        match publish.qos() {
            QoS::AtMostOnce => {
                self.deliver(&publish);
            }
            QoS::AtLeastOnce => {
                self.deliver(&publish);
                let ack = PublishAckPacket::new(publish.packet_id(), self.protocol_level);
                let mut buf = Vec::new();
                let _ = ack.encode(&mut buf);
                let _ = self.send_bytes(&buf);
            }
            QoS::ExactOnce => {
                let id = publish.packet_id();
                let already_open = self.session.has_inbound(id);
                if already_open && publish.dup() {
                    // Duplicate redelivery while the handshake is still
                    // open: ack again, but never deliver twice.
                } else if !already_open {
                    self.deliver(&publish);
                    let cmd: Box<dyn Command> = Box::new(InboundPublishQos2::new(id, self.protocol_level));
                    self.session.add_inbound(id, cmd);
                }
                self.tick_commands_now();
            }
        }
    }

    fn deliver(&mut self, publish: &PublishPacket) {
        let message = Message::stamped(
            publish.topic().to_string(),
            publish.message().to_vec(),
            publish.retain(),
            publish.qos(),
        );
        self.session.deliver(&message);
    }

    fn on_inbound_ack(&mut self, bytes: &[u8]) {
        let mut ba = ByteArray::new(bytes);
        let first = bytes[0];
        let packet_type = match PacketType::try_from(first) {
            Ok(t) => t,
            Err(_) => {
                self.on_protocol_violation();
                return;
            }
        };
        let result = match packet_type {
            PacketType::PublishAck => PublishAckPacket::decode_with_level(&mut ba, self.protocol_level)
                .map(|ack| (ack.packet_id(), OwnedInbound::PubAck(ack))),
            PacketType::PublishReceived => {
                PublishReceivedPacket::decode_with_level(&mut ba, self.protocol_level)
                    .map(|ack| (ack.packet_id(), OwnedInbound::PubRec(ack)))
            }
            PacketType::PublishComplete => {
                PublishCompletePacket::decode_with_level(&mut ba, self.protocol_level)
                    .map(|ack| (ack.packet_id(), OwnedInbound::PubComp(ack)))
            }
            PacketType::SubscribeAck => SubscribeAckPacket::decode_with_level(&mut ba, self.protocol_level)
                .map(|ack| (ack.packet_id(), OwnedInbound::SubAck(ack))),
            PacketType::UnsubscribeAck => {
                UnsubscribeAckPacket::decode_with_level(&mut ba, self.protocol_level)
                    .map(|ack| (ack.packet_id(), OwnedInbound::UnsubAck(ack)))
            }
            _ => unreachable!("on_inbound_ack only dispatched for ack packet types"),
        };
        match result {
            Ok((id, owned)) => {
                self.session.acknowledge(id, &owned.as_inbound());
            }
            Err(err) => {
                log::warn!("ack decode failed: {err:?}");
                self.on_protocol_violation();
            }
        }
    }

    fn on_inbound_pubrel(&mut self, bytes: &[u8]) {
        let mut ba = ByteArray::new(bytes);
        let rel = match PublishReleasePacket::decode_with_level(&mut ba, self.protocol_level) {
            Ok(rel) => rel,
            Err(err) => {
                log::warn!("PUBREL decode failed: {err:?}");
                self.on_protocol_violation();
                return;
            }
        };
        self.session.acknowledge(rel.packet_id(), &Inbound::PubRel(&rel));
        self.tick_commands_now();
    }

    fn on_pingresp(&mut self, bytes: &[u8]) {
        let mut ba = ByteArray::new(bytes);
        if PingResponsePacket::decode(&mut ba).is_err() {
            self.on_protocol_violation();
            return;
        }
        if let Some(ping) = &mut self.ping {
            let _ = ping.acknowledge(&Inbound::PingResp);
        }
    }

    fn on_auth(&mut self, bytes: &[u8]) {
        let mut ba = ByteArray::new(bytes);
        match AuthPacket::decode_with_level(&mut ba, self.protocol_level) {
            Ok(auth) => {
                log::debug!("unsolicited AUTH received: {:?}", auth.reason_code());
            }
            Err(err) => {
                log::warn!("AUTH decode failed: {err:?}");
                self.on_protocol_violation();
            }
        }
    }
}

/// Owned counterpart to [`Inbound`] so a decoded packet can outlive the
/// `match` arm that produced it long enough to route through
/// `SessionContext::acknowledge`.
enum OwnedInbound {
    PubAck(PublishAckPacket),
    PubRec(PublishReceivedPacket),
    PubComp(PublishCompletePacket),
    SubAck(SubscribeAckPacket),
    UnsubAck(UnsubscribeAckPacket),
}

impl OwnedInbound {
    fn as_inbound(&self) -> Inbound<'_> {
        match self {
            Self::PubAck(p) => Inbound::PubAck(p),
            Self::PubRec(p) => Inbound::PubRec(p),
            Self::PubComp(p) => Inbound::PubComp(p),
            Self::SubAck(p) => Inbound::SubAck(p),
            Self::UnsubAck(p) => Inbound::UnsubAck(p),
        }
    }
}

