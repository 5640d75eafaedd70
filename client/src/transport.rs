// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! §4.8: the external transport contract plus the byte-stream reassembler
//! that sits on top of it. Transport I/O plumbing itself (TCP/TLS/WebSocket
//! frame carriage) is out of scope for the CORE; this module only specifies
//! what the state machine consumes and produces.

use std::io;

use tokio::sync::mpsc;

/// What a concrete transport reports back to the adapter. Real transports
/// (TCP/TLS/WebSocket/WSS) push these through the sender handed to them in
/// [`Transport::bind`].
#[derive(Debug)]
pub enum TransportEvent {
    Connected { success: bool },
    Disconnected,
    Bytes(Vec<u8>),
}

/// The byte-oriented, connection-oriented transport the client core relies
/// on (§1, §4.8). Implementations carry an actual TCP/TLS/WebSocket socket;
/// that carriage is deliberately not specified here.
pub trait Transport: Send {
    /// Begin an asynchronous connection attempt. Completion is reported via
    /// a [`TransportEvent::Connected`] on the channel given to [`Self::bind`].
    fn connect(&mut self);

    /// Close the connection. A [`TransportEvent::Disconnected`] follows once
    /// the close completes.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Non-blocking: queues `bytes` for the transport's own send loop.
    ///
    /// # Errors
    ///
    /// Returns error if the transport has no queue to accept bytes into
    /// (e.g. already torn down).
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Register the channel the transport reports connect/disconnect/bytes
    /// events through. Called exactly once, before the first `connect`.
    fn bind(&mut self, events: mpsc::UnboundedSender<TransportEvent>);
}

#[derive(Debug, PartialEq, Eq)]
pub enum AssemblerError {
    /// A frame's fixed-header claims a size larger than `max_packet_size`.
    PacketTooLarge,
    /// The variable-byte-integer length prefix used more than 4 bytes.
    MalformedLength,
}

/// Reassembles whole MQTT packets from an arbitrarily-chunked byte stream,
/// using the VBI remaining-length prefix to find frame boundaries (§4.8).
pub struct PacketAssembler {
    buf: Vec<u8>,
    max_packet_size: usize,
}

impl PacketAssembler {
    #[must_use]
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_packet_size,
        }
    }

    /// Feed newly received bytes in, draining every whole packet currently
    /// available. Partial trailing bytes stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblerError`] the first time a malformed-or-oversized
    /// frame is detected; the caller should treat this as a protocol
    /// violation and reconnect (the assembler's buffer is left intact but
    /// should not be reused past this point).
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, AssemblerError> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        loop {
            match Self::peek_frame_len(&self.buf, self.max_packet_size)? {
                None => break,
                Some(frame_len) => {
                    let frame = self.buf.drain(..frame_len).collect();
                    out.push(frame);
                }
            }
        }
        Ok(out)
    }

    /// Returns `Ok(Some(total_frame_len))` once a whole fixed header +
    /// remaining-length + body is buffered, `Ok(None)` if more bytes are
    /// needed, and `Err` if the header is malformed or oversized.
    fn peek_frame_len(buf: &[u8], max_packet_size: usize) -> Result<Option<usize>, AssemblerError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let mut remaining_length: usize = 0;
        let mut multiplier: usize = 1;
        let mut offset = 1; // skip the fixed-header type/flags byte
        loop {
            let Some(&byte) = buf.get(offset) else {
                return Ok(None);
            };
            offset += 1;
            remaining_length += (byte as usize & 0x7f) * multiplier;
            multiplier *= 128;
            if byte & 0x80 == 0 {
                break;
            }
            if multiplier > 128 * 128 * 128 * 128 {
                return Err(AssemblerError::MalformedLength);
            }
        }
        let total = offset + remaining_length;
        if total > max_packet_size {
            return Err(AssemblerError::PacketTooLarge);
        }
        if buf.len() < total {
            return Ok(None);
        }
        Ok(Some(total))
    }
}

/// Owns a boxed [`Transport`] plus the [`PacketAssembler`] sitting on top
/// of it (§4.8), and the channel the transport reports events through.
/// `ClientStateMachine` drives a client purely through this adapter.
pub struct TransportAdapter {
    transport: Box<dyn Transport>,
    assembler: PacketAssembler,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    pending: std::collections::VecDeque<Vec<u8>>,
}

/// Events yielded by [`TransportAdapter::next_event`]: either a reassembled
/// whole packet's bytes, or a connection-lifecycle event.
pub enum AdapterEvent {
    Connected { success: bool },
    Disconnected,
    Packet(Vec<u8>),
    Malformed(AssemblerError),
}

impl TransportAdapter {
    #[must_use]
    pub fn new(mut transport: Box<dyn Transport>, max_packet_size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        transport.bind(tx);
        Self {
            transport,
            assembler: PacketAssembler::new(max_packet_size),
            events: rx,
            pending: std::collections::VecDeque::new(),
        }
    }

    pub fn connect(&mut self) {
        self.transport.connect();
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// # Errors
    ///
    /// Returns error if the underlying transport rejects the write.
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.transport.send(bytes)
    }

    /// Await the transport's next reported event, running inbound bytes
    /// through the assembler. A single `Bytes` event may yield zero, one,
    /// or several buffered [`AdapterEvent::Packet`]s -- callers should loop
    /// until this returns `None` (channel closed) or pulls fresh queued
    /// packets out before awaiting again; in practice the driver loop
    /// calls this once per `select!` iteration and handles one packet at a
    /// time via an internal pending queue.
    pub async fn next_event(&mut self) -> Option<AdapterEvent> {
        loop {
            if let Some(pending) = self.take_pending() {
                return Some(pending);
            }
            match self.events.recv().await? {
                TransportEvent::Connected { success } => {
                    return Some(AdapterEvent::Connected { success })
                }
                TransportEvent::Disconnected => return Some(AdapterEvent::Disconnected),
                TransportEvent::Bytes(bytes) => match self.assembler.feed(&bytes) {
                    Ok(frames) => {
                        self.pending.extend(frames);
                        if let Some(pending) = self.take_pending() {
                            return Some(pending);
                        }
                    }
                    Err(err) => return Some(AdapterEvent::Malformed(err)),
                },
            }
        }
    }

    fn take_pending(&mut self) -> Option<AdapterEvent> {
        self.pending.pop_front().map(AdapterEvent::Packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_a_single_chunked_packet() {
        let mut assembler = PacketAssembler::new(1024);
        // PINGREQ: type/flags 0xC0, remaining length 0.
        let whole = [0xC0u8, 0x00];
        let mut out = assembler.feed(&whole[..1]).unwrap();
        assert!(out.is_empty());
        out = assembler.feed(&whole[1..]).unwrap();
        assert_eq!(out, vec![whole.to_vec()]);
    }

    #[test]
    fn assembles_two_back_to_back_packets() {
        let mut assembler = PacketAssembler::new(1024);
        let two = [0xC0u8, 0x00, 0xC0, 0x00];
        let out = assembler.feed(&two).unwrap();
        assert_eq!(out, vec![vec![0xC0, 0x00], vec![0xC0, 0x00]]);
    }

    #[test]
    fn rejects_oversized_frame() {
        let mut assembler = PacketAssembler::new(4);
        // Claims a remaining length of 100, far past the 4 byte cap.
        let oversized = [0x30u8, 0x64];
        assert_eq!(
            assembler.feed(&oversized),
            Err(AssemblerError::PacketTooLarge)
        );
    }

    #[test]
    fn rejects_malformed_length() {
        let mut assembler = PacketAssembler::new(1 << 20);
        let malformed = [0x30u8, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(
            assembler.feed(&malformed),
            Err(AssemblerError::MalformedLength)
        );
    }
}
