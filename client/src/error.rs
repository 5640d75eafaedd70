// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;

/// Semantic error category surfaced to callers. The library never exposes
/// more detail than this through the public `Result` API (§7); diagnostics
/// beyond the kind go to the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport is down, or never came up; triggers a reconnect from
    /// `Connected`/`Connecting`.
    TransportUnavailable,

    /// A decoded packet failed validation, or an unexpected packet type
    /// arrived for the current state; forces a reconnect.
    ProtocolViolation,

    /// The broker responded with a failure reason/return code.
    ReasonCode,

    /// A `Command` reached `max_packet_retries` without being acknowledged.
    RetryExhausted,

    /// The identifier pool had nothing left to allocate.
    IdPoolExhausted,

    /// Caller supplied a malformed topic, filter, or oversized payload.
    InvalidInput,

    /// A user-initiated `disconnect` cancelled a pending operation.
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::TransportUnavailable, format!("io error: {err}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::new(
            ErrorKind::TransportUnavailable,
            format!("websocket error: {err}"),
        )
    }
}

impl From<codec::EncodeError> for Error {
    fn from(err: codec::EncodeError) -> Self {
        Self::new(ErrorKind::InvalidInput, format!("encode error: {err:?}"))
    }
}

impl From<codec::DecodeError> for Error {
    fn from(err: codec::DecodeError) -> Self {
        Self::new(
            ErrorKind::ProtocolViolation,
            format!("decode error: {err:?}"),
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
