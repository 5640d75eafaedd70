// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

/// CONNACK return code under MQTT 3.1.1. 5.0 replaces this with the wider
/// [`crate::ReasonCode`].
///
/// If the Server sends a CONNACK with non-zero return code, it MUST close
/// the network connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    #[default]
    Accepted,

    /// The Server does not support the level of the MQTT protocol requested
    /// by the Client.
    UnacceptedProtocol,

    /// The Client identifier is correct UTF-8 but not allowed by the Server.
    IdentifierRejected,

    /// The Network Connection has been made but the MQTT service is
    /// unavailable.
    ServerUnavailable,

    /// The data in the username or password is malformed.
    MalformedUsernamePassword,

    /// The Client is not authorized to connect.
    NotAuthorized,
}

impl ConnectReturnCode {
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }

    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl From<ConnectReturnCode> for u8 {
    fn from(code: ConnectReturnCode) -> Self {
        match code {
            ConnectReturnCode::Accepted => 0,
            ConnectReturnCode::UnacceptedProtocol => 1,
            ConnectReturnCode::IdentifierRejected => 2,
            ConnectReturnCode::ServerUnavailable => 3,
            ConnectReturnCode::MalformedUsernamePassword => 4,
            ConnectReturnCode::NotAuthorized => 5,
        }
    }
}

impl DecodePacket for ConnectReturnCode {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let byte = ba.read_byte()?;
        Ok(match byte {
            0 => Self::Accepted,
            1 => Self::UnacceptedProtocol,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::MalformedUsernamePassword,
            5 => Self::NotAuthorized,
            // 6-255 are reserved for future use; treat as a generic rejection
            // rather than a hard decode failure so forward-compatible brokers
            // don't force a disconnect loop.
            _ => Self::ServerUnavailable,
        })
    }
}

impl EncodePacket for ConnectReturnCode {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push((*self).into());
        Ok(1)
    }
}
