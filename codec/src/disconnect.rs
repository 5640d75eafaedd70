// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, ProtocolLevel, ReasonCode, VarIntError,
};

/// Reason codes a DISCONNECT is allowed to carry under 5.0.
pub const DISCONNECT_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::DisconnectWithWillMessage,
    ReasonCode::UnspecifiedError,
    ReasonCode::MalformedPacket,
    ReasonCode::ProtocolError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::ServerBusy,
    ReasonCode::ServerShuttingDown,
    ReasonCode::KeepAliveTimeout,
    ReasonCode::SessionTakenOver,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::TopicNameInvalid,
    ReasonCode::ReceiveMaximumExceeded,
    ReasonCode::TopicAliasInvalid,
];

/// Properties allowed in a 5.0 DISCONNECT.
pub const DISCONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
    PropertyType::ServerReference,
];

/// DISCONNECT, the final packet exchanged before either side closes the
/// network connection.
///
/// Under 3.1.1 it always has an empty payload; under 5.0, if `remaining
/// length` is 0 on the wire the reason code defaults to
/// [`ReasonCode::Success`] with no properties.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisconnectPacket {
    protocol_level: ProtocolLevel,
    reason_code: ReasonCode,
    properties: Properties,
}

impl DisconnectPacket {
    #[must_use]
    pub fn new(level: ProtocolLevel) -> Self {
        Self {
            protocol_level: level,
            reason_code: ReasonCode::Success,
            properties: Properties::new(),
        }
    }

    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> &mut Self {
        self.reason_code = reason_code;
        self
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    #[must_use]
    pub const fn protocol_level(&self) -> ProtocolLevel {
        self.protocol_level
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    const fn is_v5(&self) -> bool {
        matches!(self.protocol_level, ProtocolLevel::V5)
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let remaining_length = if self.is_v5() {
            ReasonCode::bytes() + self.properties.bytes()
        } else {
            0
        };
        FixedHeader::new(PacketType::Disconnect, remaining_length)
    }
}

impl DisconnectPacket {
    /// # Errors
    ///
    /// Returns error on malformed bytes, or a non-empty payload under
    /// 3.1.1.
    pub fn decode_with_level(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Disconnect {
            return Err(DecodeError::InvalidPacketType);
        }

        let is_v5 = matches!(level, ProtocolLevel::V5);
        if !is_v5 {
            if fixed_header.remaining_length() != 0 {
                return Err(DecodeError::InvalidRemainingLength);
            }
            return Ok(Self::new(level));
        }

        if fixed_header.remaining_length() == 0 {
            return Ok(Self::new(level));
        }

        let reason_code = ReasonCode::decode(ba)?;
        if !DISCONNECT_REASONS.contains(&reason_code) {
            log::error!("DISCONNECT: invalid reason code {reason_code:?}");
            return Err(DecodeError::InvalidReasonCode);
        }

        let properties = Properties::decode(ba)?;
        if let Err(property_type) =
            check_property_type_list(properties.props(), DISCONNECT_PROPERTIES)
        {
            log::error!("DISCONNECT: property type {property_type:?} not allowed here");
            return Err(DecodeError::InvalidPropertyType);
        }

        Ok(Self {
            protocol_level: level,
            reason_code,
            properties,
        })
    }
}

impl DecodePacket for DisconnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Self::decode_with_level(ba, ProtocolLevel::V5)
    }
}

impl EncodePacket for DisconnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(buf)?;

        if self.is_v5() {
            self.reason_code.encode(buf)?;
            self.properties.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for DisconnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header()?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_always_empty() {
        let mut packet = DisconnectPacket::new(ProtocolLevel::V4);
        packet.set_reason_code(ReasonCode::ServerBusy);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0xe0, 0x00]);
    }

    #[test]
    fn test_v5_round_trip() {
        let mut packet = DisconnectPacket::new(ProtocolLevel::V5);
        packet.set_reason_code(ReasonCode::SessionTakenOver);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = DisconnectPacket::decode_with_level(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::SessionTakenOver);
    }
}
