// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketId, PacketType, ProtocolLevel, ReasonCode, VarIntError,
};

/// Reason codes a UNSUBACK is allowed to carry under 5.0 [MQTT-3.11.3-2].
pub const UNSUBSCRIBE_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::NoSubscriptionExisted,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::PacketIdentifierInUse,
];

/// Properties allowed in a 5.0 UNSUBACK.
pub const UNSUBSCRIBE_ACK_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

/// UNSUBACK, the Server's confirmation of an UNSUBSCRIBE.
///
/// Under 3.1.1 the packet carries no payload at all beyond the packet id
/// (`remaining_length` must equal exactly [`PacketId::bytes`]); under 5.0 it
/// carries properties and one reason code per unsubscribed filter
/// [MQTT-3.11.3-1].
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnsubscribeAckPacket {
    protocol_level: ProtocolLevel,
    packet_id: PacketId,
    properties: Properties,
    reasons: Vec<ReasonCode>,
}

impl UnsubscribeAckPacket {
    #[must_use]
    pub fn new(packet_id: PacketId, reason: ReasonCode, level: ProtocolLevel) -> Self {
        Self::with_vec(packet_id, vec![reason], level)
    }

    #[must_use]
    pub fn with_vec(packet_id: PacketId, reasons: Vec<ReasonCode>, level: ProtocolLevel) -> Self {
        Self {
            protocol_level: level,
            packet_id,
            properties: Properties::new(),
            reasons,
        }
    }

    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
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

    pub fn reasons_mut(&mut self) -> &mut Vec<ReasonCode> {
        &mut self.reasons
    }

    #[must_use]
    pub fn reasons(&self) -> &[ReasonCode] {
        &self.reasons
    }

    const fn is_v5(&self) -> bool {
        matches!(self.protocol_level, ProtocolLevel::V5)
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let remaining_length = if self.is_v5() {
            PacketId::bytes() + self.properties.bytes() + self.reasons.len() * ReasonCode::bytes()
        } else {
            PacketId::bytes()
        };
        FixedHeader::new(PacketType::UnsubscribeAck, remaining_length)
    }
}

impl UnsubscribeAckPacket {
    /// # Errors
    ///
    /// Returns error on malformed bytes, or a 3.1.1 packet whose
    /// `remaining_length` is not exactly [`PacketId::bytes`].
    pub fn decode_with_level(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::UnsubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }

        let is_v5 = matches!(level, ProtocolLevel::V5);
        if !is_v5 && fixed_header.remaining_length() != PacketId::bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }

        let packet_id = PacketId::decode(ba)?;

        if !is_v5 {
            return Ok(Self {
                protocol_level: level,
                packet_id,
                properties: Properties::new(),
                reasons: Vec::new(),
            });
        }

        let properties = if fixed_header.remaining_length() > PacketId::bytes() {
            let properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(properties.props(), UNSUBSCRIBE_ACK_PROPERTIES)
            {
                log::error!("UNSUBACK: property type {property_type:?} not allowed here");
                return Err(DecodeError::InvalidPropertyType);
            }
            properties
        } else {
            Properties::new()
        };

        let mut consumed = PacketId::bytes() + properties.bytes();
        let mut reasons = Vec::new();
        while consumed < fixed_header.remaining_length() {
            let reason = ReasonCode::decode(ba)?;
            if !UNSUBSCRIBE_REASONS.contains(&reason) {
                return Err(DecodeError::InvalidReasonCode);
            }
            reasons.push(reason);
            consumed += ReasonCode::bytes();
        }

        Ok(Self {
            protocol_level: level,
            packet_id,
            properties,
            reasons,
        })
    }
}

impl DecodePacket for UnsubscribeAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Self::decode_with_level(ba, ProtocolLevel::V5)
    }
}

impl EncodePacket for UnsubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;

        if self.is_v5() {
            self.properties.encode(buf)?;
            for reason in &self.reasons {
                reason.encode(buf)?;
            }
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for UnsubscribeAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::UnsubscribeAck
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
    fn test_v4_has_bare_packet_id() {
        let packet = UnsubscribeAckPacket::new(PacketId::from(6), ReasonCode::Success, ProtocolLevel::V4);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 4);

        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribeAckPacket::decode_with_level(&mut ba, ProtocolLevel::V4).unwrap();
        assert_eq!(decoded.packet_id().value(), 6);
    }

    #[test]
    fn test_v5_round_trip_keeps_reasons() {
        let packet = UnsubscribeAckPacket::with_vec(
            PacketId::from(6),
            vec![ReasonCode::NoSubscriptionExisted],
            ProtocolLevel::V5,
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribeAckPacket::decode_with_level(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded.reasons(), &[ReasonCode::NoSubscriptionExisted]);
    }
}
