// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketId, PacketType, ProtocolLevel, QoS, ReasonCode, VarIntError,
};

/// Reason codes a SUBACK is allowed to carry under 5.0 [MQTT-3.9.3-1].
pub const SUBSCRIBE_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::GrantedQos1,
    ReasonCode::GrantedQos2,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::PacketIdentifierInUse,
    ReasonCode::QuotaExceeded,
    ReasonCode::SharedSubscriptionNotSupported,
    ReasonCode::SubscriptionIdentifiersNotSupported,
    ReasonCode::WildcardSubscriptionsNotSupported,
];

/// Properties allowed in a 5.0 SUBACK.
pub const SUBSCRIBE_ACK_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

/// Translate a 3.1.1 grant/failure byte to its 5.0 reason code equivalent,
/// so callers see one reason-code API regardless of protocol level.
const fn return_byte_to_reason(byte: u8) -> Result<ReasonCode, DecodeError> {
    match byte & 0b1000_0011 {
        0b1000_0000 => Ok(ReasonCode::UnspecifiedError),
        0b0000_0010 => Ok(ReasonCode::GrantedQos2),
        0b0000_0001 => Ok(ReasonCode::GrantedQos1),
        0b0000_0000 => Ok(ReasonCode::Success),
        _ => Err(DecodeError::InvalidQoS),
    }
}

/// Narrow a reason code back to the single grant/failure byte 3.1.1 uses.
/// Any failure reason collapses to the generic `0x80` "Failure" byte
/// [MQTT-3.1.1 §3.9.3].
const fn reason_to_return_byte(reason: ReasonCode) -> u8 {
    match reason {
        ReasonCode::Success => QoS::AtMostOnce as u8,
        ReasonCode::GrantedQos1 => QoS::AtLeastOnce as u8,
        ReasonCode::GrantedQos2 => QoS::ExactOnce as u8,
        _ => 0b1000_0000,
    }
}

/// SUBACK, the Server's reply to SUBSCRIBE.
///
/// Reason codes are tracked uniformly as [`ReasonCode`] regardless of
/// protocol level; 3.1.1 wire encode/decode narrows each to a single
/// grant/failure byte.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SubscribeAckPacket {
    protocol_level: ProtocolLevel,
    packet_id: PacketId,
    properties: Properties,
    /// One reason per Topic Filter in the SUBSCRIBE being acknowledged, in
    /// the same order [MQTT-3.9.3-1].
    reasons: Vec<ReasonCode>,
}

impl SubscribeAckPacket {
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
        let mut remaining_length = PacketId::bytes() + self.reasons.len() * ReasonCode::bytes();
        if self.is_v5() {
            remaining_length += self.properties.bytes();
        }
        FixedHeader::new(PacketType::SubscribeAck, remaining_length)
    }
}

impl SubscribeAckPacket {
    /// # Errors
    ///
    /// Returns error on malformed bytes.
    pub fn decode_with_level(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::SubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }

        let packet_id = PacketId::decode(ba)?;

        let is_v5 = matches!(level, ProtocolLevel::V5);
        let properties = if is_v5 {
            let properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(properties.props(), SUBSCRIBE_ACK_PROPERTIES)
            {
                log::error!("SUBACK: property type {property_type:?} not allowed here");
                return Err(DecodeError::InvalidPropertyType);
            }
            properties
        } else {
            Properties::new()
        };

        let mut consumed = PacketId::bytes();
        if is_v5 {
            consumed += properties.bytes();
        }

        let mut reasons = Vec::new();
        while consumed < fixed_header.remaining_length() {
            let reason = if is_v5 {
                let reason = ReasonCode::decode(ba)?;
                if !SUBSCRIBE_REASONS.contains(&reason) {
                    return Err(DecodeError::InvalidReasonCode);
                }
                reason
            } else {
                let byte = ba.read_byte()?;
                return_byte_to_reason(byte)?
            };
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

impl DecodePacket for SubscribeAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Self::decode_with_level(ba, ProtocolLevel::V5)
    }
}

impl EncodePacket for SubscribeAckPacket {
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
        } else {
            for reason in &self.reasons {
                buf.push(reason_to_return_byte(*reason));
            }
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for SubscribeAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubscribeAck
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
    fn test_v4_round_trip_collapses_to_grant_byte() {
        let packet = SubscribeAckPacket::with_vec(
            PacketId::from(4),
            vec![ReasonCode::GrantedQos1, ReasonCode::NotAuthorized],
            ProtocolLevel::V4,
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribeAckPacket::decode_with_level(&mut ba, ProtocolLevel::V4).unwrap();
        assert_eq!(
            decoded.reasons(),
            &[ReasonCode::GrantedQos1, ReasonCode::UnspecifiedError]
        );
    }

    #[test]
    fn test_v5_round_trip_keeps_exact_reason() {
        let packet = SubscribeAckPacket::with_vec(
            PacketId::from(4),
            vec![ReasonCode::TopicFilterInvalid],
            ProtocolLevel::V5,
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribeAckPacket::decode_with_level(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded.reasons(), &[ReasonCode::TopicFilterInvalid]);
    }
}
