// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketId, PacketType, ProtocolLevel, ReasonCode, VarIntError,
};

/// Reason codes a PUBCOMP is allowed to carry under 5.0.
pub const PUBLISH_COMPLETE_REASONS: &[ReasonCode] =
    &[ReasonCode::Success, ReasonCode::PacketIdentifierNotFound];

/// Properties allowed in a 5.0 PUBCOMP.
pub const PUBLISH_COMPLETE_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

/// PUBCOMP, the final step in the `QoS` 2 handshake.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PublishCompletePacket {
    protocol_level: ProtocolLevel,
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishCompletePacket {
    #[must_use]
    pub fn new(packet_id: PacketId, level: ProtocolLevel) -> Self {
        Self {
            protocol_level: level,
            packet_id,
            reason_code: ReasonCode::Success,
            properties: Properties::new(),
        }
    }

    /// # Errors
    ///
    /// Returns error if `reason_code` is not in [`PUBLISH_COMPLETE_REASONS`].
    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> Result<&mut Self, EncodeError> {
        if !PUBLISH_COMPLETE_REASONS.contains(&reason_code) {
            return Err(EncodeError::InvalidPacketType);
        }
        self.reason_code = reason_code;
        Ok(self)
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
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

    fn has_reason_tail(&self) -> bool {
        self.is_v5() && (self.reason_code != ReasonCode::Success || !self.properties.is_empty())
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let remaining_length = PacketId::bytes()
            + if self.has_reason_tail() {
                ReasonCode::bytes() + self.properties.bytes()
            } else {
                0
            };
        FixedHeader::new(PacketType::PublishComplete, remaining_length)
    }
}

impl PublishCompletePacket {
    /// # Errors
    ///
    /// Returns error on malformed bytes.
    pub fn decode_with_level(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::PublishComplete {
            return Err(DecodeError::InvalidPacketType);
        }

        let packet_id = PacketId::decode(ba)?;

        let is_v5 = matches!(level, ProtocolLevel::V5);
        let (reason_code, properties) =
            if is_v5 && fixed_header.remaining_length() > PacketId::bytes() {
                let reason_code = ReasonCode::decode(ba)?;
                if !PUBLISH_COMPLETE_REASONS.contains(&reason_code) {
                    return Err(DecodeError::InvalidReasonCode);
                }
                let properties = Properties::decode(ba)?;
                if let Err(property_type) =
                    check_property_type_list(properties.props(), PUBLISH_COMPLETE_PROPERTIES)
                {
                    log::error!("PUBCOMP: property type {property_type:?} not allowed here");
                    return Err(DecodeError::InvalidPropertyType);
                }
                (reason_code, properties)
            } else {
                (ReasonCode::Success, Properties::new())
            };

        Ok(Self {
            protocol_level: level,
            packet_id,
            reason_code,
            properties,
        })
    }
}

impl DecodePacket for PublishCompletePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Self::decode_with_level(ba, ProtocolLevel::V5)
    }
}

impl EncodePacket for PublishCompletePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;

        if self.has_reason_tail() {
            self.reason_code.encode(buf)?;
            self.properties.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for PublishCompletePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PublishComplete
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
    fn test_success_omits_reason_tail() {
        let packet = PublishCompletePacket::new(PacketId::from(3), ProtocolLevel::V5);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_v4_round_trip() {
        let packet = PublishCompletePacket::new(PacketId::from(3), ProtocolLevel::V4);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishCompletePacket::decode_with_level(&mut ba, ProtocolLevel::V4).unwrap();
        assert_eq!(decoded.packet_id().value(), 3);
    }
}
