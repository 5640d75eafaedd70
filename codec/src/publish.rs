// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::io::Write;

use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketId, PacketType, ProtocolLevel, PubTopic, QoS, VarIntError,
};

/// Properties allowed in a 5.0 PUBLISH [MQTT-3.3.2].
pub const PUBLISH_PROPERTIES: &[PropertyType] = &[
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::TopicAlias,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
    PropertyType::ContentType,
];

/// PUBLISH transports an application message from Client to Server or
/// Server to Client.
///
/// Wire layout:
///
/// ```txt
///  7                     0
/// +-----------------------+
/// | Fixed header          |
/// +-----------------------+
/// | Topic name            |
/// +-----------------------+
/// | Packet id (QoS 1/2)   |
/// +-----------------------+
/// | Properties (5.0 only) |
/// +-----------------------+
/// | Payload               |
/// +-----------------------+
/// ```
///
/// Response: none at `QoS` 0, [`crate::PublishAckPacket`] at `QoS` 1,
/// [`crate::PublishReceivedPacket`] at `QoS` 2.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PublishPacket {
    protocol_level: ProtocolLevel,

    /// MUST be set to 1 on re-delivery, and MUST be 0 for `QoS` 0 [MQTT-3.3.1-1/2].
    dup: bool,

    qos: QoS,

    retain: bool,

    /// MUST NOT contain wildcard characters [MQTT-3.3.2-2].
    topic: PubTopic,

    /// Only present when `qos` is 1 or 2.
    packet_id: PacketId,

    properties: Properties,

    msg: Vec<u8>,
}

impl PublishPacket {
    /// Create a new publish packet.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid.
    pub fn new(topic: &str, qos: QoS, msg: &[u8], level: ProtocolLevel) -> Result<Self, EncodeError> {
        let topic = PubTopic::new(topic)?;
        Ok(Self {
            protocol_level: level,
            qos,
            dup: false,
            retain: false,
            topic,
            packet_id: PacketId::new(0),
            properties: Properties::new(),
            msg: msg.to_vec(),
        })
    }

    /// Append bytes to the payload.
    pub fn append(&mut self, msg_parts: &[u8]) {
        self.msg.extend_from_slice(msg_parts);
    }

    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    /// # Errors
    ///
    /// Returns error if `dup` is set on a `QoS` 0 packet [MQTT-3.3.1-2].
    pub fn set_dup(&mut self, dup: bool) -> Result<&mut Self, EncodeError> {
        if dup && self.qos == QoS::AtMostOnce {
            return Err(EncodeError::InvalidPacketType);
        }
        self.dup = dup;
        Ok(self)
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    pub fn set_qos(&mut self, qos: QoS) -> &mut Self {
        if qos == QoS::AtMostOnce {
            self.packet_id = PacketId::new(0);
        }
        self.qos = qos;
        self
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    /// # Errors
    ///
    /// Returns error if `topic` is invalid.
    pub fn set_topic(&mut self, topic: &str) -> Result<&mut Self, EncodeError> {
        self.topic = PubTopic::new(topic)?;
        Ok(self)
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_ref()
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn message(&self) -> &[u8] {
        &self.msg
    }

    #[must_use]
    pub const fn protocol_level(&self) -> ProtocolLevel {
        self.protocol_level
    }

    const fn is_v5(&self) -> bool {
        matches!(self.protocol_level, ProtocolLevel::V5)
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = self.topic.bytes() + self.msg.len();
        if self.qos != QoS::AtMostOnce {
            remaining_length += PacketId::bytes();
        }
        if self.is_v5() {
            remaining_length += self.properties.bytes();
        }

        let packet_type = PacketType::Publish {
            dup: self.dup,
            retain: self.retain,
            qos: self.qos,
        };
        FixedHeader::new(packet_type, remaining_length)
    }
}

impl PublishPacket {
    /// Decode a PUBLISH whose protocol level is already known.
    ///
    /// # Errors
    ///
    /// Returns error on malformed bytes.
    pub fn decode_with_level(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        let (dup, qos, retain) =
            if let PacketType::Publish { dup, qos, retain } = fixed_header.packet_type() {
                (dup, qos, retain)
            } else {
                return Err(DecodeError::InvalidPacketType);
            };

        // The DUP flag MUST be set to 0 for all QoS 0 messages [MQTT-3.3.1-2].
        if dup && qos == QoS::AtMostOnce {
            return Err(DecodeError::InvalidPacketFlags);
        }

        let topic = PubTopic::decode(ba)?;

        // A PUBLISH packet MUST NOT contain a Packet Identifier if its QoS value
        // is 0 [MQTT-2.2.1-2].
        let packet_id = if qos == QoS::AtMostOnce {
            PacketId::new(0)
        } else {
            let packet_id = PacketId::decode(ba)?;
            if packet_id.value() == 0 {
                return Err(DecodeError::InvalidPacketId);
            }
            packet_id
        };

        let is_v5 = matches!(level, ProtocolLevel::V5);
        let properties = if is_v5 {
            let properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(properties.props(), PUBLISH_PROPERTIES)
            {
                log::error!(
                    "PublishPacket: property type {property_type:?} cannot be used in properties!"
                );
                return Err(DecodeError::InvalidPropertyType);
            }
            properties
        } else {
            Properties::new()
        };

        let mut consumed = topic.bytes();
        if qos != QoS::AtMostOnce {
            consumed += PacketId::bytes();
        }
        if is_v5 {
            consumed += properties.bytes();
        }
        if fixed_header.remaining_length() < consumed {
            return Err(DecodeError::InvalidRemainingLength);
        }
        let msg_len = fixed_header.remaining_length() - consumed;
        let msg = ba.read_bytes(msg_len)?.to_vec();

        Ok(Self {
            protocol_level: level,
            dup,
            qos,
            retain,
            topic,
            packet_id,
            properties,
            msg,
        })
    }
}

impl DecodePacket for PublishPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Self::decode_with_level(ba, ProtocolLevel::V5)
    }
}

impl EncodePacket for PublishPacket {
    fn encode(&self, v: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = v.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(v)?;

        self.topic.encode(v)?;
        if self.qos != QoS::AtMostOnce {
            self.packet_id.encode(v)?;
        }
        if self.is_v5() {
            self.properties.encode(v)?;
        }
        v.write_all(&self.msg)?;

        Ok(v.len() - old_len)
    }
}

impl Packet for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish {
            dup: self.dup,
            retain: self.retain,
            qos: self.qos,
        }
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
    fn test_v4_publish_has_no_properties() {
        let packet = PublishPacket::new("a/b", QoS::AtMostOnce, b"hello", ProtocolLevel::V4).unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode_with_level(&mut ba, ProtocolLevel::V4).unwrap();
        assert_eq!(decoded.message(), b"hello");
        assert!(decoded.properties().is_empty());
    }

    #[test]
    fn test_qos0_rejects_dup() {
        let mut packet = PublishPacket::new("a/b", QoS::AtMostOnce, b"x", ProtocolLevel::V4).unwrap();
        assert!(packet.set_dup(true).is_err());
    }

    #[test]
    fn test_qos1_round_trip_carries_packet_id() {
        let mut packet =
            PublishPacket::new("a/b", QoS::AtLeastOnce, b"hi", ProtocolLevel::V4).unwrap();
        packet.set_packet_id(PacketId::from(7));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode_with_level(&mut ba, ProtocolLevel::V4).unwrap();
        assert_eq!(decoded.packet_id().value(), 7);
    }
}
