// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketId, PacketType, ProtocolLevel, TopicFilter, VarIntError,
};

/// Properties allowed in a 5.0 UNSUBSCRIBE.
pub const UNSUBSCRIBE_PROPERTIES: &[PropertyType] = &[PropertyType::UserProperty];

/// UNSUBSCRIBE, requesting that the Server stop forwarding PUBLISHes for
/// one or more topic filters. Unfinished `QoS` 1/2 deliveries already in
/// flight are still completed.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    protocol_level: ProtocolLevel,
    packet_id: PacketId,
    properties: Properties,
    /// Must match the filters used in the original SUBSCRIBE exactly.
    topics: Vec<TopicFilter>,
}

impl UnsubscribePacket {
    /// # Errors
    ///
    /// Returns error if `topic` is not a well formed filter.
    pub fn new(topic: &str, packet_id: PacketId, level: ProtocolLevel) -> Result<Self, EncodeError> {
        Self::with_topics(&[topic], packet_id, level)
    }

    /// # Errors
    ///
    /// Returns error if any of `topics` is not a well formed filter.
    pub fn with_topics(
        topics: &[&str],
        packet_id: PacketId,
        level: ProtocolLevel,
    ) -> Result<Self, EncodeError> {
        let mut parsed = Vec::with_capacity(topics.len());
        for topic in topics {
            let topic = TopicFilter::parse(topic).map_err(|_e| EncodeError::InvalidString)?;
            parsed.push(topic);
        }
        Ok(Self {
            protocol_level: level,
            packet_id,
            properties: Properties::new(),
            topics: parsed,
        })
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

    /// # Errors
    ///
    /// Returns error if `topic` is not a well formed filter.
    pub fn add_topic(&mut self, topic: &str) -> Result<&mut Self, EncodeError> {
        let topic = TopicFilter::parse(topic).map_err(|_e| EncodeError::InvalidString)?;
        self.topics.push(topic);
        Ok(self)
    }

    #[must_use]
    pub fn topics(&self) -> &[TopicFilter] {
        &self.topics
    }

    pub fn mut_topics(&mut self) -> &mut Vec<TopicFilter> {
        &mut self.topics
    }

    const fn is_v5(&self) -> bool {
        matches!(self.protocol_level, ProtocolLevel::V5)
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = PacketId::bytes();
        if self.is_v5() {
            remaining_length += self.properties.bytes();
        }
        for topic in &self.topics {
            remaining_length += topic.bytes();
        }
        FixedHeader::new(PacketType::Unsubscribe, remaining_length)
    }
}

impl UnsubscribePacket {
    /// # Errors
    ///
    /// Returns error on malformed bytes, or an empty topic list
    /// [MQTT-3.10.3-2].
    pub fn decode_with_level(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Unsubscribe {
            return Err(DecodeError::InvalidPacketType);
        }

        let packet_id = PacketId::decode(ba)?;
        if packet_id.value() == 0 {
            return Err(DecodeError::InvalidPacketId);
        }

        let is_v5 = matches!(level, ProtocolLevel::V5);
        let properties = if is_v5 {
            let properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(properties.props(), UNSUBSCRIBE_PROPERTIES)
            {
                log::error!("UnsubscribePacket: property type {property_type:?} not allowed here");
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

        let mut topics = Vec::new();
        while consumed < fixed_header.remaining_length() {
            let topic = TopicFilter::decode(ba)?;
            consumed += topic.bytes();
            topics.push(topic);
        }

        // The Payload of an UNSUBSCRIBE packet MUST contain at least one
        // Topic Filter [MQTT-3.10.3-2].
        if topics.is_empty() {
            return Err(DecodeError::OtherErrors);
        }

        Ok(Self {
            protocol_level: level,
            packet_id,
            properties,
            topics,
        })
    }
}

impl DecodePacket for UnsubscribePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Self::decode_with_level(ba, ProtocolLevel::V5)
    }
}

impl EncodePacket for UnsubscribePacket {
    fn encode(&self, v: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = v.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(v)?;

        self.packet_id.encode(v)?;
        if self.is_v5() {
            self.properties.encode(v)?;
        }

        for topic in &self.topics {
            topic.encode(v)?;
        }

        Ok(v.len() - old_len)
    }
}

impl Packet for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
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
    fn test_v4_round_trip_has_no_properties() {
        let packet =
            UnsubscribePacket::new("sport/tennis/+", PacketId::from(5), ProtocolLevel::V4).unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribePacket::decode_with_level(&mut ba, ProtocolLevel::V4).unwrap();
        assert_eq!(decoded.topics().len(), 1);
    }

    #[test]
    fn test_empty_topics_rejected() {
        let packet = UnsubscribePacket {
            protocol_level: ProtocolLevel::V4,
            packet_id: PacketId::from(1),
            properties: Properties::new(),
            topics: Vec::new(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert!(UnsubscribePacket::decode_with_level(&mut ba, ProtocolLevel::V4).is_err());
    }
}
