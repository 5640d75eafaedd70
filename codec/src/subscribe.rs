// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::property::{
    check_multiple_subscription_identifiers, check_property_type_list, Properties, PropertyType,
};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketId, PacketType, ProtocolLevel, QoS, TopicFilter, VarIntError,
};

/// Properties allowed in a 5.0 SUBSCRIBE.
pub const SUBSCRIBE_PROPERTIES: &[PropertyType] =
    &[PropertyType::SubscriptionIdentifier, PropertyType::UserProperty];

/// What a Server does with retained messages when a subscription is
/// (re)established. 5.0 only; 3.1.1 behaves as [`Self::Send`] always.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetainHandling {
    /// Send retained messages at the time of the subscribe.
    #[default]
    Send = 0,

    /// Send retained messages at subscribe only if the subscription does not
    /// currently exist.
    SendFirst = 1,

    /// Do not send retained messages at the time of the subscribe.
    NoSend = 2,
}

impl TryFrom<u8> for RetainHandling {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Send),
            1 => Ok(Self::SendFirst),
            2 => Ok(Self::NoSend),
            _ => Err(DecodeError::OtherErrors),
        }
    }
}

/// A topic filter paired with the subscription options a client requests
/// for it.
///
/// `no_local`/`retain_as_published`/`retain_handling` only exist under 5.0;
/// encoding under 3.1.1 writes the `qos` bits alone and leaves the rest of
/// the options byte zeroed.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribeTopic {
    topic: TopicFilter,
    qos: QoS,
    no_local: bool,
    retain_as_published: bool,
    retain_handling: RetainHandling,
}

impl SubscribeTopic {
    /// # Errors
    ///
    /// Returns error if `topic` is not a well formed filter.
    pub fn new(topic: &str, qos: QoS) -> Result<Self, EncodeError> {
        let topic = TopicFilter::parse(topic).map_err(|_e| EncodeError::InvalidString)?;
        Ok(Self {
            topic,
            qos,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_str()
    }

    pub fn set_qos(&mut self, qos: QoS) -> &mut Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    pub fn set_no_local(&mut self, no_local: bool) -> &mut Self {
        self.no_local = no_local;
        self
    }

    #[must_use]
    pub const fn no_local(&self) -> bool {
        self.no_local
    }

    pub fn set_retain_as_published(&mut self, retain_as_published: bool) -> &mut Self {
        self.retain_as_published = retain_as_published;
        self
    }

    #[must_use]
    pub const fn retain_as_published(&self) -> bool {
        self.retain_as_published
    }

    pub fn set_retain_handling(&mut self, retain_handling: RetainHandling) -> &mut Self {
        self.retain_handling = retain_handling;
        self
    }

    #[must_use]
    pub const fn retain_handling(&self) -> RetainHandling {
        self.retain_handling
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        1 + self.topic.bytes()
    }

    fn encode_with_level(&self, buf: &mut Vec<u8>, is_v5: bool) -> Result<usize, EncodeError> {
        self.topic.encode(buf)?;
        let mut flag: u8 = 0b0000_0011 & (self.qos as u8);
        if is_v5 {
            if self.no_local {
                flag |= 0b0000_0100;
            }
            if self.retain_as_published {
                flag |= 0b0000_1000;
            }
            flag |= 0b0011_0000 & (self.retain_handling as u8);
        }
        buf.push(flag);
        Ok(self.bytes())
    }

    fn decode_with_level(ba: &mut ByteArray, is_v5: bool) -> Result<Self, DecodeError> {
        let topic = TopicFilter::decode(ba)?;
        let flag = ba.read_byte()?;
        let qos = QoS::try_from(flag & 0b0000_0011)?;

        if is_v5 {
            let no_local = (flag & 0b0000_0100) == 0b0000_0100;
            let retain_as_published = (flag & 0b0000_1000) == 0b0000_1000;
            let retain_handling = RetainHandling::try_from(flag & 0b0011_0000)?;
            // Bits 6 and 7 of the Subscription Options byte are reserved
            // [MQTT-3.8.3-5].
            if flag & 0b1100_0000 != 0b0000_0000 {
                return Err(DecodeError::OtherErrors);
            }
            Ok(Self {
                topic,
                qos,
                no_local,
                retain_as_published,
                retain_handling,
            })
        } else {
            // The upper 6 bits of the options byte are reserved in 3.1.1
            // [MQTT-3-8.3-4].
            if flag & 0b1111_0000 != 0b0000_0000 {
                return Err(DecodeError::InvalidQoS);
            }
            Ok(Self {
                topic,
                qos,
                ..Self::default()
            })
        }
    }
}

/// SUBSCRIBE, sent by a Client to register interest in one or more topic
/// filters.
///
/// A Server receiving a filter identical to an existing subscription
/// replaces it outright -- the `QoS` may differ, any matching retained
/// message is re-sent.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    protocol_level: ProtocolLevel,
    packet_id: PacketId,
    properties: Properties,
    topics: Vec<SubscribeTopic>,
}

impl SubscribePacket {
    /// # Errors
    ///
    /// Returns error if `topic` is not a well formed filter.
    pub fn new(
        topic: &str,
        qos: QoS,
        packet_id: PacketId,
        level: ProtocolLevel,
    ) -> Result<Self, EncodeError> {
        let topic = SubscribeTopic::new(topic, qos)?;
        Ok(Self {
            protocol_level: level,
            packet_id,
            properties: Properties::new(),
            topics: vec![topic],
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

    pub fn set_topics(&mut self, topics: &[SubscribeTopic]) -> &mut Self {
        self.topics.clear();
        self.topics.extend_from_slice(topics);
        self
    }

    #[must_use]
    pub fn topics(&self) -> &[SubscribeTopic] {
        &self.topics
    }

    pub fn mut_topics(&mut self) -> &mut Vec<SubscribeTopic> {
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
        FixedHeader::new(PacketType::Subscribe, remaining_length)
    }
}

impl SubscribePacket {
    /// # Errors
    ///
    /// Returns error on malformed bytes, or an empty topic list
    /// [MQTT-3.8.3-3].
    pub fn decode_with_level(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Subscribe {
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
                check_property_type_list(properties.props(), SUBSCRIBE_PROPERTIES)
            {
                log::error!("SubscribePacket: property type {property_type:?} not allowed here");
                return Err(DecodeError::InvalidPropertyType);
            }
            if let Err(property_type) = check_multiple_subscription_identifiers(properties.props())
            {
                log::error!("SubscribePacket: property type {property_type:?} repeated");
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
            let topic = SubscribeTopic::decode_with_level(ba, is_v5)?;
            consumed += topic.bytes();
            topics.push(topic);
        }

        // A SUBSCRIBE packet with no payload is a protocol violation
        // [MQTT-3.8.3-3].
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

impl DecodePacket for SubscribePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Self::decode_with_level(ba, ProtocolLevel::V5)
    }
}

impl EncodePacket for SubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(buf)?;

        self.packet_id.encode(buf)?;
        if self.is_v5() {
            self.properties.encode(buf)?;
        }

        for topic in &self.topics {
            topic.encode_with_level(buf, self.is_v5())?;
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
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
    fn test_v4_round_trip_ignores_v5_only_bits() {
        let mut packet = SubscribePacket::new(
            "sport/tennis/+",
            QoS::AtLeastOnce,
            PacketId::from(10),
            ProtocolLevel::V4,
        )
        .unwrap();
        packet.mut_topics()[0].set_no_local(true);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribePacket::decode_with_level(&mut ba, ProtocolLevel::V4).unwrap();
        assert!(!decoded.topics()[0].no_local());
        assert_eq!(decoded.topics()[0].qos(), QoS::AtLeastOnce);
    }

    #[test]
    fn test_v5_round_trip_keeps_options() {
        let mut packet = SubscribePacket::new(
            "sport/#",
            QoS::ExactOnce,
            PacketId::from(11),
            ProtocolLevel::V5,
        )
        .unwrap();
        packet.mut_topics()[0].set_no_local(true);
        packet.mut_topics()[0].set_retain_handling(RetainHandling::NoSend);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribePacket::decode_with_level(&mut ba, ProtocolLevel::V5).unwrap();
        assert!(decoded.topics()[0].no_local());
        assert_eq!(decoded.topics()[0].retain_handling(), RetainHandling::NoSend);
    }

    #[test]
    fn test_empty_topic_list_rejected() {
        let packet = SubscribePacket {
            protocol_level: ProtocolLevel::V4,
            packet_id: PacketId::from(1),
            properties: Properties::new(),
            topics: Vec::new(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert!(SubscribePacket::decode_with_level(&mut ba, ProtocolLevel::V4).is_err());
    }
}
