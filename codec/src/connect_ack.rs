// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::connect_return_code::ConnectReturnCode;
use crate::property::{check_property_type_list, Properties, PropertyType};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, ProtocolLevel, ReasonCode, VarIntError,
};

/// Reason codes a CONNACK is allowed to carry under 5.0 [MQTT-3.2.2-8].
pub const CONNECT_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::UnspecifiedError,
    ReasonCode::MalformedPacket,
    ReasonCode::ProtocolError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::UnsupportedProtocolVersion,
    ReasonCode::ClientIdentifierNotValid,
    ReasonCode::BadUserNameOrPassword,
    ReasonCode::NotAuthorized,
    ReasonCode::ServerUnavailable,
    ReasonCode::ServerBusy,
    ReasonCode::Banned,
    ReasonCode::BadAuthenticationMethod,
    ReasonCode::TopicNameInvalid,
    ReasonCode::PacketTooLarge,
    ReasonCode::QuotaExceeded,
    ReasonCode::PayloadFormatInvalid,
    ReasonCode::QosNotSupported,
    ReasonCode::UseAnotherServer,
    ReasonCode::ServerMoved,
    ReasonCode::ConnectionRateExceeded,
];

/// Properties allowed in a 5.0 CONNACK.
pub const CONNECT_ACK_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReceiveMaximum,
    PropertyType::MaximumQoS,
    PropertyType::RetainAvailable,
    PropertyType::MaximumPacketSize,
    PropertyType::AssignedClientIdentifier,
    PropertyType::TopicAliasMaximum,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
    PropertyType::WildcardSubscriptionAvailable,
    PropertyType::SubscriptionIdentifierAvailable,
    PropertyType::SharedSubscriptionAvailable,
    PropertyType::ServerKeepAlive,
    PropertyType::ResponseInformation,
    PropertyType::ServerReference,
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
];

/// Translate a 5.0 reason code to the narrower 3.1.1 return code space, for
/// packets decoded/encoded against [`ProtocolLevel::V3`]/[`ProtocolLevel::V4`].
fn reason_to_return_code(reason: ReasonCode) -> ConnectReturnCode {
    match reason {
        ReasonCode::Success => ConnectReturnCode::Accepted,
        ReasonCode::UnsupportedProtocolVersion => ConnectReturnCode::UnacceptedProtocol,
        ReasonCode::ClientIdentifierNotValid => ConnectReturnCode::IdentifierRejected,
        ReasonCode::BadUserNameOrPassword => ConnectReturnCode::MalformedUsernamePassword,
        ReasonCode::NotAuthorized | ReasonCode::Banned => ConnectReturnCode::NotAuthorized,
        _ => ConnectReturnCode::ServerUnavailable,
    }
}

const fn return_code_to_reason(code: ConnectReturnCode) -> ReasonCode {
    match code {
        ConnectReturnCode::Accepted => ReasonCode::Success,
        ConnectReturnCode::UnacceptedProtocol => ReasonCode::UnsupportedProtocolVersion,
        ConnectReturnCode::IdentifierRejected => ReasonCode::ClientIdentifierNotValid,
        ConnectReturnCode::MalformedUsernamePassword => ReasonCode::BadUserNameOrPassword,
        ConnectReturnCode::NotAuthorized => ReasonCode::NotAuthorized,
        ConnectReturnCode::ServerUnavailable => ReasonCode::ServerUnavailable,
    }
}

/// CONNACK, sent once by the server in response to CONNECT [MQTT-3.2.0-1/2].
///
/// Stores a [`ReasonCode`] regardless of protocol level; 3.1.1 wire
/// encode/decode narrows it through [`ConnectReturnCode`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectAckPacket {
    protocol_level: ProtocolLevel,
    session_present: bool,
    reason_code: ReasonCode,
    properties: Properties,
}

impl ConnectAckPacket {
    /// Create a new CONNACK.
    ///
    /// If `reason_code` is not [`ReasonCode::Success`], `session_present` is
    /// forced to `false` [MQTT-3.2.2-6].
    #[must_use]
    pub fn new(mut session_present: bool, reason_code: ReasonCode, level: ProtocolLevel) -> Self {
        if reason_code != ReasonCode::Success {
            session_present = false;
        }
        Self {
            protocol_level: level,
            session_present,
            reason_code,
            properties: Properties::new(),
        }
    }

    /// Update reason code.
    ///
    /// # Errors
    ///
    /// Returns error if `reason_code` is not in [`CONNECT_REASONS`].
    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> Result<&mut Self, EncodeError> {
        if !CONNECT_REASONS.contains(&reason_code) {
            return Err(EncodeError::InvalidPacketType);
        }
        if reason_code != ReasonCode::Success {
            self.session_present = false;
        }
        self.reason_code = reason_code;
        Ok(self)
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    /// Get the 3.1.1 return code corresponding to this CONNACK's reason code.
    #[must_use]
    pub fn return_code(&self) -> ConnectReturnCode {
        reason_to_return_code(self.reason_code)
    }

    pub fn set_session_present(&mut self, present: bool) -> &mut Self {
        self.session_present = present;
        self
    }

    #[must_use]
    pub const fn session_present(&self) -> bool {
        self.session_present
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
        let remaining_length = 1
            + if self.is_v5() {
                ReasonCode::bytes() + self.properties.bytes()
            } else {
                ConnectReturnCode::bytes()
            };
        FixedHeader::new(PacketType::ConnectAck, remaining_length)
    }
}

impl DecodePacket for ConnectAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Self::decode_with_level(ba, ProtocolLevel::V5)
    }
}

impl ConnectAckPacket {
    /// Decode a CONNACK whose protocol level is already known from the
    /// CONNECT this reply answers.
    ///
    /// # Errors
    ///
    /// Returns error on malformed bytes, or a reason/return code this
    /// packet type does not allow.
    pub fn decode_with_level(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::ConnectAck {
            return Err(DecodeError::InvalidPacketType);
        }

        let ack_flags = ba.read_byte()?;
        let session_present = ack_flags & 0b0000_0001 == 0b0000_0001;

        let is_v5 = matches!(level, ProtocolLevel::V5);
        let (reason_code, properties) = if is_v5 {
            let reason_code = ReasonCode::decode(ba)?;
            if !CONNECT_REASONS.contains(&reason_code) {
                return Err(DecodeError::InvalidReasonCode);
            }
            let properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(properties.props(), CONNECT_ACK_PROPERTIES)
            {
                log::error!("CONNACK: property type {property_type:?} not allowed here");
                return Err(DecodeError::InvalidPropertyType);
            }
            (reason_code, properties)
        } else {
            let return_code = ConnectReturnCode::decode(ba)?;
            (return_code_to_reason(return_code), Properties::new())
        };

        Ok(Self {
            protocol_level: level,
            session_present,
            reason_code,
            properties,
        })
    }
}

impl EncodePacket for ConnectAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(buf)?;

        let ack_flags = u8::from(self.session_present);
        buf.push(ack_flags);

        if self.is_v5() {
            self.reason_code.encode(buf)?;
            self.properties.encode(buf)?;
        } else {
            self.return_code().encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for ConnectAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnectAck
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header()?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::{ByteArray, ConnectAckPacket, ProtocolLevel};

    #[test]
    fn test_decode_v4() {
        let buf: Vec<u8> = vec![0x20, 0x02, 0x00, 0x00];
        let mut ba = ByteArray::new(&buf);
        let packet = ConnectAckPacket::decode_with_level(&mut ba, ProtocolLevel::V4).unwrap();
        assert!(!packet.session_present());
    }
}
