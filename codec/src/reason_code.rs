// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

/// A Reason Code is a one byte unsigned value that indicates the result of an operation.
///
/// Reason Codes less than 0x80 indicate successful completion of an operation.
/// The normal Reason Code for success is 0. Reason Code values of 0x80 or greater
/// indicate failure.
///
/// The CONNACK, PUBACK, PUBREC, PUBREL, PUBCOMP, DISCONNECT and AUTH Control Packets
/// have a single Reason Code as part of the Variable Header. The SUBACK and UNSUBACK
/// packets contain a list of one or more Reason Codes in the Payload.
///
/// Only defined under MQTT 5.0; 3.1.1 uses narrower per-packet return/ack codes instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReasonCode {
    /// - Success: CONNACK, PUBACK, PUBREC, PUBREL, PUBCOMP, UNSUBACK, AUTH
    /// - Normal disconnection: DISCONNECT
    /// - Granted QoS 0: SUBACK
    #[default]
    Success,

    /// Granted QoS 1: SUBACK
    GrantedQos1,

    /// Granted QoS 2: SUBACK
    GrantedQos2,

    /// Disconnect with Will Message: DISCONNECT
    DisconnectWithWillMessage,

    /// No matching subscribers: PUBACK, PUBREC
    NoMatchingSubscribers,

    /// No subscription existed: UNSUBACK
    NoSubscriptionExisted,

    /// Continue authentication: AUTH
    ContinueAuthentication,

    /// Re-authenticate: AUTH
    ReAuthenticate,

    /// Unspecified error: CONNACK, PUBACK, PUBREC, SUBACK, UNSUBACK, DISCONNECT
    UnspecifiedError,

    /// Malformed Packet: CONNACK, DISCONNECT
    MalformedPacket,

    /// Protocol Error: CONNACK, DISCONNECT
    ProtocolError,

    /// Implementation specific error: CONNACK, PUBACK, PUBREC, SUBACK, UNSUBACK, DISCONNECT
    ImplementationSpecificError,

    /// Unsupported Protocol Version: CONNACK
    UnsupportedProtocolVersion,

    /// Client Identifier not valid: CONNACK
    ClientIdentifierNotValid,

    /// Bad User Name or Password: CONNACK
    BadUserNameOrPassword,

    /// Not authorized: CONNACK, PUBACK, PUBREC, SUBACK, UNSUBACK, DISCONNECT
    NotAuthorized,

    /// Server unavailable: CONNACK
    ServerUnavailable,

    /// Server busy: CONNACK, DISCONNECT
    ServerBusy,

    /// Banned: CONNACK
    Banned,

    /// Server shutting down: DISCONNECT
    ServerShuttingDown,

    /// Bad authentication method: CONNACK, DISCONNECT
    BadAuthenticationMethod,

    /// Keep Alive timeout: DISCONNECT
    KeepAliveTimeout,

    /// Session taken over: DISCONNECT
    SessionTakenOver,

    /// Topic Filter invalid: SUBACK, UNSUBACK, DISCONNECT
    TopicFilterInvalid,

    /// Topic Name invalid: CONNACK, PUBACK, PUBREC, DISCONNECT
    TopicNameInvalid,

    /// Packet Identifier in use: PUBACK, PUBREC, SUBACK, UNSUBACK
    PacketIdentifierInUse,

    /// Packet Identifier not found: PUBREL, PUBCOMP
    PacketIdentifierNotFound,

    /// Receive Maximum exceeded: DISCONNECT
    ReceiveMaximumExceeded,

    /// Topic Alias invalid: DISCONNECT
    TopicAliasInvalid,

    /// Packet too large: CONNACK, DISCONNECT
    PacketTooLarge,

    /// Message rate too high: DISCONNECT
    MessageRateTooHigh,

    /// Quota exceeded: CONNACK, PUBACK, PUBREC, SUBACK, DISCONNECT
    QuotaExceeded,

    /// Administrative action: DISCONNECT
    AdministrativeAction,

    /// Payload format invalid: CONNACK, PUBACK, PUBREC, DISCONNECT
    PayloadFormatInvalid,

    /// Retain not supported: CONNACK, DISCONNECT
    RetainNotSupported,

    /// QoS not supported: CONNACK, DISCONNECT
    QosNotSupported,

    /// Use another server: CONNACK, DISCONNECT
    UseAnotherServer,

    /// Server moved: CONNACK, DISCONNECT
    ServerMoved,

    /// Shared Subscriptions not supported: SUBACK, DISCONNECT
    SharedSubscriptionNotSupported,

    /// Connection rate exceeded: CONNACK, DISCONNECT
    ConnectionRateExceeded,

    /// Maximum connect time: DISCONNECT
    MaximumConnectTime,

    /// Subscription Identifiers not supported: SUBACK, DISCONNECT
    SubscriptionIdentifiersNotSupported,

    /// Wildcard Subscriptions not supported: SUBACK, DISCONNECT
    WildcardSubscriptionsNotSupported,
}

impl ReasonCode {
    /// Reason codes below 0x80 indicate success.
    #[must_use]
    pub fn is_success(self) -> bool {
        let code: u8 = self.into();
        code < 0x80
    }

    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl From<ReasonCode> for u8 {
    fn from(code: ReasonCode) -> Self {
        match code {
            ReasonCode::Success => 0x00,
            ReasonCode::GrantedQos1 => 0x01,
            ReasonCode::GrantedQos2 => 0x02,
            ReasonCode::DisconnectWithWillMessage => 0x04,
            ReasonCode::NoMatchingSubscribers => 0x10,
            ReasonCode::NoSubscriptionExisted => 0x11,
            ReasonCode::ContinueAuthentication => 0x18,
            ReasonCode::ReAuthenticate => 0x19,
            ReasonCode::UnspecifiedError => 0x80,
            ReasonCode::MalformedPacket => 0x81,
            ReasonCode::ProtocolError => 0x82,
            ReasonCode::ImplementationSpecificError => 0x83,
            ReasonCode::UnsupportedProtocolVersion => 0x84,
            ReasonCode::ClientIdentifierNotValid => 0x85,
            ReasonCode::BadUserNameOrPassword => 0x86,
            ReasonCode::NotAuthorized => 0x87,
            ReasonCode::ServerUnavailable => 0x88,
            ReasonCode::ServerBusy => 0x89,
            ReasonCode::Banned => 0x8a,
            ReasonCode::ServerShuttingDown => 0x8b,
            ReasonCode::BadAuthenticationMethod => 0x8c,
            ReasonCode::KeepAliveTimeout => 0x8d,
            ReasonCode::SessionTakenOver => 0x8e,
            ReasonCode::TopicFilterInvalid => 0x8f,
            ReasonCode::TopicNameInvalid => 0x90,
            ReasonCode::PacketIdentifierInUse => 0x91,
            ReasonCode::PacketIdentifierNotFound => 0x92,
            ReasonCode::ReceiveMaximumExceeded => 0x93,
            ReasonCode::TopicAliasInvalid => 0x94,
            ReasonCode::PacketTooLarge => 0x95,
            ReasonCode::MessageRateTooHigh => 0x96,
            ReasonCode::QuotaExceeded => 0x97,
            ReasonCode::AdministrativeAction => 0x98,
            ReasonCode::PayloadFormatInvalid => 0x99,
            ReasonCode::RetainNotSupported => 0x9a,
            ReasonCode::QosNotSupported => 0x9b,
            ReasonCode::UseAnotherServer => 0x9c,
            ReasonCode::ServerMoved => 0x9d,
            ReasonCode::SharedSubscriptionNotSupported => 0x9e,
            ReasonCode::ConnectionRateExceeded => 0x9f,
            ReasonCode::MaximumConnectTime => 0xa0,
            ReasonCode::SubscriptionIdentifiersNotSupported => 0xa1,
            ReasonCode::WildcardSubscriptionsNotSupported => 0xa2,
        }
    }
}

impl TryFrom<u8> for ReasonCode {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0x00 => Self::Success,
            0x01 => Self::GrantedQos1,
            0x02 => Self::GrantedQos2,
            0x04 => Self::DisconnectWithWillMessage,
            0x10 => Self::NoMatchingSubscribers,
            0x11 => Self::NoSubscriptionExisted,
            0x18 => Self::ContinueAuthentication,
            0x19 => Self::ReAuthenticate,
            0x80 => Self::UnspecifiedError,
            0x81 => Self::MalformedPacket,
            0x82 => Self::ProtocolError,
            0x83 => Self::ImplementationSpecificError,
            0x84 => Self::UnsupportedProtocolVersion,
            0x85 => Self::ClientIdentifierNotValid,
            0x86 => Self::BadUserNameOrPassword,
            0x87 => Self::NotAuthorized,
            0x88 => Self::ServerUnavailable,
            0x89 => Self::ServerBusy,
            0x8a => Self::Banned,
            0x8b => Self::ServerShuttingDown,
            0x8c => Self::BadAuthenticationMethod,
            0x8d => Self::KeepAliveTimeout,
            0x8e => Self::SessionTakenOver,
            0x8f => Self::TopicFilterInvalid,
            0x90 => Self::TopicNameInvalid,
            0x91 => Self::PacketIdentifierInUse,
            0x92 => Self::PacketIdentifierNotFound,
            0x93 => Self::ReceiveMaximumExceeded,
            0x94 => Self::TopicAliasInvalid,
            0x95 => Self::PacketTooLarge,
            0x96 => Self::MessageRateTooHigh,
            0x97 => Self::QuotaExceeded,
            0x98 => Self::AdministrativeAction,
            0x99 => Self::PayloadFormatInvalid,
            0x9a => Self::RetainNotSupported,
            0x9b => Self::QosNotSupported,
            0x9c => Self::UseAnotherServer,
            0x9d => Self::ServerMoved,
            0x9e => Self::SharedSubscriptionNotSupported,
            0x9f => Self::ConnectionRateExceeded,
            0xa0 => Self::MaximumConnectTime,
            0xa1 => Self::SubscriptionIdentifiersNotSupported,
            0xa2 => Self::WildcardSubscriptionsNotSupported,
            _ => return Err(DecodeError::InvalidReasonCode),
        })
    }
}

impl DecodePacket for ReasonCode {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let byte = ba.read_byte()?;
        Self::try_from(byte)
    }
}

impl EncodePacket for ReasonCode {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push((*self).into());
        Ok(1)
    }
}

/// Checks that `code` is one of the reason codes this packet type allows to
/// receive. Receipt of any other code marks the containing packet invalid.
///
/// # Errors
///
/// Returns `DecodeError::InvalidReasonCode` if `code` is not in `allowed`.
pub fn check_reason_code(code: ReasonCode, allowed: &[ReasonCode]) -> Result<(), DecodeError> {
    if allowed.contains(&code) {
        Ok(())
    } else {
        Err(DecodeError::InvalidReasonCode)
    }
}
