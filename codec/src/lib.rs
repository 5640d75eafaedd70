// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Wire codec for MQTT 3.1.1 and 5.0: fixed header framing, the variable
//! byte integer, the 5.0 property system, and one struct per packet type
//! shared across both protocol levels.

mod auth;
mod binary_data;
mod bool_data;
mod byte_array;
mod connect;
mod connect_ack;
mod connect_flags;
mod connect_return_code;
mod disconnect;
mod error;
mod header;
mod keep_alive;
mod packet_id;
mod ping_request;
mod ping_response;
pub mod property;
mod protocol_level;
mod publish;
mod publish_ack;
mod publish_complete;
mod publish_release;
mod publish_received;
mod qos;
mod reason_code;
mod string_data;
mod string_pair_data;
mod subscribe;
mod subscribe_ack;
mod topic;
mod traits;
mod u16_data;
mod u32_data;
mod unsubscribe;
mod unsubscribe_ack;
pub mod utils;
mod var_int;

pub use auth::{AuthPacket, AUTH_PROPERTIES, AUTH_REASONS};
pub use binary_data::BinaryData;
pub use bool_data::BoolData;
pub use byte_array::ByteArray;
pub use connect::{ConnectPacket, CONNECT_PROPERTIES, CONNECT_WILL_PROPERTIES, PROTOCOL_NAME};
pub use connect_ack::{ConnectAckPacket, CONNECT_ACK_PROPERTIES, CONNECT_REASONS};
pub use connect_flags::ConnectFlags;
pub use connect_return_code::ConnectReturnCode;
pub use disconnect::{DisconnectPacket, DISCONNECT_PROPERTIES, DISCONNECT_REASONS};
pub use error::{DecodeError, EncodeError};
pub use header::{FixedHeader, Packet, PacketType};
pub use keep_alive::{validate_keep_alive, KeepAlive};
pub use packet_id::PacketId;
pub use ping_request::PingRequestPacket;
pub use ping_response::PingResponsePacket;
pub use property::{Properties, Property, PropertyType};
pub use protocol_level::ProtocolLevel;
pub use publish::{PublishPacket, PUBLISH_PROPERTIES};
pub use publish_ack::{PublishAckPacket, PUBLISH_ACK_PROPERTIES, PUBLISH_ACK_REASONS};
pub use publish_complete::{
    PublishCompletePacket, PUBLISH_COMPLETE_PROPERTIES, PUBLISH_COMPLETE_REASONS,
};
pub use publish_received::{
    PublishReceivedPacket, PUBLISH_RECEIVED_PROPERTIES, PUBLISH_RECEIVED_REASONS,
};
pub use publish_release::{
    PublishReleasePacket, PUBLISH_RELEASE_PROPERTIES, PUBLISH_RELEASE_REASONS,
};
pub use qos::QoS;
pub use reason_code::ReasonCode;
pub use string_data::StringData;
pub use string_pair_data::StringPairData;
pub use subscribe::{
    RetainHandling, SubscribePacket, SubscribeTopic, SUBSCRIBE_PROPERTIES,
};
pub use subscribe_ack::{SubscribeAckPacket, SUBSCRIBE_ACK_PROPERTIES, SUBSCRIBE_REASONS};
pub use topic::{validate_pub_topic, validate_sub_topic, PubTopic, TopicError, TopicFilter};
pub use traits::{DecodePacket, EncodePacket};
pub use u16_data::U16Data;
pub use u32_data::U32Data;
pub use unsubscribe::{UnsubscribePacket, UNSUBSCRIBE_PROPERTIES};
pub use unsubscribe_ack::{
    UnsubscribeAckPacket, UNSUBSCRIBE_ACK_PROPERTIES, UNSUBSCRIBE_REASONS,
};
pub use var_int::{VarInt, VarIntError, MAX_PACKET_LEN};
