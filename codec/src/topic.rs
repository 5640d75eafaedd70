// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, WriteBytesExt};
use std::fmt;
use std::io::Write;

use crate::{
    utils::validate_utf8_string, utils::StringError, ByteArray, DecodeError, DecodePacket,
    EncodeError, EncodePacket,
};

/// A topic name used in a PUBLISH packet. Unlike a topic filter, a topic
/// name MUST NOT contain the `+`/`#` wildcard characters [MQTT-3.3.2-2].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PubTopic(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    Empty,
    TooLong,
    ContainsWildcard,
    /// `#` is not the last level, or `+`/`#` shares a level with other chars.
    MalformedWildcard,
    /// Filter contains an embedded U+0000, which MQTT-1.5.4-2 forbids.
    NullChar,
}

impl PubTopic {
    /// Create a new topic name.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is empty, too long, or contains a wildcard
    /// character.
    pub fn new(topic: &str) -> Result<Self, EncodeError> {
        validate_pub_topic(topic).map_err(|_e| EncodeError::InvalidString)?;
        validate_utf8_string(topic).map_err(EncodeError::from)?;
        Ok(Self(topic.to_string()))
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PubTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PubTopic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl DecodePacket for PubTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let len = ba.read_u16()?;
        let s = ba.read_string(len as usize)?;
        validate_pub_topic(&s).map_err(|_e| DecodeError::InvalidUtf8String)?;
        Ok(Self(s))
    }
}

impl EncodePacket for PubTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        #[allow(clippy::cast_possible_truncation)]
        let len = self.0.len() as u16;
        buf.write_u16::<BigEndian>(len)?;
        buf.write_all(self.0.as_bytes())?;
        Ok(self.bytes())
    }
}

/// Check whether a topic name (not a filter) is valid for PUBLISH, per
/// MQTT chapter 4.7.
///
/// # Errors
///
/// Returns error if `topic` is empty, too long to fit a two-byte length
/// prefix, or contains a `+`/`#` wildcard character.
pub fn validate_pub_topic(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.len() > u16::MAX as usize {
        return Err(TopicError::TooLong);
    }
    if topic.bytes().any(|b| b == b'+' || b == b'#') {
        return Err(TopicError::ContainsWildcard);
    }
    Ok(())
}

/// Check whether a topic filter (used in SUBSCRIBE/UNSUBSCRIBE) is well
/// formed, per MQTT chapter 4.7:
/// - `#` must occupy its own level and be the last level.
/// - `+` must occupy its own level, but can appear at any level.
///
/// # Errors
///
/// Returns error if `filter` is empty or the wildcards are malformed.
pub fn validate_sub_topic(filter: &str) -> Result<(), TopicError> {
    if filter.is_empty() {
        return Err(TopicError::Empty);
    }
    if filter.len() > u16::MAX as usize {
        return Err(TopicError::TooLong);
    }
    if filter.contains('\u{0000}') {
        return Err(TopicError::NullChar);
    }
    for level in filter.split('/') {
        if level.len() > 1 && (level.contains('+') || level.contains('#')) {
            return Err(TopicError::MalformedWildcard);
        }
    }
    if let Some(pos) = filter.find('#') {
        if pos != filter.len() - 1 {
            return Err(TopicError::MalformedWildcard);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterPart {
    Internal(String),
    Normal(String),
    SingleWildcard,
    MultiWildcard,
}

impl FilterPart {
    fn parse(s: &str) -> Self {
        match s {
            "+" => Self::SingleWildcard,
            "#" => Self::MultiWildcard,
            _ if s.starts_with('$') => Self::Internal(s.to_string()),
            _ => Self::Normal(s.to_string()),
        }
    }
}

/// A subscription topic filter, possibly containing `+`/`#` wildcards.
///
/// A filter whose first level is a wildcard never matches a topic name
/// whose first level starts with `$` (e.g. `$SYS/...`), even though `+`
/// and `#` would otherwise match any level [MQTT-4.7.2-1].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    filter: String,
    parts: Vec<FilterPart>,
}

impl TopicFilter {
    /// Parse a subscription filter.
    ///
    /// # Errors
    ///
    /// Returns error if `filter` is malformed per [`validate_sub_topic`].
    pub fn parse(filter: &str) -> Result<Self, TopicError> {
        validate_sub_topic(filter)?;
        let parts = filter.split('/').map(FilterPart::parse).collect();
        Ok(Self {
            filter: filter.to_string(),
            parts,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.filter
    }

    /// Check whether this filter matches a published topic name.
    #[must_use]
    pub fn is_match(&self, topic: &str) -> bool {
        let starts_with_internal = topic.starts_with('$');
        let starts_with_wildcard = matches!(
            self.parts.first(),
            Some(FilterPart::SingleWildcard) | Some(FilterPart::MultiWildcard)
        );
        if starts_with_internal && starts_with_wildcard {
            return false;
        }

        let mut topic_levels = topic.split('/');
        for part in &self.parts {
            match part {
                FilterPart::MultiWildcard => return true,
                FilterPart::SingleWildcard => {
                    if topic_levels.next().is_none() {
                        return false;
                    }
                }
                FilterPart::Normal(expected) | FilterPart::Internal(expected) => {
                    match topic_levels.next() {
                        Some(level) if level == expected => {}
                        _ => return false,
                    }
                }
            }
        }
        topic_levels.next().is_none()
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.filter)
    }
}

impl TopicFilter {
    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.filter.len()
    }
}

impl DecodePacket for TopicFilter {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let len = ba.read_u16()?;
        let s = ba.read_string(len as usize)?;
        Self::parse(&s).map_err(|_e| DecodeError::InvalidUtf8String)
    }
}

impl EncodePacket for TopicFilter {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        #[allow(clippy::cast_possible_truncation)]
        let len = self.filter.len() as u16;
        buf.write_u16::<BigEndian>(len)?;
        buf.write_all(self.filter.as_bytes())?;
        Ok(self.bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pub_topic_rejects_wildcard() {
        assert!(PubTopic::new("sport/tennis/player").is_ok());
        assert!(PubTopic::new("sport/+").is_err());
        assert!(PubTopic::new("sport/#").is_err());
        assert!(PubTopic::new("").is_err());
    }

    #[test]
    fn test_sub_topic_validation() {
        assert!(validate_sub_topic("sport/tennis/player/#").is_ok());
        assert!(validate_sub_topic("sport/tennis/player#").is_err());
        assert!(validate_sub_topic("#").is_ok());
        assert!(validate_sub_topic("sport/#/player/ranking").is_err());
        assert!(validate_sub_topic("+").is_ok());
        assert!(validate_sub_topic("sport+").is_err());
        assert_eq!(
            validate_sub_topic("sport/\u{0000}"),
            Err(TopicError::NullChar)
        );
    }

    #[test]
    fn test_filter_match_single_wildcard() {
        let filter = TopicFilter::parse("sport/tennis/+").unwrap();
        assert!(filter.is_match("sport/tennis/player"));
        assert!(!filter.is_match("sport/tennis/player/ranking"));
    }

    #[test]
    fn test_filter_match_multi_wildcard() {
        let filter = TopicFilter::parse("sport/#").unwrap();
        assert!(filter.is_match("sport"));
        assert!(filter.is_match("sport/tennis"));
        assert!(filter.is_match("sport/tennis/player/ranking"));

        let filter = TopicFilter::parse("#").unwrap();
        assert!(filter.is_match("sport/tennis"));
    }

    #[test]
    fn test_filter_excludes_internal_topics() {
        let filter = TopicFilter::parse("#").unwrap();
        assert!(!filter.is_match("$SYS/uptime"));

        let filter = TopicFilter::parse("+/uptime").unwrap();
        assert!(!filter.is_match("$SYS/uptime"));

        let filter = TopicFilter::parse("$SYS/#").unwrap();
        assert!(filter.is_match("$SYS/uptime"));
    }

    #[test]
    fn test_filter_exact_match() {
        let filter = TopicFilter::parse("sport/tennis/player").unwrap();
        assert!(filter.is_match("sport/tennis/player"));
        assert!(!filter.is_match("sport/tennis"));
    }
}
