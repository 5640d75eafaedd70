// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Subscription-side topic filter (§3) and the per-filter outcomes returned
//! by `subscribe`/`unsubscribe` (§6).

use codec::{QoS, RetainHandling};

use crate::error::{Error, ErrorKind, Result};

/// A subscription request: a topic filter plus the 5.0 subscription
/// options. Under 3.1.1 `no_local`/`retain_as_published`/`retain_handling`
/// are accepted but ignored on the wire (§3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicFilter {
    filter: String,
    qos: QoS,
    no_local: bool,
    retain_as_published: bool,
    retain_handling: RetainHandling,
}

impl TopicFilter {
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidInput`] if `filter` is not a well formed
    /// subscription filter (§4.5).
    pub fn new(filter: impl Into<String>, qos: QoS) -> Result<Self> {
        let filter = filter.into();
        codec::validate_sub_topic(&filter)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("{e:?}")))?;
        Ok(Self {
            filter,
            qos,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::Send,
        })
    }

    #[must_use]
    pub fn with_no_local(mut self, no_local: bool) -> Self {
        self.no_local = no_local;
        self
    }

    #[must_use]
    pub fn with_retain_as_published(mut self, retain_as_published: bool) -> Self {
        self.retain_as_published = retain_as_published;
        self
    }

    #[must_use]
    pub fn with_retain_handling(mut self, retain_handling: RetainHandling) -> Self {
        self.retain_handling = retain_handling;
        self
    }

    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    #[must_use]
    pub const fn no_local(&self) -> bool {
        self.no_local
    }

    #[must_use]
    pub const fn retain_as_published(&self) -> bool {
        self.retain_as_published
    }

    #[must_use]
    pub const fn retain_handling(&self) -> RetainHandling {
        self.retain_handling
    }
}

/// Per-filter outcome of a `subscribe` call (§6).
#[derive(Clone, Debug)]
pub struct SubscribeResult {
    pub filter: String,
    pub success: bool,
    pub granted_qos: Option<QoS>,
}

/// Per-filter outcome of an `unsubscribe` call (§6).
#[derive(Clone, Debug)]
pub struct UnsubscribeResult {
    pub filter: String,
    pub success: bool,
}
