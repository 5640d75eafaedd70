// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! §4.5/§4.6 topic dispatch: maps subscribed filters to the set of
//! delegates that should be invoked for a given inbound PUBLISH topic.

use std::collections::HashMap;
use std::sync::Arc;

use codec::TopicFilter;

use crate::message::Message;

pub type MessageDelegate = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Clone)]
struct Entry {
    filter: TopicFilter,
    delegate: MessageDelegate,
}

/// Filter -> delegate map. Exact-topic filters (no wildcard characters) are
/// matched literally in addition to going through [`TopicFilter::is_match`],
/// since a filter with no wildcards is, definitionally, the one topic it
/// names.
#[derive(Default)]
pub struct Dispatcher {
    entries: HashMap<String, Entry>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, filter: &str, delegate: MessageDelegate) -> Result<(), codec::TopicError> {
        let parsed = TopicFilter::parse(filter)?;
        self.entries.insert(
            filter.to_string(),
            Entry {
                filter: parsed,
                delegate,
            },
        );
        Ok(())
    }

    pub fn clear(&mut self, filters: &[String]) {
        for filter in filters {
            self.entries.remove(filter);
        }
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn get(&self, filter: &str) -> Option<MessageDelegate> {
        self.entries.get(filter).map(|e| Arc::clone(&e.delegate))
    }

    /// Every delegate whose filter matches `topic`; ordering is unspecified
    /// (§4.5).
    pub fn matching(&self, topic: &str) -> Vec<MessageDelegate> {
        self.entries
            .values()
            .filter(|entry| entry.filter.is_match(topic))
            .map(|entry| Arc::clone(&entry.delegate))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
