// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! §3 Data Model / §4.9: a stable hash over connection parameters used by
//! [`crate::pool::ClientPool`] to deduplicate client instances. Password is
//! deliberately excluded so rotating credentials reuses the existing client
//! rather than spawning a second connection to the same broker.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::connect_options::ConnectOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    #[must_use]
    pub fn new(options: &ConnectOptions) -> Self {
        let mut hasher = DefaultHasher::new();
        options.connect_type().scheme().hash(&mut hasher);
        options.address().hash(&mut hasher);
        options.username().hash(&mut hasher);
        options.connect_type().path().hash(&mut hasher);
        options.keep_alive_interval().hash(&mut hasher);
        options.packet_retry_interval().hash(&mut hasher);
        options.initial_retry_connection_interval().hash(&mut hasher);
        options.max_connection_retries().hash(&mut hasher);
        Self(hasher.finish())
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Deterministic client identifier derived from a fingerprint, used when
/// the caller leaves `client_id` empty (§3 Connection Settings). Capped
/// under the 23-byte MQTT-3.1.3-5 baseline (`codec::utils::check_client_id`).
#[must_use]
pub fn derive_client_id(fingerprint: Fingerprint) -> String {
    format!("ruo{:016x}", fingerprint.value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_settings_hash_identically() {
        let a = ConnectOptions::default();
        let b = ConnectOptions::default();
        assert_eq!(Fingerprint::new(&a), Fingerprint::new(&b));
    }

    #[test]
    fn differing_host_changes_the_fingerprint() {
        let a = ConnectOptions::default();
        let mut b = ConnectOptions::default();
        b.set_address(("127.0.0.1", 1884)).unwrap();
        assert_ne!(Fingerprint::new(&a), Fingerprint::new(&b));
    }

    #[test]
    fn password_alone_does_not_change_the_fingerprint() {
        use crate::connect_options::UsernameAuth;
        use std::sync::Arc;

        let mut a = ConnectOptions::default();
        a.set_auth(Some(Arc::new(UsernameAuth {
            username: "same".to_string(),
            password: "first".to_string(),
        })));
        let mut b = ConnectOptions::default();
        b.set_auth(Some(Arc::new(UsernameAuth {
            username: "same".to_string(),
            password: "second".to_string(),
        })));
        assert_eq!(Fingerprint::new(&a), Fingerprint::new(&b));
    }

    #[test]
    fn derived_client_id_fits_the_baseline_length() {
        let id = derive_client_id(Fingerprint::new(&ConnectOptions::default()));
        assert!(codec::utils::check_client_id(&id).is_ok());
    }
}
