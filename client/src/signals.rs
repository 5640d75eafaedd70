// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! §6 public API signals/events: fired from the driver task as the client
//! moves through its lifecycle, independent of the per-call promises.

use std::sync::Arc;

use crate::subscription::{SubscribeResult, UnsubscribeResult};

pub type ConnectSignal = Arc<dyn Fn(bool) + Send + Sync>;
pub type DisconnectSignal = Arc<dyn Fn() + Send + Sync>;
pub type PublishSignal = Arc<dyn Fn(bool) + Send + Sync>;
pub type SubscribeSignal = Arc<dyn Fn(&[SubscribeResult]) + Send + Sync>;
pub type UnsubscribeSignal = Arc<dyn Fn(&[UnsubscribeResult]) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Signals {
    pub on_connect: Option<ConnectSignal>,
    pub on_disconnect: Option<DisconnectSignal>,
    pub on_publish: Option<PublishSignal>,
    pub on_subscribe: Option<SubscribeSignal>,
    pub on_unsubscribe: Option<UnsubscribeSignal>,
}

impl Signals {
    pub fn fire_connect(&self, success: bool) {
        if let Some(f) = &self.on_connect {
            f(success);
        }
    }

    pub fn fire_disconnect(&self) {
        if let Some(f) = &self.on_disconnect {
            f();
        }
    }

    pub fn fire_publish(&self, delivered: bool) {
        if let Some(f) = &self.on_publish {
            f(delivered);
        }
    }

    pub fn fire_subscribe(&self, results: &[SubscribeResult]) {
        if let Some(f) = &self.on_subscribe {
            f(results);
        }
    }

    pub fn fire_unsubscribe(&self, results: &[UnsubscribeResult]) {
        if let Some(f) = &self.on_unsubscribe {
            f(results);
        }
    }
}
