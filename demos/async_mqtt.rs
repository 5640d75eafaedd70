// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::sync::Arc;

use codec::QoS;
use ruo::connect_options::ConnectOptions;
use ruo::message::Message;
use ruo::net_transport::NetTransport;
use ruo::pool::ClientPool;
use ruo::subscription::TopicFilter;

#[tokio::main]
async fn main() {
    std::env::set_var("RUST_LOG", "info");
    env_logger::init();

    let address = "127.0.0.1:1883";
    let options = ConnectOptions::new(address).unwrap();
    log::info!("options: {:?}", options);

    let pool = ClientPool::new();
    let client = pool.get_or_create(options, |options| {
        Box::new(NetTransport::new(
            *options.address(),
            options.connect_type().clone(),
            options.should_verify_certificate(),
            options.socket_connection_timeout(),
        ))
    });
    client.set_on_message(Arc::new(|message: &Message| {
        log::info!("on_message: {} ({} bytes)", message.topic(), message.payload().len());
    }));

    client.connect(true).await.unwrap();

    let filter = TopicFilter::new("hello", QoS::AtMostOnce).unwrap();
    client
        .subscribe(vec![(filter, Arc::new(|_: &Message| {}))])
        .await
        .unwrap();
    client
        .publish(Message::new("hello", b"Hello, world".to_vec(), QoS::AtMostOnce))
        .await
        .unwrap();
}
