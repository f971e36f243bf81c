//! Shared helpers for the simnic integration tests.

#![allow(dead_code)]

use std::time::Duration;

use simnic::{Delivery, Nic, Port, PortConfig};
use visicheck::{HarnessConfig, Transport};

pub const SERVER_PORT: u8 = 1;
pub const CLIENT_PORT: u8 = 0;

pub fn open_server(nic: &Nic) -> Port {
    Port::open(
        nic,
        PortConfig {
            id: 0,
            port: SERVER_PORT,
            ..Default::default()
        },
    )
    .expect("open server port")
}

pub fn open_client(nic: &Nic, delivery: Delivery) -> Port {
    Port::open(
        nic,
        PortConfig {
            id: 1,
            port: CLIENT_PORT,
            delivery,
            ..Default::default()
        },
    )
    .expect("open client port")
}

/// A server and a client port on one NIC, connected to each other.
pub fn connected_pair(delivery: Delivery) -> (Port, Port) {
    let nic = Nic::new();
    let mut server = open_server(&nic);
    let mut client = open_client(&nic, delivery);

    let server_ep = server.endpoint();
    let client_ep = client.endpoint();
    server.connect(&client_ep).expect("connect server");
    client.connect(&server_ep).expect("connect client");
    (server, client)
}

/// Harness settings that keep the handshake fast.
pub fn fast_harness(iterations: u64) -> HarnessConfig {
    HarnessConfig {
        iterations: Some(iterations),
        server_poll_interval: Duration::from_millis(1),
        client_poll_interval: Duration::from_millis(1),
        ..Default::default()
    }
}
