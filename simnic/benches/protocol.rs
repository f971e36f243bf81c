//! Cost of one checker poll and one writer round trip on the simulated NIC.

use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use simnic::{Delivery, Nic, Port, PortConfig};
use visicheck::{Checker, FullFence, ProgressCounter, Transport, Writer};

fn connected_pair() -> (Port, Port) {
    let nic = Nic::new();
    let mut server = Port::open(&nic, PortConfig { port: 1, ..Default::default() }).unwrap();
    let mut client = Port::open(
        &nic,
        PortConfig {
            id: 1,
            port: 0,
            delivery: Delivery::Ordered,
            ..Default::default()
        },
    )
    .unwrap();
    let (server_ep, client_ep) = (server.endpoint(), client.endpoint());
    server.connect(&client_ep).unwrap();
    client.connect(&server_ep).unwrap();
    (server, client)
}

fn bench_checker_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("checker");
    group.throughput(Throughput::Elements(1));

    let (server, _client) = connected_pair();
    let counter = ProgressCounter::new();
    let mut checker = Checker::new(server.exposed_cell(), &counter, FullFence);

    group.bench_function("poll_once", |b| {
        b.iter(|| black_box(checker.poll_once()));
    });

    group.finish();
}

fn bench_writer_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer");
    group.throughput(Throughput::Elements(1));

    let (server, client) = connected_pair();
    let counter = ProgressCounter::new();
    let mut writer = Writer::new(client, server.endpoint().region, &counter, FullFence).unwrap();

    group.bench_function("write_once", |b| {
        b.iter(|| black_box(writer.write_once().unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_checker_poll, bench_writer_round_trip);
criterion_main!(benches);
