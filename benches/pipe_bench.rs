//! Throughput of pipes, ports and traced acknowledgment round trips.
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use streamweave_packet::{InPort, OneToOneNode, OutPort, Packet, Process, ReadPipe, WritePipe};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
  tokio::runtime::Builder::new_multi_thread()
    .worker_threads(2)
    .enable_all()
    .build()
    .unwrap()
}

fn bench_fan_out(c: &mut Criterion) {
  let rt = runtime();
  let mut group = c.benchmark_group("write_pipe_fan_out");
  for readers in [1usize, 4, 16] {
    let values = 1_000u64;
    group.throughput(Throughput::Elements(values * readers as u64));
    group.bench_with_input(BenchmarkId::from_parameter(readers), &readers, |b, &readers| {
      b.to_async(&rt).iter(|| async move {
        let writer = WritePipe::new();
        let sides: Vec<ReadPipe<u64>> = (0..readers).map(|_| ReadPipe::new()).collect();
        for side in &sides {
          writer.link(side);
        }
        for i in 0..values {
          writer.write(i);
        }
        for side in &sides {
          let rx = side.read();
          for _ in 0..values {
            black_box(rx.recv().await);
          }
        }
      });
    });
  }
  group.finish();
}

fn bench_port_round_trip(c: &mut Criterion) {
  let rt = runtime();
  c.bench_function("port_round_trip", |b| {
    b.to_async(&rt).iter(|| async {
      let out = OutPort::new();
      let inp = InPort::new();
      out.link(&inp);
      let proc = Process::new();
      let writer = out.open(&proc);
      let reader = inp.open(&proc);
      for i in 0..100u64 {
        writer.write(Packet::new(i));
        let got = reader.read().await.unwrap();
        reader.receive(&got, Some(got.clone()));
        black_box(writer.receive().await);
      }
      proc.exit();
    });
  });
}

fn bench_traced_node(c: &mut Criterion) {
  let rt = runtime();
  let node = rt.block_on(async {
    let node = OneToOneNode::new("incr", |p: Packet<u64>| Some(Packet::new(*p.payload() + 1)));
    node.spawn();
    node
  });
  let up = OutPort::new();
  up.link(node.input());
  c.bench_function("traced_node_ack", |b| {
    b.to_async(&rt).iter(|| async {
      let proc = Process::new();
      let writer = up.open(&proc);
      for i in 0..100u64 {
        writer.write(Packet::new(i));
        black_box(writer.receive().await);
      }
      proc.exit();
    });
  });
}

criterion_group!(benches, bench_fan_out, bench_port_round_trip, bench_traced_node);
criterion_main!(benches);
