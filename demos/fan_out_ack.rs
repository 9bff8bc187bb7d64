//! Splits each request across two workers, joins their results and shows the
//! single acknowledgment the original writer receives.
//!
//! Usage: `cargo run --example fan_out_ack [-- <config.json>]`
//!
//! Set RUST_LOG=streamweave_packet=trace to see every read, write and resolution.

use std::env;
use std::path::PathBuf;
use std::process;
use streamweave_packet::{
  Config, InPort, ManyToOneNode, OneToOneNode, OutPort, Packet, Process, Tracer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::CLOSE)
    .init();

  let config = match env::args().nth(1).map(PathBuf::from) {
    Some(path) => match Config::from_file(&path) {
      Ok(config) => config,
      Err(e) => {
        error!(error = %e, "failed to load config");
        process::exit(1);
      }
    },
    None => match Config::from_env() {
      Ok(config) => config,
      Err(e) => {
        error!(error = %e, "invalid environment config");
        process::exit(1);
      }
    },
  };
  info!(?config, "fan_out_ack starting");

  let tracer: Tracer<String> = Tracer::new();
  let port = || InPort::with_config(config.clone());
  let split = OneToOneNode::new("split", |p: Packet<String>| Some(p.carry()))
    .with_ports(port(), OutPort::with_config(config.clone()))
    .with_tracer(tracer.clone());
  let upper = OneToOneNode::new("upper", |p: Packet<String>| {
    Some(Packet::new(p.payload().to_uppercase()))
  })
  .with_ports(port(), OutPort::with_config(config.clone()))
  .with_tracer(tracer.clone());
  let reverse = OneToOneNode::new("reverse", |p: Packet<String>| {
    Some(Packet::new(p.payload().chars().rev().collect::<String>()))
  })
  .with_ports(port(), OutPort::with_config(config.clone()))
  .with_tracer(tracer.clone());
  let join = ManyToOneNode::with_ports(
    "join",
    vec![port(), port()],
    OutPort::with_config(config.clone()),
    |row: Vec<Packet<String>>| {
      let parts: Vec<&str> = row.iter().map(|p| p.payload().as_str()).collect();
      Some(Packet::new(parts.join(" | ")))
    },
  )
  .with_tracer(tracer.clone());

  let source = OutPort::with_config(config.clone());
  let sink = port();
  source.link(split.input());
  split.output().link(upper.input());
  split.output().link(reverse.input());
  upper.output().link(&join.inputs()[0]);
  reverse.output().link(&join.inputs()[1]);
  join.output().link(&sink);
  split.spawn();
  upper.spawn();
  reverse.spawn();
  join.spawn();

  let proc = Process::new();
  let writer = source.open(&proc);
  let reader = sink.open(&proc);
  for word in ["packet", "lineage", "tracer"] {
    writer.write(Packet::new(word.to_string()));
    let Some(joined) = reader.read().await else {
      error!("sink closed early");
      process::exit(1);
    };
    info!(joined = %joined.payload(), "sink received");
    let answer = Packet::new(format!("ok: {}", joined.payload()));
    reader.receive(&joined, Some(answer));

    // Fanned out twice, but the writer sees one answer per write.
    match writer.receive().await {
      Some(ack) => info!(
        written = %ack.written.payload(),
        outcome = ack.outcome.as_ref().map(|p| p.payload().as_str()).unwrap_or("<discarded>"),
        "source acknowledged"
      ),
      None => {
        error!("source writer closed early");
        process::exit(1);
      }
    }
  }
  info!(lineage_left = tracer.len(), "fan_out_ack finished");
  proc.exit();
}
