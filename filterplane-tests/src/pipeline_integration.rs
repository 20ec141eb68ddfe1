//! Demonstrates the interface a compiled filter plugs into: a `Module` that
//! runs a `CompiledFilter` inside a `Pipeline`, driven end to end by a
//! `Worker`. `filterplane` ships no concrete wire format for delivering
//! compiled rules to a module instance (that belongs to module registration
//! transport, out of scope), so this adapter swaps its filter directly
//! through a dedicated method rather than through `Module::configure`'s
//! opaque byte payload — the part a real deployment would wire up its own
//! way.

use arc_swap::ArcSwap;
use filterplane::classify::CompiledFilter;
use filterplane::module::{Module, ModuleConfig, ModuleRegistry};
use filterplane::packet::{parse_packet, ParsedHeaders};
use filterplane::pipeline::{ModuleConfigData, Pipeline, PipelineFront};
use filterplane::worker::{PacketSink, PacketSource, Worker};
use filterplane::{AclCompiler, PortRange, Rule};
use std::collections::VecDeque;
use std::error::Error;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct PassConfig;
impl ModuleConfig for PassConfig {
    fn name(&self) -> &str {
        "default"
    }
}

/// Runs a `CompiledFilter` against each packet, dropping anything whose
/// action is `0` and forwarding everything else unchanged.
#[derive(Debug)]
struct AclModule {
    filter: ArcSwap<CompiledFilter>,
}

impl AclModule {
    fn new(filter: CompiledFilter) -> Self {
        Self {
            filter: ArcSwap::from_pointee(filter),
        }
    }

    fn swap_filter(&self, filter: CompiledFilter) {
        self.filter.store(Arc::new(filter));
    }
}

impl Module for AclModule {
    fn name(&self) -> &str {
        "acl"
    }

    fn configure(
        &self,
        _data: &[u8],
        _previous: Option<&dyn ModuleConfig>,
    ) -> Result<Arc<dyn ModuleConfig>, Box<dyn Error + Send + Sync>> {
        Ok(Arc::new(PassConfig))
    }

    fn process(&self, _config: &dyn ModuleConfig, front: &mut PipelineFront) {
        let filter = self.filter.load();
        for packet in front.input.drain(..) {
            if filter.classify(&packet) == 0 {
                front.drop.push(packet);
            } else {
                front.output.push(packet);
            }
        }
    }
}

struct QueueSource(VecDeque<Vec<u8>>);
impl PacketSource for QueueSource {
    fn read(&mut self, max: usize) -> Vec<ParsedHeaders> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.0.pop_front() {
                Some(bytes) => {
                    if let Some(parsed) = parse_packet(&bytes) {
                        out.push(parsed);
                    }
                }
                None => break,
            }
        }
        out
    }
}

struct CollectSink(Vec<ParsedHeaders>);
impl PacketSink for CollectSink {
    fn write(&mut self, packets: &[ParsedHeaders]) -> usize {
        self.0.extend_from_slice(packets);
        packets.len()
    }
}

fn build_filter(allow_port: u16) -> CompiledFilter {
    let mut rule = Rule::new(1);
    rule.dst_ports = vec![PortRange::new(allow_port, allow_port)];
    AclCompiler::compile(&[rule], 0).unwrap()
}

#[test]
fn a_worker_drives_packets_through_an_acl_module_in_a_pipeline() {
    let pipeline = Arc::new(Pipeline::new());
    let mut registry = ModuleRegistry::new();
    let acl = Arc::new(AclModule::new(build_filter(443)));
    registry.register(acl.clone());

    pipeline
        .configure(
            &registry,
            &[ModuleConfigData {
                module_name: "acl",
                config_name: "default",
                data: b"",
            }],
        )
        .unwrap();

    let src = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
    let dst = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
    let allowed = crate::packet::tcp_v6(src, dst, 50000, 443);
    let blocked = crate::packet::tcp_v6(src, dst, 50000, 80);

    let source = QueueSource(VecDeque::from(vec![allowed, blocked]));
    let sink = CollectSink(Vec::new());
    let stop = Arc::new(AtomicBool::new(false));
    let mut worker = Worker::new(pipeline.clone(), source, sink, stop);

    worker.run_batch();

    assert_eq!(worker.sink.0.len(), 1);
}

#[test]
fn swapping_the_filter_changes_classification_without_reconfiguring_the_pipeline() {
    let pipeline = Arc::new(Pipeline::new());
    let mut registry = ModuleRegistry::new();
    let acl = Arc::new(AclModule::new(build_filter(443)));
    registry.register(acl.clone());

    pipeline
        .configure(
            &registry,
            &[ModuleConfigData {
                module_name: "acl",
                config_name: "default",
                data: b"",
            }],
        )
        .unwrap();

    let src = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
    let dst = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
    let packet = parse_packet(&crate::packet::tcp_v6(src, dst, 50000, 80)).unwrap();

    let mut front = PipelineFront::new();
    front.output.push(packet.clone());
    pipeline.process(&mut front);
    assert!(front.output.is_empty());
    assert_eq!(front.drop.len(), 1);

    acl.swap_filter(build_filter(80));

    let mut front = PipelineFront::new();
    front.output.push(packet);
    pipeline.process(&mut front);
    assert_eq!(front.output.len(), 1);
}
