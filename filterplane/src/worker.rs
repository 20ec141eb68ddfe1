//! Drives a [`Pipeline`] in a `read → process → write → drop` loop against
//! a pair of source/sink callbacks, stopping cooperatively when asked.

use crate::packet::ParsedHeaders;
use crate::pipeline::{Pipeline, PipelineFront};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Where a worker's input packets come from — a NIC queue, a test fixture,
/// whatever the caller wires up.
pub trait PacketSource {
    /// Reads up to `max` packets. An empty result is not an error; the
    /// worker simply loops back around.
    fn read(&mut self, max: usize) -> Vec<ParsedHeaders>;
}

/// Where a worker's output packets go. Returns how many of `packets` were
/// actually sent — anything beyond that count is dropped by the worker.
pub trait PacketSink {
    fn write(&mut self, packets: &[ParsedHeaders]) -> usize;
}

const READ_BATCH: usize = 16;

/// One worker thread's state: a pipeline to run, a source and sink, and a
/// shared stop flag another thread can set to end the loop after the
/// in-flight batch finishes.
pub struct Worker<S, K> {
    pipeline: Arc<Pipeline>,
    source: S,
    pub sink: K,
    stop: Arc<AtomicBool>,
}

impl<S: PacketSource, K: PacketSink> Worker<S, K> {
    pub fn new(pipeline: Arc<Pipeline>, source: S, sink: K, stop: Arc<AtomicBool>) -> Self {
        Self {
            pipeline,
            source,
            sink,
            stop,
        }
    }

    /// Runs batches until [`stop`](Self::stop_flag) is set. Each batch:
    /// reads up to [`READ_BATCH`] packets, runs them through the pipeline,
    /// writes whatever made it to `output`, and silently discards `drop`
    /// (and anything the sink didn't accept).
    pub fn run(&mut self) {
        while !self.stop.load(Ordering::Relaxed) {
            self.run_batch();
        }
    }

    /// Runs exactly one batch — split out from [`run`](Self::run) so tests
    /// can drive a single iteration deterministically.
    pub fn run_batch(&mut self) {
        let mut front = PipelineFront::new();
        front.output = self.source.read(READ_BATCH);
        if front.output.is_empty() {
            return;
        }

        self.pipeline.process(&mut front);
        trace!(
            output = front.output.len(),
            dropped = front.drop.len(),
            "pipeline batch processed"
        );

        let sent = self.sink.write(&front.output);
        if sent < front.output.len() {
            trace!(unsent = front.output.len() - sent, "sink rejected packets");
        }
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{NetworkHeader, TransportHeader};
    use std::collections::VecDeque;

    struct QueueSource(VecDeque<ParsedHeaders>);
    impl PacketSource for QueueSource {
        fn read(&mut self, max: usize) -> Vec<ParsedHeaders> {
            let mut out = Vec::new();
            while out.len() < max {
                match self.0.pop_front() {
                    Some(p) => out.push(p),
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

    fn sample() -> ParsedHeaders {
        ParsedHeaders {
            vlan: None,
            network: NetworkHeader::V4,
            network_offset: 0,
            transport: TransportHeader::Other(0),
            transport_offset: 0,
        }
    }

    #[test]
    fn a_batch_moves_packets_from_source_to_sink() {
        let pipeline = Arc::new(Pipeline::new());
        let source = QueueSource(VecDeque::from(vec![sample(), sample()]));
        let sink = CollectSink(Vec::new());
        let stop = Arc::new(AtomicBool::new(false));

        let mut worker = Worker::new(pipeline, source, sink, stop);
        worker.run_batch();

        assert_eq!(worker.sink.0.len(), 2);
    }

    #[test]
    fn an_empty_read_is_a_no_op() {
        let pipeline = Arc::new(Pipeline::new());
        let source = QueueSource(VecDeque::new());
        let sink = CollectSink(Vec::new());
        let stop = Arc::new(AtomicBool::new(false));

        let mut worker = Worker::new(pipeline, source, sink, stop);
        worker.run_batch();

        assert!(worker.sink.0.is_empty());
    }

    #[test]
    fn setting_the_stop_flag_ends_run() {
        let pipeline = Arc::new(Pipeline::new());
        let source = QueueSource(VecDeque::new());
        let sink = CollectSink(Vec::new());
        let stop = Arc::new(AtomicBool::new(true));

        let mut worker = Worker::new(pipeline, source, sink, stop);
        worker.run(); // would spin forever if the flag were ignored
    }
}
