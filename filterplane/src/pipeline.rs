//! A chain of configured [`Module`] instances, hot-swappable without
//! pausing in-flight traffic.
//!
//! [`Pipeline::configure`] builds an entirely new chain off to the side,
//! reusing any `(module_name, config_name)` instance already running, and
//! only publishes it via [`ArcSwap::store`] once every stage configures
//! successfully. A reader that loaded the old chain a moment earlier keeps
//! running it to completion — nothing is mutated in place.

use crate::error::ReconfigureError;
use crate::module::{Module, ModuleConfig, ModuleRegistry};
use crate::packet::ParsedHeaders;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

/// The packets flowing through one pipeline invocation: modules drain
/// `input`, a packet a module is done with goes into `output` (to continue
/// to the next stage) or `drop` (removed from the pipeline for good).
#[derive(Debug, Default)]
pub struct PipelineFront {
    pub input: Vec<ParsedHeaders>,
    pub output: Vec<ParsedHeaders>,
    pub drop: Vec<ParsedHeaders>,
}

impl PipelineFront {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, packet: ParsedHeaders) {
        self.output.push(packet);
    }

    pub fn drop_packet(&mut self, packet: ParsedHeaders) {
        self.drop.push(packet);
    }

    /// Connects the previous stage's output to the next stage's input —
    /// called once per stage, before that stage runs.
    pub fn switch(&mut self) {
        self.input = std::mem::take(&mut self.output);
    }
}

struct Stage {
    module: Arc<dyn Module>,
    config: Arc<dyn ModuleConfig>,
}

#[derive(Default)]
struct Chain {
    stages: Vec<Stage>,
}

/// One module instance's configuration request: which module, which named
/// instance of it, and the raw configuration payload for that instance to
/// decode.
pub struct ModuleConfigData<'a> {
    pub module_name: &'a str,
    pub config_name: &'a str,
    pub data: &'a [u8],
}

/// An ordered chain of configured module instances, reconfigurable while
/// [`process`](Pipeline::process) keeps running on other threads.
pub struct Pipeline {
    chain: ArcSwap<Chain>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            chain: ArcSwap::from_pointee(Chain::default()),
        }
    }

    /// Rebuilds the chain from `module_config_datas` in order, reusing an
    /// already-running instance's [`ModuleConfig`] as the `previous` value
    /// passed to [`Module::configure`] whenever the new request names the
    /// same `(module_name, config_name)` pair. Publishes the new chain only
    /// once every stage configures without error; on failure the pipeline
    /// keeps serving its previous chain untouched.
    pub fn configure(
        &self,
        registry: &ModuleRegistry,
        module_config_datas: &[ModuleConfigData],
    ) -> Result<(), ReconfigureError> {
        let previous = self.chain.load();
        let mut stages = Vec::with_capacity(module_config_datas.len());

        for data in module_config_datas {
            let module = registry
                .lookup(data.module_name)
                .ok_or_else(|| ReconfigureError::UnknownModule(data.module_name.to_string()))?;

            let existing = previous.stages.iter().find(|stage| {
                stage.module.name() == data.module_name && stage.config.name() == data.config_name
            });

            let config = module
                .configure(data.data, existing.map(|stage| stage.config.as_ref()))
                .map_err(|source| ReconfigureError::RejectedConfig {
                    module: data.module_name.to_string(),
                    config: data.config_name.to_string(),
                    source,
                })?;

            stages.push(Stage { module, config });
        }

        debug!(stages = stages.len(), "publishing new pipeline chain");
        self.chain.store(Arc::new(Chain { stages }));
        Ok(())
    }

    /// Drives `front` through every stage of the currently published
    /// chain, switching `output` into `input` before each one so a stage
    /// only ever sees the previous stage's output (or, for the first
    /// stage, whatever the caller placed in `output` before calling —
    /// mirroring how RX is itself treated as a pipeline stage).
    pub fn process(&self, front: &mut PipelineFront) {
        let chain = self.chain.load();
        for stage in chain.stages.iter() {
            front.switch();
            stage.module.process(stage.config.as_ref(), front);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::NetworkHeader;
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingConfig {
        name: String,
    }
    impl ModuleConfig for CountingConfig {
        fn name(&self) -> &str {
            &self.name
        }
    }

    /// A module that counts every packet it sees in a counter the module
    /// itself owns — configs here are just names, the runtime state a real
    /// module would want to preserve across a reconfigure lives on the
    /// module, not the config, so there's nothing to test for `previous`.
    #[derive(Debug)]
    struct CountingModule {
        module_name: &'static str,
        seen: Arc<AtomicUsize>,
    }
    impl Module for CountingModule {
        fn name(&self) -> &str {
            self.module_name
        }
        fn configure(
            &self,
            data: &[u8],
            _previous: Option<&dyn ModuleConfig>,
        ) -> Result<Arc<dyn ModuleConfig>, Box<dyn Error + Send + Sync>> {
            Ok(Arc::new(CountingConfig {
                name: String::from_utf8_lossy(data).to_string(),
            }))
        }
        fn process(&self, _config: &dyn ModuleConfig, front: &mut PipelineFront) {
            self.seen.fetch_add(front.input.len(), Ordering::Relaxed);
            for packet in front.input.drain(..) {
                front.output.push(packet);
            }
        }
    }

    fn sample_packet() -> ParsedHeaders {
        ParsedHeaders {
            vlan: None,
            network: NetworkHeader::V4,
            network_offset: 0,
            transport: crate::packet::TransportHeader::Other(0),
            transport_offset: 0,
        }
    }

    #[test]
    fn unconfigured_pipeline_passes_packets_through_untouched() {
        let pipeline = Pipeline::new();
        let mut front = PipelineFront::new();
        front.output.push(sample_packet());
        pipeline.process(&mut front);
        // switch() ran zero times against any stage, so input holds
        // whatever was placed in output before processing began.
        assert_eq!(front.output.len(), 1);
    }

    #[test]
    fn unknown_module_name_is_rejected_and_leaves_the_old_chain_running() {
        let pipeline = Pipeline::new();
        let registry = ModuleRegistry::new();
        let result = pipeline.configure(
            &registry,
            &[ModuleConfigData {
                module_name: "does-not-exist",
                config_name: "default",
                data: b"",
            }],
        );
        assert!(matches!(result, Err(ReconfigureError::UnknownModule(_))));
    }

    #[test]
    fn configuring_with_a_known_module_runs_it() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new();
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(CountingModule {
            module_name: "counter",
            seen: seen.clone(),
        }));

        pipeline
            .configure(
                &registry,
                &[ModuleConfigData {
                    module_name: "counter",
                    config_name: "default",
                    data: b"default",
                }],
            )
            .unwrap();

        let mut front = PipelineFront::new();
        front.output.push(sample_packet());
        front.output.push(sample_packet());
        pipeline.process(&mut front);

        assert_eq!(front.output.len(), 2);
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn reconfiguring_with_the_same_instance_name_replaces_it_atomically() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new();
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(CountingModule {
            module_name: "counter",
            seen: seen.clone(),
        }));

        for data in [b"first".as_slice(), b"second".as_slice()] {
            pipeline
                .configure(
                    &registry,
                    &[ModuleConfigData {
                        module_name: "counter",
                        config_name: "default",
                        data,
                    }],
                )
                .unwrap();
        }

        let mut front = PipelineFront::new();
        front.output.push(sample_packet());
        pipeline.process(&mut front);
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }
}
