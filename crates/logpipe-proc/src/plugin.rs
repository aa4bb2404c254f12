//! Plugin processor: host-registered programs behind the recoverable-fault
//! boundary.

use logpipe_config::{ConfigError, KvSection};
use logpipe_core::{ProcessError, Processor, Record};
use std::collections::HashMap;

/// A user-supplied program run inside the chain. Unlike a native
/// [`Processor`], a program works on a borrowed batch and reports errors as
/// plain strings; the wrapper turns those into recoverable faults.
pub trait PluginProgram: Send {
    fn process(&mut self, batch: &mut Vec<Record>) -> Result<(), String>;

    fn flush(&mut self) -> Vec<Record> {
        Vec::new()
    }

    fn close(&mut self) -> Result<(), String> {
        Ok(())
    }
}

type PluginBuilder =
    Box<dyn Fn(&KvSection) -> Result<Box<dyn PluginProgram>, String> + Send + Sync>;

/// Named constructors the host registers before loading configuration.
#[derive(Default)]
pub struct PluginRegistry {
    builders: HashMap<String, PluginBuilder>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(&KvSection) -> Result<Box<dyn PluginProgram>, String> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Box::new(builder));
    }

    /// Builds the processor for a `plugin` section; `Plugin` names the
    /// registered constructor.
    pub fn build(&self, sec: &KvSection) -> Result<PluginProcessor, ConfigError> {
        let name = sec.require_string("Plugin")?;
        let builder = self.builders.get(&name).ok_or_else(|| {
            ConfigError::build(sec.name(), format!("no plugin registered as {name:?}"))
        })?;
        let program = builder(sec)
            .map_err(|e| ConfigError::build(sec.name(), format!("plugin {name:?}: {e}")))?;
        Ok(PluginProcessor { name, program })
    }
}

/// Wraps a [`PluginProgram`], snapshotting each batch so a program error can
/// surface as a fault carrying the pre-call records.
pub struct PluginProcessor {
    name: String,
    program: Box<dyn PluginProgram>,
}

impl Processor for PluginProcessor {
    fn process(&mut self, batch: Vec<Record>) -> Result<Vec<Record>, ProcessError> {
        let snapshot = batch.clone();
        let mut work = batch;
        match self.program.process(&mut work) {
            Ok(()) => Ok(work),
            Err(reason) => Err(ProcessError::Fault {
                reason: format!("plugin {:?}: {reason}", self.name),
                batch: snapshot,
            }),
        }
    }

    fn flush(&mut self) -> Vec<Record> {
        self.program.flush()
    }

    fn close(&mut self) -> Result<(), ProcessError> {
        self.program
            .close()
            .map_err(|e| ProcessError::other(format!("plugin {:?}: {e}", self.name)))
    }
}
