use std::sync::{Arc, Mutex};
use std::time::Duration;

use conductor::registry::{
    Capability, Fields, ModuleDescriptor, ProcessError, ProcessFuture, Processor, ProcessorInput,
};
use serde_json::Value;
use tokio::sync::Notify;

/// Shared, ordered record of every processor invocation.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<ProcessorInput>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, input: ProcessorInput) {
        self.calls.lock().unwrap().push(input);
    }

    /// Module names in invocation order.
    pub fn modules(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.module.clone())
            .collect()
    }

    pub fn count(&self, module: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.module == module)
            .count()
    }

    pub fn position(&self, module: &str) -> Option<usize> {
        self.modules().iter().position(|m| m == module)
    }

    pub fn inputs(&self) -> Vec<ProcessorInput> {
        self.calls.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
enum Behaviour {
    Succeed,
    Fail,
    Unsupported(Capability),
    Panic,
}

/// Processor that records its calls and answers as configured.
#[derive(Clone)]
pub struct RecordingProcessor {
    module: String,
    log: CallLog,
    behaviour: Behaviour,
    fields: Fields,
    gate: Option<Arc<Notify>>,
    delay: Option<Duration>,
}

impl RecordingProcessor {
    /// Succeeds with `{"<module>": true}` by default.
    pub fn new(module: &str, log: &CallLog) -> Self {
        let mut fields = Fields::new();
        fields.insert(module.to_string(), Value::Bool(true));
        Self {
            module: module.to_string(),
            log: log.clone(),
            behaviour: Behaviour::Succeed,
            fields,
            gate: None,
            delay: None,
        }
    }

    pub fn failing(mut self) -> Self {
        self.behaviour = Behaviour::Fail;
        self
    }

    pub fn unsupported(mut self, capability: Capability) -> Self {
        self.behaviour = Behaviour::Unsupported(capability);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behaviour = Behaviour::Panic;
        self
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn without_fields(mut self) -> Self {
        self.fields.clear();
        self
    }

    /// Block inside the processor until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn into_processor(self) -> Arc<dyn Processor> {
        Arc::new(self)
    }

    /// Descriptor for a single-entity module backed by this processor.
    pub fn descriptor(self, deps: &[&str]) -> ModuleDescriptor {
        let name = self.module.clone();
        let mut descriptor =
            ModuleDescriptor::new(name, self.into_processor()).supports(Capability::SingleEntity);
        for dep in deps {
            descriptor = descriptor.depends_on(*dep);
        }
        descriptor
    }
}

impl Processor for RecordingProcessor {
    fn process(&self, input: ProcessorInput) -> ProcessFuture {
        self.log.push(input);
        let this = self.clone();

        Box::pin(async move {
            if let Some(gate) = this.gate {
                gate.notified().await;
            }
            if let Some(delay) = this.delay {
                tokio::time::sleep(delay).await;
            }

            match this.behaviour {
                Behaviour::Succeed => Ok(this.fields),
                Behaviour::Fail => Err(ProcessError::Failed(format!("{} failed", this.module))),
                Behaviour::Unsupported(cap) => Err(ProcessError::UnsupportedShape(cap)),
                Behaviour::Panic => panic!("{} panicked", this.module),
            }
        })
    }
}

/// Single-entity module that records into `log` and succeeds.
pub fn recording_module(name: &str, deps: &[&str], log: &CallLog) -> ModuleDescriptor {
    RecordingProcessor::new(name, log).descriptor(deps)
}
