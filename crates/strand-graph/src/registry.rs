//! Tool registry.
//!
//! An explicit struct built at startup and passed by reference; there is no
//! process-global tool table.

use std::collections::HashMap;
use std::sync::Arc;
use strand_contract::{Tool, ToolDescriptor};

/// How a delegated sub-computation is run.
#[derive(Clone)]
pub struct DelegateSpec {
    /// Descriptor exposed to the model.
    pub descriptor: ToolDescriptor,
    /// Model override for the sub-computation; parent model when `None`.
    pub model: Option<String>,
}

impl DelegateSpec {
    /// Create a spec running on the parent's model.
    pub fn new(descriptor: ToolDescriptor) -> Self {
        Self {
            descriptor,
            model: None,
        }
    }

    /// Run the sub-computation on a different model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// How a registered tool is executed.
#[derive(Clone)]
pub enum ToolBinding {
    /// Executed in-process by dispatch.
    Backend(Arc<dyn Tool>),
    /// Declared to the model but executed by the client; the result arrives
    /// as an inbound command on a later request.
    ClientExecuted(ToolDescriptor),
    /// Spawns a delegated sub-computation whose events stream through the
    /// parent run under an extended namespace.
    Delegating(DelegateSpec),
}

impl ToolBinding {
    /// The descriptor exposed to the model.
    pub fn descriptor(&self) -> ToolDescriptor {
        match self {
            ToolBinding::Backend(tool) => tool.descriptor(),
            ToolBinding::ClientExecuted(desc) => desc.clone(),
            ToolBinding::Delegating(spec) => spec.descriptor.clone(),
        }
    }
}

/// Name-keyed tool table with stable declaration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    entries: HashMap<String, ToolBinding>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, binding: ToolBinding) {
        let name = binding.descriptor().name;
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.entries.insert(name, binding);
    }

    /// Register a backend-executed tool.
    pub fn register_backend(&mut self, tool: Arc<dyn Tool>) {
        self.insert(ToolBinding::Backend(tool));
    }

    /// Register a client-executed tool by descriptor.
    pub fn register_client(&mut self, descriptor: ToolDescriptor) {
        self.insert(ToolBinding::ClientExecuted(descriptor));
    }

    /// Register a delegating tool.
    pub fn register_delegate(&mut self, spec: DelegateSpec) {
        self.insert(ToolBinding::Delegating(spec));
    }

    /// Look up a tool by name.
    pub fn binding(&self, name: &str) -> Option<&ToolBinding> {
        self.entries.get(name)
    }

    /// Descriptors for every registered tool, in declaration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(ToolBinding::descriptor)
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
