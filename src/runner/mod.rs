//! The live runner: the host-facing wrapper around a script engine
//!
//! A [`LiveRunner`] owns one engine and one node arena. Sync calls lock
//! the engine directly; async updates are messages to an engine actor that
//! takes the same locks, so every mutation is serialized and async updates
//! apply in submission order.
//!
//! Lock order is execution, then engine, then arena. Extension hooks run
//! under the execution lock only, so a hook may read from the runner but
//! must not start another mutation.

pub mod actor;
pub mod events;
pub mod ticket;

pub use actor::{Actor, ActorAddr, ActorError, ActorId, ActorSystem, Message};
pub use events::{EventHub, RunnerEvent, UpdateListener};
pub use ticket::UpdateTicket;

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, instrument, warn};

use crate::ast::{AstBuilder, AstNode, CallSite, NodeArena, Stmt};
use crate::core::{MethodRef, Parameter, SymbolInfo, Value};
use crate::engine::{AssociativeEngine, ScriptEngine, StateSnapshot, UpdateSummary};
use crate::errors::{Result, RunnerError};
use crate::frontend::config::{ConfigurationKeys, RunnerConfig};
use crate::frontend::lexer::is_identifier;
use crate::frontend::parser::parse_expression;
use crate::host::trace::{self, TraceData};
use crate::host::{
    ContextData, ContextDataProvider, ContextParameters, ContextProviders, ExecutionSession,
    ExtensionApplication, HostBridge, NullBridge,
};
use crate::infrastructure::metrics::{names as metric, RunnerMetrics, Timer};

/// State shared between the runner and its engine actor.
struct Shared {
    execution: Mutex<()>,
    engine: Mutex<Box<dyn ScriptEngine>>,
    arena: Mutex<NodeArena>,
    session: ExecutionSession,
    extensions: RwLock<Vec<Arc<dyn ExtensionApplication>>>,
    providers: ContextProviders,
    events: EventHub,
    metrics: RunnerMetrics,
}

impl Shared {
    /// Run a mutating engine operation, bracketed by extension hooks.
    fn mutate<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut dyn ScriptEngine, &Mutex<NodeArena>) -> Result<T>,
    ) -> Result<T> {
        let _timer = Timer::new(&self.metrics, op);
        let _execution = self.execution.lock();
        let extensions = self.extensions.read().clone();

        for extension in &extensions {
            extension.on_begin_execution(&self.session);
        }
        let result = {
            let mut engine = self.engine.lock();
            f(&mut **engine, &self.arena)
        };
        for extension in &extensions {
            extension.on_end_execution(&self.session);
        }

        if result.is_err() {
            self.metrics.increment(metric::FAULTS);
        }
        result
    }

    fn read<T>(&self, f: impl FnOnce(&dyn ScriptEngine) -> T) -> T {
        let engine = self.engine.lock();
        f(&**engine)
    }

    /// Apply an update and report the outcome to listeners and subscribers.
    fn run_update(
        &self,
        ticket: u64,
        op: &'static str,
        f: impl FnOnce(&mut dyn ScriptEngine, &Mutex<NodeArena>) -> Result<UpdateSummary>,
    ) -> Result<UpdateSummary> {
        let result = self.mutate(op, f);

        match &result {
            Ok(summary) => {
                self.metrics.add(metric::EVALUATED_BINDINGS, summary.evaluated.len() as u64);
                self.metrics.add(metric::SKIPPED_DEFINITIONS, summary.skipped.len() as u64);
                debug!(
                    ticket,
                    defined = summary.defined.len(),
                    evaluated = summary.evaluated.len(),
                    skipped = summary.skipped.len(),
                    "update applied"
                );
                self.events.update_completed(ticket, summary);
            }
            Err(error) => {
                warn!(ticket, %error, "update failed");
                self.events.update_failed(ticket, error);
            }
        }

        result
    }
}

enum EngineMsg {
    Update {
        ticket: u64,
        code: String,
        trace: TraceData,
    },
}

impl Message for EngineMsg {
    type Response = Result<UpdateSummary>;
}

/// Applies queued updates on the runtime.
struct EngineWorker {
    shared: Arc<Shared>,
}

#[async_trait::async_trait]
impl Actor for EngineWorker {
    type Message = EngineMsg;

    async fn handle(&mut self, msg: EngineMsg) -> Result<UpdateSummary> {
        match msg {
            EngineMsg::Update { ticket, code, trace } => {
                let _trace = trace::restore(&trace);
                self.shared
                    .run_update(ticket, metric::UPDATE_ASYNC, |engine, _| engine.evaluate(&code))
            }
        }
    }
}

pub struct LiveRunner {
    shared: Arc<Shared>,
    worker: ActorAddr<EngineWorker>,
    builder: AstBuilder,
    next_ticket: AtomicU64,
    active_graph: AtomicU32,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl LiveRunner {
    /// Runner with the default engine and no host bridge.
    pub fn new(config: RunnerConfig) -> Result<Self> {
        LiveRunnerBuilder::new(config).build()
    }

    pub fn builder(config: RunnerConfig) -> LiveRunnerBuilder {
        LiveRunnerBuilder::new(config)
    }

    fn next_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    /// Apply a code segment and wait for it.
    #[instrument(skip(self, code), fields(len = code.len()))]
    pub fn update(&self, code: &str) -> Result<UpdateSummary> {
        let ticket = self.next_ticket();
        self.shared
            .run_update(ticket, metric::UPDATE, |engine, _| engine.evaluate(code))
    }

    /// Queue a code segment for the engine worker and return immediately.
    ///
    /// Trace data set on the calling thread is visible to the engine while
    /// this update runs.
    pub fn update_async(&self, code: impl Into<String>) -> UpdateTicket {
        let ticket = self.next_ticket();
        let msg = EngineMsg::Update {
            ticket,
            code: code.into(),
            trace: trace::capture(),
        };

        match self.worker.post(msg) {
            Ok(reply) => {
                debug!(ticket, pending = self.worker.pending(), "update queued");
                UpdateTicket::pending(ticket, reply)
            }
            Err(e) => {
                let error = RunnerError::engine_fault(format!("update {} not queued: {}", ticket, e));
                self.shared.metrics.increment(metric::FAULTS);
                self.shared.events.update_failed(ticket, &error);
                UpdateTicket::failed(ticket, error)
            }
        }
    }

    /// Load libraries; either every name resolves or nothing changes.
    #[instrument(skip(self))]
    pub fn import_libraries(&self, names: &[&str]) -> Result<Vec<SymbolInfo>> {
        let symbols = self
            .shared
            .mutate(metric::IMPORT, |engine, _| engine.import_libraries(names))?;

        self.shared.events.publish(RunnerEvent::LibrariesImported {
            names: names.iter().map(|n| n.to_string()).collect(),
        });
        Ok(symbols)
    }

    pub fn inspect(&self, name: &str) -> Result<Value> {
        if name.trim().is_empty() {
            return Err(RunnerError::invalid_argument("empty name"));
        }
        self.shared.read(|engine| engine.inspect(name))
    }

    pub fn dump_state(&self) -> String {
        self.shared.read(|engine| engine.dump_state())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.shared.read(|engine| engine.snapshot())
    }

    /// Clear the engine. Nodes built before this call become stale.
    pub fn reinitialize(&self) {
        // reset cannot fail
        let _ = self.shared.mutate(metric::REINITIALIZE, |engine, arena| {
            engine.reset();
            arena.lock().reset();
            Ok(())
        });
        info!("runner reinitialized");
        self.shared.events.publish(RunnerEvent::Reinitialized);
    }

    /// Reinitialize, then import `names`.
    ///
    /// The reset happens even when the import fails.
    pub fn reset_and_import(&self, names: &[&str]) -> Result<Vec<SymbolInfo>> {
        let result = self.shared.mutate(metric::REINITIALIZE, |engine, arena| {
            engine.reset();
            arena.lock().reset();
            engine.import_libraries(names)
        });

        self.shared.events.publish(RunnerEvent::Reinitialized);
        if result.is_ok() {
            self.shared.events.publish(RunnerEvent::LibrariesImported {
                names: names.iter().map(|n| n.to_string()).collect(),
            });
        }
        result
    }

    pub fn build_ast(&self, site: &CallSite) -> Result<AstNode> {
        let node = self.builder.build(&mut self.shared.arena.lock(), site)?;
        self.shared.metrics.increment(metric::NODES_BUILT);
        Ok(node)
    }

    pub fn build_array_node<S: AsRef<str>>(&self, inputs: &[S]) -> Result<AstNode> {
        let node = self.builder.build_array(&mut self.shared.arena.lock(), inputs)?;
        self.shared.metrics.increment(metric::NODES_BUILT);
        Ok(node)
    }

    /// Submit a built node as `name = code;`.
    pub fn update_graph(&self, node: &AstNode) -> Result<UpdateSummary> {
        let ticket = self.next_ticket();
        self.shared.run_update(ticket, metric::GRAPH_UPDATE, |engine, arena| {
            if !arena.lock().is_current(node.id()) {
                return Err(RunnerError::invalid_argument(format!(
                    "node {} ({}) is stale; the runner was reinitialized after it was built",
                    node.name(),
                    node.id()
                )));
            }
            engine.submit(&node.statement())
        })
    }

    /// Parameters of a function, method or property, in declaration order.
    pub fn function_args(&self, method: &MethodRef) -> Result<Vec<Parameter>> {
        self.shared.read(|engine| engine.function_signature(method))
    }

    pub fn symbols(&self) -> Vec<SymbolInfo> {
        self.shared.read(|engine| engine.symbols())
    }

    /// Receive every [`RunnerEvent`] from now on.
    pub fn subscribe(&self) -> flume::Receiver<RunnerEvent> {
        self.shared.events.subscribe()
    }

    pub fn set_listener(&self, listener: &Arc<dyn UpdateListener>) {
        self.shared.events.set_listener(listener);
    }

    pub fn clear_listener(&self) {
        self.shared.events.clear_listener();
    }

    pub fn register_extension(&self, extension: Arc<dyn ExtensionApplication>) {
        extension.start_up();
        self.shared.extensions.write().push(extension);
    }

    /// Make `provider` available to the context data operations.
    pub fn register_context_provider(&self, provider: Arc<dyn ContextDataProvider>) {
        info!(provider = provider.name(), "context provider registered");
        self.shared.providers.register(provider);
    }

    pub fn context_providers(&self) -> Vec<String> {
        self.shared.providers.names()
    }

    /// Provider named `name`, or the one configured under
    /// [`ConfigurationKeys::GEOMETRY_PROVIDER`] when `name` is `None`.
    pub fn context_provider(&self, name: Option<&str>) -> Result<Arc<dyn ContextDataProvider>> {
        match name {
            Some(name) => self.shared.providers.get(name),
            None => {
                let configured = self
                    .shared
                    .session
                    .config_value(ConfigurationKeys::GEOMETRY_PROVIDER)
                    .and_then(|v| v.as_str().map(str::to_string))
                    .ok_or_else(|| RunnerError::invalid_argument("no context provider configured"))?;
                self.shared.providers.get(&configured)
            }
        }
    }

    pub fn import_context_data(
        &self,
        provider: Option<&str>,
        parameters: &ContextParameters,
    ) -> Result<Vec<ContextData>> {
        let provider = self.context_provider(provider)?;
        let data = provider.import_data(parameters)?;
        debug!(provider = provider.name(), count = data.len(), "context data imported");
        Ok(data)
    }

    /// Bind `variable` to the expression the provider gives for
    /// `parameters`.
    pub fn bind_context_data(
        &self,
        provider: Option<&str>,
        parameters: &ContextParameters,
        variable: &str,
    ) -> Result<UpdateSummary> {
        if !is_identifier(variable) {
            return Err(RunnerError::invalid_argument(format!(
                "'{}' is not a variable name",
                variable
            )));
        }
        let provider = self.context_provider(provider)?;
        let text = provider.expression(parameters, variable)?;
        let expr = parse_expression(&text)?;

        let ticket = self.next_ticket();
        let stmt = Stmt::assign(variable, expr);
        self.shared
            .run_update(ticket, metric::CONTEXT_BIND, |engine, _| engine.submit(&stmt))
    }

    /// Let the provider capture data, then bind it to `variable`.
    pub fn capture_context_data(&self, provider: Option<&str>, variable: &str) -> Result<UpdateSummary> {
        let parameters = self.context_provider(provider)?.capture_data()?;
        self.bind_context_data(provider, &parameters, variable)
    }

    /// Switch to the host graph `graph_id` and tell the listener.
    pub fn activate_graph(&self, graph_id: u32) {
        self.active_graph.store(graph_id, Ordering::SeqCst);
        info!(graph_id, "graph activated");
        self.shared.events.graph_activated(graph_id);
    }

    /// Graph last passed to [`Self::activate_graph`], `0` before any.
    pub fn active_graph(&self) -> u32 {
        self.active_graph.load(Ordering::SeqCst)
    }

    /// Application-defined configuration value, as currently set.
    pub fn config_value(&self, key: &str) -> Option<toml::Value> {
        self.shared.session.config_value(key)
    }

    pub fn set_config_value(&self, key: impl Into<String>, value: impl Into<toml::Value>) {
        self.shared.session.set_config_value(key, value);
    }

    pub fn suspend_execution(&self) {
        for extension in self.shared.extensions.read().iter() {
            extension.on_suspend_execution(&self.shared.session);
        }
    }

    pub fn resume_execution(&self) {
        for extension in self.shared.extensions.read().iter() {
            extension.on_resume_execution(&self.shared.session);
        }
    }

    pub fn metrics(&self) -> &RunnerMetrics {
        &self.shared.metrics
    }

    pub fn config(&self) -> &RunnerConfig {
        self.shared.session.configuration()
    }

    pub fn session(&self) -> &ExecutionSession {
        &self.shared.session
    }

    /// Async updates queued but not yet picked up by the worker.
    pub fn pending_updates(&self) -> usize {
        self.worker.pending()
    }

    /// Runtime the engine worker runs on.
    pub fn runtime_handle(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for LiveRunner {
    fn drop(&mut self) {
        for extension in self.shared.extensions.read().iter() {
            extension.shut_down();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

pub struct LiveRunnerBuilder {
    config: RunnerConfig,
    bridge: Arc<dyn HostBridge>,
    engine: Option<Box<dyn ScriptEngine>>,
    listener: Option<Weak<dyn UpdateListener>>,
    runtime: Option<Handle>,
    extensions: Vec<Arc<dyn ExtensionApplication>>,
}

impl LiveRunnerBuilder {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            bridge: Arc::new(NullBridge),
            engine: None,
            listener: None,
            runtime: None,
            extensions: Vec::new(),
        }
    }

    pub fn bridge(mut self, bridge: Arc<dyn HostBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    /// Use `engine` instead of the default [`AssociativeEngine`].
    pub fn engine(mut self, engine: Box<dyn ScriptEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn listener(mut self, listener: &Arc<dyn UpdateListener>) -> Self {
        self.listener = Some(Arc::downgrade(listener));
        self
    }

    /// Run the engine worker on this runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn extension(mut self, extension: Arc<dyn ExtensionApplication>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn build(self) -> Result<LiveRunner> {
        let mailbox_size = self.config.runner.mailbox_size;
        let worker_threads = self.config.runner.worker_threads.max(1);
        let prefix = self.config.runner.node_prefix.clone();

        let session = ExecutionSession::new(self.config);
        let engine = self
            .engine
            .unwrap_or_else(|| Box::new(AssociativeEngine::new(session.clone())));

        let (handle, runtime) = match self.runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => (handle, None),
            None => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(worker_threads)
                    .thread_name("liverunner-worker")
                    .enable_all()
                    .build()
                    .map_err(|e| {
                        RunnerError::engine_fault(format!("failed to start worker runtime: {}", e))
                    })?;
                (runtime.handle().clone(), Some(runtime))
            }
        };

        for extension in &self.extensions {
            extension.start_up();
        }

        let events = EventHub::new();
        if let Some(listener) = self.listener {
            events.set_weak_listener(listener);
        }

        let shared = Arc::new(Shared {
            execution: Mutex::new(()),
            engine: Mutex::new(engine),
            arena: Mutex::new(NodeArena::new(prefix)),
            session,
            extensions: RwLock::new(self.extensions),
            providers: ContextProviders::new(),
            events,
            metrics: RunnerMetrics::new(),
        });

        let system = ActorSystem::new(handle.clone());
        let worker = system.spawn(
            EngineWorker {
                shared: Arc::clone(&shared),
            },
            mailbox_size,
        );

        info!(owns_runtime = runtime.is_some(), mailbox_size, "live runner started");

        Ok(LiveRunner {
            shared,
            worker,
            builder: AstBuilder::new(self.bridge),
            next_ticket: AtomicU64::new(1),
            active_graph: AtomicU32::new(0),
            handle,
            runtime,
        })
    }
}
