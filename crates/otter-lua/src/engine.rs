//! Thread-safe engine for Lua execution
//!
//! A [`LuaEngine`] owns one worker thread, and that thread owns the only
//! `LuaContext`. Jobs are submitted through a cloneable [`LuaEngineHandle`]
//! and run one at a time, in submission order.
//!
//! # Example
//!
//! ```no_run
//! use otter_lua::{LuaEngine, Value};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = LuaEngine::new().unwrap();
//!     let handle = engine.handle();
//!
//!     let out = handle.eval("return 1 + 1").await.unwrap();
//!     assert_eq!(out, vec![Value::Number(2.0)]);
//!
//!     engine.shutdown().await;
//! }
//! ```

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError, bounded};
use otter_lua_core::{Bindings, IntoLua, IntoLuaMulti, LuaConfig, LuaContext, LuaResult, Value};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::worker::{Job, SetupFn, run_worker};

/// Job counters shared between the handles and the worker
///
/// A job counts as submitted once the queue accepts it, and as finished
/// once the worker has produced its response.
#[derive(Debug, Default)]
pub struct EngineStats {
    submitted: AtomicU64,
    finished: AtomicU64,
    failed: AtomicU64,
}

impl EngineStats {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finished(&self, ok: bool) {
        self.finished.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Counter values read at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub submitted: u64,
    pub finished: u64,
    pub failed: u64,
}

impl EngineStatsSnapshot {
    /// Jobs still queued or running on the worker
    pub fn pending(&self) -> u64 {
        self.submitted.saturating_sub(self.finished)
    }
}

/// Settings for a [`LuaEngine`], consumed by [`build`](Self::build)
pub struct LuaEngineBuilder {
    config: LuaConfig,
    queue_capacity: usize,
    setup: Vec<SetupFn>,
}

impl Default for LuaEngineBuilder {
    fn default() -> Self {
        Self {
            config: LuaConfig::default(),
            queue_capacity: 1024,
            setup: Vec::new(),
        }
    }
}

impl LuaEngineBuilder {
    /// Set the configuration used to create the worker's context
    pub fn config(mut self, config: LuaConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of jobs that may wait for the worker (default 1024, at least 1).
    ///
    /// Past this, `try_eval` fails with [`EngineError::QueueFull`] and the
    /// async operations wait for room.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Register a hook that runs once against the new context
    ///
    /// Hooks run on the worker thread in registration order, before any job.
    /// A failing hook makes [`build`](Self::build) fail.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use otter_lua::{HostFunction, LuaEngine};
    ///
    /// let engine = LuaEngine::builder()
    ///     .setup(|lua| lua.try_set("add", HostFunction::new(|a: f64, b: f64| a + b)))
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn setup<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&LuaContext) -> LuaResult<()> + Send + 'static,
    {
        self.setup.push(Box::new(hook));
        self
    }

    /// Build the engine and start the worker thread
    ///
    /// Blocks until the worker has created its context and run the setup
    /// hooks.
    pub fn build(self) -> EngineResult<LuaEngine> {
        LuaEngine::new_with_config(self)
    }
}

/// Lua execution engine with a dedicated worker thread
///
/// Use [`handle`](Self::handle) to get a thread-safe handle for submitting
/// jobs. Dropping the engine asks the worker to stop without waiting for it.
pub struct LuaEngine {
    job_tx: Sender<Job>,
    worker: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<EngineStats>,
}

impl LuaEngine {
    /// Start an engine with the default configuration
    pub fn new() -> EngineResult<Self> {
        Self::builder().build()
    }

    pub fn builder() -> LuaEngineBuilder {
        LuaEngineBuilder::default()
    }

    fn new_with_config(builder: LuaEngineBuilder) -> EngineResult<Self> {
        let (job_tx, job_rx) = bounded::<Job>(builder.queue_capacity);
        let (ready_tx, ready_rx) = bounded::<LuaResult<()>>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(EngineStats::default());

        let config = builder.config;
        let setup = builder.setup;
        let shutdown_flag = shutdown.clone();
        let worker_stats = stats.clone();

        let worker = std::thread::Builder::new()
            .name("otter-lua-worker".to_string())
            .spawn(move || {
                run_worker(job_rx, config, setup, ready_tx, shutdown_flag, worker_stats);
            })
            .map_err(|e| EngineError::internal(format!("Failed to spawn worker: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = worker.join();
                return Err(EngineError::internal("Worker exited during startup"));
            }
        }

        debug!(
            queue_capacity = builder.queue_capacity,
            "Lua engine started"
        );

        Ok(Self {
            job_tx,
            worker: Some(worker),
            shutdown,
            stats,
        })
    }

    /// A new handle onto this engine's queue
    pub fn handle(&self) -> LuaEngineHandle {
        LuaEngineHandle {
            job_tx: self.job_tx.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Job counters for this engine
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Check if the worker is still serving jobs
    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
    }

    /// Stop the worker once the queued jobs are done and wait for it
    pub async fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.job_tx.send(Job::Shutdown);

        // Join off the async runtime so the caller's executor is not blocked.
        if let Some(worker) = self.worker.take() {
            tokio::task::spawn_blocking(move || {
                let _ = worker.join();
            })
            .await
            .ok();
        }
        debug!("Lua engine shut down");
    }
}

impl Drop for LuaEngine {
    fn drop(&mut self) {
        if self.worker.take().is_some() {
            self.shutdown.store(true, Ordering::SeqCst);
            let _ = self.job_tx.send(Job::Shutdown);
        }
    }
}

/// Cloneable, `Send + Sync` front end to the engine's worker
///
/// Each operation becomes one job. Jobs from all handles run one at a time
/// on the worker thread, in the order the queue accepted them.
#[derive(Clone)]
pub struct LuaEngineHandle {
    job_tx: Sender<Job>,
    stats: Arc<EngineStats>,
}

impl LuaEngineHandle {
    /// Bind a value to a dotted global name
    pub async fn set(
        &self,
        name: impl Into<String>,
        value: impl IntoLua + Send,
    ) -> EngineResult<()> {
        let name = name.into();
        let value = value.into_lua()?;
        self.submit(|response| Job::Set {
            name,
            value,
            response,
        })
        .await
    }

    /// Evaluate a chunk and return every value it returns
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example(handle: otter_lua::LuaEngineHandle) {
    /// let out = handle.eval("return 'a', 2").await.unwrap();
    /// assert_eq!(out.len(), 2);
    /// # }
    /// ```
    pub async fn eval(&self, source: impl Into<String>) -> EngineResult<Vec<Value>> {
        let source = source.into();
        self.submit(|response| Job::Eval {
            source,
            bindings: None,
            response,
        })
        .await
    }

    /// Evaluate a chunk with names visible only to it
    pub async fn eval_with(
        &self,
        source: impl Into<String>,
        bindings: Bindings,
    ) -> EngineResult<Vec<Value>> {
        let source = source.into();
        self.submit(|response| Job::Eval {
            source,
            bindings: Some(bindings),
            response,
        })
        .await
    }

    /// Call the Lua function at a dotted name
    pub async fn call(
        &self,
        function: impl Into<String>,
        args: impl IntoLuaMulti + Send,
    ) -> EngineResult<Vec<Value>> {
        let function = function.into();
        let args = args.into_lua_multi()?;
        self.submit(|response| Job::Call {
            function,
            args,
            response,
        })
        .await
    }

    /// Run `f` against the context on the worker thread
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example(handle: otter_lua::LuaEngineHandle) {
    /// let count = handle
    ///     .with_context(|lua| lua.registry().len())
    ///     .await
    ///     .unwrap();
    /// # }
    /// ```
    pub async fn with_context<F, R>(&self, f: F) -> EngineResult<R>
    where
        F: FnOnce(&LuaContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let task = Box::new(move |lua: &LuaContext| Box::new(f(lua)) as Box<dyn Any + Send>);
        let result = self.submit(|response| Job::Run { task, response }).await?;
        result
            .downcast::<R>()
            .map(|value| *value)
            .map_err(|_| EngineError::internal("Context task returned an unexpected type"))
    }

    /// Try to submit an eval without blocking
    ///
    /// Fails with [`EngineError::QueueFull`] when the queue is at capacity.
    /// The returned receiver resolves when the job completes.
    pub fn try_eval(
        &self,
        source: impl Into<String>,
    ) -> EngineResult<oneshot::Receiver<EngineResult<Vec<Value>>>> {
        let (tx, rx) = oneshot::channel();
        self.job_tx
            .try_send(Job::Eval {
                source: source.into(),
                bindings: None,
                response: tx,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => EngineError::QueueFull,
                TrySendError::Disconnected(_) => EngineError::ShutDown,
            })?;
        self.stats.record_submitted();

        Ok(rx)
    }

    /// Job counters shared with the engine
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    async fn submit<T>(
        &self,
        job: impl FnOnce(oneshot::Sender<EngineResult<T>>) -> Job,
    ) -> EngineResult<T> {
        let (tx, rx) = oneshot::channel();
        self.job_tx
            .send(job(tx))
            .map_err(|_| EngineError::ShutDown)?;
        self.stats.record_submitted();

        rx.await.map_err(|_| EngineError::ShutDown)?
    }
}
