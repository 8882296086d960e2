//! Worker thread implementation for Lua execution
//!
//! The worker owns the engine's single `LuaContext` and processes jobs from
//! the shared queue in order. Panics while running a job are caught and
//! reported through the job's response channel.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender};
use otter_lua_core::{Bindings, LuaConfig, LuaContext, LuaResult, MultiValue, Value};
use tokio::sync::oneshot;
use tracing::{debug, error, info_span, trace};

use crate::engine::EngineStats;
use crate::error::{EngineError, EngineResult};

/// Hook run once against the fresh context before any job
pub(crate) type SetupFn = Box<dyn FnOnce(&LuaContext) -> LuaResult<()> + Send>;

/// Type-erased closure submitted through `with_context`
pub(crate) type ContextTask = Box<dyn FnOnce(&LuaContext) -> Box<dyn Any + Send> + Send>;

type Response<T> = oneshot::Sender<EngineResult<T>>;

/// Work queued for the Lua worker thread
pub(crate) enum Job {
    /// Bind a value to a dotted global name
    Set {
        name: String,
        value: Value,
        response: Response<()>,
    },
    /// Evaluate a chunk, optionally with per-call bindings
    Eval {
        source: String,
        bindings: Option<Bindings>,
        response: Response<Vec<Value>>,
    },
    /// Call a Lua function by dotted name
    Call {
        function: String,
        args: Vec<Value>,
        response: Response<Vec<Value>>,
    },
    /// Run an arbitrary closure against the context
    Run {
        task: ContextTask,
        response: Response<Box<dyn Any + Send>>,
    },
    /// Shutdown signal
    Shutdown,
}

/// Run the worker thread until shutdown
///
/// Creates the context, runs the setup hooks and reports the outcome over
/// `ready` before serving jobs. A failed setup ends the thread.
pub(crate) fn run_worker(
    job_rx: Receiver<Job>,
    config: LuaConfig,
    setup: Vec<SetupFn>,
    ready: Sender<LuaResult<()>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<EngineStats>,
) {
    let thread_name = std::thread::current()
        .name()
        .unwrap_or("otter-lua-worker")
        .to_string();

    let _span = info_span!("worker", name = %thread_name).entered();
    debug!("Worker starting");

    let context = match init_context(config, setup) {
        Ok(context) => context,
        Err(e) => {
            error!(error = %e, "Failed to initialize Lua context");
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    debug!("Worker initialized");

    loop {
        match job_rx.recv() {
            Ok(Job::Shutdown) => {
                debug!("Received shutdown signal");
                break;
            }
            Ok(job) => execute_job(&context, job, &stats),
            Err(_) => {
                debug!("Job channel disconnected");
                break;
            }
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    debug!("Worker stopped");
}

fn init_context(config: LuaConfig, setup: Vec<SetupFn>) -> LuaResult<LuaContext> {
    let context = LuaContext::with_config(config)?;
    for hook in setup {
        hook(&context)?;
    }
    Ok(context)
}

/// Runs one job, turning a panic into `EngineError::WorkerPanic`
fn execute_job(context: &LuaContext, job: Job, stats: &EngineStats) {
    match job {
        Job::Shutdown => {}
        Job::Set {
            name,
            value,
            response,
        } => {
            let _span = info_span!("set", name = %name).entered();
            let result =
                execute_with_panic_handler(|| context.try_set(&name, value).map_err(Into::into));
            finish(stats, response, result);
        }
        Job::Eval {
            source,
            bindings,
            response,
        } => {
            let _span = info_span!("eval", len = source.len()).entered();
            let result = execute_with_panic_handler(|| {
                let values = match bindings {
                    Some(bindings) => context.try_eval_with(&source, bindings)?,
                    None => context.try_eval(&source)?,
                };
                Ok(values)
            });
            finish(stats, response, result);
        }
        Job::Call {
            function,
            args,
            response,
        } => {
            let _span = info_span!("call", function = %function).entered();
            let result = execute_with_panic_handler(|| {
                Ok(context.try_call(&function, MultiValue(args))?)
            });
            finish(stats, response, result);
        }
        Job::Run { task, response } => {
            let _span = info_span!("run").entered();
            let result = execute_with_panic_handler(|| Ok(task(context)));
            finish(stats, response, result);
        }
    }
}

fn finish<T>(stats: &EngineStats, response: Response<T>, result: EngineResult<T>) {
    stats.record_finished(result.is_ok());
    if response.send(result).is_err() {
        trace!("Job response receiver dropped");
    }
}

/// Calls `f` and catches any panic it raises
fn execute_with_panic_handler<T, F>(f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown error".to_string()
            };
            error!("Worker panic: {}", message);
            Err(EngineError::WorkerPanic(message))
        }
    }
}
