// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Context-confined task execution.
//!
//! Each GL context is owned by exactly one thread; every GPU call in this
//! crate happens inside a task submitted to that context's
//! [`GlTaskRunner`]. Callers block until their task completes and get its
//! result (or failure) back. Submitting from one runner's thread to a
//! *different* runner is disallowed by construction - the two subsystems'
//! contexts never nest; data crosses between them only through explicit
//! interop.

use std::cell::Cell;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;

use crate::core::error::{BridgeError, Result};
use crate::gl::backend::GpuBackend;

type Task = Box<dyn FnOnce(&dyn GpuBackend) + Send>;

enum RunnerMessage {
    Task(Task),
    Shutdown,
}

thread_local! {
    /// Set while a runner thread is executing tasks; used to reject nested
    /// confinement across contexts.
    static CONFINED: Cell<bool> = const { Cell::new(false) };
}

/// Identity attached to a task for diagnostics: which node asked, for which
/// frame.
#[derive(Debug, Clone, Default)]
pub struct TaskTag {
    pub node: String,
    pub sequence: Option<u64>,
}

impl TaskTag {
    pub fn new(node: impl Into<String>, sequence: Option<u64>) -> Self {
        Self {
            node: node.into(),
            sequence,
        }
    }
}

/// Executes units of GPU work exclusively on the thread owning one GL
/// context.
pub struct GlTaskRunner {
    name: String,
    sender: crossbeam_channel::Sender<RunnerMessage>,
    thread_id: ThreadId,
    backend: Arc<dyn GpuBackend>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl GlTaskRunner {
    /// Spawn the context thread. The backend's context is made current on
    /// that thread before any task runs.
    pub fn spawn(name: impl Into<String>, backend: Arc<dyn GpuBackend>) -> Arc<Self> {
        let name = name.into();
        let (sender, receiver) = crossbeam_channel::unbounded::<RunnerMessage>();
        let (id_tx, id_rx) = crossbeam_channel::bounded(1);

        let thread_backend = Arc::clone(&backend);
        let thread_name = name.clone();
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _ = id_tx.send(thread::current().id());
                thread_backend.make_current();
                tracing::debug!("[{}] GL context thread started", thread_name);
                CONFINED.with(|flag| flag.set(true));
                for message in receiver.iter() {
                    match message {
                        RunnerMessage::Task(task) => task(thread_backend.as_ref()),
                        RunnerMessage::Shutdown => break,
                    }
                }
                CONFINED.with(|flag| flag.set(false));
                tracing::debug!("[{}] GL context thread stopped", thread_name);
            })
            .unwrap_or_else(|e| panic!("failed to spawn GL context thread {name}: {e}"));

        let thread_id = id_rx
            .recv()
            .unwrap_or_else(|_| panic!("GL context thread {name} died during startup"));

        Arc::new(Self {
            name,
            sender,
            thread_id,
            backend,
            join: Mutex::new(Some(join)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Whether the calling thread is this runner's context thread.
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Execute `task` on the context thread and block until it completes.
    ///
    /// Re-entrant: when called from this runner's own thread (e.g. a
    /// release callback firing inside a task), the task executes inline
    /// instead of deadlocking on the queue. Calling from a *different*
    /// runner's thread panics - GPU work must never nest across contexts.
    pub fn run_sync<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn GpuBackend) -> Result<T> + Send,
    {
        if self.is_current_thread() {
            return task(self.backend.as_ref());
        }
        assert!(
            !CONFINED.with(|flag| flag.get()),
            "[{}] nested context confinement: task submitted from another GL context thread",
            self.name
        );

        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let task: Box<dyn FnOnce(&dyn GpuBackend) + Send + '_> = Box::new(move |gpu| {
            let _ = result_tx.send(task(gpu));
        });
        // SAFETY: run_sync blocks on result_rx until the task has run (or
        // the channel disconnects), so borrows captured by `task` outlive
        // its execution. The 'static bound is only needed to cross the
        // channel.
        let task: Task = unsafe { std::mem::transmute(task) };

        self.sender
            .send(RunnerMessage::Task(task))
            .map_err(|_| BridgeError::ContextLost(format!("[{}] runner stopped", self.name)))?;
        result_rx
            .recv()
            .map_err(|_| BridgeError::ContextLost(format!("[{}] task dropped", self.name)))?
    }

    /// [`run_sync`](Self::run_sync) with diagnostics identity attached to
    /// failures.
    pub fn run_sync_tagged<T, F>(&self, tag: &TaskTag, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn GpuBackend) -> Result<T> + Send,
    {
        self.run_sync(task).map_err(|e| match e {
            BridgeError::ContextLost(msg) => BridgeError::ContextLost(format!(
                "{msg} (node {}, seq {:?})",
                tag.node, tag.sequence
            )),
            other => other,
        })
    }
}

impl Drop for GlTaskRunner {
    fn drop(&mut self) {
        let _ = self.sender.send(RunnerMessage::Shutdown);
        if self.is_current_thread() {
            // Last reference dropped from inside a task (e.g. a buffer's
            // release path). The thread drains the queue and exits on its
            // own; joining here would deadlock against ourselves.
            return;
        }
        if let Some(join) = self.join.lock().take() {
            if join.join().is_err() {
                tracing::warn!("[{}] GL context thread panicked", self.name);
            }
        }
    }
}

impl std::fmt::Debug for GlTaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlTaskRunner")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGpu;

    #[test]
    fn test_tasks_run_on_context_thread() {
        let runner = GlTaskRunner::spawn("test-gl", FakeGpu::shared());
        let caller = thread::current().id();
        let (on_runner, same_as_caller) = runner
            .run_sync(|_gpu| Ok((thread::current().id(), thread::current().id() == caller)))
            .unwrap();
        assert_eq!(on_runner, runner.thread_id);
        assert!(!same_as_caller);
    }

    #[test]
    fn test_errors_propagate_to_caller() {
        let runner = GlTaskRunner::spawn("test-gl", FakeGpu::shared());
        let err = runner
            .run_sync::<(), _>(|_gpu| Err(BridgeError::Engine("boom".into())))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Engine(_)));
    }

    #[test]
    fn test_reentrant_call_executes_inline() {
        let runner = GlTaskRunner::spawn("test-gl", FakeGpu::shared());
        let inner = Arc::clone(&runner);
        let value = runner
            .run_sync(move |_gpu| inner.run_sync(|_gpu| Ok(7)))
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_cross_runner_nesting_is_fatal_to_the_offending_context() {
        let a = GlTaskRunner::spawn("gl-a", FakeGpu::shared());
        let b = GlTaskRunner::spawn("gl-b", FakeGpu::shared());
        // The nested submission panics on a's context thread; the caller
        // observes the context as lost.
        let err = a
            .run_sync(move |_gpu| b.run_sync(|_gpu| Ok(())))
            .unwrap_err();
        assert!(matches!(err, BridgeError::ContextLost(_)));
    }

    #[test]
    fn test_borrowed_state_visible_to_task() {
        let runner = GlTaskRunner::spawn("test-gl", FakeGpu::shared());
        let data = vec![1u8, 2, 3];
        let sum = runner
            .run_sync(|_gpu| Ok(data.iter().map(|&b| b as u32).sum::<u32>()))
            .unwrap();
        assert_eq!(sum, 6);
        assert_eq!(data.len(), 3);
    }
}
