// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Worker-pool plumbing for CPU-bound decode tasks.
//!
//! Page decoding is pure CPU work (decompression + value decoding), so it
//! runs on a dedicated blocking pool rather than async worker threads.  The
//! consumer side is an ordinary synchronous thread; it polls a task through
//! [`TaskHandle::is_finished`] and joins it with [`TaskHandle::join`].

use std::sync::LazyLock;
use std::time::Duration;

use snafu::location;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;

use crate::{Error, Result};

fn num_compute_intensive_cpus() -> usize {
    if let Ok(user_specified) = std::env::var("STRATA_CPU_THREADS") {
        if let Ok(n) = user_specified.parse::<usize>() {
            return n.max(1);
        }
        log::warn!("ignoring unparseable STRATA_CPU_THREADS={user_specified}");
    }
    // Leave a couple of cores for the consumer thread and the OS.
    num_cpus::get().saturating_sub(2).max(1)
}

static CPU_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .thread_name("strata-cpu")
        .max_blocking_threads(num_compute_intensive_cpus())
        .worker_threads(1)
        // keep the threads alive "forever"
        .thread_keep_alive(Duration::from_secs(u64::MAX))
        .build()
        .unwrap()
});

/// Handle to the worker pool that decode and assembly tasks run on.
///
/// The default executor is a process-wide pool sized to the machine; hosts
/// embedding the reader into an existing tokio application can wrap their
/// own runtime handle instead.
#[derive(Clone)]
pub struct Executor {
    handle: Handle,
}

impl Executor {
    /// The shared process-wide CPU pool.
    pub fn cpu_pool() -> Self {
        Self {
            handle: CPU_RUNTIME.handle().clone(),
        }
    }

    /// Run tasks on a host-provided tokio runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Submit a CPU-bound task to the pool.
    pub fn spawn<T, F>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (send, recv) = oneshot::channel();
        self.handle.spawn_blocking(move || {
            // The receiver may have been dropped (reader closed); the
            // result of an in-flight task is discarded in that case.
            let _ = send.send(task());
        });
        TaskHandle {
            recv,
            ready: None,
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::cpu_pool()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}

/// A joinable handle to a task submitted through [`Executor::spawn`].
pub struct TaskHandle<T> {
    recv: oneshot::Receiver<Result<T>>,
    ready: Option<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// True once the task's result is available without blocking.
    pub fn is_finished(&mut self) -> bool {
        if self.ready.is_some() {
            return true;
        }
        match self.recv.try_recv() {
            Ok(value) => {
                self.ready = Some(value);
                true
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            // A dropped sender means the task died; join() reports it.
            Err(oneshot::error::TryRecvError::Closed) => true,
        }
    }

    /// Block the calling thread until the task completes.
    pub fn join(mut self) -> Result<T> {
        if let Some(ready) = self.ready.take() {
            return ready;
        }
        futures::executor::block_on(self.recv)
            .unwrap_or_else(|_| Err(Error::io("worker task dropped before completion", location!())))
    }
}
