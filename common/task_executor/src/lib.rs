use futures::channel::mpsc::Sender;
use futures::prelude::*;
use slog::{crit, debug, Logger};

/// The reason a node is shutting down, sent from any task to the process
/// entry point.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ShutdownReason {
    /// The node shut down successfully.
    Success(&'static str),
    /// The node shut down due to an error condition.
    Failure(&'static str),
}

impl ShutdownReason {
    pub fn message(&self) -> &'static str {
        match self {
            ShutdownReason::Success(msg) => msg,
            ShutdownReason::Failure(msg) => msg,
        }
    }
}

/// A wrapper over a runtime handle which spawns named, exit-aware tasks.
#[derive(Clone)]
pub struct TaskExecutor {
    handle: tokio::runtime::Handle,
    /// The receiving side resolves when the node is shutting down; spawned
    /// tasks race against it.
    exit: exit_future::Exit,
    /// Sender given to tasks so they can request the node shut down.
    signal_tx: Sender<ShutdownReason>,
    log: Logger,
}

impl TaskExecutor {
    pub fn new(
        handle: tokio::runtime::Handle,
        exit: exit_future::Exit,
        log: Logger,
        signal_tx: Sender<ShutdownReason>,
    ) -> Self {
        Self {
            handle,
            exit,
            signal_tx,
            log,
        }
    }

    /// Spawn a future, cancelling it when the executor's exit future resolves.
    pub fn spawn(&self, task: impl Future<Output = ()> + Send + 'static, name: &'static str) {
        let exit = self.exit.clone();
        let log = self.log.clone();

        let future = async move {
            futures::pin_mut!(task);
            match future::select(task, exit).await {
                future::Either::Left(_) => debug!(log, "Async task completed"; "task" => name),
                future::Either::Right(_) => debug!(log, "Async task shutdown, exit received"; "task" => name),
            }
        };
        self.handle.spawn(future);
    }

    /// Spawn a future without exit handling; the task is responsible for its
    /// own termination.
    pub fn spawn_without_exit(
        &self,
        task: impl Future<Output = ()> + Send + 'static,
        name: &'static str,
    ) {
        debug!(self.log, "Spawning monitored task"; "task" => name);
        self.handle.spawn(task);
    }

    /// Run a blocking closure on the dedicated blocking thread pool, awaiting
    /// its completion.
    pub fn spawn_blocking_handle<F, T>(
        &self,
        task: F,
        name: &'static str,
    ) -> impl Future<Output = Result<T, tokio::task::JoinError>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        debug!(self.log, "Spawning blocking task"; "task" => name);
        self.handle.spawn_blocking(task)
    }

    /// Ask the node to shut down.
    pub fn shutdown(&self, reason: ShutdownReason) {
        let mut tx = self.signal_tx.clone();
        if let Err(e) = tx.try_send(reason) {
            crit!(self.log, "Failed to send shutdown signal"; "error" => %e);
        }
    }

    pub fn shutdown_sender(&self) -> Sender<ShutdownReason> {
        self.signal_tx.clone()
    }

    pub fn exit(&self) -> exit_future::Exit {
        self.exit.clone()
    }

    pub fn runtime_handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }
}
