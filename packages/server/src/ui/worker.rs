//! Worker execution contexts
//!
//! Each worker is an OS thread running a current-thread Tokio runtime inside a
//! `LocalSet`. Sessions attached to a worker run as local tasks on it, so all of
//! a session's socket I/O and event handling stays on that one thread.

use std::{io, thread};

use tokio::{
    runtime::Builder as RuntimeBuilder,
    sync::mpsc,
    task::{JoinSet, LocalSet},
};

use super::session::SessionTask;

pub enum WorkerCommand {
    Attach(SessionTask),
    Quit,
}

/// Handle to one worker thread
pub struct Worker {
    index: usize,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(index: usize) -> io::Result<Self> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name(format!("worker-{}", index))
            .spawn(move || worker_thread_main(index, receiver))?;

        tracing::info!("Started worker {}", index);
        Ok(Self {
            index,
            commands,
            thread: Some(thread),
        })
    }

    /// A worker whose thread has already exited
    #[cfg(test)]
    pub(crate) fn stopped(index: usize) -> Self {
        let (commands, _) = mpsc::unbounded_channel();
        Self {
            index,
            commands,
            thread: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Hand a session to this worker. Gives the task back if the worker is gone.
    pub fn attach(&self, task: SessionTask) -> Result<(), SessionTask> {
        if let Err(mpsc::error::SendError(WorkerCommand::Attach(task))) =
            self.commands.send(WorkerCommand::Attach(task))
        {
            return Err(task);
        }
        Ok(())
    }

    /// Ask the worker to finish its sessions and exit, then wait for it.
    pub fn quit_and_join(mut self) {
        let _ = self.commands.send(WorkerCommand::Quit);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Worker {} panicked", self.index);
            } else {
                tracing::info!("Worker {} stopped", self.index);
            }
        }
    }
}

fn worker_thread_main(index: usize, receiver: mpsc::UnboundedReceiver<WorkerCommand>) {
    let runtime = match RuntimeBuilder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Worker {} failed to build its runtime: {}", index, e);
            return;
        }
    };

    let local_set = LocalSet::new();
    local_set.block_on(&runtime, worker_loop(index, receiver));
}

async fn worker_loop(index: usize, mut receiver: mpsc::UnboundedReceiver<WorkerCommand>) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            command = receiver.recv() => match command {
                Some(WorkerCommand::Attach(task)) => {
                    tracing::debug!("Worker {} attached session {}", index, task.id());
                    sessions.spawn_local(task.run());
                }
                Some(WorkerCommand::Quit) | None => break,
            },
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = finished {
                    tracing::warn!("Session task on worker {} failed: {}", index, e);
                }
            }
        }
    }

    // in-flight handling is allowed to finish
    while let Some(finished) = sessions.join_next().await {
        if let Err(e) = finished {
            tracing::warn!("Session task on worker {} failed: {}", index, e);
        }
    }
}
