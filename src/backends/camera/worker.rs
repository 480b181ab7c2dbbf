// SPDX-License-Identifier: GPL-3.0-only

//! Serial camera worker thread
//!
//! All camera work (open, configure, capture, frame pairing, DNG writing)
//! runs on one dedicated thread that drains a single message channel. UI
//! commands and camera callbacks share that channel, so every state
//! transition happens in arrival order without further locking.
//!
//! The thread hosts a current-thread tokio runtime only to wait on the
//! channel with an optional deadline.

use super::{CallbackSink, CameraCallback};
use crate::errors::{AppError, AppResult};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, error, info, warn};

/// Message processed by the worker
pub enum WorkerMessage<C> {
    /// Request from the UI side
    Command(C),
    /// Notification from the camera service
    Callback(CameraCallback),
    /// Close everything and exit
    Shutdown,
}

/// Logic run on the worker thread
pub trait WorkerHandler: Send + 'static {
    type Command: Send + 'static;

    fn on_command(&mut self, command: Self::Command, callbacks: &CallbackSink);

    fn on_callback(&mut self, callback: CameraCallback, callbacks: &CallbackSink);

    /// Earliest pending deadline, if any operation is being timed
    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    /// Called when [`next_deadline`](WorkerHandler::next_deadline) passes
    /// with no message arriving
    fn on_deadline(&mut self, _callbacks: &CallbackSink) {}

    /// Release every camera resource before the thread exits
    fn on_shutdown(&mut self);
}

/// Handle to a running camera worker
pub struct CameraWorker<C: Send + 'static> {
    sender: UnboundedSender<WorkerMessage<C>>,
    thread_handle: Option<JoinHandle<()>>,
    name: String,
}

impl<C: Send + 'static> CameraWorker<C> {
    /// Spawn the worker thread running `handler`
    pub fn start<H>(name: &str, handler: H) -> AppResult<Self>
    where
        H: WorkerHandler<Command = C>,
    {
        let (sender, receiver) = unbounded_channel();
        let callbacks = callback_sink(&sender);
        let thread_name = name.to_string();

        info!(name = %name, "Starting camera worker");
        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(thread_name, handler, receiver, callbacks))
            .map_err(|e| AppError::Worker(format!("failed to spawn {}: {}", name, e)))?;

        Ok(Self {
            sender,
            thread_handle: Some(thread_handle),
            name: name.to_string(),
        })
    }

    /// Queue a command; returns false once the worker has exited
    pub fn send(&self, command: C) -> bool {
        self.sender.send(WorkerMessage::Command(command)).is_ok()
    }

    /// Sink posting camera callbacks onto this worker
    pub fn callback_sink(&self) -> CallbackSink {
        callback_sink(&self.sender)
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Ask the worker to shut down and wait for it to exit
    ///
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        debug!(name = %self.name, "Requesting camera worker shutdown");
        let _ = self.sender.send(WorkerMessage::Shutdown);
        if let Err(e) = handle.join() {
            warn!(name = %self.name, "Camera worker thread panicked: {:?}", e);
        } else {
            debug!(name = %self.name, "Camera worker thread finished");
        }
    }
}

impl<C: Send + 'static> Drop for CameraWorker<C> {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CameraWorker dropped, stopping thread");
            self.stop();
        }
    }
}

fn callback_sink<C: Send + 'static>(sender: &UnboundedSender<WorkerMessage<C>>) -> CallbackSink {
    let sender = sender.clone();
    CallbackSink::new(move |callback| sender.send(WorkerMessage::Callback(callback)).is_ok())
}

fn run<H: WorkerHandler>(
    name: String,
    mut handler: H,
    mut receiver: UnboundedReceiver<WorkerMessage<H::Command>>,
    callbacks: CallbackSink,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(name = %name, error = %e, "Failed to create worker runtime");
            handler.on_shutdown();
            return;
        }
    };

    debug!(name = %name, "Camera worker thread started");
    runtime.block_on(async {
        loop {
            let message = match handler.next_deadline() {
                Some(deadline) => {
                    let deadline = tokio::time::Instant::from_std(deadline);
                    match tokio::time::timeout_at(deadline, receiver.recv()).await {
                        Ok(message) => message,
                        Err(_) => {
                            handler.on_deadline(&callbacks);
                            continue;
                        }
                    }
                }
                None => receiver.recv().await,
            };

            match message {
                Some(WorkerMessage::Command(command)) => handler.on_command(command, &callbacks),
                Some(WorkerMessage::Callback(callback)) => {
                    handler.on_callback(callback, &callbacks)
                }
                Some(WorkerMessage::Shutdown) | None => break,
            }
        }
    });

    handler.on_shutdown();

    receiver.close();
    while let Ok(message) = receiver.try_recv() {
        if let WorkerMessage::Callback(callback) = message {
            discard(callback);
        }
    }
    info!(name = %name, "Camera worker thread exiting");
}

/// Dispose of a callback that arrived after shutdown
fn discard(callback: CameraCallback) {
    match callback {
        CameraCallback::Opened(mut device) => {
            debug!(camera_id = device.id(), "Closing camera opened during shutdown");
            if let Err(e) = device.close() {
                warn!(error = %e, "Failed to close late camera");
            }
        }
        CameraCallback::SessionConfigured(mut session) => {
            debug!("Closing session configured during shutdown");
            if let Err(e) = session.close() {
                warn!(error = %e, "Failed to close late session");
            }
        }
        other => debug!(callback = ?other, "Dropping callback after shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        commands: AtomicU32,
        callbacks: AtomicU32,
        deadlines: AtomicU32,
        shut_down: AtomicBool,
    }

    struct RecordingHandler {
        counters: Arc<Counters>,
        deadline: Option<Instant>,
    }

    enum TestCommand {
        Count,
        Arm(Duration),
    }

    impl WorkerHandler for RecordingHandler {
        type Command = TestCommand;

        fn on_command(&mut self, command: TestCommand, _callbacks: &CallbackSink) {
            self.counters.commands.fetch_add(1, Ordering::SeqCst);
            match command {
                TestCommand::Count => {}
                TestCommand::Arm(after) => self.deadline = Some(Instant::now() + after),
            }
        }

        fn on_callback(&mut self, _callback: CameraCallback, _callbacks: &CallbackSink) {
            self.counters.callbacks.fetch_add(1, Ordering::SeqCst);
        }

        fn next_deadline(&self) -> Option<Instant> {
            self.deadline
        }

        fn on_deadline(&mut self, _callbacks: &CallbackSink) {
            self.deadline = None;
            self.counters.deadlines.fetch_add(1, Ordering::SeqCst);
        }

        fn on_shutdown(&mut self) {
            self.counters.shut_down.store(true, Ordering::SeqCst);
        }
    }

    fn start() -> (CameraWorker<TestCommand>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let handler = RecordingHandler {
            counters: Arc::clone(&counters),
            deadline: None,
        };
        (CameraWorker::start("test-worker", handler).unwrap(), counters)
    }

    #[test]
    fn test_commands_and_callbacks_processed_in_order() {
        let (mut worker, counters) = start();
        assert!(worker.send(TestCommand::Count));
        assert!(worker.callback_sink().post(CameraCallback::FrameAvailable));
        assert!(worker.send(TestCommand::Count));
        worker.stop();

        assert_eq!(counters.commands.load(Ordering::SeqCst), 2);
        assert_eq!(counters.callbacks.load(Ordering::SeqCst), 1);
        assert!(counters.shut_down.load(Ordering::SeqCst));
    }

    #[test]
    fn test_deadline_fires_once() {
        let (mut worker, counters) = start();
        worker.send(TestCommand::Arm(Duration::from_millis(20)));
        thread::sleep(Duration::from_millis(150));
        worker.stop();
        assert_eq!(counters.deadlines.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut worker, counters) = start();
        worker.stop();
        worker.stop();
        assert!(!worker.is_running());
        assert!(!worker.send(TestCommand::Count));
        assert!(counters.shut_down.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_shuts_down() {
        let (worker, counters) = start();
        drop(worker);
        assert!(counters.shut_down.load(Ordering::SeqCst));
    }
}
