//! Callback thread.
//!
//! Completion callbacks and events never run on the device thread. They are
//! queued here and executed one at a time, in order, by a dedicated thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, trace, warn};

use tether_types::TetherEvent;

use crate::error::{panic_message, EngineError, EngineResult};
use crate::reporter::ErrorReporter;

/// A callback queued for the callback thread.
pub(crate) type Callback = Box<dyn FnOnce() + Send>;

/// Application listener for [`TetherEvent`]s.
pub type EventListener = Arc<dyn Fn(&TetherEvent) + Send + Sync>;

pub(crate) enum CallbackItem {
    Deliver(Callback),
    /// Sentinel: stop after everything queued before it has run.
    Shutdown,
}

/// Producer side of the callback queue.
#[derive(Clone)]
pub(crate) struct CallbackQueue {
    tx: Sender<CallbackItem>,
}

impl CallbackQueue {
    /// Queue a callback. Fails only once the callback thread has exited.
    pub(crate) fn push(&self, callback: Callback) -> EngineResult<()> {
        self.tx
            .send(CallbackItem::Deliver(callback))
            .map_err(|_| EngineError::ExecutorStopped)
    }

    pub(crate) fn shutdown(&self) {
        if self.tx.send(CallbackItem::Shutdown).is_err() {
            debug!("Callback thread already gone");
        }
    }
}

/// Owns the callback thread.
pub(crate) struct CallbackDispatcher {
    queue: CallbackQueue,
    rx: Mutex<Option<Receiver<CallbackItem>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: RwLock<Option<ThreadId>>,
    reporter: ErrorReporter,
}

impl CallbackDispatcher {
    /// Create a new dispatcher. Callbacks queue up until [`start`](Self::start).
    pub(crate) fn new(reporter: ErrorReporter) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            queue: CallbackQueue { tx },
            rx: Mutex::new(Some(rx)),
            thread: Mutex::new(None),
            thread_id: RwLock::new(None),
            reporter,
        }
    }

    pub(crate) fn queue(&self) -> CallbackQueue {
        self.queue.clone()
    }

    /// Spawn the callback thread.
    #[instrument(name = "callbacks_start", skip(self))]
    pub(crate) fn start(&self) -> EngineResult<()> {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            debug!("Callback thread already running, ignoring");
            return Ok(());
        }
        let rx = self.rx.lock().take().ok_or(EngineError::ExecutorStopped)?;
        let reporter = self.reporter.clone();

        let handle = thread::Builder::new()
            .name("tether-callbacks".into())
            .spawn(move || callback_loop(rx, reporter))
            .map_err(EngineError::Spawn)?;

        *self.thread_id.write() = Some(handle.thread().id());
        *slot = Some(handle);
        Ok(())
    }

    /// Returns true if called from the callback thread.
    pub(crate) fn is_callback_thread(&self) -> bool {
        *self.thread_id.read() == Some(thread::current().id())
    }

    /// Wait for the callback thread to exit.
    ///
    /// The caller must have arranged for a shutdown sentinel to be queued.
    pub(crate) fn join(&self) {
        if self.is_callback_thread() {
            warn!("Callback thread cannot join itself");
            return;
        }
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            warn!("Callback thread panicked");
        }
    }
}

fn callback_loop(rx: Receiver<CallbackItem>, reporter: ErrorReporter) {
    info!("Callback thread started");

    while let Ok(item) = rx.recv() {
        match item {
            CallbackItem::Deliver(callback) => {
                if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                    reporter.report(format!(
                        "Callback panicked: {}",
                        panic_message(panic.as_ref())
                    ));
                }
            }
            CallbackItem::Shutdown => {
                trace!("Callback shutdown sentinel reached");
                break;
            }
        }
    }

    info!("Callback thread exiting");
}

/// Delivers [`TetherEvent`]s to the application listener, if any.
#[derive(Clone)]
pub(crate) struct EventSink {
    listener: Arc<RwLock<Option<EventListener>>>,
    callbacks: CallbackQueue,
}

impl EventSink {
    pub(crate) fn new(listener: Arc<RwLock<Option<EventListener>>>, callbacks: CallbackQueue) -> Self {
        Self { listener, callbacks }
    }

    /// Queue `event` for the listener on the callback thread.
    pub(crate) fn emit(&self, event: TetherEvent) {
        let Some(listener) = self.listener.read().clone() else {
            trace!(?event, "No listener registered");
            return;
        };
        if self
            .callbacks
            .push(Box::new(move || listener(&event)))
            .is_err()
        {
            debug!("Callback thread stopped, dropping event");
        }
    }
}
