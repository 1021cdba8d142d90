//! Device executor.
//!
//! Every native call is made from one thread. That thread drains a FIFO of
//! work items, pumps native events, then sleeps for the configured interval.
//! Results travel back to the application through the callback thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, trace, warn};

use tether_sdk::DeviceSdk;

use crate::dispatcher::{Callback, CallbackDispatcher, CallbackQueue};
use crate::error::{panic_message, EngineError, EngineResult};
use crate::platform;
use crate::reporter::ErrorReporter;
use crate::runtime::RuntimeGuard;

type Action = Box<dyn FnOnce(&dyn DeviceSdk) -> EngineResult<Option<Callback>> + Send>;

enum WorkItem {
    Run { label: &'static str, action: Action },
    /// Sentinel: the last item the device thread runs.
    Shutdown,
}

/// Serializes all native work onto a single device thread.
///
/// The vendor library is process-wide: one executor should drive it per
/// process, normally the one owned by a `TetherContext`.
pub struct DeviceExecutor {
    sdk: Arc<dyn DeviceSdk>,
    runtime: Arc<RuntimeGuard>,
    reporter: ErrorReporter,
    callbacks: CallbackDispatcher,
    work_tx: Sender<WorkItem>,
    work_rx: Mutex<Option<Receiver<WorkItem>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    device_thread: RwLock<Option<ThreadId>>,
    pump_interval: Duration,
}

impl DeviceExecutor {
    /// Create a new executor. Nothing runs until [`start`](Self::start).
    ///
    /// Create one per process. A second executor over the same library
    /// would initialize and release it independently.
    pub fn new(sdk: Arc<dyn DeviceSdk>, reporter: ErrorReporter, pump_interval: Duration) -> Self {
        let (work_tx, work_rx) = crossbeam_channel::unbounded();
        Self {
            runtime: Arc::new(RuntimeGuard::new(Arc::clone(&sdk))),
            sdk,
            callbacks: CallbackDispatcher::new(reporter.clone()),
            reporter,
            work_tx,
            work_rx: Mutex::new(Some(work_rx)),
            thread: Mutex::new(None),
            device_thread: RwLock::new(None),
            pump_interval,
        }
    }

    /// Spawn the device and callback threads.
    ///
    /// Calling this while running is a no-op. An executor cannot be
    /// restarted once stopped.
    #[instrument(name = "executor_start", skip(self))]
    pub fn start(&self) -> EngineResult<()> {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            debug!("Executor already running, ignoring");
            return Ok(());
        }
        let rx = self
            .work_rx
            .lock()
            .take()
            .ok_or(EngineError::ExecutorStopped)?;

        self.callbacks.start()?;

        let device_loop = DeviceLoop {
            sdk: Arc::clone(&self.sdk),
            runtime: Arc::clone(&self.runtime),
            reporter: self.reporter.clone(),
            callbacks: self.callbacks.queue(),
            rx,
            pump_interval: self.pump_interval,
        };
        let handle = match thread::Builder::new()
            .name("tether-device".into())
            .spawn(move || device_loop.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.callbacks.queue().shutdown();
                self.callbacks.join();
                return Err(EngineError::Spawn(e));
            }
        };

        *self.device_thread.write() = Some(handle.thread().id());
        *slot = Some(handle);

        info!(pump_interval_ms = self.pump_interval.as_millis() as u64, "Device executor started");
        Ok(())
    }

    /// Queue the shutdown sentinel and wait for both threads to exit.
    ///
    /// Work queued before this call runs first, and so do its callbacks.
    /// Called from an engine thread it only queues the sentinel.
    #[instrument(name = "executor_stop", skip(self))]
    pub fn stop(&self) {
        if self.is_device_thread() || self.callbacks.is_callback_thread() {
            warn!("Stop requested from an engine thread, not waiting");
            let _ = self.work_tx.send(WorkItem::Shutdown);
            return;
        }

        let Some(handle) = self.thread.lock().take() else {
            debug!("Executor not running, ignoring");
            return;
        };

        let _ = self.work_tx.send(WorkItem::Shutdown);
        if handle.join().is_err() {
            error!("Device thread panicked");
        }
        self.callbacks.join();

        info!("Device executor stopped");
    }

    /// Queue `action` for the device thread.
    ///
    /// A failing or panicking action is reported through the error hook.
    pub fn submit<T, A>(&self, label: &'static str, action: A) -> EngineResult<()>
    where
        T: Send + 'static,
        A: FnOnce(&dyn DeviceSdk) -> EngineResult<T> + Send + 'static,
    {
        self.enqueue(label, Box::new(move |sdk: &dyn DeviceSdk| action(sdk).map(|_| None)))
    }

    /// Queue `action` and hand its result to `on_complete` on the callback thread.
    ///
    /// `on_complete` only runs if the action succeeds.
    pub fn submit_then<T, A, C>(&self, label: &'static str, action: A, on_complete: C) -> EngineResult<()>
    where
        T: Send + 'static,
        A: FnOnce(&dyn DeviceSdk) -> EngineResult<T> + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        self.enqueue(
            label,
            Box::new(move |sdk: &dyn DeviceSdk| {
                let value = action(sdk)?;
                Ok(Some(Box::new(move || on_complete(value)) as Callback))
            }),
        )
    }

    /// Queue `action` and return a channel that receives its result.
    ///
    /// Failures go to the channel instead of the error hook.
    pub fn request<T, A>(&self, label: &'static str, action: A) -> EngineResult<Receiver<EngineResult<T>>>
    where
        T: Send + 'static,
        A: FnOnce(&dyn DeviceSdk) -> EngineResult<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.enqueue(
            label,
            Box::new(move |sdk: &dyn DeviceSdk| {
                let result = panic::catch_unwind(AssertUnwindSafe(|| action(sdk))).unwrap_or_else(
                    |panic| Err(EngineError::ActionPanicked(panic_message(panic.as_ref()))),
                );
                if reply_tx.send(result).is_err() {
                    trace!(label, "Requester went away");
                }
                Ok(None)
            }),
        )?;
        Ok(reply_rx)
    }

    /// Run `action` on the device thread and wait for its result.
    pub fn call<T, A>(&self, label: &'static str, action: A) -> EngineResult<T>
    where
        T: Send + 'static,
        A: FnOnce(&dyn DeviceSdk) -> EngineResult<T> + Send + 'static,
    {
        if self.is_device_thread() || self.callbacks.is_callback_thread() {
            return Err(EngineError::WouldDeadlock);
        }
        if !self.is_running() {
            return Err(EngineError::ExecutorStopped);
        }
        self.request(label, action)?
            .recv()
            .map_err(|_| EngineError::ExecutorStopped)?
    }

    /// Wait until everything queued before this call has run.
    pub fn flush(&self) -> EngineResult<()> {
        self.call("flush", |_| Ok(()))
    }

    /// Returns true between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.thread.lock().is_some()
    }

    /// Returns true if called from the device thread.
    pub fn is_device_thread(&self) -> bool {
        *self.device_thread.read() == Some(thread::current().id())
    }

    /// Release the vendor runtime from the device thread.
    pub(crate) fn release_runtime(&self) -> EngineResult<()> {
        let runtime = Arc::clone(&self.runtime);
        self.submit("release camera SDK", move |_| Ok(runtime.release()?))
    }

    pub(crate) fn callback_queue(&self) -> CallbackQueue {
        self.callbacks.queue()
    }

    fn enqueue(&self, label: &'static str, action: Action) -> EngineResult<()> {
        trace!(label, "Queueing work");
        self.work_tx
            .send(WorkItem::Run { label, action })
            .map_err(|_| EngineError::ExecutorStopped)
    }
}

impl Drop for DeviceExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the device thread.
struct DeviceLoop {
    sdk: Arc<dyn DeviceSdk>,
    runtime: Arc<RuntimeGuard>,
    reporter: ErrorReporter,
    callbacks: CallbackQueue,
    rx: Receiver<WorkItem>,
    pump_interval: Duration,
}

impl DeviceLoop {
    fn run(self) {
        let _apartment = platform::Apartment::enter();

        if let Err(e) = self.runtime.initialize() {
            self.reporter
                .report(format!("Failed to initialize camera SDK: {e}"));
        }

        'running: loop {
            loop {
                match self.rx.try_recv() {
                    Ok(WorkItem::Run { label, action }) => self.run_item(label, action),
                    Ok(WorkItem::Shutdown) => break 'running,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'running,
                }
            }
            self.pump();
            thread::sleep(self.pump_interval);
        }

        let discarded = self.rx.try_iter().count();
        if discarded > 0 {
            warn!(discarded, "Discarding work queued after shutdown");
        }

        if let Err(e) = self.runtime.release() {
            self.reporter
                .report(format!("Failed to release camera SDK: {e}"));
        }
        self.callbacks.shutdown();

        info!("Device thread exiting");
    }

    fn run_item(&self, label: &'static str, action: Action) {
        trace!(label, "Running work item");
        let sdk: &dyn DeviceSdk = self.sdk.as_ref();

        match panic::catch_unwind(AssertUnwindSafe(move || action(sdk))) {
            Ok(Ok(Some(callback))) => {
                if self.callbacks.push(callback).is_err() {
                    warn!(label, "Callback thread gone, dropping completion");
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => self.reporter.report(format!("{label} failed: {e}")),
            Err(panic) => self.reporter.report(format!(
                "{label} panicked: {}",
                panic_message(panic.as_ref())
            )),
        }
    }

    fn pump(&self) {
        platform::pump_messages();
        if !self.runtime.is_running() {
            return;
        }
        let sdk = self.sdk.as_ref();
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| sdk.pump_events())) {
            self.reporter.report(format!(
                "Event handler panicked: {}",
                panic_message(panic.as_ref())
            ));
        }
    }
}
