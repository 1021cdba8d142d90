//! Process-wide error reporting hook.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, warn};

/// Application sink for failure messages.
pub type ErrorHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Reports native failures to the application.
///
/// Every message is logged at `error` level and then handed to the hook, if
/// one is installed. A panicking hook is contained here and never reaches
/// the engine threads.
#[derive(Clone, Default)]
pub struct ErrorReporter {
    hook: Option<ErrorHook>,
}

impl ErrorReporter {
    /// Create a reporter forwarding to `hook`.
    pub fn new(hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            hook: Some(Arc::new(hook)),
        }
    }

    /// Create a reporter that only logs.
    pub fn log_only() -> Self {
        Self::default()
    }

    /// Report a failure message.
    pub fn report(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        error!("{}", message);

        if let Some(ref hook) = self.hook {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(message))).is_err() {
                warn!("Error hook panicked");
            }
        }
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_hook_receives_message() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ErrorReporter::new(move |msg| sink.lock().push(msg.to_string()));

        reporter.report("shoot failed");
        reporter.clone().report(String::from("close failed"));

        assert_eq!(*seen.lock(), vec!["shoot failed", "close failed"]);
    }

    #[test]
    fn test_panicking_hook_is_contained() {
        let reporter = ErrorReporter::new(|_| panic!("hook exploded"));
        reporter.report("anything");
        ErrorReporter::log_only().report("still fine");
    }
}
