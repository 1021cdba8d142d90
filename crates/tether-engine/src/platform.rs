//! Native message pumping for the device thread.
//!
//! On Windows the vendor library delivers its callbacks through the window
//! messages of the thread that loaded it, so the device thread joins a
//! single-threaded COM apartment and drains its message queue every tick.
//! Elsewhere both are no-ops.

#[cfg(windows)]
mod imp {
    use tracing::warn;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    };

    /// Membership of the current thread in a single-threaded apartment.
    pub struct Apartment {
        joined: bool,
    }

    impl Apartment {
        pub fn enter() -> Self {
            // SAFETY: called once at the top of the device thread, balanced in Drop.
            let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
            if hr.is_err() {
                warn!(?hr, "Failed to enter COM apartment");
            }
            Self { joined: hr.is_ok() }
        }
    }

    impl Drop for Apartment {
        fn drop(&mut self) {
            if self.joined {
                // SAFETY: paired with the successful CoInitializeEx above.
                unsafe { CoUninitialize() };
            }
        }
    }

    /// Dispatch every queued window message for this thread.
    pub fn pump_messages() {
        let mut msg = MSG::default();
        // SAFETY: msg is a valid out-pointer for the duration of each call.
        unsafe {
            while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

#[cfg(not(windows))]
mod imp {
    pub struct Apartment;

    impl Apartment {
        pub fn enter() -> Self {
            Self
        }
    }

    pub fn pump_messages() {}
}

pub(crate) use imp::{pump_messages, Apartment};
