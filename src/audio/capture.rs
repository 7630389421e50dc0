use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Whether some session currently holds the capture device.
static CAPTURE_IN_USE: AtomicBool = AtomicBool::new(false);

/// Exclusive claim on the microphone/audio capture resource.
///
/// Only one session may hold the claim at a time; the real backend acquires it
/// for the duration of a call, and the claim is released when the guard is
/// dropped (on `stop()` and on every teardown path). The fallback simulator
/// never touches hardware and never acquires one.
#[derive(Debug)]
pub struct CaptureClaim {
    _private: (),
}

impl CaptureClaim {
    /// Try to claim the capture device. Returns `None` if another session
    /// already holds it.
    pub fn acquire() -> Option<Self> {
        if CAPTURE_IN_USE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("audio capture claimed");
            Some(Self { _private: () })
        } else {
            None
        }
    }
}

impl Drop for CaptureClaim {
    fn drop(&mut self) {
        CAPTURE_IN_USE.store(false, Ordering::Release);
        debug!("audio capture released");
    }
}

/// Serializes tests that exercise the process-global capture flag.
#[cfg(test)]
pub(crate) static DEVICE_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_exclusive_until_dropped() {
        let _device = DEVICE_TEST_LOCK.lock().unwrap();

        let first = CaptureClaim::acquire().expect("device should be free");
        assert!(CaptureClaim::acquire().is_none(), "second claim must fail");

        drop(first);

        let again = CaptureClaim::acquire();
        assert!(again.is_some(), "claim should be reacquirable after release");
    }
}
