//! Platform services the demo needs from its environment.

/// Millisecond clock and blocking sleep.
///
/// On a device this wraps the RTOS tick; on a host it wraps `std::time`.
/// Tests use a fake clock whose `sleep_ms` simply advances `now_ms`.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed epoch.
    fn now_ms(&self) -> u64;

    /// Block the calling thread for `ms` milliseconds.
    fn sleep_ms(&self, ms: u64);
}

impl<K: Clock + ?Sized> Clock for &K {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn sleep_ms(&self, ms: u64) {
        (**self).sleep_ms(ms)
    }
}
