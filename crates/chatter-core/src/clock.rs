//! Coarse monotonic clock for liveness bookkeeping.
//!
//! On Linux, timestamps use `CLOCK_MONOTONIC_RAW` (immune to NTP slew).
//! On other platforms, an `Instant`-based fallback is used.

/// Millisecond timestamp via `CLOCK_MONOTONIC_RAW` (Linux) or `Instant` (other platforms).
#[inline(always)]
pub fn now_ms() -> u64 {
    #[cfg(target_os = "linux")]
    {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts);
        }
        (ts.tv_sec as u64) * 1_000 + (ts.tv_nsec as u64) / 1_000_000
    }
    #[cfg(not(target_os = "linux"))]
    {
        use std::time::Instant;
        static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let epoch = EPOCH.get_or_init(Instant::now);
        epoch.elapsed().as_millis() as u64
    }
}
