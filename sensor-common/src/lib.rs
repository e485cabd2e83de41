use std::time::{Duration, SystemTime};

mod channel;
pub use channel::{dispatch_queue, Consumer, EnqueueError, Producer};

/// Returns the number of whole microseconds elapsed since the UNIX epoch for the given instant.
/// Instants before the epoch are clamped to 0.
#[inline]
pub fn unix_micros(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_micros() as u64).unwrap_or_default()
}

/// Returns the time elapsed from `earlier` to `later`, or `None` if `later` is not strictly
/// after `earlier`.
#[inline]
pub fn strictly_after(earlier: SystemTime, later: SystemTime) -> Option<Duration> {
    match later.duration_since(earlier) {
        Ok(elapsed) if !elapsed.is_zero() => Some(elapsed),
        _ => None,
    }
}

#[allow(non_upper_case_globals)]
pub mod constants {
    pub const KiB: u32 = 1024;
}
