use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock used by the session loop and the simulated box
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration);

    /// Seconds since the timer was created.
    fn now_secs(&self) -> f64;
}

/// Wall-clock timer backed by `Instant` with platform sleeps
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn now_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(target_os = "macos")]
        self.macos_sleep(duration);
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // Resume with the remainder when a signal interrupts the sleep.
        loop {
            let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
            if rc != EINTR {
                break;
            }
            req = rem;
        }
    }

    // Settle states are a few milliseconds; only sub-tick remainders are spun.
    #[cfg(target_os = "macos")]
    fn macos_sleep(&self, duration: Duration) {
        use mach2::mach_time::mach_absolute_time;

        let deadline = Instant::now() + duration;
        if duration > SPIN_THRESHOLD {
            std::thread::sleep(duration - SPIN_THRESHOLD);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        let ticks = mach_ticks(remaining);
        let start = unsafe { mach_absolute_time() };
        while unsafe { mach_absolute_time() }.wrapping_sub(start) < ticks {
            std::hint::spin_loop();
        }
    }
}

/// Tail of a sleep that is busy-waited instead of handed to the scheduler
#[cfg(target_os = "macos")]
const SPIN_THRESHOLD: Duration = Duration::from_micros(200);

#[cfg(target_os = "macos")]
fn mach_ticks(d: Duration) -> u64 {
    use mach2::mach_time::{mach_timebase_info, mach_timebase_info_data_t};

    let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
    unsafe { mach_timebase_info(&mut timebase) };
    if timebase.numer == 0 {
        return 0;
    }
    (d.as_nanos() * u128::from(timebase.denom) / u128::from(timebase.numer)) as u64
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock that only moves when told to. `sleep` advances it instantly.
///
/// Clones share the same clock, so a simulated box and the session loop holding
/// clones observe one timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    nanos: Arc<AtomicU64>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.nanos.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Timer for ManualTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration) {
        self.advance(d)
    }
    fn now_secs(&self) -> f64 {
        self.now() as f64 / 1e9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_timer_clones_share_a_clock() {
        let a = ManualTimer::new();
        let b = a.clone();
        let t0 = a.now();
        b.sleep(Duration::from_millis(250));
        assert_eq!(a.elapsed(t0), Duration::from_millis(250));
        assert!((a.now_secs() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn high_precision_sleep_waits_at_least_requested() {
        let timer = HighPrecisionTimer::new();
        let t0 = timer.now();
        timer.sleep(Duration::from_millis(2));
        assert!(timer.elapsed(t0) >= Duration::from_millis(2));
    }
}
