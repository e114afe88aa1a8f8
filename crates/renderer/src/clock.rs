use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Where playback time comes from.
pub trait TimeSource: Send {
    /// Restarts the clock at zero.
    fn reset(&mut self);
    /// Seconds since playback started.
    fn now(&mut self) -> f64;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    /// A clock reading zero now.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
    }

    fn now(&mut self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Externally driven time source. Clones share the same clock, so a test can
/// keep one handle and hand the other to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    time: Arc<Mutex<f64>>,
}

impl ManualTimeSource {
    /// A clock stopped at `time` until it is moved.
    pub fn new(time: f64) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    pub fn set(&self, time: f64) {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }

    pub fn advance(&self, seconds: f64) {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner) += seconds;
    }

    pub fn get(&self) -> f64 {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimeSource for ManualTimeSource {
    fn reset(&mut self) {
        self.set(0.0);
    }

    fn now(&mut self) -> f64 {
        self.get()
    }
}

pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_time_is_monotonic() {
        let mut clock = SystemTimeSource::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
        clock.reset();
        assert!(clock.now() < 1.0);
    }

    #[test]
    fn manual_clones_share_time() {
        let handle = ManualTimeSource::new(1.5);
        let mut clock: BoxedTimeSource = Box::new(handle.clone());
        assert_eq!(clock.now(), 1.5);
        handle.advance(0.5);
        assert_eq!(clock.now(), 2.0);
        clock.reset();
        assert_eq!(handle.get(), 0.0);
    }
}
