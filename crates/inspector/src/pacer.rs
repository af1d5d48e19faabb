use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

/// Suspension point of the loop: inter-iteration sleeps and reconnect backoff.
pub trait Pacer {
    /// Wait for `duration`. Returns false if the wait was cut short by a
    /// stop request.
    fn pause(&mut self, duration: Duration) -> bool;

    /// True once a stop has been requested.
    fn stop_requested(&self) -> bool {
        false
    }
}

/// Sleeps in short slices, waking early when the stop flag is raised.
pub struct InterruptiblePacer {
    stop: Arc<AtomicBool>,
    slice: Duration,
}

impl InterruptiblePacer {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self {
            stop,
            slice: Duration::from_millis(100),
        }
    }

    pub fn with_slice(mut self, slice: Duration) -> Self {
        self.slice = slice.max(Duration::from_millis(1));
        self
    }
}

impl Pacer for InterruptiblePacer {
    fn pause(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(self.slice.min(deadline - now));
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_pause_without_stop() {
        let mut pacer = InterruptiblePacer::new(Arc::new(AtomicBool::new(false)))
            .with_slice(Duration::from_millis(5));
        let start = Instant::now();

        assert!(pacer.pause(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn raised_flag_cuts_pause_short() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut pacer = InterruptiblePacer::new(Arc::clone(&stop)).with_slice(Duration::from_millis(5));

        let raiser = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                stop.store(true, Ordering::Relaxed);
            })
        };

        let start = Instant::now();
        assert!(!pacer.pause(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(pacer.stop_requested());
        raiser.join().unwrap();
    }

    #[test]
    fn zero_pause_returns_immediately() {
        let mut pacer = InterruptiblePacer::new(Arc::new(AtomicBool::new(false)));
        assert!(pacer.pause(Duration::ZERO));
    }
}
