//! Fixed-interval scheduler for repeated download passes.
//!
//! Runs never overlap: the next start is fixed `interval` after the current
//! one begins, and a pass that overruns is followed immediately by the next.

use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

const WAIT_SLICE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Option<Duration>,
    stop: Arc<AtomicBool>,
    slice: Duration,
}

impl Scheduler {
    /// Scheduler for a timeout in minutes; `<= 0` means a single run.
    pub fn from_minutes(timeout: i64, stop: Arc<AtomicBool>) -> Self {
        let interval = u64::try_from(timeout)
            .ok()
            .filter(|&m| m > 0)
            .map(|m| Duration::from_secs(m * 60));
        Self {
            interval,
            stop,
            slice: WAIT_SLICE,
        }
    }

    pub fn once(stop: Arc<AtomicBool>) -> Self {
        Self {
            interval: None,
            stop,
            slice: WAIT_SLICE,
        }
    }

    pub fn every(interval: Duration, stop: Arc<AtomicBool>) -> Self {
        Self {
            interval: (!interval.is_zero()).then_some(interval),
            stop,
            slice: WAIT_SLICE,
        }
    }

    /// Granularity of stop-flag checks while waiting.
    pub fn with_slice(mut self, slice: Duration) -> Self {
        self.slice = slice.max(Duration::from_millis(1));
        self
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Invoke `action` once, or repeatedly until stopped. Returns the number
    /// of runs.
    pub fn run<F: FnMut()>(&self, mut action: F) -> usize {
        let Some(interval) = self.interval else {
            if self.is_stopped() {
                return 0;
            }
            action();
            return 1;
        };

        let mut runs = 0;
        while !self.is_stopped() {
            let next = Instant::now() + interval;
            action();
            runs += 1;
            if self.is_stopped() {
                break;
            }

            let remaining = next.saturating_duration_since(Instant::now());
            let at = Local::now() + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero());
            info!(next_run = %at.format("%Y-%m-%d %H:%M:%S"), "waiting for next pass");
            self.wait_until(next);
        }
        runs
    }

    fn wait_until(&self, deadline: Instant) {
        loop {
            if self.is_stopped() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(self.slice));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn non_positive_timeout_runs_once() {
        for timeout in [0, -5] {
            let s = Scheduler::from_minutes(timeout, flag());
            assert_eq!(s.interval(), None);
            let mut calls = 0;
            assert_eq!(s.run(|| calls += 1), 1);
            assert_eq!(calls, 1);
        }
    }

    #[test]
    fn positive_timeout_is_minutes() {
        let s = Scheduler::from_minutes(240, flag());
        assert_eq!(s.interval(), Some(Duration::from_secs(240 * 60)));
    }

    #[test]
    fn repeats_until_stopped() {
        let stop = flag();
        let s = Scheduler::every(Duration::from_millis(5), stop.clone())
            .with_slice(Duration::from_millis(1));
        let mut calls = 0;
        let runs = s.run(|| {
            calls += 1;
            if calls == 3 {
                stop.store(true, Ordering::Relaxed);
            }
        });
        assert_eq!(runs, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn runs_are_spaced_by_interval() {
        let stop = flag();
        let s = Scheduler::every(Duration::from_millis(40), stop.clone())
            .with_slice(Duration::from_millis(5));
        let mut starts = Vec::new();
        s.run(|| {
            starts.push(Instant::now());
            if starts.len() == 2 {
                stop.store(true, Ordering::Relaxed);
            }
        });
        assert!(starts[1] - starts[0] >= Duration::from_millis(40));
    }

    #[test]
    fn overrun_starts_next_pass_immediately() {
        let stop = flag();
        let s = Scheduler::every(Duration::from_millis(10), stop.clone());
        let mut starts = Vec::new();
        s.run(|| {
            starts.push(Instant::now());
            if starts.len() == 1 {
                thread::sleep(Duration::from_millis(30));
            } else {
                stop.store(true, Ordering::Relaxed);
            }
        });
        let gap = starts[1] - starts[0];
        assert!(gap >= Duration::from_millis(30));
        assert!(gap < Duration::from_millis(500));
    }

    #[test]
    fn stop_interrupts_long_wait() {
        let stop = flag();
        let s = Scheduler::every(Duration::from_secs(3600), stop.clone())
            .with_slice(Duration::from_millis(5));
        let stopper = {
            let stop = stop.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                stop.store(true, Ordering::Relaxed);
            })
        };
        let started = Instant::now();
        assert_eq!(s.run(|| {}), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();
    }

    #[test]
    fn already_stopped_runs_nothing() {
        let stop = Arc::new(AtomicBool::new(true));
        assert_eq!(Scheduler::once(stop.clone()).run(|| {}), 0);
        assert_eq!(Scheduler::every(Duration::from_millis(1), stop).run(|| {}), 0);
    }
}
