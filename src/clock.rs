//! A shared, periodically-refreshed wall-clock time and its RFC 9110 `Date` header rendering.
//!
//! Every response needs a `Date` header, but formatting `SystemTime::now()` on every request
//! (across every worker shard) is wasted work when the value only needs millisecond-ish
//! freshness. Monkey spawns a dedicated clock worker thread (`mk_clock_worker_init`) that
//! refreshes a shared buffer once a second; this is the same idea, built on an `ArcSwap`-free
//! `Mutex<Arc<str>>` so readers never block a writer for longer than a pointer swap.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, SystemTime},
};

/// A background-refreshed formatted HTTP date, shared read-only across worker shards.
pub struct Clock {
    formatted: Mutex<Arc<str>>,
}

impl Clock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            formatted: Mutex::new(Arc::from(httpdate::fmt_http_date(SystemTime::now()))),
        })
    }

    /// The current formatted date, e.g. `Tue, 15 Nov 1994 08:12:31 GMT`. Cheap: a mutex lock and
    /// an `Arc` clone, not a fresh `strftime`.
    pub fn formatted_date(&self) -> Arc<str> {
        self.formatted.lock().expect("clock mutex poisoned").clone()
    }

    fn refresh(&self) {
        let formatted: Arc<str> = Arc::from(httpdate::fmt_http_date(SystemTime::now()));
        *self.formatted.lock().expect("clock mutex poisoned") = formatted;
    }
}

/// Owns the background thread that keeps a [`Clock`] current. Dropping this stops the thread.
pub struct ClockHandle {
    clock: Arc<Clock>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ClockHandle {
    pub fn spawn() -> Self {
        let clock = Clock::new();
        let running = Arc::new(AtomicBool::new(true));

        let thread_clock = clock.clone();
        let thread_running = running.clone();
        let thread = std::thread::Builder::new()
            .name("clock".into())
            .spawn(move || {
                while thread_running.load(Ordering::Acquire) {
                    thread_clock.refresh();
                    std::thread::sleep(Duration::from_millis(500));
                }
            })
            .expect("failed to spawn clock thread");

        Self {
            clock,
            running,
            thread: Some(thread),
        }
    }

    pub fn clock(&self) -> Arc<Clock> {
        self.clock.clone()
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn formatted_date_is_well_formed() {
        let clock = Clock::new();
        let formatted = clock.formatted_date();
        assert!(httpdate::parse_http_date(&formatted).is_ok());
    }
}
