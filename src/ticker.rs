use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::time_provider::{ClockSnapshot, TimeProvider};

const STOP_POLL: Duration = Duration::from_millis(50);

/// Periodic clock task. Stops when asked, when dropped, or when the tick
/// callback reports that nobody is listening anymore.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn start<F>(provider: Arc<dyn TimeProvider>, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut(ClockSnapshot) -> bool + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let period = period.max(Duration::from_millis(1));
        let join = thread::spawn(move || {
            debug!("ticker started ({}, every {period:?})", provider.label());
            let mut next_tick = Instant::now();
            while !stop_for_thread.load(Ordering::Relaxed) {
                match provider.now() {
                    Ok(snapshot) => {
                        if !on_tick(snapshot) {
                            break;
                        }
                    }
                    Err(err) => warn!("clock read failed: {err:#}"),
                }

                next_tick += period;
                let now = Instant::now();
                if next_tick < now {
                    next_tick = now + period;
                }
                sleep_until(next_tick, &stop_for_thread);
            }
            debug!("ticker stopped");
        });
        Self {
            stop,
            join: Some(join),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sleep_until(deadline: Instant, stop: &AtomicBool) {
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        thread::sleep(remaining.min(STOP_POLL));
    }
}
