use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone};

use crate::alarm::model::AlarmTime;

/// One reading of the clock: local wall time for matching and display, and a
/// monotonic instant for deadlines.
#[derive(Debug, Clone, Copy)]
pub struct ClockSnapshot {
    pub local: DateTime<Local>,
    pub instant: Instant,
}

impl ClockSnapshot {
    pub fn minute(&self) -> AlarmTime {
        AlarmTime::of(&self.local)
    }

    pub fn clock_text(&self) -> String {
        self.local.format("%H:%M:%S").to_string()
    }
}

pub trait TimeProvider: Send + Sync {
    fn now(&self) -> Result<ClockSnapshot>;
    fn label(&self) -> &'static str;
}

/// Reads the local wall clock. Readings never go backwards even if the
/// system clock is stepped back.
pub struct SystemTimeProvider {
    last_local: Mutex<Option<DateTime<Local>>>,
}

impl SystemTimeProvider {
    pub fn new() -> Self {
        Self {
            last_local: Mutex::new(None),
        }
    }
}

impl Default for SystemTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> Result<ClockSnapshot> {
        let proposed = Local::now();
        let mut guard = self
            .last_local
            .lock()
            .map_err(|_| anyhow!("failed to lock system clock monotonic state"))?;
        let local = match *guard {
            Some(last) if proposed < last => last,
            _ => proposed,
        };
        *guard = Some(local);
        Ok(ClockSnapshot {
            local,
            instant: Instant::now(),
        })
    }

    fn label(&self) -> &'static str {
        "SYSTEM_LOCAL"
    }
}

/// Simulated clock that only moves when told to.
pub struct ManualTimeProvider {
    current: Mutex<ClockSnapshot>,
}

impl ManualTimeProvider {
    pub fn new(start: NaiveDateTime) -> Result<Self> {
        let Some(local) = resolve_local_datetime(&Local, start) else {
            bail!("start time {start} does not exist in the local timezone");
        };
        Ok(Self {
            current: Mutex::new(ClockSnapshot {
                local,
                instant: Instant::now(),
            }),
        })
    }

    pub fn advance(&self, step: Duration) -> Result<ClockSnapshot> {
        let delta = chrono::Duration::from_std(step)
            .map_err(|err| anyhow!("clock step out of range: {err}"))?;
        let mut guard = self
            .current
            .lock()
            .map_err(|_| anyhow!("failed to lock manual clock state"))?;
        guard.local += delta;
        guard.instant += step;
        Ok(*guard)
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> Result<ClockSnapshot> {
        let guard = self
            .current
            .lock()
            .map_err(|_| anyhow!("failed to lock manual clock state"))?;
        Ok(*guard)
    }

    fn label(&self) -> &'static str {
        "MANUAL"
    }
}

fn resolve_local_datetime<Tz>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
{
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        LocalResult::None => None,
    }
}
