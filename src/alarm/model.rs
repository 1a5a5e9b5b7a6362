use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct AlarmId(u64);

impl AlarmId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for AlarmId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse::<u64>().map(Self)
    }
}

/// Time of day at minute resolution. Seconds are always zero.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AlarmTime(NaiveTime);

impl AlarmTime {
    /// Truncates any clock value to its `HH:MM` projection.
    pub fn of<T: Timelike>(value: &T) -> Self {
        Self::from_minute_of_day(value.hour() * 60 + value.minute())
    }

    fn from_minute_of_day(minutes: u32) -> Self {
        let (time, _) = NaiveTime::default().overflowing_add_signed(chrono::Duration::minutes(
            i64::from(minutes % MINUTES_PER_DAY),
        ));
        Self(time)
    }

    pub fn parse(input: &str) -> std::result::Result<Self, AlarmError> {
        let trimmed = input.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .map(Self)
            .map_err(|_| AlarmError::InvalidTime(trimmed.to_string()))
    }

    pub fn hour(self) -> u32 {
        self.0.hour()
    }

    pub fn minute(self) -> u32 {
        self.0.minute()
    }

    pub fn minute_of_day(self) -> u32 {
        self.hour() * 60 + self.minute()
    }

    /// Clock arithmetic: wraps past midnight.
    pub fn plus_minutes(self, minutes: u32) -> Self {
        Self::from_minute_of_day(self.minute_of_day() + minutes % MINUTES_PER_DAY)
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for AlarmTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Alarm {
    pub id: AlarmId,
    pub time: AlarmTime,
    pub snooze_count: u8,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum AlarmError {
    #[error("An alarm for {0} already exists")]
    DuplicateTime(AlarmTime),
    #[error("Invalid alarm time '{0}', expected HH:MM")]
    InvalidTime(String),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub settings: EngineSettings,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EngineSettings {
    pub snooze_minutes: u32,
    pub max_snoozes: u8,
    pub notice_ttl_ms: u64,
    pub tick_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            snooze_minutes: default_snooze_minutes(),
            max_snoozes: default_max_snoozes(),
            notice_ttl_ms: default_notice_ttl_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl EngineSettings {
    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ttl_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

pub fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    parse_engine_config_text(&content)
}

pub fn parse_engine_config_text(content: &str) -> Result<EngineConfig> {
    let raw = serde_json::from_str::<EngineConfigFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported config version {}; expected version 1",
            raw.version
        );
    }

    let settings = raw.settings;
    if settings.snooze_minutes == 0 || settings.snooze_minutes >= MINUTES_PER_DAY {
        bail!(
            "snooze_minutes must be between 1 and {}, got {}",
            MINUTES_PER_DAY - 1,
            settings.snooze_minutes
        );
    }
    if settings.max_snoozes == 0 {
        bail!("max_snoozes must be at least 1");
    }
    if settings.notice_ttl_ms == 0 {
        bail!("notice_ttl_ms must be > 0");
    }
    if settings.tick_interval_ms == 0 {
        bail!("tick_interval_ms must be > 0");
    }

    Ok(EngineConfig {
        settings: EngineSettings {
            snooze_minutes: settings.snooze_minutes,
            max_snoozes: settings.max_snoozes,
            notice_ttl_ms: settings.notice_ttl_ms,
            tick_interval_ms: settings.tick_interval_ms,
        },
    })
}

#[derive(Debug, Deserialize)]
struct EngineConfigFile {
    version: u32,
    #[serde(default)]
    settings: EngineSettingsFile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineSettingsFile {
    #[serde(default = "default_snooze_minutes")]
    snooze_minutes: u32,
    #[serde(default = "default_max_snoozes")]
    max_snoozes: u8,
    #[serde(default = "default_notice_ttl_ms")]
    notice_ttl_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    tick_interval_ms: u64,
}

impl Default for EngineSettingsFile {
    fn default() -> Self {
        Self {
            snooze_minutes: default_snooze_minutes(),
            max_snoozes: default_max_snoozes(),
            notice_ttl_ms: default_notice_ttl_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_snooze_minutes() -> u32 {
    5
}

fn default_max_snoozes() -> u8 {
    3
}

fn default_notice_ttl_ms() -> u64 {
    2_000
}

fn default_tick_interval_ms() -> u64 {
    1_000
}
