use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::alarm::model::{Alarm, AlarmId, EngineSettings};
use crate::alarm::scheduler::{AlarmScheduler, Intent};
use crate::console::write_alarm_list;
use crate::runtime::{CueSink, CueWatch};
use crate::time_provider::{ManualTimeProvider, TimeProvider};

/// A scenario replayed against a simulated clock.
#[derive(Debug, Clone)]
pub struct Script {
    pub start: NaiveDateTime,
    pub steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum ScriptStep {
    Add { time: String },
    Update { id: u64, time: String },
    Delete { id: u64 },
    Edit { id: u64 },
    Submit { time: String },
    Snooze,
    Cancel,
    Advance { seconds: u64 },
    State,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ScriptSummary {
    pub rings: usize,
    pub expired: usize,
    pub remaining: usize,
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    version: u32,
    start: String,
    steps: Vec<ScriptStep>,
}

pub fn load_script(path: &Path) -> Result<Script> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read script file {}", path.display()))?;
    parse_script_text(&content)
}

pub fn parse_script_text(content: &str) -> Result<Script> {
    let raw = serde_json::from_str::<ScriptFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;
    if raw.version != 1 {
        bail!(
            "unsupported script version {}; expected version 1",
            raw.version
        );
    }
    let start = NaiveDateTime::parse_from_str(&raw.start, "%Y-%m-%dT%H:%M:%S")
        .with_context(|| {
            format!(
                "invalid start '{}', expected local datetime YYYY-MM-DDTHH:MM:SS",
                raw.start
            )
        })?;
    Ok(Script {
        start,
        steps: raw.steps,
    })
}

/// Collects cue edges so they can be printed with the simulated time.
#[derive(Default)]
struct RecordingCue {
    pending: Vec<String>,
}

impl CueSink for RecordingCue {
    fn start(&mut self, alarm: &Alarm) {
        self.pending
            .push(format!("cue started: the alarm for {} is ringing", alarm.time));
    }

    fn stop(&mut self) {
        self.pending.push("cue stopped".to_string());
    }
}

pub fn run_script<W: Write>(
    script: &Script,
    settings: &EngineSettings,
    out: &mut W,
) -> Result<ScriptSummary> {
    let clock = ManualTimeProvider::new(script.start)?;
    let mut scheduler = AlarmScheduler::new(settings.clone(), clock.now()?);
    let mut cue = RecordingCue::default();
    let mut watch = CueWatch::default();
    let mut summary = ScriptSummary::default();
    let period = settings.tick_interval();

    for step in &script.steps {
        match step {
            ScriptStep::Advance { seconds } => {
                let total = Duration::from_secs(*seconds);
                let mut elapsed = Duration::ZERO;
                while elapsed < total {
                    let step = period.min(total - elapsed);
                    elapsed += step;
                    let snapshot = clock.advance(step)?;
                    let outcome = scheduler.tick(snapshot);
                    let stamp = snapshot.clock_text();
                    if outcome.notice_cleared {
                        writeln!(out, "[{stamp}] notice cleared")?;
                    }
                    for alarm in &outcome.expired {
                        summary.expired += 1;
                        writeln!(
                            out,
                            "[{stamp}] expired alarm {} at {} after {} snoozes",
                            alarm.id, alarm.time, alarm.snooze_count
                        )?;
                    }
                    if let Some(alarm) = &outcome.started {
                        summary.rings += 1;
                        writeln!(out, "[{stamp}] ringing alarm {} at {}", alarm.id, alarm.time)?;
                    }
                    watch.sync(&scheduler, &mut cue);
                    flush_cue(&mut cue, &stamp, out)?;
                }
            }
            ScriptStep::State => {
                let now = clock.now()?;
                let state = scheduler.snapshot(now.instant);
                writeln!(out, "{}", serde_json::to_string(&state)?)?;
            }
            intent_step => {
                let Some(intent) = to_intent(intent_step) else {
                    continue;
                };
                let now = clock.now()?;
                let stamp = now.clock_text();
                let outcome = scheduler.apply(intent, now.instant);
                writeln!(out, "[{stamp}] {outcome}")?;
                if let Some(notice) = scheduler.notice(now.instant) {
                    writeln!(out, "[{stamp}] notice: {notice}")?;
                }
                watch.sync(&scheduler, &mut cue);
                flush_cue(&mut cue, &stamp, out)?;
            }
        }
    }

    summary.remaining = scheduler.alarms().len();
    writeln!(
        out,
        "summary: {} rang, {} expired, {} remaining",
        summary.rings, summary.expired, summary.remaining
    )?;
    write_alarm_list(out, scheduler.alarms())?;
    Ok(summary)
}

fn to_intent(step: &ScriptStep) -> Option<Intent> {
    let intent = match step {
        ScriptStep::Add { time } => Intent::Add { time: time.clone() },
        ScriptStep::Update { id, time } => Intent::Update {
            id: AlarmId::new(*id),
            time: time.clone(),
        },
        ScriptStep::Delete { id } => Intent::Delete {
            id: AlarmId::new(*id),
        },
        ScriptStep::Edit { id } => Intent::BeginEdit {
            id: AlarmId::new(*id),
        },
        ScriptStep::Submit { time } => Intent::Submit { time: time.clone() },
        ScriptStep::Snooze => Intent::Snooze,
        ScriptStep::Cancel => Intent::Cancel,
        ScriptStep::Advance { .. } | ScriptStep::State => return None,
    };
    Some(intent)
}

fn flush_cue<W: Write>(cue: &mut RecordingCue, stamp: &str, out: &mut W) -> Result<()> {
    for line in cue.pending.drain(..) {
        writeln!(out, "[{stamp}] {line}")?;
    }
    Ok(())
}
