use std::io::{self, BufRead, Write};

use anyhow::Result;
use log::warn;

use crate::alarm::model::{Alarm, AlarmId};
use crate::alarm::scheduler::{EngineSnapshot, Intent, RingView};
use crate::runtime::{CueSink, RuntimeHandle};

pub const HELP_TEXT: &str = "\
commands:
  add HH:MM            create an alarm
  edit <id>            start editing an alarm, then `set HH:MM`
  set HH:MM            submit the time (updates while editing, adds otherwise)
  update <id> HH:MM    change an alarm's time
  delete <id>          remove an alarm
  snooze               snooze the ringing alarm
  cancel               dismiss the ringing alarm and remove it
  list                 show all alarms
  state                show clock, ring state and notice
  help                 show this text
  quit                 exit";

#[derive(Debug, Clone, Eq, PartialEq)]
enum Command {
    Intent(Intent),
    List,
    State,
    Help,
    Quit,
}

/// Terminal stand-in for the audio cue.
pub struct TerminalBell;

impl CueSink for TerminalBell {
    fn start(&mut self, alarm: &Alarm) {
        let mut stdout = io::stdout().lock();
        if writeln!(
            stdout,
            "\x07*** Alarm is ringing! The alarm for {} is ringing. (snooze | cancel)",
            alarm.time
        )
        .and_then(|_| stdout.flush())
        .is_err()
        {
            warn!("could not write ring cue to stdout");
        }
    }

    fn stop(&mut self) {
        let mut stdout = io::stdout().lock();
        if writeln!(stdout, "*** Alarm silenced.").is_err() {
            warn!("could not write cue stop to stdout");
        }
    }
}

pub fn run_console<R: BufRead, W: Write>(
    handle: &RuntimeHandle,
    input: R,
    mut out: W,
) -> Result<()> {
    writeln!(out, "snoozeclock ready. Type `help` for commands.")?;
    for line in input.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match parse_command(trimmed) {
            Ok(Command::Quit) => break,
            Ok(Command::Help) => writeln!(out, "{HELP_TEXT}")?,
            Ok(Command::List) => {
                let state = handle.query()?;
                write_alarm_list(&mut out, &state.alarms)?;
            }
            Ok(Command::State) => {
                let state = handle.query()?;
                write_state(&mut out, &state)?;
            }
            Ok(Command::Intent(intent)) => {
                let reply = handle.submit(intent)?;
                writeln!(out, "{}", reply.outcome)?;
                if let Some(notice) = reply.state.notice.as_deref() {
                    writeln!(out, "notice: {notice}")?;
                }
            }
            Err(message) => writeln!(out, "{message}")?,
        }
        out.flush()?;
    }
    Ok(())
}

pub fn write_alarm_list<W: Write>(out: &mut W, alarms: &[Alarm]) -> io::Result<()> {
    if alarms.is_empty() {
        return writeln!(out, "No alarms set");
    }
    for alarm in alarms {
        writeln!(
            out,
            "{:<5} {}  snoozed {}x",
            alarm.id.to_string(),
            alarm.time,
            alarm.snooze_count
        )?;
    }
    Ok(())
}

pub fn write_state<W: Write>(out: &mut W, state: &EngineSnapshot) -> io::Result<()> {
    let ring = match &state.ring {
        RingView::Idle => "idle".to_string(),
        RingView::Ringing { id, time } => format!("ringing {id} ({time})"),
    };
    writeln!(out, "{}  {ring}", state.clock)?;
    if let Some(id) = state.editing {
        writeln!(out, "editing {id}")?;
    }
    if let Some(notice) = state.notice.as_deref() {
        writeln!(out, "notice: {notice}")?;
    }
    Ok(())
}

fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(usage_hint(line));
    };
    let args = words.collect::<Vec<_>>();
    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("add", [time]) => Command::Intent(Intent::Add {
            time: (*time).to_string(),
        }),
        ("edit", [id]) => Command::Intent(Intent::BeginEdit {
            id: parse_id(id)?,
        }),
        ("set", []) => Command::Intent(Intent::Submit {
            time: String::new(),
        }),
        ("set", [time]) => Command::Intent(Intent::Submit {
            time: (*time).to_string(),
        }),
        ("update", [id, time]) => Command::Intent(Intent::Update {
            id: parse_id(id)?,
            time: (*time).to_string(),
        }),
        ("delete" | "rm", [id]) => Command::Intent(Intent::Delete { id: parse_id(id)? }),
        ("snooze", []) => Command::Intent(Intent::Snooze),
        ("cancel", []) => Command::Intent(Intent::Cancel),
        ("list" | "ls", []) => Command::List,
        ("state", []) => Command::State,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        _ => return Err(usage_hint(line)),
    };
    Ok(command)
}

fn parse_id(raw: &str) -> std::result::Result<AlarmId, String> {
    raw.parse::<AlarmId>()
        .map_err(|_| format!("'{raw}' is not an alarm id"))
}

fn usage_hint(line: &str) -> String {
    format!("unrecognized command '{line}'; type `help` for commands")
}
