use std::fmt;
use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;

use crate::alarm::matcher::{Match, match_alarms};
use crate::alarm::model::{Alarm, AlarmError, AlarmId, AlarmTime, EngineSettings};
use crate::alarm::notifier::TransientNotifier;
use crate::alarm::ring::{RingController, RingState, RingTransition};
use crate::alarm::store::AlarmStore;
use crate::time_provider::ClockSnapshot;

/// Commands accepted from a front end.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Intent {
    Add { time: String },
    Update { id: AlarmId, time: String },
    Delete { id: AlarmId },
    BeginEdit { id: AlarmId },
    Submit { time: String },
    Snooze,
    Cancel,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntentOutcome {
    Added {
        alarm: Alarm,
    },
    Updated {
        alarm: Alarm,
    },
    Deleted {
        id: AlarmId,
    },
    Editing {
        id: AlarmId,
        time: AlarmTime,
    },
    Snoozed {
        id: AlarmId,
        time: AlarmTime,
        snooze_count: u8,
    },
    Cancelled {
        id: AlarmId,
    },
    Rejected {
        reason: String,
    },
    Ignored,
}

impl fmt::Display for IntentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentOutcome::Added { alarm } => {
                write!(f, "added alarm {} at {}", alarm.id, alarm.time)
            }
            IntentOutcome::Updated { alarm } => {
                write!(f, "updated alarm {} to {}", alarm.id, alarm.time)
            }
            IntentOutcome::Deleted { id } => write!(f, "deleted alarm {id}"),
            IntentOutcome::Editing { id, time } => write!(f, "editing alarm {id} ({time})"),
            IntentOutcome::Snoozed {
                id,
                time,
                snooze_count,
            } => write!(
                f,
                "snoozed alarm {id} until {time} (snooze {snooze_count})"
            ),
            IntentOutcome::Cancelled { id } => write!(f, "cancelled alarm {id}"),
            IntentOutcome::Rejected { reason } => write!(f, "rejected: {reason}"),
            IntentOutcome::Ignored => write!(f, "ignored"),
        }
    }
}

/// Whether the next submitted time creates an alarm or edits one.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum EditSession {
    #[default]
    Adding,
    Editing(AlarmId),
}

#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub started: Option<Alarm>,
    pub expired: Vec<Alarm>,
    pub notice_cleared: bool,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RingView {
    Idle,
    Ringing { id: AlarmId, time: AlarmTime },
}

/// Everything a front end renders.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub clock: String,
    pub minute: AlarmTime,
    pub alarms: Vec<Alarm>,
    pub ring: RingView,
    pub should_play_cue: bool,
    pub notice: Option<String>,
    pub editing: Option<AlarmId>,
}

/// Owns the store, the ring slot and the notifier. Every tick and intent goes
/// through here, one at a time.
pub struct AlarmScheduler {
    settings: EngineSettings,
    store: AlarmStore,
    ring: RingController,
    notifier: TransientNotifier,
    edit: EditSession,
    latest: ClockSnapshot,
}

impl AlarmScheduler {
    pub fn new(settings: EngineSettings, now: ClockSnapshot) -> Self {
        Self {
            store: AlarmStore::new(),
            ring: RingController::new(settings.snooze_minutes),
            notifier: TransientNotifier::new(settings.notice_ttl()),
            edit: EditSession::Adding,
            latest: now,
            settings,
        }
    }

    pub fn tick(&mut self, now: ClockSnapshot) -> TickOutcome {
        self.latest = now;
        let mut outcome = TickOutcome {
            notice_cleared: self.expire_notice(now.instant),
            ..TickOutcome::default()
        };

        let minute = now.minute();
        debug!("tick {} (minute {minute})", now.clock_text());
        let decisions = match_alarms(minute, self.store.list(), self.settings.max_snoozes);
        for decision in decisions {
            match decision {
                Match::Expire(id) => {
                    if let Some(alarm) = self.store.delete(id) {
                        info!(
                            "alarm {} at {} expired after {} snoozes",
                            alarm.id, alarm.time, alarm.snooze_count
                        );
                        if self.edit == EditSession::Editing(id) {
                            self.edit = EditSession::Adding;
                        }
                        outcome.expired.push(alarm);
                    }
                }
                Match::Ring(id) => match self.ring.on_match(id) {
                    RingTransition::Started(id) => {
                        info!("alarm {id} ringing at {minute}");
                        outcome.started = self.store.get(id).cloned();
                    }
                    RingTransition::Suppressed(other) => {
                        debug!("alarm {other} matched while another alarm is ringing");
                    }
                    _ => {}
                },
            }
        }
        outcome
    }

    pub fn apply(&mut self, intent: Intent, now: Instant) -> IntentOutcome {
        match intent {
            Intent::Add { time } => self.add_alarm(&time, now),
            Intent::Update { id, time } => self.update_alarm(id, &time, now),
            Intent::Delete { id } => self.delete_alarm(id),
            Intent::BeginEdit { id } => self.begin_edit(id),
            Intent::Submit { time } => self.submit(&time, now),
            Intent::Snooze => self.snooze(),
            Intent::Cancel => self.cancel(),
        }
    }

    pub fn add_alarm(&mut self, input: &str, now: Instant) -> IntentOutcome {
        let time = match parse_input(input) {
            Some(Ok(time)) => time,
            Some(Err(err)) => return self.reject(err, now),
            None => return IntentOutcome::Ignored,
        };
        match self.store.add(time) {
            Ok(alarm) => {
                info!("alarm {} created for {}", alarm.id, alarm.time);
                IntentOutcome::Added { alarm }
            }
            Err(err) => self.reject(err, now),
        }
    }

    pub fn update_alarm(&mut self, id: AlarmId, input: &str, now: Instant) -> IntentOutcome {
        let time = match parse_input(input) {
            Some(Ok(time)) => time,
            Some(Err(err)) => return self.reject(err, now),
            None => return IntentOutcome::Ignored,
        };
        match self.store.update(id, time) {
            Some(alarm) => {
                info!("alarm {} moved to {}", alarm.id, alarm.time);
                IntentOutcome::Updated { alarm }
            }
            None => IntentOutcome::Ignored,
        }
    }

    pub fn delete_alarm(&mut self, id: AlarmId) -> IntentOutcome {
        let Some(alarm) = self.store.delete(id) else {
            return IntentOutcome::Ignored;
        };
        if self.ring.release(id) {
            info!("alarm {id} deleted while ringing");
        } else {
            info!("alarm {} at {} deleted", alarm.id, alarm.time);
        }
        if self.edit == EditSession::Editing(id) {
            self.edit = EditSession::Adding;
        }
        IntentOutcome::Deleted { id }
    }

    pub fn begin_edit(&mut self, id: AlarmId) -> IntentOutcome {
        match self.store.get(id) {
            Some(alarm) => {
                self.edit = EditSession::Editing(id);
                IntentOutcome::Editing { id, time: alarm.time }
            }
            None => IntentOutcome::Ignored,
        }
    }

    /// Adds or updates depending on the edit session, which ends unless the
    /// input is empty.
    pub fn submit(&mut self, input: &str, now: Instant) -> IntentOutcome {
        if input.trim().is_empty() {
            return IntentOutcome::Ignored;
        }
        match std::mem::take(&mut self.edit) {
            EditSession::Adding => self.add_alarm(input, now),
            EditSession::Editing(id) => self.update_alarm(id, input, now),
        }
    }

    pub fn snooze(&mut self) -> IntentOutcome {
        match self.ring.snooze(&mut self.store) {
            RingTransition::Snoozed {
                id,
                from,
                to,
                snooze_count,
            } => {
                info!("alarm {id} snoozed from {from} to {to} ({snooze_count} so far)");
                IntentOutcome::Snoozed {
                    id,
                    time: to,
                    snooze_count,
                }
            }
            RingTransition::Released(id) => {
                debug!("snooze released missing alarm {id}");
                IntentOutcome::Ignored
            }
            _ => IntentOutcome::Ignored,
        }
    }

    pub fn cancel(&mut self) -> IntentOutcome {
        match self.ring.cancel(&mut self.store) {
            RingTransition::Cancelled(alarm) => {
                info!("alarm {} at {} cancelled", alarm.id, alarm.time);
                if self.edit == EditSession::Editing(alarm.id) {
                    self.edit = EditSession::Adding;
                }
                IntentOutcome::Cancelled { id: alarm.id }
            }
            RingTransition::Released(id) => {
                debug!("cancel released missing alarm {id}");
                IntentOutcome::Ignored
            }
            _ => IntentOutcome::Ignored,
        }
    }

    pub fn expire_notice(&mut self, now: Instant) -> bool {
        let cleared = self.notifier.expire(now);
        if cleared {
            debug!("transient notice cleared");
        }
        cleared
    }

    pub fn notice_deadline(&self) -> Option<Instant> {
        self.notifier.deadline()
    }

    pub fn notice(&self, now: Instant) -> Option<&str> {
        self.notifier.current(now)
    }

    pub fn alarms(&self) -> &[Alarm] {
        self.store.list()
    }

    pub fn ring_state(&self) -> RingState {
        self.ring.state()
    }

    pub fn ringing_alarm(&self) -> Option<&Alarm> {
        self.ring.ringing().and_then(|id| self.store.get(id))
    }

    pub fn should_play_cue(&self) -> bool {
        self.ring.ringing().is_some()
    }

    pub fn edit_session(&self) -> EditSession {
        self.edit
    }

    pub fn snapshot(&self, now: Instant) -> EngineSnapshot {
        let ring = match self.ring_state() {
            RingState::Ringing(id) => match self.store.get(id) {
                Some(alarm) => RingView::Ringing {
                    id,
                    time: alarm.time,
                },
                None => RingView::Idle,
            },
            RingState::Idle => RingView::Idle,
        };
        EngineSnapshot {
            clock: self.latest.clock_text(),
            minute: self.latest.minute(),
            alarms: self.store.list().to_vec(),
            ring,
            should_play_cue: self.should_play_cue(),
            notice: self.notice(now).map(str::to_string),
            editing: match self.edit_session() {
                EditSession::Adding => None,
                EditSession::Editing(id) => Some(id),
            },
        }
    }

    fn reject(&mut self, err: AlarmError, now: Instant) -> IntentOutcome {
        warn!("alarm input rejected: {err}");
        let reason = err.to_string();
        self.notifier.raise(reason.clone(), now);
        IntentOutcome::Rejected { reason }
    }
}

/// Empty input is not an intent at all.
fn parse_input(input: &str) -> Option<Result<AlarmTime, AlarmError>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(AlarmTime::parse(trimmed))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    use super::*;
    use crate::time_provider::{ManualTimeProvider, TimeProvider};

    struct Harness {
        clock: ManualTimeProvider,
        scheduler: AlarmScheduler,
    }

    impl Harness {
        fn at(hour: u32, minute: u32, second: u32) -> Self {
            Self::with_settings(hour, minute, second, EngineSettings::default())
        }

        fn with_settings(hour: u32, minute: u32, second: u32, settings: EngineSettings) -> Self {
            let start = NaiveDateTime::new(
                NaiveDate::from_ymd_opt(2026, 2, 7).expect("date"),
                NaiveTime::from_hms_opt(hour, minute, second).expect("time"),
            );
            let clock = ManualTimeProvider::new(start).expect("clock");
            let scheduler = AlarmScheduler::new(settings, clock.now().expect("now"));
            Self { clock, scheduler }
        }

        fn now(&self) -> Instant {
            self.clock.now().expect("now").instant
        }

        fn add(&mut self, time: &str) -> IntentOutcome {
            let now = self.now();
            self.scheduler.add_alarm(time, now)
        }

        fn added_id(&mut self, time: &str) -> AlarmId {
            match self.add(time) {
                IntentOutcome::Added { alarm } => alarm.id,
                other => panic!("expected add, got {other:?}"),
            }
        }

        fn tick(&mut self, seconds: u64) -> Vec<TickOutcome> {
            (0..seconds)
                .map(|_| {
                    let snapshot = self.clock.advance(Duration::from_secs(1)).expect("advance");
                    self.scheduler.tick(snapshot)
                })
                .collect()
        }

        fn alarm(&self, id: AlarmId) -> Option<&Alarm> {
            self.scheduler.alarms().iter().find(|alarm| alarm.id == id)
        }
    }

    #[test]
    fn alarm_rings_when_its_minute_arrives() {
        let mut h = Harness::at(6, 59, 58);
        let id = h.added_id("07:00");

        let outcomes = h.tick(1);
        assert!(outcomes[0].started.is_none());
        assert!(!h.scheduler.should_play_cue());

        let outcomes = h.tick(1);
        assert_eq!(outcomes[0].started.as_ref().map(|a| a.id), Some(id));
        assert_eq!(h.scheduler.ring_state(), RingState::Ringing(id));
        assert!(h.scheduler.should_play_cue());
    }

    #[test]
    fn repeated_ticks_in_the_window_start_ringing_once() {
        let mut h = Harness::at(6, 59, 59);
        let id = h.added_id("07:00");

        let starts = h
            .tick(60)
            .into_iter()
            .filter(|outcome| outcome.started.is_some())
            .count();
        assert_eq!(starts, 1);
        assert_eq!(h.scheduler.ring_state(), RingState::Ringing(id));
    }

    #[test]
    fn snooze_moves_alarm_five_minutes_and_goes_idle() {
        let mut h = Harness::at(23, 57, 59);
        let id = h.added_id("23:58");
        h.tick(1);

        assert_eq!(
            h.scheduler.snooze(),
            IntentOutcome::Snoozed {
                id,
                time: AlarmTime::parse("00:03").expect("time"),
                snooze_count: 1,
            }
        );
        assert_eq!(h.scheduler.ring_state(), RingState::Idle);

        let rest_of_minute = h.tick(59);
        assert!(rest_of_minute.iter().all(|outcome| outcome.started.is_none()));
    }

    #[test]
    fn exhausted_alarm_is_removed_without_ringing() {
        let mut h = Harness::at(6, 59, 59);
        let id = h.added_id("07:00");

        for round in 1..=3 {
            let started = h
                .tick(5 * 60)
                .into_iter()
                .filter_map(|outcome| outcome.started)
                .count();
            assert_eq!(started, 1, "round {round}");
            h.scheduler.snooze();
            let alarm = h.alarm(id).expect("still stored");
            assert_eq!(alarm.snooze_count, round);
            assert!(alarm.snooze_count <= 3);
        }

        let outcomes = h.tick(5 * 60);
        assert!(outcomes.iter().all(|outcome| outcome.started.is_none()));
        let expired = outcomes
            .iter()
            .flat_map(|outcome| outcome.expired.iter())
            .map(|alarm| alarm.id)
            .collect::<Vec<_>>();
        assert_eq!(expired, [id]);
        assert!(h.scheduler.alarms().is_empty());
        assert_eq!(h.scheduler.ring_state(), RingState::Idle);
    }

    #[test]
    fn cancel_removes_alarm_and_later_ticks_do_nothing() {
        let mut h = Harness::at(6, 59, 59);
        let id = h.added_id("07:00");
        h.tick(1);

        assert_eq!(h.scheduler.cancel(), IntentOutcome::Cancelled { id });
        assert_eq!(h.scheduler.ring_state(), RingState::Idle);
        assert!(h.scheduler.alarms().is_empty());

        let outcomes = h.tick(30);
        assert!(outcomes.iter().all(|outcome| outcome.started.is_none()));
        assert!(!h.scheduler.should_play_cue());
    }

    #[test]
    fn snooze_and_cancel_while_idle_are_ignored() {
        let mut h = Harness::at(6, 0, 0);
        let id = h.added_id("07:00");
        assert_eq!(h.scheduler.snooze(), IntentOutcome::Ignored);
        assert_eq!(h.scheduler.cancel(), IntentOutcome::Ignored);
        assert_eq!(h.alarm(id).map(|a| a.snooze_count), Some(0));
    }

    #[test]
    fn first_alarm_in_store_order_wins_the_tick() {
        let mut h = Harness::at(6, 59, 59);
        let first = h.added_id("07:00");
        h.tick(1);
        h.scheduler.snooze();

        // The snoozed alarm makes re-adding its time legal.
        let second = h.added_id("07:05");
        let outcomes = h.tick(5 * 60);
        let started = outcomes
            .iter()
            .filter_map(|outcome| outcome.started.as_ref().map(|a| a.id))
            .collect::<Vec<_>>();
        assert_eq!(started, [first]);
        assert_eq!(h.scheduler.ring_state(), RingState::Ringing(first));

        // Once the first is resolved the other one surfaces in the same minute.
        h.scheduler.cancel();
        let outcomes = h.tick(1);
        assert_eq!(outcomes[0].started.as_ref().map(|a| a.id), Some(second));
    }

    #[test]
    fn duplicate_add_raises_notice_that_clears() {
        let mut h = Harness::at(6, 0, 0);
        h.added_id("07:00");
        let outcome = h.add("07:00");
        assert_eq!(
            outcome,
            IntentOutcome::Rejected {
                reason: "An alarm for 07:00 already exists".to_string(),
            }
        );
        assert_eq!(h.scheduler.alarms().len(), 1);
        assert_eq!(
            h.scheduler.notice(h.now()),
            Some("An alarm for 07:00 already exists")
        );

        let outcomes = h.tick(2);
        assert!(!outcomes[0].notice_cleared);
        assert!(outcomes[1].notice_cleared);
        assert_eq!(h.scheduler.notice(h.now()), None);
    }

    #[test]
    fn newer_notice_restarts_the_clear_window() {
        let mut h = Harness::at(6, 0, 0);
        h.add("bogus");
        h.tick(1);
        h.added_id("07:00");
        h.add("07:00");

        let outcomes = h.tick(2);
        assert!(!outcomes[0].notice_cleared);
        assert!(outcomes[1].notice_cleared);
    }

    #[test]
    fn add_with_snoozed_alarm_present_follows_inverted_rule() {
        let mut h = Harness::at(6, 59, 59);
        h.added_id("07:00");
        h.tick(1);
        h.scheduler.snooze();

        assert!(matches!(h.add("07:05"), IntentOutcome::Added { .. }));
        assert!(matches!(h.add("08:00"), IntentOutcome::Rejected { .. }));
        assert_eq!(h.scheduler.alarms().len(), 2);
    }

    #[test]
    fn empty_input_is_ignored_without_notice() {
        let mut h = Harness::at(6, 0, 0);
        assert_eq!(h.add("   "), IntentOutcome::Ignored);
        assert!(h.scheduler.notice_deadline().is_none());
        assert!(h.scheduler.alarms().is_empty());
    }

    #[test]
    fn invalid_time_is_rejected_with_notice() {
        let mut h = Harness::at(6, 0, 0);
        let outcome = h.add("25:00");
        assert!(matches!(outcome, IntentOutcome::Rejected { .. }));
        assert_eq!(
            h.scheduler.notice(h.now()),
            Some("Invalid alarm time '25:00', expected HH:MM")
        );
    }

    #[test]
    fn empty_submit_keeps_edit_session() {
        let mut h = Harness::at(6, 0, 0);
        let id = h.added_id("07:00");
        let now = h.now();
        h.scheduler.begin_edit(id);

        assert_eq!(h.scheduler.submit("  ", now), IntentOutcome::Ignored);
        assert_eq!(h.scheduler.edit_session(), EditSession::Editing(id));
        assert_eq!(h.scheduler.notice(now), None);

        match h.scheduler.submit("09:00", now) {
            IntentOutcome::Updated { alarm } => {
                assert_eq!(alarm.id, id);
                assert_eq!(alarm.time.to_string(), "09:00");
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(h.scheduler.alarms().len(), 1);
        assert_eq!(h.scheduler.edit_session(), EditSession::Adding);
    }

    #[test]
    fn edit_keeps_id_and_snooze_count() {
        let mut h = Harness::at(6, 59, 59);
        let id = h.added_id("07:00");
        h.tick(1);
        h.scheduler.snooze();

        let now = h.now();
        assert_eq!(
            h.scheduler.begin_edit(id),
            IntentOutcome::Editing {
                id,
                time: AlarmTime::parse("07:05").expect("time"),
            }
        );
        assert_eq!(h.scheduler.edit_session(), EditSession::Editing(id));

        match h.scheduler.submit("09:30", now) {
            IntentOutcome::Updated { alarm } => {
                assert_eq!(alarm.id, id);
                assert_eq!(alarm.time.to_string(), "09:30");
                assert_eq!(alarm.snooze_count, 1);
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(h.scheduler.edit_session(), EditSession::Adding);

        assert!(matches!(
            h.scheduler.submit("10:00", now),
            IntentOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn begin_edit_on_unknown_id_is_ignored() {
        let mut h = Harness::at(6, 0, 0);
        assert_eq!(
            h.scheduler.begin_edit(AlarmId::new(42)),
            IntentOutcome::Ignored
        );
        assert_eq!(h.scheduler.edit_session(), EditSession::Adding);
    }

    #[test]
    fn deleting_ringing_alarm_stops_the_cue() {
        let mut h = Harness::at(6, 59, 59);
        let id = h.added_id("07:00");
        h.tick(1);
        assert!(h.scheduler.should_play_cue());

        assert_eq!(h.scheduler.delete_alarm(id), IntentOutcome::Deleted { id });
        assert!(!h.scheduler.should_play_cue());
        assert_eq!(h.scheduler.delete_alarm(id), IntentOutcome::Ignored);
    }

    #[test]
    fn editing_ringing_alarm_keeps_it_ringing() {
        let mut h = Harness::at(6, 59, 59);
        let id = h.added_id("07:00");
        h.tick(1);
        let now = h.now();
        h.scheduler.update_alarm(id, "08:00", now);
        assert_eq!(h.scheduler.ring_state(), RingState::Ringing(id));
        assert_eq!(h.tick(1)[0].started, None);
    }

    #[test]
    fn snapshot_reports_query_surface() {
        let mut h = Harness::at(6, 59, 59);
        let id = h.added_id("07:00");
        h.tick(1);

        let snapshot = h.scheduler.snapshot(h.now());
        assert_eq!(snapshot.clock, "07:00:00");
        assert_eq!(snapshot.minute.to_string(), "07:00");
        assert_eq!(snapshot.alarms.len(), 1);
        assert!(snapshot.should_play_cue);
        assert_eq!(
            snapshot.ring,
            RingView::Ringing {
                id,
                time: AlarmTime::parse("07:00").expect("time"),
            }
        );

        let json = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(json["ring"]["state"], "ringing");
        assert_eq!(json["alarms"][0]["time"], "07:00");
        assert!(json["notice"].is_null());
    }

    #[test]
    fn custom_settings_change_step_and_bound() {
        let settings = EngineSettings {
            snooze_minutes: 10,
            max_snoozes: 1,
            ..EngineSettings::default()
        };
        let mut h = Harness::with_settings(6, 59, 59, settings);
        let id = h.added_id("07:00");
        h.tick(1);
        assert!(matches!(
            h.scheduler.snooze(),
            IntentOutcome::Snoozed { snooze_count: 1, .. }
        ));
        assert_eq!(h.alarm(id).map(|a| a.time.to_string()), Some("07:10".into()));

        let outcomes = h.tick(10 * 60);
        assert!(outcomes.iter().all(|outcome| outcome.started.is_none()));
        assert!(h.scheduler.alarms().is_empty());
    }
}
