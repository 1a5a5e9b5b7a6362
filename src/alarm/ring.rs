use crate::alarm::model::{Alarm, AlarmId, AlarmTime};
use crate::alarm::store::AlarmStore;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum RingState {
    #[default]
    Idle,
    Ringing(AlarmId),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RingTransition {
    Started(AlarmId),
    /// The ringing alarm matched again inside its minute.
    Unchanged,
    /// Another alarm matched while the slot was taken.
    Suppressed(AlarmId),
    Snoozed {
        id: AlarmId,
        from: AlarmTime,
        to: AlarmTime,
        snooze_count: u8,
    },
    Cancelled(Alarm),
    /// The ringing alarm vanished from the store before it was resolved.
    Released(AlarmId),
    /// Snooze or cancel while idle.
    Ignored,
}

/// Single-slot ringing state. Holds only the id of the ringing alarm; the
/// record itself is looked up in the store on every resolution.
#[derive(Debug)]
pub struct RingController {
    state: RingState,
    snooze_minutes: u32,
}

impl RingController {
    pub fn new(snooze_minutes: u32) -> Self {
        Self {
            state: RingState::Idle,
            snooze_minutes,
        }
    }

    pub fn state(&self) -> RingState {
        self.state
    }

    pub fn ringing(&self) -> Option<AlarmId> {
        match self.state {
            RingState::Idle => None,
            RingState::Ringing(id) => Some(id),
        }
    }

    pub fn on_match(&mut self, id: AlarmId) -> RingTransition {
        match self.state {
            RingState::Idle => {
                self.state = RingState::Ringing(id);
                RingTransition::Started(id)
            }
            RingState::Ringing(current) if current == id => RingTransition::Unchanged,
            RingState::Ringing(_) => RingTransition::Suppressed(id),
        }
    }

    pub fn snooze(&mut self, store: &mut AlarmStore) -> RingTransition {
        let RingState::Ringing(id) = self.state else {
            return RingTransition::Ignored;
        };
        self.state = RingState::Idle;

        let Some(alarm) = store.get_mut(id) else {
            return RingTransition::Released(id);
        };
        let from = alarm.time;
        alarm.snooze_count = alarm.snooze_count.saturating_add(1);
        alarm.time = from.plus_minutes(self.snooze_minutes);
        RingTransition::Snoozed {
            id,
            from,
            to: alarm.time,
            snooze_count: alarm.snooze_count,
        }
    }

    pub fn cancel(&mut self, store: &mut AlarmStore) -> RingTransition {
        let RingState::Ringing(id) = self.state else {
            return RingTransition::Ignored;
        };
        self.state = RingState::Idle;

        match store.delete(id) {
            Some(alarm) => RingTransition::Cancelled(alarm),
            None => RingTransition::Released(id),
        }
    }

    /// Drops the ringing reference if it points at `id`.
    pub fn release(&mut self, id: AlarmId) -> bool {
        if self.state == RingState::Ringing(id) {
            self.state = RingState::Idle;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(text: &str) -> AlarmTime {
        AlarmTime::parse(text).expect("valid time")
    }

    fn store_with(times: &[&str]) -> (AlarmStore, Vec<AlarmId>) {
        let mut store = AlarmStore::new();
        let ids = times
            .iter()
            .map(|time| store.add(t(time)).expect("add").id)
            .collect();
        (store, ids)
    }

    #[test]
    fn starts_idle_and_rings_on_first_match() {
        let (_, ids) = store_with(&["07:00"]);
        let mut ring = RingController::new(5);
        assert_eq!(ring.state(), RingState::Idle);
        assert_eq!(ring.on_match(ids[0]), RingTransition::Started(ids[0]));
        assert_eq!(ring.state(), RingState::Ringing(ids[0]));
    }

    #[test]
    fn repeated_match_is_idempotent() {
        let (_, ids) = store_with(&["07:00"]);
        let mut ring = RingController::new(5);
        ring.on_match(ids[0]);
        for _ in 0..59 {
            assert_eq!(ring.on_match(ids[0]), RingTransition::Unchanged);
        }
        assert_eq!(ring.state(), RingState::Ringing(ids[0]));
    }

    #[test]
    fn second_alarm_cannot_take_the_slot() {
        let (_, ids) = store_with(&["07:00", "08:00"]);
        let mut ring = RingController::new(5);
        ring.on_match(ids[0]);
        assert_eq!(ring.on_match(ids[1]), RingTransition::Suppressed(ids[1]));
        assert_eq!(ring.ringing(), Some(ids[0]));
    }

    #[test]
    fn snooze_bumps_count_and_time() {
        let (mut store, ids) = store_with(&["23:58"]);
        let mut ring = RingController::new(5);
        ring.on_match(ids[0]);

        let transition = ring.snooze(&mut store);
        assert_eq!(
            transition,
            RingTransition::Snoozed {
                id: ids[0],
                from: t("23:58"),
                to: t("00:03"),
                snooze_count: 1,
            }
        );
        assert_eq!(ring.state(), RingState::Idle);
        let alarm = store.get(ids[0]).expect("still stored");
        assert_eq!(alarm.time, t("00:03"));
        assert_eq!(alarm.snooze_count, 1);
    }

    #[test]
    fn cancel_removes_alarm() {
        let (mut store, ids) = store_with(&["07:00"]);
        let mut ring = RingController::new(5);
        ring.on_match(ids[0]);

        match ring.cancel(&mut store) {
            RingTransition::Cancelled(alarm) => assert_eq!(alarm.id, ids[0]),
            other => panic!("unexpected transition {other:?}"),
        }
        assert!(store.is_empty());
        assert_eq!(ring.state(), RingState::Idle);
    }

    #[test]
    fn resolutions_while_idle_are_ignored() {
        let (mut store, _) = store_with(&["07:00"]);
        let mut ring = RingController::new(5);
        assert_eq!(ring.snooze(&mut store), RingTransition::Ignored);
        assert_eq!(ring.cancel(&mut store), RingTransition::Ignored);
        assert_eq!(store.list()[0].snooze_count, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn vanished_alarm_only_releases_the_slot() {
        let (mut store, ids) = store_with(&["07:00"]);
        let mut ring = RingController::new(5);
        ring.on_match(ids[0]);
        store.delete(ids[0]);
        assert_eq!(ring.snooze(&mut store), RingTransition::Released(ids[0]));
        assert_eq!(ring.state(), RingState::Idle);
    }

    #[test]
    fn release_matches_only_the_ringing_id() {
        let (_, ids) = store_with(&["07:00", "08:00"]);
        let mut ring = RingController::new(5);
        ring.on_match(ids[0]);
        assert!(!ring.release(ids[1]));
        assert!(ring.release(ids[0]));
        assert_eq!(ring.state(), RingState::Idle);
    }
}
