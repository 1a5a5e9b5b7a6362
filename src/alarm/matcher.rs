use crate::alarm::model::{Alarm, AlarmId, AlarmTime};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Match {
    Ring(AlarmId),
    Expire(AlarmId),
}

/// Decides, in store order, what happens to every alarm whose time equals
/// `minute`. Alarms that have used up their snoozes expire instead of ringing.
pub fn match_alarms(minute: AlarmTime, alarms: &[Alarm], max_snoozes: u8) -> Vec<Match> {
    alarms
        .iter()
        .filter(|alarm| alarm.time == minute)
        .map(|alarm| {
            if alarm.snooze_count < max_snoozes {
                Match::Ring(alarm.id)
            } else {
                Match::Expire(alarm.id)
            }
        })
        .collect()
}
