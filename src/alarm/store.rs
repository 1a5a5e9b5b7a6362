use crate::alarm::model::{Alarm, AlarmError, AlarmId, AlarmTime};

/// Owns every alarm record, in insertion order.
#[derive(Debug)]
pub struct AlarmStore {
    alarms: Vec<Alarm>,
    next_id: u64,
}

impl Default for AlarmStore {
    fn default() -> Self {
        Self {
            alarms: Vec::new(),
            next_id: 1,
        }
    }
}

impl AlarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an alarm with a zero snooze count.
    ///
    /// While any alarm is snoozed, only a time already present in the store
    /// is accepted. Otherwise only a time not yet present is accepted.
    pub fn add(&mut self, time: AlarmTime) -> Result<Alarm, AlarmError> {
        let has_snoozed_alarm = self.alarms.iter().any(|alarm| alarm.snooze_count > 0);
        let time_already_used = self.alarms.iter().any(|alarm| alarm.time == time);
        if has_snoozed_alarm != time_already_used {
            return Err(AlarmError::DuplicateTime(time));
        }

        let alarm = Alarm {
            id: AlarmId::new(self.next_id),
            time,
            snooze_count: 0,
        };
        self.next_id += 1;
        self.alarms.push(alarm.clone());
        Ok(alarm)
    }

    pub fn update(&mut self, id: AlarmId, time: AlarmTime) -> Option<Alarm> {
        let alarm = self.get_mut(id)?;
        alarm.time = time;
        Some(alarm.clone())
    }

    pub fn delete(&mut self, id: AlarmId) -> Option<Alarm> {
        let index = self.alarms.iter().position(|alarm| alarm.id == id)?;
        Some(self.alarms.remove(index))
    }

    pub fn list(&self) -> &[Alarm] {
        &self.alarms
    }

    pub fn get(&self, id: AlarmId) -> Option<&Alarm> {
        self.alarms.iter().find(|alarm| alarm.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: AlarmId) -> Option<&mut Alarm> {
        self.alarms.iter_mut().find(|alarm| alarm.id == id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }
}
