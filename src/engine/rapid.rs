use crate::error::ControlError;
use crate::types::RapidView;

/// Per-session rapid charge budget. Seconds are only spent while active and
/// never come back until the next session.
#[derive(Clone, Debug)]
pub struct RapidResource {
    budget_sec: u32,
    remaining_sec: u32,
    active: bool,
    ever_activated: bool,
}

impl RapidResource {
    pub fn new(budget_sec: u32) -> Self {
        Self {
            budget_sec,
            remaining_sec: budget_sec,
            active: false,
            ever_activated: false,
        }
    }

    pub fn activate(&mut self) -> Result<(), ControlError> {
        if self.remaining_sec == 0 {
            return Err(ControlError::RapidExhausted);
        }
        self.active = true;
        self.ever_activated = true;
        Ok(())
    }

    pub fn pause(&mut self) {
        self.active = false;
    }

    /// Returns true on the second the budget runs out.
    pub fn tick_1s(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.remaining_sec = self.remaining_sec.saturating_sub(1);
        if self.remaining_sec == 0 {
            self.active = false;
            return true;
        }
        false
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_sec == 0
    }

    pub fn remaining_sec(&self) -> u32 {
        self.remaining_sec
    }

    pub fn seconds_used(&self) -> u32 {
        self.budget_sec - self.remaining_sec
    }

    pub fn view(&self) -> RapidView {
        RapidView {
            active: self.active,
            remaining_sec: self.remaining_sec,
            ever_activated: self.ever_activated,
            exhausted: self.is_exhausted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_keeps_spent_seconds_spent() {
        let mut rapid = RapidResource::new(20);
        rapid.activate().expect("budget available");
        for _ in 0..7 {
            rapid.tick_1s();
        }
        rapid.pause();
        assert_eq!(rapid.remaining_sec(), 13);
        assert!(!rapid.tick_1s());
        assert_eq!(rapid.remaining_sec(), 13);

        rapid.activate().expect("budget available");
        rapid.tick_1s();
        assert_eq!(rapid.remaining_sec(), 12);
        assert_eq!(rapid.seconds_used(), 8);
        assert!(rapid.view().ever_activated);
    }

    #[test]
    fn depletion_deactivates_and_blocks_reactivation() {
        let mut rapid = RapidResource::new(2);
        rapid.activate().expect("budget available");
        assert!(!rapid.tick_1s());
        assert!(rapid.tick_1s());
        assert!(!rapid.is_active());
        assert!(rapid.is_exhausted());
        assert_eq!(rapid.activate(), Err(ControlError::RapidExhausted));
        assert!(!rapid.is_active());
    }

    #[test]
    fn fresh_resource_has_full_budget() {
        let rapid = RapidResource::new(20);
        let view = rapid.view();
        assert_eq!(view.remaining_sec, 20);
        assert!(!view.active);
        assert!(!view.ever_activated);
        assert!(!view.exhausted);
    }
}
