use crate::types::PenaltyView;

#[derive(Clone, Debug, Default)]
pub struct Penalty {
    active: bool,
    remaining_sec: u32,
}

impl Penalty {
    pub fn enter(&mut self, duration_sec: u32) {
        self.active = true;
        self.remaining_sec = duration_sec.max(1);
    }

    /// Returns true on the second the cooldown ends.
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

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn remaining_sec(&self) -> u32 {
        self.remaining_sec
    }

    pub fn view(&self) -> PenaltyView {
        PenaltyView {
            active: self.active,
            remaining_sec: self.remaining_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_lasts_its_duration() {
        let mut penalty = Penalty::default();
        penalty.enter(5);
        for _ in 0..4 {
            assert!(!penalty.tick_1s());
            assert!(penalty.is_active());
        }
        assert!(penalty.tick_1s());
        assert!(!penalty.is_active());
        assert_eq!(penalty.view().remaining_sec, 0);
    }

    #[test]
    fn zero_duration_still_blocks_one_second() {
        let mut penalty = Penalty::default();
        penalty.enter(0);
        assert!(penalty.is_active());
        assert!(penalty.tick_1s());
    }

    #[test]
    fn clear_resets_everything() {
        let mut penalty = Penalty::default();
        penalty.enter(5);
        penalty.clear();
        assert!(!penalty.is_active());
        assert_eq!(penalty.remaining_sec(), 0);
    }
}
