use crate::types::BonusView;

#[derive(Clone, Debug, Default)]
pub struct BonusWindow {
    active: bool,
    remaining_sec: u32,
    output_kw: f64,
}

impl BonusWindow {
    /// Opens a window of `duration_sec`. A zero duration leaves it closed.
    pub fn activate(&mut self, output_kw: f64, duration_sec: u32) {
        if duration_sec == 0 {
            self.clear();
            return;
        }
        self.active = true;
        self.remaining_sec = duration_sec;
        self.output_kw = output_kw.max(0.0);
    }

    /// Returns true on the second the window closes.
    pub fn tick_1s(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.remaining_sec = self.remaining_sec.saturating_sub(1);
        if self.remaining_sec == 0 {
            self.clear();
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.active = false;
        self.remaining_sec = 0;
        self.output_kw = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn remaining_sec(&self) -> u32 {
        self.remaining_sec
    }

    pub fn output_kw(&self) -> f64 {
        self.output_kw
    }

    pub fn view(&self) -> BonusView {
        BonusView {
            active: self.active,
            remaining_sec: self.remaining_sec,
            output_kw: self.output_kw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_counts_down_and_zeroes_output() {
        let mut bonus = BonusWindow::default();
        bonus.activate(250.0, 3);
        assert!(bonus.is_active());
        assert!(!bonus.tick_1s());
        assert!(!bonus.tick_1s());
        assert_eq!(bonus.remaining_sec(), 1);
        assert!(bonus.tick_1s());
        assert!(!bonus.is_active());
        assert_eq!(bonus.output_kw(), 0.0);
        assert!(!bonus.tick_1s());
    }

    #[test]
    fn zero_duration_never_opens() {
        let mut bonus = BonusWindow::default();
        bonus.activate(100.0, 0);
        assert!(!bonus.is_active());
        assert_eq!(bonus.view().output_kw, 0.0);
    }
}
