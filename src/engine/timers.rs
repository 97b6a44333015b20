use crate::constants::{TICK_MS, WALL_CLOCK_MS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    SimTick,
    WallClock,
    Penalty,
    Bonus,
    Rapid,
}

impl TimerKind {
    pub const ALL: [TimerKind; 5] = [
        TimerKind::SimTick,
        TimerKind::WallClock,
        TimerKind::Penalty,
        TimerKind::Bonus,
        TimerKind::Rapid,
    ];

    fn period_ms(self) -> u64 {
        match self {
            TimerKind::SimTick => TICK_MS,
            _ => WALL_CLOCK_MS,
        }
    }

    fn slot(self) -> usize {
        match self {
            TimerKind::SimTick => 0,
            TimerKind::WallClock => 1,
            TimerKind::Penalty => 2,
            TimerKind::Bonus => 3,
            TimerKind::Rapid => 4,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct TimerHandle {
    period_ms: u64,
    accumulated_ms: u64,
    armed: bool,
}

impl TimerHandle {
    fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            accumulated_ms: 0,
            armed: false,
        }
    }
}

/// Interval timers owned by a session. A timer fires every `period` of
/// simulated time counted from the moment it was armed.
#[derive(Clone, Debug)]
pub struct TimerSet {
    handles: [TimerHandle; 5],
}

impl Default for TimerSet {
    fn default() -> Self {
        Self {
            handles: TimerKind::ALL.map(|kind| TimerHandle::new(kind.period_ms())),
        }
    }
}

impl TimerSet {
    /// Starts `kind` counting from zero. Already-armed timers keep their phase.
    pub fn arm(&mut self, kind: TimerKind) {
        let handle = &mut self.handles[kind.slot()];
        if handle.armed {
            return;
        }
        handle.armed = true;
        handle.accumulated_ms = 0;
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        let handle = &mut self.handles[kind.slot()];
        handle.armed = false;
        handle.accumulated_ms = 0;
    }

    pub fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.cancel(kind);
        }
    }

    /// Disarms `kind` but keeps the time counted toward its next firing.
    pub fn pause(&mut self, kind: TimerKind) {
        self.handles[kind.slot()].armed = false;
    }

    /// Re-arms a paused timer from where it stopped.
    pub fn resume(&mut self, kind: TimerKind) {
        self.handles[kind.slot()].armed = true;
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.handles[kind.slot()].armed
    }

    #[cfg(test)]
    pub fn any_armed(&self) -> bool {
        self.handles.iter().any(|handle| handle.armed)
    }

    /// Moves every armed timer forward and lists the ones that came due, one
    /// entry per period elapsed.
    pub fn advance(&mut self, dt_ms: u64) -> Vec<TimerKind> {
        let mut fired = Vec::new();
        for kind in TimerKind::ALL {
            let handle = &mut self.handles[kind.slot()];
            if !handle.armed {
                continue;
            }
            handle.accumulated_ms = handle.accumulated_ms.saturating_add(dt_ms);
            while handle.accumulated_ms >= handle.period_ms {
                handle.accumulated_ms -= handle.period_ms;
                fired.push(kind);
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_timers_never_fire() {
        let mut timers = TimerSet::default();
        assert!(timers.advance(5_000).is_empty());
        assert!(!timers.any_armed());
    }

    #[test]
    fn wall_clock_fires_once_per_second() {
        let mut timers = TimerSet::default();
        timers.arm(TimerKind::WallClock);
        let mut fires = 0;
        for _ in 0..25 {
            fires += timers
                .advance(TICK_MS)
                .iter()
                .filter(|kind| **kind == TimerKind::WallClock)
                .count();
        }
        assert_eq!(fires, 2);
    }

    #[test]
    fn sim_tick_fires_every_step() {
        let mut timers = TimerSet::default();
        timers.arm(TimerKind::SimTick);
        assert_eq!(timers.advance(TICK_MS), vec![TimerKind::SimTick]);
        assert_eq!(timers.advance(TICK_MS * 3).len(), 3);
    }

    #[test]
    fn rearming_keeps_phase_but_cancel_resets_it() {
        let mut timers = TimerSet::default();
        timers.arm(TimerKind::Bonus);
        timers.advance(900);
        timers.arm(TimerKind::Bonus);
        assert_eq!(timers.advance(100), vec![TimerKind::Bonus]);

        timers.advance(900);
        timers.cancel(TimerKind::Bonus);
        timers.arm(TimerKind::Bonus);
        assert!(timers.advance(100).is_empty());
    }

    #[test]
    fn paused_timer_resumes_with_its_phase() {
        let mut timers = TimerSet::default();
        timers.arm(TimerKind::Rapid);
        timers.advance(900);
        timers.pause(TimerKind::Rapid);
        assert!(timers.advance(5_000).is_empty());
        timers.resume(TimerKind::Rapid);
        assert_eq!(timers.advance(100), vec![TimerKind::Rapid]);
    }

    #[test]
    fn cancel_all_disarms_everything() {
        let mut timers = TimerSet::default();
        for kind in TimerKind::ALL {
            timers.arm(kind);
        }
        timers.cancel_all();
        assert!(!timers.any_armed());
        assert!(timers.advance(10_000).is_empty());
    }
}
