use super::mode::{intended_output_kw, resolve_mode};
use super::timers::TimerKind;
use super::GameSession;
use crate::constants::energy_per_tick_kwh;
use crate::types::{AudioCue, ChargingMode, RuntimeEvent};

impl GameSession {
    /// One simulation step of the charger. Runs only while charging is
    /// allowed and a vehicle is docked.
    pub(super) fn charging_tick(&mut self) {
        if !self.phase.can_charge() || self.ev.is_none() {
            self.effective_output_kw = 0.0;
            return;
        }
        let inputs = self.mode_inputs();
        let mode = resolve_mode(&inputs);
        if mode == ChargingMode::Idle {
            self.effective_output_kw = 0.0;
            return;
        }

        let intended_kw = intended_output_kw(mode, &inputs);
        if self.current_demand_kw + intended_kw > self.config.contract_power_kw {
            self.enter_penalty(intended_kw);
            return;
        }

        let Some(ev) = self.ev.as_mut() else {
            return;
        };
        let actual_kw = intended_kw.min(ev.max_input_kw).max(0.0);
        let energy_kwh = energy_per_tick_kwh(actual_kw, self.config.tick_ms);
        ev.current_charge_kwh = (ev.current_charge_kwh + energy_kwh).min(ev.capacity_kwh);
        let full = ev.is_full();
        self.score += energy_kwh;
        self.effective_output_kw = actual_kw;

        self.message = if energy_kwh > 0.0 {
            match mode {
                ChargingMode::Rapid => format!("RAPID CHARGING at {actual_kw:.1} kW!"),
                ChargingMode::Bonus => format!("BONUS CHARGING at {actual_kw:.1} kW!"),
                _ => format!("Charging at {actual_kw:.1} kW..."),
            }
        } else if intended_kw > 0.0 {
            "EV at max input or no power from charger. Check demand!".to_string()
        } else {
            "Charger active but no power output. Check demand!".to_string()
        };

        if full {
            self.complete_ev(mode);
        }
    }

    fn complete_ev(&mut self, mode: ChargingMode) {
        let Some(done) = self.ev.take() else {
            return;
        };
        let during_rapid = mode == ChargingMode::Rapid;
        let rapid_continues = during_rapid && !self.rapid.is_exhausted();

        self.normal_charging = false;
        if !rapid_continues && self.rapid.is_active() {
            self.rapid.pause();
            self.timers.pause(TimerKind::Rapid);
        }

        let counted = !self.bonus.is_active() && !during_rapid;
        if counted {
            self.consecutive_charges += 1;
        }
        self.stats.evs_completed += 1;
        self.events.push(RuntimeEvent::EvCompleted {
            ev_id: done.id.clone(),
            name: done.name.clone(),
            capacity_kwh: done.capacity_kwh,
            counted,
        });

        if counted && self.consecutive_charges >= self.config.charges_for_bonus {
            self.start_bonus();
        } else {
            self.message = format!(
                "{} fully charged! (+{:.0} kWh) Next EV arriving.",
                done.name, done.capacity_kwh
            );
        }

        self.spawn_ev();
        self.settle_phase();
    }

    fn start_bonus(&mut self) {
        let output_kw = self.rng.uniform(self.config.bonus_output_range);
        self.bonus.activate(output_kw, self.config.bonus_duration_sec);
        self.timers.cancel(TimerKind::Bonus);
        if self.bonus.is_active() {
            self.timers.arm(TimerKind::Bonus);
        }
        self.consecutive_charges = 0;
        self.time_left_sec = self
            .time_left_sec
            .saturating_add(self.config.bonus_duration_sec);
        self.stats.bonus_windows += 1;
        self.message = "BONUS TIME! Enhanced charging active!".to_string();
        self.cues.push(AudioCue::BonusStart);
        self.events.push(RuntimeEvent::BonusStarted {
            output_kw: self.bonus.output_kw(),
            remaining_sec: self.bonus.remaining_sec(),
        });
    }

    /// Demand plus charger output went over the contract limit.
    fn enter_penalty(&mut self, intended_kw: f64) {
        self.penalty.enter(self.config.penalty_duration_sec);
        self.timers.cancel(TimerKind::Penalty);
        self.timers.arm(TimerKind::Penalty);

        self.normal_charging = false;
        if self.rapid.is_active() {
            self.rapid.pause();
            self.timers.pause(TimerKind::Rapid);
        }
        self.consecutive_charges = 0;
        self.effective_output_kw = 0.0;
        self.stats.penalties += 1;

        self.message = format!(
            "DEMAND EXCEEDED! Facility overload. Charging disabled for {}s.",
            self.penalty.remaining_sec()
        );
        self.events.push(RuntimeEvent::PenaltyStarted {
            demand_kw: self.current_demand_kw,
            intended_kw,
        });
        self.settle_phase();
    }
}
