use crate::constants::{
    BONUS_DURATION_SEC, BONUS_OUTPUT_RANGE, CONSECUTIVE_CHARGES_FOR_BONUS, CONTRACT_POWER_KW,
    FACILITY_DEMAND_RANGE, FORECAST_INTERVAL_SEC, NORMAL_OUTPUT_RANGE, PENALTY_DURATION_SEC,
    RAPID_BUDGET_SEC, RAPID_OUTPUT_KW, SESSION_DURATION_SEC, TICK_MS,
};
use crate::error::{ControlError, SessionError};
use crate::ev_factory::{EvFactory, RandomEvFactory};
use crate::forecast::DemandForecast;
use crate::rng::Rng;
use crate::types::{
    AudioCue, ChargingMode, EvInstance, GameConfig, GameSummary, RuntimeEvent, SessionPhase,
    Snapshot,
};

mod bonus;
mod charging;
mod mode;
mod penalty;
mod rapid;
mod timers;

use self::bonus::BonusWindow;
use self::mode::{resolve_mode, ModeInputs};
use self::penalty::Penalty;
use self::rapid::RapidResource;
use self::timers::{TimerKind, TimerSet};

const WELCOME_MESSAGE: &str = "Welcome to EV Charger-san!";
const START_PROMPT: &str = "Click 'Start Charge' or 'Start Rapid Charge'.";
const NAME_REQUIRED_MESSAGE: &str = "Please enter your name to start the game.";

#[derive(Clone, Debug, Default)]
struct SessionStats {
    evs_completed: u32,
    penalties: u32,
    bonus_windows: u32,
}

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    pub session_duration_sec_override: Option<u32>,
    /// Replaces the random forecast with a fixed demand profile, one value per
    /// forecast interval.
    pub demand_profile: Option<Vec<f64>>,
}

/// One player's charging session: owns every sub-state, the timers that drive
/// them and the only transition function between phases.
#[derive(Debug)]
pub struct GameSession {
    pub config: GameConfig,

    rng: Rng,
    factory: Box<dyn EvFactory>,
    options: SessionOptions,

    player_name: String,
    phase: SessionPhase,
    score: f64,
    time_left_sec: u32,
    elapsed_sec: u32,
    message: String,

    forecast: DemandForecast,
    current_demand_kw: f64,
    ev: Option<EvInstance>,
    base_output_kw: f64,
    normal_charging: bool,
    effective_output_kw: f64,
    consecutive_charges: u32,

    bonus: BonusWindow,
    rapid: RapidResource,
    penalty: Penalty,
    timers: TimerSet,

    events: Vec<RuntimeEvent>,
    cues: Vec<AudioCue>,
    last_mode: ChargingMode,

    tick_counter: u64,
    elapsed_ms: u64,
    stats: SessionStats,
    next_ev_seq: u64,
    finished: Option<GameSummary>,
}

impl GameSession {
    pub fn new(seed: u32, options: SessionOptions) -> Self {
        Self::with_factory(seed, options, Box::new(RandomEvFactory::default()))
    }

    pub fn with_factory(seed: u32, options: SessionOptions, factory: Box<dyn EvFactory>) -> Self {
        let config = GameConfig {
            tick_ms: TICK_MS,
            session_duration_sec: options
                .session_duration_sec_override
                .unwrap_or(SESSION_DURATION_SEC),
            bonus_duration_sec: BONUS_DURATION_SEC,
            penalty_duration_sec: PENALTY_DURATION_SEC,
            forecast_interval_sec: FORECAST_INTERVAL_SEC,
            demand_range: FACILITY_DEMAND_RANGE,
            contract_power_kw: CONTRACT_POWER_KW,
            normal_output_range: NORMAL_OUTPUT_RANGE,
            bonus_output_range: BONUS_OUTPUT_RANGE,
            rapid_output_kw: RAPID_OUTPUT_KW,
            rapid_budget_sec: RAPID_BUDGET_SEC,
            charges_for_bonus: CONSECUTIVE_CHARGES_FOR_BONUS,
        };
        let mut rng = Rng::new(seed);
        let forecast = build_forecast(&config, &options, &mut rng);
        let current_demand_kw = forecast.demand_at(0);

        Self {
            rapid: RapidResource::new(config.rapid_budget_sec),
            time_left_sec: config.session_duration_sec,
            config,
            rng,
            factory,
            options,
            player_name: String::new(),
            phase: SessionPhase::Idle,
            score: 0.0,
            elapsed_sec: 0,
            message: WELCOME_MESSAGE.to_string(),
            forecast,
            current_demand_kw,
            ev: None,
            base_output_kw: 0.0,
            normal_charging: false,
            effective_output_kw: 0.0,
            consecutive_charges: 0,
            bonus: BonusWindow::default(),
            penalty: Penalty::default(),
            timers: TimerSet::default(),
            events: Vec::new(),
            cues: Vec::new(),
            last_mode: ChargingMode::Idle,
            tick_counter: 0,
            elapsed_ms: 0,
            stats: SessionStats::default(),
            next_ev_seq: 1,
            finished: None,
        }
    }

    /// Resets every sub-state and begins play. Rejected names leave the
    /// session untouched apart from the prompt.
    pub fn start(&mut self, player_name: &str) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Idle {
            return Err(SessionError::NotIdle);
        }
        let name = player_name.trim();
        if name.is_empty() {
            self.message = NAME_REQUIRED_MESSAGE.to_string();
            return Err(SessionError::EmptyPlayerName);
        }

        self.timers.cancel_all();
        self.player_name = name.to_string();
        self.score = 0.0;
        self.time_left_sec = self.config.session_duration_sec;
        self.elapsed_sec = 0;
        self.forecast = build_forecast(&self.config, &self.options, &mut self.rng);
        self.current_demand_kw = self.forecast.demand_at(0);
        self.normal_charging = false;
        self.effective_output_kw = 0.0;
        self.consecutive_charges = 0;
        self.bonus.clear();
        self.rapid = RapidResource::new(self.config.rapid_budget_sec);
        self.penalty.clear();
        self.last_mode = ChargingMode::Idle;
        self.tick_counter = 0;
        self.elapsed_ms = 0;
        self.stats = SessionStats::default();
        self.finished = None;

        self.spawn_ev();
        self.phase = SessionPhase::Playing;
        self.message = START_PROMPT.to_string();
        self.timers.arm(TimerKind::WallClock);
        self.timers.arm(TimerKind::SimTick);
        self.cues.push(AudioCue::Start);
        self.events.push(RuntimeEvent::SessionStarted {
            player_name: self.player_name.clone(),
        });
        Ok(())
    }

    /// Moves simulated time forward in tick-sized steps, firing whatever
    /// timers come due. Timers cancelled by an earlier callback in the same
    /// step are skipped.
    pub fn advance(&mut self, dt_ms: u64) {
        let mut remaining = dt_ms;
        while remaining > 0 && self.phase.is_running() {
            let step = remaining.min(self.config.tick_ms);
            remaining -= step;
            self.tick_counter += 1;
            self.elapsed_ms = self.elapsed_ms.saturating_add(step);

            for kind in self.timers.advance(step) {
                if !self.timers.is_armed(kind) {
                    continue;
                }
                match kind {
                    TimerKind::SimTick => self.charging_tick(),
                    TimerKind::WallClock => self.tick_clock(),
                    TimerKind::Penalty => self.tick_penalty(),
                    TimerKind::Bonus => self.tick_bonus(),
                    TimerKind::Rapid => self.tick_rapid(),
                }
                self.sync_mode_cues();
            }
        }
    }

    pub fn toggle_normal_charge(&mut self) -> Result<(), ControlError> {
        if !self.phase.is_running() {
            return Err(ControlError::NotRunning);
        }
        if self.rapid.is_active() {
            return Err(ControlError::RapidActive);
        }
        if self.penalty.is_active() {
            return Err(ControlError::PenaltyActive);
        }

        if self.normal_charging {
            self.normal_charging = false;
            self.effective_output_kw = 0.0;
            self.message = "Charging stopped.".to_string();
        } else if self.phase.can_charge() {
            self.normal_charging = true;
        }
        self.sync_mode_cues();
        Ok(())
    }

    pub fn toggle_rapid_charge(&mut self) -> Result<(), ControlError> {
        if self.rapid.is_active() {
            self.pause_rapid()
        } else {
            self.activate_rapid()
        }
    }

    pub fn activate_rapid(&mut self) -> Result<(), ControlError> {
        self.ensure_controllable()?;
        if self.rapid.is_active() {
            return Ok(());
        }
        if let Err(err) = self.rapid.activate() {
            self.message = "Rapid charge fully used for this game.".to_string();
            return Err(err);
        }
        self.normal_charging = false;
        self.timers.resume(TimerKind::Rapid);
        self.message = format!(
            "Rapid Charge Activated! {}s available.",
            self.rapid.remaining_sec()
        );
        self.events.push(RuntimeEvent::RapidStarted {
            remaining_sec: self.rapid.remaining_sec(),
        });
        self.settle_phase();
        self.sync_mode_cues();
        Ok(())
    }

    pub fn pause_rapid(&mut self) -> Result<(), ControlError> {
        self.ensure_controllable()?;
        if !self.rapid.is_active() {
            return Ok(());
        }
        self.rapid.pause();
        self.timers.pause(TimerKind::Rapid);
        self.effective_output_kw = 0.0;
        self.message = format!(
            "Rapid charge paused. {}s remaining.",
            self.rapid.remaining_sec()
        );
        self.events.push(RuntimeEvent::RapidPaused {
            remaining_sec: self.rapid.remaining_sec(),
        });
        self.settle_phase();
        self.sync_mode_cues();
        Ok(())
    }

    /// Stops every timer, freezes the score and records the summary.
    pub fn end_session(&mut self) {
        if !self.phase.is_running() {
            return;
        }
        self.timers.cancel_all();
        self.normal_charging = false;
        self.rapid.pause();
        self.bonus.clear();
        self.penalty.clear();
        self.effective_output_kw = 0.0;
        self.phase = SessionPhase::GameOver;
        self.message = format!(
            "Game Over, {}! Final Score: {:.1} kWh",
            self.player_name, self.score
        );
        self.sync_mode_cues();
        self.cues.push(AudioCue::GameOver);
        self.events.push(RuntimeEvent::GameOver {
            final_score: self.score,
        });
        self.finished = Some(self.build_summary());
    }

    /// Leaves the game-over screen. Returns false while a session is running.
    pub fn return_to_idle(&mut self) -> bool {
        match self.phase {
            SessionPhase::Idle => true,
            SessionPhase::GameOver => {
                self.phase = SessionPhase::Idle;
                self.ev = None;
                self.message = WELCOME_MESSAGE.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        let mode = self.current_mode();
        Snapshot {
            tick: self.tick_counter,
            elapsed_ms: self.elapsed_ms,
            phase: self.phase,
            mode,
            score: self.score,
            time_left_sec: self.time_left_sec,
            demand_kw: self.current_demand_kw,
            forecast_index: self.forecast.index_at(self.elapsed_sec),
            effective_output_kw: self.effective_output_kw,
            normal_charging: self.normal_charging,
            consecutive_charges: self.consecutive_charges,
            message: self.message.clone(),
            ev: self.ev.clone(),
            bonus: self.bonus.view(),
            rapid: self.rapid.view(),
            penalty: self.penalty.view(),
            events: if include_events {
                std::mem::take(&mut self.events)
            } else {
                Vec::new()
            },
            cues: if include_events {
                std::mem::take(&mut self.cues)
            } else {
                Vec::new()
            },
        }
    }

    pub fn build_summary(&self) -> GameSummary {
        GameSummary {
            player_name: self.player_name.clone(),
            final_score: self.score,
            duration_ms: self.elapsed_ms,
            evs_completed: self.stats.evs_completed,
            penalties: self.stats.penalties,
            bonus_windows: self.stats.bonus_windows,
            rapid_seconds_used: self.rapid.seconds_used(),
        }
    }

    /// Hands out the summary of a finished session exactly once.
    pub fn take_finished(&mut self) -> Option<GameSummary> {
        self.finished.take()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn time_left_sec(&self) -> u32 {
        self.time_left_sec
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn forecast(&self) -> &DemandForecast {
        &self.forecast
    }

    pub fn current_mode(&self) -> ChargingMode {
        resolve_mode(&self.mode_inputs())
    }

    fn mode_inputs(&self) -> ModeInputs {
        ModeInputs {
            penalty_active: self.penalty.is_active(),
            rapid_active: self.rapid.is_active(),
            normal_charging: self.normal_charging,
            bonus_active: self.bonus.is_active(),
            base_output_kw: self.base_output_kw,
            bonus_output_kw: self.bonus.output_kw(),
            rapid_output_kw: self.config.rapid_output_kw,
        }
    }

    fn ensure_controllable(&self) -> Result<(), ControlError> {
        if !self.phase.is_running() {
            return Err(ControlError::NotRunning);
        }
        if self.penalty.is_active() {
            return Err(ControlError::PenaltyActive);
        }
        Ok(())
    }

    /// The single place the running phase is derived from sub-state.
    fn settle_phase(&mut self) {
        if !self.phase.is_running() {
            return;
        }
        self.phase = if self.penalty.is_active() {
            SessionPhase::PenaltyCooldown
        } else if self.bonus.is_active() || self.rapid.is_active() {
            SessionPhase::Bonus
        } else {
            SessionPhase::Playing
        };
    }

    fn tick_clock(&mut self) {
        self.elapsed_sec = self.elapsed_sec.saturating_add(1);
        if self.time_left_sec <= 1 {
            self.time_left_sec = 0;
            self.end_session();
            return;
        }
        self.time_left_sec -= 1;
        self.current_demand_kw = self.forecast.demand_at(self.elapsed_sec);
    }

    fn tick_penalty(&mut self) {
        if !self.penalty.tick_1s() {
            return;
        }
        self.timers.cancel(TimerKind::Penalty);
        self.settle_phase();
        self.message = "Penalty over. You can charge again!".to_string();
        self.events.push(RuntimeEvent::PenaltyEnded {
            resumed_phase: self.phase,
        });
    }

    fn tick_bonus(&mut self) {
        if !self.bonus.tick_1s() {
            return;
        }
        self.timers.cancel(TimerKind::Bonus);
        self.settle_phase();
        if !self.penalty.is_active() {
            self.message = "Bonus time over!".to_string();
        }
        self.events.push(RuntimeEvent::BonusEnded);
    }

    fn tick_rapid(&mut self) {
        if !self.rapid.tick_1s() {
            return;
        }
        self.timers.cancel(TimerKind::Rapid);
        self.effective_output_kw = 0.0;
        self.settle_phase();
        self.message = "Rapid charge duration finished!".to_string();
        self.events.push(RuntimeEvent::RapidDepleted);
    }

    fn spawn_ev(&mut self) {
        let id = format!("ev_{}", self.next_ev_seq);
        self.next_ev_seq += 1;
        let spawn = self.factory.spawn(id, &mut self.rng);
        self.base_output_kw = spawn.base_output_kw.max(0.0);
        self.events.push(RuntimeEvent::EvSpawned {
            ev_id: spawn.ev.id.clone(),
            name: spawn.ev.name.clone(),
            base_output_kw: self.base_output_kw,
        });
        self.ev = Some(spawn.ev);
    }

    /// Emits loop begin/end cues whenever the resolved mode changes.
    fn sync_mode_cues(&mut self) {
        let mode = self.current_mode();
        if mode == self.last_mode {
            return;
        }
        if let Some(cue) = loop_end_cue(self.last_mode) {
            self.cues.push(cue);
        }
        match loop_begin_cue(mode) {
            Some(cue) => self.cues.push(cue),
            None => self.cues.push(AudioCue::ChargeStop),
        }
        self.last_mode = mode;
    }
}

fn build_forecast(config: &GameConfig, options: &SessionOptions, rng: &mut Rng) -> DemandForecast {
    match &options.demand_profile {
        Some(profile) => DemandForecast::from_profile(config.forecast_interval_sec, profile.clone()),
        None => DemandForecast::generate(
            config.session_duration_sec,
            config.forecast_interval_sec,
            config.demand_range,
            rng,
        ),
    }
}

fn loop_begin_cue(mode: ChargingMode) -> Option<AudioCue> {
    match mode {
        ChargingMode::Idle => None,
        ChargingMode::Normal => Some(AudioCue::NormalLoopBegin),
        ChargingMode::Bonus => Some(AudioCue::BonusLoopBegin),
        ChargingMode::Rapid => Some(AudioCue::RapidLoopBegin),
    }
}

fn loop_end_cue(mode: ChargingMode) -> Option<AudioCue> {
    match mode {
        ChargingMode::Idle => None,
        ChargingMode::Normal => Some(AudioCue::NormalLoopEnd),
        ChargingMode::Bonus => Some(AudioCue::BonusLoopEnd),
        ChargingMode::Rapid => Some(AudioCue::RapidLoopEnd),
    }
}
