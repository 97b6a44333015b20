use serde::{Deserialize, Serialize};

use crate::constants::PowerRange;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Playing,
    Bonus,
    PenaltyCooldown,
    GameOver,
}

impl SessionPhase {
    pub fn is_running(self) -> bool {
        matches!(self, Self::Playing | Self::Bonus | Self::PenaltyCooldown)
    }

    pub fn can_charge(self) -> bool {
        matches!(self, Self::Playing | Self::Bonus)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargingMode {
    Idle,
    Normal,
    Bonus,
    Rapid,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvType {
    pub name: &'static str,
    pub capacity_kwh: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvInstance {
    pub id: String,
    pub name: String,
    #[serde(rename = "capacityKwh")]
    pub capacity_kwh: f64,
    #[serde(rename = "currentChargeKwh")]
    pub current_charge_kwh: f64,
    #[serde(rename = "maxInputKw")]
    pub max_input_kw: f64,
}

impl EvInstance {
    pub fn is_full(&self) -> bool {
        self.current_charge_kwh >= self.capacity_kwh
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BonusView {
    pub active: bool,
    #[serde(rename = "remainingSec")]
    pub remaining_sec: u32,
    #[serde(rename = "outputKw")]
    pub output_kw: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RapidView {
    pub active: bool,
    #[serde(rename = "remainingSec")]
    pub remaining_sec: u32,
    #[serde(rename = "everActivated")]
    pub ever_activated: bool,
    pub exhausted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PenaltyView {
    pub active: bool,
    #[serde(rename = "remainingSec")]
    pub remaining_sec: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCue {
    Start,
    NormalLoopBegin,
    NormalLoopEnd,
    BonusLoopBegin,
    BonusLoopEnd,
    RapidLoopBegin,
    RapidLoopEnd,
    ChargeStop,
    BonusStart,
    GameOver,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    SessionStarted {
        #[serde(rename = "playerName")]
        player_name: String,
    },
    EvSpawned {
        #[serde(rename = "evId")]
        ev_id: String,
        name: String,
        #[serde(rename = "baseOutputKw")]
        base_output_kw: f64,
    },
    EvCompleted {
        #[serde(rename = "evId")]
        ev_id: String,
        name: String,
        #[serde(rename = "capacityKwh")]
        capacity_kwh: f64,
        counted: bool,
    },
    BonusStarted {
        #[serde(rename = "outputKw")]
        output_kw: f64,
        #[serde(rename = "remainingSec")]
        remaining_sec: u32,
    },
    BonusEnded,
    PenaltyStarted {
        #[serde(rename = "demandKw")]
        demand_kw: f64,
        #[serde(rename = "intendedKw")]
        intended_kw: f64,
    },
    PenaltyEnded {
        #[serde(rename = "resumedPhase")]
        resumed_phase: SessionPhase,
    },
    RapidStarted {
        #[serde(rename = "remainingSec")]
        remaining_sec: u32,
    },
    RapidPaused {
        #[serde(rename = "remainingSec")]
        remaining_sec: u32,
    },
    RapidDepleted,
    GameOver {
        #[serde(rename = "finalScore")]
        final_score: f64,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct GameConfig {
    #[serde(rename = "tickMs")]
    pub tick_ms: u64,
    #[serde(rename = "sessionDurationSec")]
    pub session_duration_sec: u32,
    #[serde(rename = "bonusDurationSec")]
    pub bonus_duration_sec: u32,
    #[serde(rename = "penaltyDurationSec")]
    pub penalty_duration_sec: u32,
    #[serde(rename = "forecastIntervalSec")]
    pub forecast_interval_sec: u32,
    #[serde(rename = "demandRange")]
    pub demand_range: PowerRange,
    #[serde(rename = "contractPowerKw")]
    pub contract_power_kw: f64,
    #[serde(rename = "normalOutputRange")]
    pub normal_output_range: PowerRange,
    #[serde(rename = "bonusOutputRange")]
    pub bonus_output_range: PowerRange,
    #[serde(rename = "rapidOutputKw")]
    pub rapid_output_kw: f64,
    #[serde(rename = "rapidBudgetSec")]
    pub rapid_budget_sec: u32,
    #[serde(rename = "chargesForBonus")]
    pub charges_for_bonus: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    pub phase: SessionPhase,
    pub mode: ChargingMode,
    pub score: f64,
    #[serde(rename = "timeLeftSec")]
    pub time_left_sec: u32,
    #[serde(rename = "demandKw")]
    pub demand_kw: f64,
    #[serde(rename = "forecastIndex")]
    pub forecast_index: usize,
    #[serde(rename = "effectiveOutputKw")]
    pub effective_output_kw: f64,
    #[serde(rename = "normalCharging")]
    pub normal_charging: bool,
    #[serde(rename = "consecutiveCharges")]
    pub consecutive_charges: u32,
    pub message: String,
    pub ev: Option<EvInstance>,
    pub bonus: BonusView,
    pub rapid: RapidView,
    pub penalty: PenaltyView,
    pub events: Vec<RuntimeEvent>,
    pub cues: Vec<AudioCue>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameSummary {
    #[serde(rename = "playerName")]
    pub player_name: String,
    #[serde(rename = "finalScore")]
    pub final_score: f64,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(rename = "evsCompleted")]
    pub evs_completed: u32,
    pub penalties: u32,
    #[serde(rename = "bonusWindows")]
    pub bonus_windows: u32,
    #[serde(rename = "rapidSecondsUsed")]
    pub rapid_seconds_used: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    pub score: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardResponse {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    pub entries: Vec<ScoreEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionResult {
    #[serde(rename = "playerName")]
    pub player_name: String,
    #[serde(rename = "finalScore")]
    pub final_score: f64,
    pub rank: Option<usize>,
    pub entries: Vec<ScoreEntry>,
    pub degraded: bool,
    pub message: String,
}
