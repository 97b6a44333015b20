use serde::Serialize;

use crate::types::EvType;

pub const TICK_MS: u64 = 100;
pub const WALL_CLOCK_MS: u64 = 1_000;

pub const SESSION_DURATION_SEC: u32 = 60;
pub const BONUS_DURATION_SEC: u32 = 15;
pub const PENALTY_DURATION_SEC: u32 = 5;

pub const FORECAST_INTERVAL_SEC: u32 = 1;
pub const FACILITY_DEMAND_RANGE: PowerRange = PowerRange::new(0.0, 500.0);
pub const CONTRACT_POWER_KW: f64 = 500.0;

pub const NORMAL_OUTPUT_RANGE: PowerRange = PowerRange::new(3.0, 6.0);
pub const BONUS_OUTPUT_RANGE: PowerRange = PowerRange::new(50.0, 450.0);

pub const RAPID_OUTPUT_KW: f64 = 100.0;
pub const RAPID_BUDGET_SEC: u32 = 20;

pub const CONSECUTIVE_CHARGES_FOR_BONUS: u32 = 3;
pub const MAX_HIGH_SCORES: usize = 100;
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const RESULT_DISPLAY_DELAY_MS: u64 = 3_000;

pub const DEFAULT_MAX_INPUT_KW: f64 = 100.0;
pub const HEAVY_EV_NAME: &str = "Long Hauler";
pub const HEAVY_EV_MAX_INPUT_KW: f64 = 200.0;

pub const EV_TYPES: [EvType; 5] = [
    EvType {
        name: "Eco Mini",
        capacity_kwh: 20.0,
    },
    EvType {
        name: "City Hopper",
        capacity_kwh: 40.0,
    },
    EvType {
        name: "Family Cruiser",
        capacity_kwh: 80.0,
    },
    EvType {
        name: "Workhorse Van",
        capacity_kwh: 120.0,
    },
    EvType {
        name: HEAVY_EV_NAME,
        capacity_kwh: 200.0,
    },
];

/// Inclusive kW range used for every randomized power draw.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PowerRange {
    pub min: f64,
    pub max: f64,
}

impl PowerRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub fn forecast_points(duration_sec: u32, interval_sec: u32) -> usize {
    if interval_sec == 0 {
        return 0;
    }
    (duration_sec / interval_sec) as usize
}

pub fn get_max_input_kw(ev_name: &str) -> f64 {
    if ev_name == HEAVY_EV_NAME {
        return HEAVY_EV_MAX_INPUT_KW;
    }
    DEFAULT_MAX_INPUT_KW
}

/// Energy delivered by `rate_kw` over one tick of `tick_ms`.
pub fn energy_per_tick_kwh(rate_kw: f64, tick_ms: u64) -> f64 {
    rate_kw * tick_ms as f64 / 1000.0
}
