use serde::Serialize;

use crate::constants::{forecast_points, PowerRange};
use crate::rng::Rng;

/// Facility demand for a whole session, drawn up front so the player can read
/// the future off it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DemandForecast {
    #[serde(rename = "intervalSec")]
    interval_sec: u32,
    #[serde(rename = "valuesKw")]
    values_kw: Vec<f64>,
}

impl DemandForecast {
    /// One independent uniform draw per interval; length is
    /// `duration_sec / interval_sec`.
    pub fn generate(duration_sec: u32, interval_sec: u32, range: PowerRange, rng: &mut Rng) -> Self {
        let points = forecast_points(duration_sec, interval_sec);
        let values_kw = (0..points).map(|_| rng.uniform(range)).collect();
        Self {
            interval_sec: interval_sec.max(1),
            values_kw,
        }
    }

    /// Uses a caller-supplied profile verbatim. Negative entries are floored
    /// to zero since demand is a draw, never a supply.
    pub fn from_profile(interval_sec: u32, values_kw: Vec<f64>) -> Self {
        Self {
            interval_sec: interval_sec.max(1),
            values_kw: values_kw.into_iter().map(|value| value.max(0.0)).collect(),
        }
    }

    #[cfg(test)]
    pub fn flat(demand_kw: f64, points: usize, interval_sec: u32) -> Self {
        Self::from_profile(interval_sec, vec![demand_kw; points])
    }

    pub fn index_at(&self, elapsed_sec: u32) -> usize {
        if self.values_kw.is_empty() {
            return 0;
        }
        let raw = (elapsed_sec / self.interval_sec) as usize;
        raw.min(self.values_kw.len() - 1)
    }

    /// Demand at `elapsed_sec`, clamped to the last point. An empty forecast
    /// reads as zero demand.
    pub fn demand_at(&self, elapsed_sec: u32) -> f64 {
        self.values_kw
            .get(self.index_at(elapsed_sec))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn values_kw(&self) -> &[f64] {
        &self.values_kw
    }

    pub fn len(&self) -> usize {
        self.values_kw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values_kw.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FACILITY_DEMAND_RANGE, FORECAST_INTERVAL_SEC, SESSION_DURATION_SEC};

    #[test]
    fn generated_length_matches_session() {
        let mut rng = Rng::new(11);
        let forecast = DemandForecast::generate(
            SESSION_DURATION_SEC,
            FORECAST_INTERVAL_SEC,
            FACILITY_DEMAND_RANGE,
            &mut rng,
        );
        assert_eq!(forecast.len(), 60);
        assert!(forecast
            .values_kw()
            .iter()
            .all(|value| FACILITY_DEMAND_RANGE.contains(*value)));
    }

    #[test]
    fn lookup_is_stable_for_repeated_calls() {
        let mut rng = Rng::new(5);
        let forecast = DemandForecast::generate(60, 1, FACILITY_DEMAND_RANGE, &mut rng);
        for t in 0..80 {
            let first = forecast.demand_at(t);
            let second = forecast.demand_at(t);
            assert_eq!(first.to_bits(), second.to_bits());
        }
    }

    #[test]
    fn lookup_clamps_past_the_end() {
        let forecast = DemandForecast::from_profile(1, vec![10.0, 20.0, 30.0]);
        assert_eq!(forecast.demand_at(0), 10.0);
        assert_eq!(forecast.demand_at(2), 30.0);
        assert_eq!(forecast.demand_at(999), 30.0);
    }

    #[test]
    fn lookup_floors_by_interval() {
        let forecast = DemandForecast::from_profile(5, vec![1.0, 2.0, 3.0]);
        assert_eq!(forecast.demand_at(4), 1.0);
        assert_eq!(forecast.demand_at(5), 2.0);
        assert_eq!(forecast.index_at(14), 2);
    }

    #[test]
    fn empty_forecast_reads_zero() {
        let forecast = DemandForecast::from_profile(1, Vec::new());
        assert!(forecast.is_empty());
        assert_eq!(forecast.demand_at(3), 0.0);
        assert_eq!(forecast.index_at(3), 0);
    }

    #[test]
    fn flat_profile_repeats_value() {
        let forecast = DemandForecast::flat(480.0, 60, 1);
        assert_eq!(forecast.len(), 60);
        assert_eq!(forecast.demand_at(37), 480.0);
    }
}
