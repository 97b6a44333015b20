use crate::constants::{get_max_input_kw, PowerRange, EV_TYPES, NORMAL_OUTPUT_RANGE};
use crate::rng::Rng;
use crate::types::{EvInstance, EvType};

/// A freshly docked vehicle together with the charger's normal output drawn
/// for it.
#[derive(Clone, Debug, PartialEq)]
pub struct EvSpawn {
    pub ev: EvInstance,
    pub base_output_kw: f64,
}

/// Produces the next vehicle whenever the slot empties.
pub trait EvFactory: Send + std::fmt::Debug {
    fn spawn(&mut self, id: String, rng: &mut Rng) -> EvSpawn;
}

/// Random type from the catalogue plus a random normal output.
#[derive(Clone, Debug)]
pub struct RandomEvFactory {
    types: Vec<EvType>,
    output_range: PowerRange,
}

impl RandomEvFactory {
    pub fn new(types: Vec<EvType>, output_range: PowerRange) -> Self {
        Self {
            types,
            output_range,
        }
    }
}

impl Default for RandomEvFactory {
    fn default() -> Self {
        Self::new(EV_TYPES.to_vec(), NORMAL_OUTPUT_RANGE)
    }
}

impl EvFactory for RandomEvFactory {
    fn spawn(&mut self, id: String, rng: &mut Rng) -> EvSpawn {
        let ev_type = self
            .types
            .get(rng.pick_index(self.types.len()))
            .copied()
            .unwrap_or(EV_TYPES[0]);
        let base_output_kw = rng.uniform(self.output_range);
        EvSpawn {
            ev: new_ev(id, ev_type),
            base_output_kw,
        }
    }
}

/// Always docks the same vehicle at the same output. Handy for scripted runs.
#[derive(Clone, Debug)]
pub struct FixedEvFactory {
    pub ev_type: EvType,
    pub max_input_kw: Option<f64>,
    pub base_output_kw: f64,
}

impl EvFactory for FixedEvFactory {
    fn spawn(&mut self, id: String, _rng: &mut Rng) -> EvSpawn {
        let mut ev = new_ev(id, self.ev_type);
        if let Some(max_input_kw) = self.max_input_kw {
            ev.max_input_kw = max_input_kw;
        }
        EvSpawn {
            ev,
            base_output_kw: self.base_output_kw,
        }
    }
}

fn new_ev(id: String, ev_type: EvType) -> EvInstance {
    EvInstance {
        id,
        name: ev_type.name.to_string(),
        capacity_kwh: ev_type.capacity_kwh,
        current_charge_kwh: 0.0,
        max_input_kw: get_max_input_kw(ev_type.name),
    }
}
