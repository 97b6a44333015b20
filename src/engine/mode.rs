use crate::types::ChargingMode;

/// Immutable inputs the charging mode is derived from.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModeInputs {
    pub penalty_active: bool,
    pub rapid_active: bool,
    pub normal_charging: bool,
    pub bonus_active: bool,
    pub base_output_kw: f64,
    pub bonus_output_kw: f64,
    pub rapid_output_kw: f64,
}

/// Rapid > bonus-boosted normal > normal > idle. Penalty forces idle.
pub fn resolve_mode(inputs: &ModeInputs) -> ChargingMode {
    if inputs.penalty_active {
        return ChargingMode::Idle;
    }
    if inputs.rapid_active {
        return ChargingMode::Rapid;
    }
    if !inputs.normal_charging {
        return ChargingMode::Idle;
    }
    if inputs.bonus_active {
        ChargingMode::Bonus
    } else {
        ChargingMode::Normal
    }
}

pub fn intended_output_kw(mode: ChargingMode, inputs: &ModeInputs) -> f64 {
    match mode {
        ChargingMode::Idle => 0.0,
        ChargingMode::Normal => inputs.base_output_kw,
        ChargingMode::Bonus => inputs.bonus_output_kw,
        ChargingMode::Rapid => inputs.rapid_output_kw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ModeInputs {
        ModeInputs {
            base_output_kw: 4.0,
            bonus_output_kw: 300.0,
            rapid_output_kw: 100.0,
            ..ModeInputs::default()
        }
    }

    #[test]
    fn nothing_requested_is_idle() {
        assert_eq!(resolve_mode(&inputs()), ChargingMode::Idle);
    }

    #[test]
    fn rapid_wins_over_everything_but_penalty() {
        let mut i = inputs();
        i.rapid_active = true;
        i.normal_charging = true;
        i.bonus_active = true;
        assert_eq!(resolve_mode(&i), ChargingMode::Rapid);
        assert_eq!(intended_output_kw(ChargingMode::Rapid, &i), 100.0);

        i.penalty_active = true;
        assert_eq!(resolve_mode(&i), ChargingMode::Idle);
        assert_eq!(intended_output_kw(resolve_mode(&i), &i), 0.0);
    }

    #[test]
    fn bonus_only_boosts_an_active_normal_charge() {
        let mut i = inputs();
        i.bonus_active = true;
        assert_eq!(resolve_mode(&i), ChargingMode::Idle);

        i.normal_charging = true;
        assert_eq!(resolve_mode(&i), ChargingMode::Bonus);
        assert_eq!(intended_output_kw(ChargingMode::Bonus, &i), 300.0);
    }

    #[test]
    fn plain_normal_uses_base_output() {
        let mut i = inputs();
        i.normal_charging = true;
        assert_eq!(resolve_mode(&i), ChargingMode::Normal);
        assert_eq!(intended_output_kw(ChargingMode::Normal, &i), 4.0);
    }
}
