use clap::{Parser, ValueEnum};
use ev_charger_server::constants::{CONTRACT_POWER_KW, RAPID_BUDGET_SEC, TICK_MS};
use ev_charger_server::engine::{GameSession, SessionOptions};
use ev_charger_server::leaderboard::{record_session, InMemoryLeaderboard};
use ev_charger_server::types::{ChargingMode, GameSummary, RuntimeEvent, SessionPhase, Snapshot};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_SCENARIO_SECONDS: u32 = 600;
const CAUTIOUS_HEADROOM_KW: f64 = 10.0;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    single: bool,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,
    #[arg(long)]
    seconds: Option<u32>,
    #[arg(long)]
    flat_demand: Option<f64>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
enum Strategy {
    /// Charges only while the contract limit leaves headroom.
    Cautious,
    /// Keeps normal charging on and fires rapid as soon as possible.
    Greedy,
    /// Starts the session and never touches the charger.
    Idle,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    strategy: Strategy,
    seconds: u32,
    seed: u32,
    #[serde(rename = "flatDemandKw")]
    flat_demand_kw: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    strategy: Strategy,
    seconds: u32,
    #[serde(rename = "finalScore")]
    final_score: f64,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "evsCompleted")]
    evs_completed: u32,
    penalties: u32,
    #[serde(rename = "bonusWindows")]
    bonus_windows: u32,
    #[serde(rename = "rapidSecondsUsed")]
    rapid_seconds_used: u32,
    #[serde(rename = "peakOutputKw")]
    peak_output_kw: f64,
    rank: Option<usize>,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug)]
struct ScenarioRunResult {
    result: ScenarioResultLine,
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageScore")]
    average_score: f64,
    #[serde(rename = "strategyCounts")]
    strategy_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Default)]
struct AnomalyLog {
    anomalies: Vec<String>,
    records: Vec<AnomalyRecord>,
    seen: HashSet<String>,
}

impl AnomalyLog {
    /// Every occurrence is recorded; the summary list keeps each message once.
    fn push(&mut self, tick: u64, message: String) {
        self.records.push(AnomalyRecord {
            tick,
            message: message.clone(),
        });
        if self.seen.insert(message.clone()) {
            self.anomalies.push(message);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms));
    let leaderboard = InMemoryLeaderboard::default();
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            strategy = ?scenario.strategy,
            seconds = scenario.seconds,
            "scenario_started"
        );
        let mut scenario_run = run_scenario(&scenario);

        for anomaly in &scenario_run.anomaly_records {
            warn!(
                match_id = %match_id,
                scenario = %scenario.name,
                seed = scenario.seed,
                tick = anomaly.tick,
                message = %anomaly.message,
                "anomaly_detected"
            );
        }

        let summary = scenario_run.summary();
        scenario_run.result.rank = record_session(&leaderboard, &summary, None).rank;

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();

        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            tick = scenario_run.finished_tick,
            final_score = scenario_run.result.final_score,
            penalties = scenario_run.result.penalties,
            anomaly_count = scenario_run.anomaly_records.len(),
            "scenario_finished"
        );

        match serde_json::to_string(&scenario_run.result) {
            Ok(line) => println!("{line}"),
            Err(error) => error!(%error, "scenario result failed to serialize"),
        }
        scenario_results.push(scenario_run.result);
    }

    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        now_ms(),
        scenario_results,
        total_anomalies,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            error!(
                match_id = %match_id,
                path = %path.display(),
                %error,
                "summary_write_failed"
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    info!(
        match_id = %match_id,
        scenario_count = summary.scenario_count,
        anomaly_count = summary.anomaly_count,
        average_score = summary.average_score,
        summary_out = ?summary_out_written,
        "run_finished"
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

impl ScenarioRunResult {
    fn summary(&self) -> GameSummary {
        GameSummary {
            player_name: self.result.scenario.clone(),
            final_score: self.result.final_score,
            duration_ms: self.result.duration_ms,
            evs_completed: self.result.evs_completed,
            penalties: self.result.penalties,
            bonus_windows: self.result.bonus_windows,
            rapid_seconds_used: self.result.rapid_seconds_used,
        }
    }
}

fn run_scenario(scenario: &Scenario) -> ScenarioRunResult {
    let options = SessionOptions {
        session_duration_sec_override: Some(scenario.seconds),
        demand_profile: scenario
            .flat_demand_kw
            .map(|demand_kw| vec![demand_kw; scenario.seconds as usize]),
    };
    let mut session = GameSession::new(scenario.seed, options);
    let mut log = AnomalyLog::default();

    if let Err(error) = session.start(&scenario.name) {
        log.push(0, format!("session failed to start: {error}"));
    }

    let mut snapshot = session.build_snapshot(true);
    let mut last_score = snapshot.score;
    let mut peak_output_kw = 0.0f64;
    let mut completed_events = 0u32;
    // Bonus windows extend the clock, so allow for the longest run possible.
    let tick_limit = (scenario.seconds as usize + 60 * 15) * 10 * 2;
    let mut tick_safety = 0usize;

    while session.phase().is_running() {
        apply_strategy(scenario.strategy, &mut session, &snapshot);
        session.advance(TICK_MS);
        snapshot = session.build_snapshot(true);

        for message in collect_snapshot_anomalies(&snapshot, last_score) {
            log.push(snapshot.tick, message);
        }
        last_score = snapshot.score;
        peak_output_kw = peak_output_kw.max(snapshot.effective_output_kw);
        completed_events += snapshot
            .events
            .iter()
            .filter(|event| matches!(event, RuntimeEvent::EvCompleted { .. }))
            .count() as u32;

        tick_safety += 1;
        if tick_safety > tick_limit {
            log.push(snapshot.tick, "tick safety limit exceeded".to_string());
            break;
        }
    }

    let summary = session.take_finished().unwrap_or_else(|| session.build_summary());
    if (summary.final_score - last_score).abs() > 1e-9 {
        log.push(
            snapshot.tick,
            format!(
                "summary score {} differs from last snapshot {}",
                summary.final_score, last_score
            ),
        );
    }
    if summary.evs_completed != completed_events {
        log.push(
            snapshot.tick,
            format!(
                "summary counted {} completions, events show {}",
                summary.evs_completed, completed_events
            ),
        );
    }
    if scenario.strategy == Strategy::Idle && summary.final_score > 0.0 {
        log.push(
            snapshot.tick,
            format!("idle strategy scored {:.1} kWh", summary.final_score),
        );
    }

    ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            strategy: scenario.strategy,
            seconds: scenario.seconds,
            final_score: round_tenth(summary.final_score),
            duration_ms: summary.duration_ms,
            evs_completed: summary.evs_completed,
            penalties: summary.penalties,
            bonus_windows: summary.bonus_windows,
            rapid_seconds_used: summary.rapid_seconds_used,
            peak_output_kw: round_tenth(peak_output_kw),
            rank: None,
            anomalies: log.anomalies,
        },
        anomaly_records: log.records,
        finished_tick: snapshot.tick,
    }
}

/// Issues at most one command per tick based on the last observed snapshot.
/// Refused commands are expected and ignored.
fn apply_strategy(strategy: Strategy, session: &mut GameSession, snapshot: &Snapshot) {
    if !snapshot.phase.can_charge() {
        return;
    }

    match strategy {
        Strategy::Idle => {}
        Strategy::Greedy => {
            if !snapshot.rapid.active && !snapshot.rapid.exhausted {
                let _ = session.activate_rapid();
            } else if !snapshot.rapid.active && !snapshot.normal_charging {
                let _ = session.toggle_normal_charge();
            }
        }
        Strategy::Cautious => {
            let limit = CONTRACT_POWER_KW - CAUTIOUS_HEADROOM_KW;
            if snapshot.rapid.active {
                if snapshot.demand_kw + session.config.rapid_output_kw > limit {
                    let _ = session.pause_rapid();
                }
                return;
            }

            let rapid_fits = snapshot.demand_kw + session.config.rapid_output_kw <= limit;
            if rapid_fits && !snapshot.rapid.exhausted && snapshot.mode != ChargingMode::Bonus {
                let _ = session.activate_rapid();
                return;
            }

            let normal_draw_kw = if snapshot.bonus.active {
                snapshot.bonus.output_kw
            } else {
                session.config.normal_output_range.max
            };
            let normal_fits = snapshot.demand_kw + normal_draw_kw <= limit;
            if snapshot.normal_charging != normal_fits {
                let _ = session.toggle_normal_charge();
            }
        }
    }
}

fn collect_snapshot_anomalies(snapshot: &Snapshot, previous_score: f64) -> Vec<String> {
    let mut anomalies = Vec::new();
    if !snapshot.score.is_finite() || snapshot.score < previous_score {
        anomalies.push(format!(
            "score went backwards: {previous_score} -> {}",
            snapshot.score
        ));
    }

    if let Some(ev) = &snapshot.ev {
        if ev.current_charge_kwh < 0.0 || ev.current_charge_kwh > ev.capacity_kwh + 1e-9 {
            anomalies.push(format!(
                "ev charge out of range: {} {}/{}",
                ev.id, ev.current_charge_kwh, ev.capacity_kwh
            ));
        }
    } else if snapshot.phase.is_running() {
        anomalies.push("running session has no ev".to_string());
    }

    if snapshot.phase == SessionPhase::PenaltyCooldown && snapshot.effective_output_kw > 0.0 {
        anomalies.push(format!(
            "output during penalty: {} kW",
            snapshot.effective_output_kw
        ));
    }

    if snapshot.penalty.active != (snapshot.phase == SessionPhase::PenaltyCooldown)
        && snapshot.phase.is_running()
    {
        anomalies.push(format!(
            "penalty flag disagrees with phase {:?}",
            snapshot.phase
        ));
    }

    if snapshot.rapid.remaining_sec > RAPID_BUDGET_SEC {
        anomalies.push(format!(
            "rapid budget exceeded: {}s remaining",
            snapshot.rapid.remaining_sec
        ));
    }

    if !snapshot.demand_kw.is_finite() || snapshot.demand_kw < 0.0 {
        anomalies.push(format!("invalid demand: {}", snapshot.demand_kw));
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let base_seed = cli.seed.unwrap_or_else(now_ms);
    let seconds = cli.seconds.unwrap_or(60).clamp(1, MAX_SCENARIO_SECONDS);
    let flat_demand_kw = cli
        .flat_demand
        .filter(|value| value.is_finite())
        .map(|value| value.max(0.0));

    if cli.single || cli.strategy.is_some() {
        let strategy = cli.strategy.unwrap_or(Strategy::Cautious);
        return vec![Scenario {
            name: format!("custom-{}", strategy_key(strategy)),
            strategy,
            seconds,
            seed: normalize_seed(base_seed),
            flat_demand_kw,
        }];
    }

    [Strategy::Cautious, Strategy::Greedy, Strategy::Idle]
        .into_iter()
        .enumerate()
        .map(|(index, strategy)| Scenario {
            name: format!("{}-{}s", strategy_key(strategy), seconds),
            strategy,
            seconds,
            seed: normalize_seed(base_seed.wrapping_add(index as u64)),
            flat_demand_kw,
        })
        .collect()
}

fn strategy_key(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Cautious => "cautious",
        Strategy::Greedy => "greedy",
        Strategy::Idle => "idle",
    }
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    anomaly_count: usize,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_score = if scenario_count == 0 {
        0.0
    } else {
        round_tenth(
            scenarios.iter().map(|scenario| scenario.final_score).sum::<f64>()
                / scenario_count as f64,
        )
    };
    let mut strategy_counts = BTreeMap::new();
    for scenario in &scenarios {
        *strategy_counts
            .entry(strategy_key(scenario.strategy).to_string())
            .or_insert(0) += 1;
    }
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_score,
        strategy_counts,
        scenarios,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(strategy: Strategy, flat_demand_kw: Option<f64>) -> Scenario {
        Scenario {
            name: format!("test-{}", strategy_key(strategy)),
            strategy,
            seconds: 20,
            seed: 42,
            flat_demand_kw,
        }
    }

    fn make_scenario_result(strategy: Strategy, final_score: f64) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            strategy,
            seconds: 60,
            final_score,
            duration_ms: 60_000,
            evs_completed: 0,
            penalties: 0,
            bonus_windows: 0,
            rapid_seconds_used: 0,
            peak_output_kw: 0.0,
            rank: None,
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn default_match_id_contains_seed_and_timestamp() {
        assert_eq!(default_match_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_averages_scores_and_counts_strategies() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![
                make_scenario_result(Strategy::Cautious, 100.0),
                make_scenario_result(Strategy::Greedy, 50.0),
                make_scenario_result(Strategy::Greedy, 0.0),
            ],
            0,
        );
        assert_eq!(summary.scenario_count, 3);
        assert_eq!(summary.average_score, 50.0);
        assert_eq!(summary.strategy_counts.get("greedy"), Some(&2));
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("ev-charger-missing-{}", now_ms()))
            .join("summary.json");
        let summary = build_run_summary("sim-1-1".to_string(), 1, 2, Vec::new(), 0);
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn anomaly_log_keeps_records_and_deduplicates_summary_messages() {
        let mut log = AnomalyLog::default();
        log.push(10, "same anomaly".to_string());
        log.push(11, "same anomaly".to_string());
        assert_eq!(log.anomalies.len(), 1);
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[1].tick, 11);
    }

    #[test]
    fn idle_strategy_scores_nothing_without_anomalies() {
        let run = run_scenario(&scenario(Strategy::Idle, None));
        assert_eq!(run.result.final_score, 0.0);
        assert_eq!(run.result.penalties, 0);
        assert!(run.result.anomalies.is_empty(), "{:?}", run.result.anomalies);
    }

    #[test]
    fn cautious_strategy_avoids_penalties_under_low_flat_demand() {
        let run = run_scenario(&scenario(Strategy::Cautious, Some(100.0)));
        assert_eq!(run.result.penalties, 0);
        assert!(run.result.final_score > 0.0);
        assert!(run.result.anomalies.is_empty(), "{:?}", run.result.anomalies);
    }

    #[test]
    fn greedy_strategy_is_penalised_under_saturated_demand() {
        let run = run_scenario(&scenario(Strategy::Greedy, Some(480.0)));
        assert!(run.result.penalties > 0);
        assert!(run.result.anomalies.is_empty(), "{:?}", run.result.anomalies);
    }

    #[test]
    fn default_run_covers_every_strategy() {
        let cli = Cli::parse_from(["simulate", "--seed", "7", "--seconds", "30"]);
        let scenarios = resolve_scenarios(&cli);
        let strategies: Vec<Strategy> = scenarios.iter().map(|s| s.strategy).collect();
        assert_eq!(
            strategies,
            vec![Strategy::Cautious, Strategy::Greedy, Strategy::Idle]
        );
        assert!(scenarios.iter().all(|s| s.seconds == 30));
        assert_eq!(scenarios[1].seed, 8);
    }

    #[test]
    fn single_run_defaults_to_cautious() {
        let cli = Cli::parse_from(["simulate", "--single", "--flat-demand=-5"]);
        let scenarios = resolve_scenarios(&cli);
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].strategy, Strategy::Cautious);
        assert_eq!(scenarios[0].flat_demand_kw, Some(0.0));
    }

    #[test]
    fn wide_seeds_wrap_into_session_seeds() {
        let cli = Cli::parse_from(["simulate", "--seed", "4294967295"]);
        let seeds: Vec<u32> = resolve_scenarios(&cli).iter().map(|s| s.seed).collect();
        assert_eq!(seeds, vec![u32::MAX, 0, 1]);

        let cli = Cli::parse_from(["simulate", "--single", "--seed", "4294967301"]);
        assert_eq!(resolve_scenarios(&cli)[0].seed, 5);
    }
}
