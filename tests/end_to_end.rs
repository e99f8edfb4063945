use std::fs;
use std::sync::Arc;

use haulq::algorithms::rl::{
    AgentConfig, EvaluationMetrics, NearestShovelPolicy, PendingStore, QLearningAgent,
    ReplayOutcome, SweepStatus, SweepWriter, TrainingLog, TruckOutcome, ValueTable,
};
use haulq::fleet::{synthetic, TickDataset, TickSnapshot};
use haulq::DispatchConfig;

const LOG: &str = r#"{
    "Parametros_Globales": {"version": 1},
    "1": {
        "truck_states": {
            "CM01": {"status": "waiting for shovel", "position": [201000.0, 8391000.0],
                     "tank_fuel_level": 60, "ETA": {"S1": 2.0, "S2": 10.0}},
            "CM02": {"status": "loading", "position": [202500.0, 8392000.0],
                     "tank_fuel_level": 35, "ETA": {"S1": 4.0, "S2": 1.5}}
        },
        "shovel_states": {"S1": {"state": 1, "queue_count": 0}, "S2": {"state": 4, "queue_count": 0}}
    },
    "2": {
        "truck_states": {
            "CM01": {"status": "waiting for shovel", "position": [201000.0, 8391000.0],
                     "tank_fuel_level": 59, "ETA": {"S1": 1.0, "S2": 9.0}},
            "CM02": {"status": "moving load", "position": [202600.0, 8392100.0],
                     "tank_fuel_level": 34, "ETA": {"S1": 5.0, "S2": 2.5}}
        },
        "shovel_states": {"S1": {"state": 1, "queue_count": 1}, "S2": {"state": 1, "queue_count": 0}}
    },
    "3": {
        "truck_states": {
            "CM01": {"status": "loading", "position": [201000.0, 8391000.0],
                     "tank_fuel_level": 58, "ETA": {"S1": 0.0, "S2": 8.0}}
        },
        "shovel_states": {"S1": {"state": 1, "queue_count": 0}, "S2": {"state": 1, "queue_count": 2}}
    }
}"#;

fn config(dir: &std::path::Path) -> DispatchConfig {
    let text = format!(
        r#"
        [fleet]
        shovels = ["S1", "S2"]

        [paths]
        value_table = "{table}"
        pending = "{pending}"

        [agent]
        epsilon = 0.0
        seed = 5

        [training]
        episodes = 3
        checkpoint_interval = 2
        "#,
        table = dir.join("table.json").display(),
        pending = dir.join("pending.json").display(),
    );
    let path = dir.join("haulq.toml");
    fs::write(&path, text).unwrap();
    let cfg = DispatchConfig::from_file(&path).unwrap();
    cfg.validate().unwrap();
    cfg
}

#[test]
fn train_log_and_reload_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.paths.checkpoint_dir = Some(dir.path().join("checkpoints"));
    let dataset = TickDataset::from_json_str(LOG).unwrap();

    let mut agent = QLearningAgent::new(cfg.fleet.shovels.clone(), &cfg.agent);
    let log_path = dir.path().join("train.csv");
    let mut log = TrainingLog::create(&log_path).unwrap();
    let report = cfg.trainer().train(&mut agent, &dataset, Some(&mut log)).unwrap();

    // 3 ticks with wrap-around, 5 truck records, 3 episodes.
    assert_eq!(report.episode_rewards.len(), 3);
    assert_eq!(report.decisions, 15);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.checkpoints.len(), 1);
    assert!(report.checkpoints[0].ends_with("value_table_ep2.json"));

    let text = fs::read_to_string(&log_path).unwrap();
    assert_eq!(text.lines().count(), 1 + 15);
    assert!(text.starts_with("episode,tick,truck,state,action"));

    agent.table().save(&cfg.paths.value_table).unwrap();
    let reloaded = ValueTable::load(&cfg.paths.value_table).unwrap();
    assert_eq!(&reloaded, agent.table());
    reloaded.save(&cfg.paths.value_table).unwrap();
    assert_eq!(ValueTable::load(&cfg.paths.value_table).unwrap(), reloaded);
}

#[test]
fn realtime_dispatch_hands_off_pending_decisions() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let dataset = TickDataset::from_json_str(LOG).unwrap();
    let store = PendingStore::new(&cfg.paths.pending);
    let dispatcher = cfg.dispatcher();

    let (_, first_tick) = dataset.get(0).unwrap();
    let first = dispatcher
        .realtime(first_tick, &cfg.paths.value_table, &store)
        .unwrap();
    assert!(first.replayed.is_empty());
    let assignments: Vec<_> = first.assignments().collect();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].truck_id, "CM01");
    assert_eq!(assignments[0].shovel, "S1");
    assert!(matches!(first.outcomes[1], TruckOutcome::Fixed(ref id) if id == "CM02"));
    assert!(store.path().exists());

    // The next invocation sees the following tick, written as a bare snapshot.
    let (_, second_tick) = dataset.get(1).unwrap();
    let tick_path = dir.path().join("tick.json");
    fs::write(&tick_path, second_tick.to_json_value().to_string()).unwrap();
    let snapshot = TickSnapshot::load(&tick_path).unwrap();

    let second = dispatcher
        .realtime(&snapshot, &cfg.paths.value_table, &store)
        .unwrap();
    assert_eq!(second.replayed.len(), 1);
    match &second.replayed[0] {
        ReplayOutcome::Applied { truck_id, action, reward, .. } => {
            assert_eq!(truck_id, "CM01");
            assert_eq!(action, "S1");
            // +1 queue, +8 waiting, +8 ETA band, +4 best ETA
            assert_eq!(*reward, 21.0);
        }
        other => panic!("unexpected replay outcome: {other:?}"),
    }
    let table = ValueTable::load(&cfg.paths.value_table).unwrap();
    assert!(!table.is_empty());
    assert_eq!(store.take().len(), 1);
}

#[test]
fn replay_saves_table_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let dataset = TickDataset::from_json_str(LOG).unwrap();

    let metrics = cfg
        .dispatcher()
        .replay(&dataset, &cfg.paths.value_table)
        .unwrap();
    assert_eq!(metrics.ticks, 2);
    assert_eq!(metrics.optimized, 2);
    assert_eq!(metrics.fixed, 2);
    assert_eq!(metrics.errors, 0);
    assert_eq!(metrics.initial_states, 0);
    assert!(cfg.paths.value_table.exists());
    assert_eq!(
        ValueTable::load(&cfg.paths.value_table).unwrap().len(),
        metrics.final_states
    );

    // A second replay starts from the saved table.
    let again = cfg
        .dispatcher()
        .replay(&dataset, &cfg.paths.value_table)
        .unwrap();
    assert_eq!(again.initial_states, metrics.final_states);
    assert_eq!(again.new_states, 0);
}

#[test]
fn sweep_writes_incremental_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.sweep.episodes = 2;
    cfg.sweep.workers = 3;
    let dataset = Arc::new(synthetic::generate(&cfg.fleet.shovels, 6, 4, 11).unwrap());

    let out = dir.path().join("sweep").join("results.csv");
    let mut writer = SweepWriter::create(&out).unwrap();
    let results = cfg.sweep().run(dataset, &mut writer).unwrap();

    assert_eq!(results.len(), 9);
    assert!(results.iter().all(|r| r.status == SweepStatus::Success));
    let text = fs::read_to_string(&out).unwrap();
    assert_eq!(text.lines().count(), 10);
    assert!(text.lines().skip(1).all(|l| l.contains(",success,")));
}

#[test]
fn greedy_agent_scores_every_heuristic_decision() {
    let shovels: Vec<String> = vec!["S1".into(), "S2".into(), "S3".into()];
    let dataset = synthetic::generate(&shovels, 30, 6, 21).unwrap();
    let mut cfg = DispatchConfig::default();
    cfg.fleet.shovels = shovels.clone();
    cfg.training.episodes = 1;
    let driver = cfg.training_driver();

    let mut nearest = NearestShovelPolicy::default();
    let heuristic = EvaluationMetrics::evaluate(&dataset, &driver, &mut nearest);
    assert!(heuristic.decisions > 0);
    assert_eq!(heuristic.skipped, 0);
    assert_eq!(heuristic.policy, "nearest_shovel");

    let agent_cfg = AgentConfig {
        seed: Some(1),
        ..AgentConfig::default()
    };
    let mut agent = QLearningAgent::new(shovels, &agent_cfg);
    cfg.trainer()
        .train::<std::io::Sink>(&mut agent, &dataset, None)
        .unwrap();
    let greedy = EvaluationMetrics::evaluate(&dataset, &driver, &mut agent);
    assert_eq!(greedy.decisions, heuristic.decisions);
    assert_eq!(greedy.policy, "q_learning");
}

#[test]
fn empty_table_breaks_ties_by_fleet_order() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let snapshot = TickSnapshot::from_json_str(
        r#"{
            "truck_states": {
                "CM01": {"status": "waiting for shovel", "position": [201000.0, 8391000.0],
                         "tank_fuel_level": 60, "ETA": {"S1": 4.0, "S2": 4.0}}
            },
            "shovel_states": {"S1": {"state": 1, "queue_count": 0}, "S2": {"state": 4, "queue_count": 0}}
        }"#,
    )
    .unwrap();

    let dispatcher = cfg.dispatcher();
    let mut agent = dispatcher.load_agent(&cfg.paths.value_table);
    assert!(agent.table().is_empty());
    let (outcomes, pending) = dispatcher.decide(&mut agent, &snapshot);

    let assignment = outcomes[0].assignment().unwrap();
    assert_eq!(assignment.shovel, "S1");
    assert!(!assignment.explored);
    assert_eq!(pending[0].valid_actions, vec!["S1", "S2"]);
    assert_eq!(pending[0].state.len(), 4 + 6 * 2);
}

#[test]
fn realtime_dispatch_isolates_malformed_truck() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let store = PendingStore::new(&cfg.paths.pending);
    let tick_path = dir.path().join("tick.json");
    fs::write(
        &tick_path,
        r#"{
            "truck_states": {
                "T1": {"status": "waiting for shovel", "tank_fuel_level": 40, "ETA": {"S1": 3.5, "S2": 2.0}},
                "T2": {"status": "waiting for shovel", "tank_fuel_level": "N/A", "ETA": {"S1": 1.0}}
            },
            "shovel_states": {"S1": {"state": 1, "queue_count": 0}, "S2": {"state": 1, "queue_count": 1}}
        }"#,
    )
    .unwrap();
    let snapshot = TickSnapshot::load(&tick_path).unwrap();

    let dispatch = cfg
        .dispatcher()
        .realtime(&snapshot, &cfg.paths.value_table, &store)
        .unwrap();

    assert_eq!(dispatch.outcomes.len(), 2);
    assert_eq!(dispatch.outcomes[0].assignment().unwrap().truck_id, "T1");
    assert!(matches!(
        &dispatch.outcomes[1],
        TruckOutcome::Error { truck_id, .. } if truck_id == "T2"
    ));
    assert_eq!(store.take().len(), 1);
}
