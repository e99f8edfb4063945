//! `haulq` command-line interface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use haulq::algorithms::rl::{
    Assignment, EvaluationMetrics, NearestShovelPolicy, PendingStore, Policy, QLearningAgent,
    RandomPolicy, SweepWriter, TrainingLog, TruckOutcome, ValueTable,
};
use haulq::fleet::{synthetic, TickDataset, TickSnapshot};
use haulq::DispatchConfig;

#[derive(Parser)]
#[command(name = "haulq")]
#[command(about = "Haul-truck dispatch by tabular Q-learning")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for the exploration RNG.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Value table to read and write.
    #[arg(long, global = true)]
    table: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on a multi-tick log.
    Train {
        #[arg(long)]
        ticks: Option<PathBuf>,
        #[arg(long)]
        episodes: Option<usize>,
        #[arg(long)]
        alpha: Option<f64>,
        #[arg(long)]
        gamma: Option<f64>,
        #[arg(long)]
        epsilon: Option<f64>,
        /// Per-transition CSV log.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Continue from the existing value table instead of an empty one.
        #[arg(long)]
        resume: bool,
    },
    /// Run the one-factor-at-a-time hyperparameter sweep.
    Sweep {
        #[arg(long)]
        ticks: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        episodes: Option<usize>,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Replay a recorded log through production dispatch.
    Replay {
        #[arg(long)]
        ticks: Option<PathBuf>,
    },
    /// Dispatch a single live tick and print the assignments as CSV.
    Dispatch {
        #[arg(long)]
        tick: Option<PathBuf>,
        /// Read `--tick` as a multi-tick log and dispatch this tick of it.
        #[arg(long)]
        index: Option<u64>,
        #[arg(long)]
        pending: Option<PathBuf>,
    },
    /// Score a policy over a log without learning.
    Evaluate {
        #[arg(long)]
        ticks: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = PolicyKind::QLearning)]
        policy: PolicyKind,
    },
    /// Write a synthetic multi-tick log for smoke tests.
    Synth {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 50)]
        ticks: usize,
        #[arg(long, default_value_t = 10)]
        trucks: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyKind {
    QLearning,
    Random,
    Nearest,
}

fn load_config(path: Option<&Path>) -> Result<DispatchConfig> {
    match path {
        Some(p) => DispatchConfig::from_file(p)
            .with_context(|| format!("Failed to load configuration from {}", p.display())),
        None => Ok(DispatchConfig::default()),
    }
}

fn load_dataset(path: &Path) -> Result<TickDataset> {
    TickDataset::load(path).with_context(|| format!("Failed to read tick log {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.seed.is_some() {
        config.agent.seed = cli.seed;
    }
    if let Some(table) = cli.table {
        config.paths.value_table = table;
    }

    match cli.command {
        Commands::Train {
            ticks,
            episodes,
            alpha,
            gamma,
            epsilon,
            log,
            resume,
        } => {
            if let Some(v) = episodes {
                config.training.episodes = v;
            }
            if let Some(v) = alpha {
                config.agent.alpha = v;
            }
            if let Some(v) = gamma {
                config.agent.gamma = v;
            }
            if let Some(v) = epsilon {
                config.agent.epsilon = v;
            }
            config.validate()?;

            let dataset = load_dataset(ticks.as_deref().unwrap_or(config.paths.ticks.as_path()))?;
            let mut agent = QLearningAgent::new(config.fleet.shovels.clone(), &config.agent);
            if resume {
                agent = agent.with_table(ValueTable::load_or_empty(&config.paths.value_table));
            }

            let trainer = config.trainer();
            let report = match log.or_else(|| config.paths.training_log.clone()) {
                Some(path) => {
                    let mut log = TrainingLog::create(&path).with_context(|| {
                        format!("Failed to create training log {}", path.display())
                    })?;
                    trainer.train(&mut agent, &dataset, Some(&mut log))?
                }
                None => trainer.train::<std::io::Sink>(&mut agent, &dataset, None)?,
            };
            agent.table().save(&config.paths.value_table).with_context(|| {
                format!(
                    "Failed to write value table {}",
                    config.paths.value_table.display()
                )
            })?;

            println!(
                "Trained {} episodes: mean reward {:.2}, {} decisions ({} optimal, {} skipped), {} states, epsilon {:.4}",
                report.episode_rewards.len(),
                report.mean_reward(),
                report.decisions,
                report.optimal_decisions,
                report.skipped,
                agent.table().len(),
                report.final_epsilon,
            );
        }

        Commands::Sweep {
            ticks,
            out,
            episodes,
            workers,
        } => {
            if let Some(v) = episodes {
                config.sweep.episodes = v;
            }
            if let Some(v) = workers {
                config.sweep.workers = v;
            }
            config.validate()?;

            let dataset = Arc::new(load_dataset(
                ticks.as_deref().unwrap_or(config.paths.ticks.as_path()),
            )?);
            let out = out.unwrap_or_else(|| config.paths.sweep_results.clone());
            let mut writer = SweepWriter::create(&out)
                .with_context(|| format!("Failed to create sweep results {}", out.display()))?;
            let results = config.sweep().run(dataset, &mut writer)?;

            let best = results
                .iter()
                .filter_map(|r| r.mean_reward.map(|m| (r, m)))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            println!("{} runs written to {}", results.len(), out.display());
            if let Some((r, mean)) = best {
                println!(
                    "Best: alpha={} gamma={} epsilon_decay={} mean_reward={:.2}",
                    r.point.alpha, r.point.gamma, r.point.epsilon_decay, mean
                );
            }
        }

        Commands::Replay { ticks } => {
            config.validate()?;
            let dataset = load_dataset(ticks.as_deref().unwrap_or(config.paths.ticks.as_path()))?;
            let metrics = config
                .dispatcher()
                .replay(&dataset, &config.paths.value_table)?;
            print!("{metrics}");
        }

        Commands::Dispatch {
            tick,
            index,
            pending,
        } => {
            config.validate()?;
            let tick = tick.unwrap_or_else(|| config.paths.tick.clone());
            let snapshot = match index {
                Some(index) => load_dataset(&tick)?.tick(index)?.clone(),
                None => TickSnapshot::load(&tick)
                    .with_context(|| format!("Failed to read tick {}", tick.display()))?,
            };
            let store = PendingStore::new(pending.unwrap_or_else(|| config.paths.pending.clone()));

            let dispatcher = config.dispatcher();
            info!(session = %dispatcher.session_id(), tick = %tick.display(), "Dispatching");
            let dispatch = dispatcher.realtime(&snapshot, &config.paths.value_table, &store)?;

            println!("{}", Assignment::CSV_HEADER);
            for assignment in dispatch.assignments() {
                println!("{}", assignment.csv_row());
            }
            let failed = dispatch
                .outcomes
                .iter()
                .filter(|o| matches!(o, TruckOutcome::Error { .. }))
                .count();
            if failed > 0 {
                warn!(failed, "Some trucks could not be dispatched");
            }
        }

        Commands::Evaluate { ticks, policy } => {
            config.validate()?;
            let dataset = load_dataset(ticks.as_deref().unwrap_or(config.paths.ticks.as_path()))?;
            let mut policy: Box<dyn Policy> = match policy {
                PolicyKind::QLearning => Box::new(
                    QLearningAgent::new(config.fleet.shovels.clone(), &config.agent)
                        .with_table(ValueTable::load_or_empty(&config.paths.value_table)),
                ),
                PolicyKind::Random => Box::new(RandomPolicy::new(config.agent.seed.unwrap_or(0))),
                PolicyKind::Nearest => {
                    Box::new(NearestShovelPolicy::new(config.reward.active_state_code))
                }
            };
            let metrics =
                EvaluationMetrics::evaluate(&dataset, &config.training_driver(), policy.as_mut());
            print!("{metrics}");
        }

        Commands::Synth { out, ticks, trucks } => {
            config.validate()?;
            let dataset = synthetic::generate(
                &config.fleet.shovels,
                ticks,
                trucks,
                config.agent.seed.unwrap_or(42),
            )?;
            let json = serde_json::to_string_pretty(&dataset.to_json_value())?;
            std::fs::write(&out, json)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Wrote {} ticks to {}", dataset.len(), out.display());
        }
    }

    Ok(())
}
