//! Hyperparameter sweep over a shared dataset.
//!
//! Every configuration trains a fresh agent. Runs execute on a bounded pool
//! of scoped worker threads, and each finished run is appended to the result
//! file immediately so a partial sweep can be inspected.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tracing::{error, info};

use super::agent::QLearningAgent;
use super::config::{AgentConfig, SweepConfig, TrainingConfig};
use super::environment::TransitionDriver;
use super::training::Trainer;
use crate::csv::field;
use crate::error::{DispatchError, Result};
use crate::fleet::TickDataset;
use crate::{generate_id, Id};

/// The hyperparameter a grid varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepParameter {
    Alpha,
    Gamma,
    EpsilonDecay,
}

impl fmt::Display for SweepParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SweepParameter::Alpha => "alpha",
            SweepParameter::Gamma => "gamma",
            SweepParameter::EpsilonDecay => "epsilon_decay",
        })
    }
}

/// One configuration of the sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPoint {
    pub parameter: SweepParameter,
    pub alpha: f64,
    pub gamma: f64,
    pub epsilon_decay: f64,
}

/// Builds the alpha, gamma, and epsilon-decay grids in that order.
pub fn grid(config: &SweepConfig) -> Vec<SweepPoint> {
    let alphas = config.alphas.iter().map(|&alpha| SweepPoint {
        parameter: SweepParameter::Alpha,
        alpha,
        gamma: config.baseline_gamma,
        epsilon_decay: config.baseline_epsilon_decay,
    });
    let gammas = config.gammas.iter().map(|&gamma| SweepPoint {
        parameter: SweepParameter::Gamma,
        alpha: config.baseline_alpha,
        gamma,
        epsilon_decay: config.baseline_epsilon_decay,
    });
    let decays = config.epsilon_decays.iter().map(|&epsilon_decay| SweepPoint {
        parameter: SweepParameter::EpsilonDecay,
        alpha: config.baseline_alpha,
        gamma: config.baseline_gamma,
        epsilon_decay,
    });
    alphas.chain(gammas).chain(decays).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum SweepStatus {
    Success,
    Error(String),
}

impl fmt::Display for SweepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepStatus::Success => f.write_str("success"),
            SweepStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Outcome of one sweep configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    pub point: SweepPoint,
    /// Mean total reward per episode; `None` when the run failed.
    pub mean_reward: Option<f64>,
    pub status: SweepStatus,
    pub run_id: Id,
}

const HEADER: &str = "parameter,alpha,gamma,epsilon_decay,mean_reward,status,run_id";

/// Appends sweep results as CSV rows, flushing after each row.
pub struct SweepWriter<W: Write> {
    writer: W,
    path: PathBuf,
    rows: usize,
}

impl SweepWriter<BufWriter<File>> {
    /// Creates (or truncates) the result file and writes the header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DispatchError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| DispatchError::io(path, e))?;
        Self::new(BufWriter::new(file), path)
    }
}

impl<W: Write> SweepWriter<W> {
    pub fn new(mut writer: W, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        writeln!(writer, "{HEADER}")
            .and_then(|_| writer.flush())
            .map_err(|e| DispatchError::io(&path, e))?;
        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    pub fn append(&mut self, result: &SweepResult) -> Result<()> {
        let mean = result
            .mean_reward
            .map(|m| m.to_string())
            .unwrap_or_default();
        writeln!(
            self.writer,
            "{},{},{},{},{},{},{}",
            result.point.parameter,
            result.point.alpha,
            result.point.gamma,
            result.point.epsilon_decay,
            mean,
            field(&result.status.to_string()),
            result.run_id,
        )
        .and_then(|_| self.writer.flush())
        .map_err(|e| DispatchError::io(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Runs every configuration of a [`SweepConfig`] grid.
#[derive(Debug, Clone)]
pub struct Sweep {
    driver: TransitionDriver,
    agent: AgentConfig,
    training: TrainingConfig,
    config: SweepConfig,
}

impl Sweep {
    /// `agent` supplies the exploration floor and seed; `training` the
    /// tick pairing. Episode count comes from `config`.
    pub fn new(
        driver: TransitionDriver,
        agent: AgentConfig,
        training: TrainingConfig,
        config: SweepConfig,
    ) -> Self {
        Self {
            driver,
            agent,
            training,
            config,
        }
    }

    pub fn points(&self) -> Vec<SweepPoint> {
        grid(&self.config)
    }

    /// Trains one configuration from ε = 1.0 and reports its mean reward.
    ///
    /// Errors and panics become [`SweepStatus::Error`].
    pub fn run_point(&self, point: SweepPoint, dataset: &TickDataset) -> SweepResult {
        let run_id = generate_id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.train_point(point, dataset)));
        let (mean_reward, status) = match outcome {
            Ok(Ok(mean)) => (Some(mean), SweepStatus::Success),
            Ok(Err(e)) => (None, SweepStatus::Error(e.to_string())),
            Err(panic_info) => {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                (None, SweepStatus::Error(msg))
            }
        };
        match &status {
            SweepStatus::Success => info!(
                run = %run_id,
                parameter = %point.parameter,
                alpha = point.alpha,
                gamma = point.gamma,
                epsilon_decay = point.epsilon_decay,
                mean_reward = mean_reward.unwrap_or_default(),
                "Sweep run finished"
            ),
            SweepStatus::Error(msg) => error!(
                run = %run_id,
                parameter = %point.parameter,
                error = %msg,
                "Sweep run failed"
            ),
        }
        SweepResult {
            point,
            mean_reward,
            status,
            run_id,
        }
    }

    fn train_point(&self, point: SweepPoint, dataset: &TickDataset) -> Result<f64> {
        let agent_config = AgentConfig {
            alpha: point.alpha,
            gamma: point.gamma,
            epsilon: 1.0,
            epsilon_decay: point.epsilon_decay,
            ..self.agent.clone()
        };
        agent_config.validate().map_err(DispatchError::InvalidConfig)?;

        let mut agent =
            QLearningAgent::new(self.driver.encoder().shovels().to_vec(), &agent_config);
        let training = TrainingConfig {
            episodes: self.config.episodes,
            checkpoint_interval: 0,
            ..self.training.clone()
        };
        let trainer = Trainer::new(self.driver.clone(), training);
        let report = trainer.train::<io::Sink>(&mut agent, dataset, None)?;
        Ok(report.mean_reward())
    }

    /// Runs the whole grid on up to `workers` scoped threads.
    ///
    /// Workers claim grid points through a shared counter. Rows reach
    /// `writer` in completion order; the returned results are in grid order.
    pub fn run<W: Write>(
        &self,
        dataset: Arc<TickDataset>,
        writer: &mut SweepWriter<W>,
    ) -> Result<Vec<SweepResult>> {
        let points = self.points();
        let total = points.len();
        let workers = self.config.workers.clamp(1, total.max(1));
        info!(runs = total, workers, "Starting sweep");

        let next = AtomicUsize::new(0);
        let mut results: Vec<Option<SweepResult>> = vec![None; total];
        let mut write_error = None;

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            for _ in 0..workers {
                let tx = tx.clone();
                let (next, points, dataset) = (&next, &points, &*dataset);
                scope.spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(&point) = points.get(index) else {
                        break;
                    };
                    if tx.send((index, self.run_point(point, dataset))).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            for (index, result) in rx {
                if write_error.is_none() {
                    if let Err(e) = writer.append(&result) {
                        write_error = Some(e);
                    }
                }
                results[index] = Some(result);
            }
        });
        if let Some(e) = write_error {
            return Err(e);
        }

        let results: Vec<SweepResult> = results.into_iter().flatten().collect();
        let failed = results
            .iter()
            .filter(|r| r.status != SweepStatus::Success)
            .count();
        info!(runs = results.len(), failed, "Sweep finished");
        Ok(results)
    }
}
