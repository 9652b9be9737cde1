//! Episode clock.
use crate::BoundedValue;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Time of a single tick, passed to every `step`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepContext {
    /// Episode step counter.
    pub t: u64,

    /// Time elapsed in this tick.
    pub delta_t: f64,

    /// Time elapsed since the start of the episode.
    pub episode_delta_t: f64,
}

/// Configuration of [`Stepper`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepperConfig {
    /// Time per tick.
    pub delta_t: f64,

    /// Episodes end when the step counter reaches this value.
    pub max_t: Option<u64>,

    /// Each episode starts at this step.
    pub init_t: u64,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            delta_t: 1.0,
            max_t: None,
            init_t: 0,
        }
    }
}

impl StepperConfig {
    /// Sets the time per tick.
    pub fn delta_t(mut self, v: f64) -> Self {
        self.delta_t = v;
        self
    }

    /// Sets the episode length in steps.
    pub fn max_t(mut self, v: u64) -> Self {
        self.max_t = Some(v);
        self
    }

    /// Sets the step each episode starts at.
    pub fn init_t(mut self, v: u64) -> Self {
        self.init_t = v;
        self
    }

    /// Constructs [`StepperConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`StepperConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Fixed-step clock counting episode and total steps.
///
/// The episode time starts at `init_t * delta_t` and grows by `delta_t` with
/// every [`Stepper::next`].
#[derive(Debug, Clone)]
pub struct Stepper {
    config: StepperConfig,
    t: u64,
    total_t: u64,
    episode_delta_t: BoundedValue<f64>,
}

impl Stepper {
    /// Builds a stepper.
    pub fn build(config: &StepperConfig) -> Self {
        let init = config.init_t as f64 * config.delta_t;
        Self {
            config: config.clone(),
            t: config.init_t,
            total_t: 0,
            episode_delta_t: BoundedValue::new(init),
        }
    }

    /// Episode step counter.
    pub fn t(&self) -> u64 {
        self.t
    }

    /// Step counter over all episodes; not reset.
    pub fn total_t(&self) -> u64 {
        self.total_t
    }

    /// Time per tick.
    pub fn delta_t(&self) -> f64 {
        self.config.delta_t
    }

    /// Episode length in steps.
    pub fn max_t(&self) -> Option<u64> {
        self.config.max_t
    }

    /// Time elapsed since the start of the episode.
    pub fn episode_delta_t(&self) -> f64 {
        self.episode_delta_t.value()
    }

    /// The episode reached `max_t`.
    pub fn done(&self) -> bool {
        match self.config.max_t {
            Some(max_t) => self.t >= max_t,
            None => false,
        }
    }

    /// Time of the current tick.
    pub fn context(&self) -> StepContext {
        StepContext {
            t: self.t,
            delta_t: self.config.delta_t,
            episode_delta_t: self.episode_delta_t.value(),
        }
    }

    /// Counts the next step.
    pub fn next(&mut self) {
        self.t += 1;
        self.total_t += 1;
        let v = self.episode_delta_t.value() + self.config.delta_t;
        self.episode_delta_t.set(v);
    }

    /// Starts a new episode.
    pub fn reset(&mut self) {
        self.t = self.config.init_t;
        self.episode_delta_t.reset();
    }
}
