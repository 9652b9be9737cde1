//! Configuration of [`ConstrainedValue`](super::ConstrainedValue).
use crate::{registry::ExprId, NumericSource, Scalar};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// When the value of a [`ConstrainedValue`](super::ConstrainedValue) is drawn at random.
///
/// Both bounds must be set; draws are uniform in `[lowerbound, upperbound]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Randomize {
    /// Never.
    Never,

    /// The initial value is drawn at every reset.
    OnReset,

    /// The current value is drawn whenever
    /// [`Registry::randomize`](crate::Registry::randomize) is called.
    OnCall,
}

impl Default for Randomize {
    fn default() -> Self {
        Randomize::Never
    }
}

/// Configuration of [`ConstrainedValue`](super::ConstrainedValue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "", default)]
pub struct ConstrConfig<T: Scalar> {
    /// Name used in records and logs.
    pub name: Option<String>,

    /// Initial value.
    pub init_value: T,

    /// Upper bound.
    pub upperbound: Option<NumericSource<T>>,

    /// Lower bound.
    pub lowerbound: Option<NumericSource<T>>,

    /// Time per unit of increase.
    pub rate_add: Option<NumericSource<T>>,

    /// Time per unit of decrease.
    pub rate_sub: Option<NumericSource<T>>,

    /// Expression applied to the value at every step, with `value`, `t`,
    /// `delta_t` and `episode_delta_t` bound.
    pub func_time: Option<ExprId>,

    /// Rejects proposals while an operation or a wait is in progress.
    pub action_lock: bool,

    /// Randomization of the value.
    pub randomize: Randomize,
}

impl<T: Scalar> Default for ConstrConfig<T> {
    fn default() -> Self {
        Self {
            name: None,
            init_value: T::zero(),
            upperbound: None,
            lowerbound: None,
            rate_add: None,
            rate_sub: None,
            func_time: None,
            action_lock: false,
            randomize: Randomize::Never,
        }
    }
}

impl<T: Scalar> ConstrConfig<T> {
    /// Constructs a configuration with the given initial value and no constraints.
    pub fn new(init_value: T) -> Self {
        Self {
            init_value,
            ..Self::default()
        }
    }

    /// Sets the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the upper bound.
    pub fn upperbound(mut self, v: impl Into<NumericSource<T>>) -> Self {
        self.upperbound = Some(v.into());
        self
    }

    /// Sets the lower bound.
    pub fn lowerbound(mut self, v: impl Into<NumericSource<T>>) -> Self {
        self.lowerbound = Some(v.into());
        self
    }

    /// Sets the time per unit of increase.
    pub fn rate_add(mut self, v: impl Into<NumericSource<T>>) -> Self {
        self.rate_add = Some(v.into());
        self
    }

    /// Sets the time per unit of decrease.
    pub fn rate_sub(mut self, v: impl Into<NumericSource<T>>) -> Self {
        self.rate_sub = Some(v.into());
        self
    }

    /// Sets the expression applied at every step.
    pub fn func_time(mut self, id: ExprId) -> Self {
        self.func_time = Some(id);
        self
    }

    /// Sets the action lock.
    pub fn action_lock(mut self, v: bool) -> Self {
        self.action_lock = v;
        self
    }

    /// Sets the randomization.
    pub fn randomize(mut self, v: Randomize) -> Self {
        self.randomize = v;
        self
    }

    /// Constructs [`ConstrConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ConstrConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::ValueId;
    use tempdir::TempDir;

    #[test]
    fn test_serde_constr_config() -> Result<()> {
        let config = ConstrConfig::new(5i64)
            .name("stock")
            .upperbound(ValueId::<i64>::from_index(0))
            .lowerbound(0)
            .rate_add(2)
            .action_lock(true)
            .randomize(Randomize::OnReset);

        let dir = TempDir::new("constr_config")?;
        let path = dir.path().join("constr_config.yaml");
        println!("{:?}", path);

        config.save(&path)?;
        let config_ = ConstrConfig::<i64>::load(&path)?;
        assert_eq!(config, config_);

        let yaml = serde_yaml::to_string(&config)?;
        println!("{}", yaml);

        Ok(())
    }

    #[test]
    fn test_missing_fields_default() -> Result<()> {
        let config: ConstrConfig<f64> =
            serde_yaml::from_str("init_value: 2.5\naction_lock: true\n")?;
        assert_eq!(config, ConstrConfig::new(2.5).action_lock(true));
        Ok(())
    }
}
