//! Configuration of [`ValueTransfer`](super::ValueTransfer).
use crate::{
    registry::{ExprId, ValueId},
    NumericSource, Scalar,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`ValueTransfer`](super::ValueTransfer).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TransferConfig<T: Scalar> {
    /// Nominal amount taken from the source at every call.
    pub amount: NumericSource<T>,

    /// Source of the transfer.
    pub from: ValueId<T>,

    /// Destination of the transfer.
    pub to: ValueId<T>,

    /// Maps a destination amount `y` into source units.
    #[serde(default)]
    pub from_func: Option<ExprId>,

    /// Maps a source amount `x` into destination units.
    #[serde(default)]
    pub to_func: Option<ExprId>,
}

impl<T: Scalar> TransferConfig<T> {
    /// Transfers `amount` from `from` to `to` without conversion.
    pub fn new(amount: impl Into<NumericSource<T>>, from: ValueId<T>, to: ValueId<T>) -> Self {
        Self {
            amount: amount.into(),
            from,
            to,
            from_func: None,
            to_func: None,
        }
    }

    /// Sets the conversion into source units.
    pub fn from_func(mut self, id: ExprId) -> Self {
        self.from_func = Some(id);
        self
    }

    /// Sets the conversion into destination units.
    pub fn to_func(mut self, id: ExprId) -> Self {
        self.to_func = Some(id);
        self
    }

    /// Constructs [`TransferConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TransferConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
