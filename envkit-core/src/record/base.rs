//! Key-value container of recorded values.
use crate::error::EnvkitError;
use std::collections::HashMap;

/// Possible types of values in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single number, such as the value of a module.
    Scalar(f64),

    /// A 1-dimensional array, such as error flags.
    Array1(Vec<f64>),
}

/// Recorded values keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Inserts a key-value pair; an existing value of the key is overwritten.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Gets a reference to the value associated with the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Gets a scalar value from the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not exist or the value is not a scalar.
    pub fn get_scalar(&self, k: &str) -> Result<f64, EnvkitError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(EnvkitError::RecordValueTypeError("Scalar".to_string())),
            None => Err(EnvkitError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a 1-dimensional array from the record.
    pub fn get_array1(&self, k: &str) -> Result<Vec<f64>, EnvkitError> {
        match self.0.get(k) {
            Some(RecordValue::Array1(v)) => Ok(v.clone()),
            Some(_) => Err(EnvkitError::RecordValueTypeError("Array1".to_string())),
            None => Err(EnvkitError::RecordKeyError(k.to_string())),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_insert_overwrites_key() {
        let mut record = Record::empty();
        assert!(record.is_empty());
        record.insert("x", RecordValue::Scalar(1.0));
        record.insert("x/errors", RecordValue::Array1(vec![0.0, 1.0]));
        record.insert("x", RecordValue::Scalar(2.0));
        assert_eq!(record.len(), 2);
        assert_eq!(record.get_scalar("x").unwrap(), 2.0);
        assert_eq!(record.get_array1("x/errors").unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_typed_getters_report_errors() {
        let mut record = Record::empty();
        record.insert("x", RecordValue::Scalar(1.0));
        assert_eq!(
            record.get_array1("x"),
            Err(EnvkitError::RecordValueTypeError("Array1".into()))
        );
        assert_eq!(
            record.get_scalar("y"),
            Err(EnvkitError::RecordKeyError("y".into()))
        );
        assert_eq!(record.get("y"), None);
    }
}
