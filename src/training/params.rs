//! Hyperparameter grids and assignments

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    String(String),
}

impl ParamValue {
    /// Get as float (integers are widened)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::String(_) => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

/// One concrete assignment of hyperparameters, in grid axis order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    values: Vec<(String, ParamValue)>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a value, replacing an existing one with the same name
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            return write!(f, "{{defaults}}");
        }
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Typed accessors used by the regressor configs when applying a `ParamSet`
pub(crate) fn expect_float(name: &str, value: &ParamValue) -> Result<f64> {
    value
        .as_float()
        .ok_or_else(|| ModelError::invalid_parameter(name, value, "expected a number"))
}

pub(crate) fn expect_usize(name: &str, value: &ParamValue) -> Result<usize> {
    match value.as_int() {
        Some(v) if v >= 0 => Ok(v as usize),
        _ => Err(ModelError::invalid_parameter(
            name,
            value,
            "expected a non-negative integer",
        )),
    }
}

pub(crate) fn expect_str<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| ModelError::invalid_parameter(name, value, "expected a string"))
}

pub(crate) fn unknown_param(algorithm: &str, name: &str, value: &ParamValue) -> ModelError {
    ModelError::invalid_parameter(name, value, format!("not a hyperparameter of {}", algorithm))
}

/// Ordered hyperparameter search space: each axis is a name with candidate values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    /// Empty grid: a single fit with default hyperparameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: append an axis
    pub fn axis<V: Into<ParamValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.axes
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn axes(&self) -> impl Iterator<Item = (&str, &[ParamValue])> {
        self.axes.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Number of candidate assignments
    pub fn n_candidates(&self) -> usize {
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    /// Reject axes without candidates and repeated axis names
    pub fn validate(&self) -> Result<()> {
        for (i, (name, values)) in self.axes.iter().enumerate() {
            if values.is_empty() {
                return Err(ModelError::invalid_parameter(
                    name.as_str(),
                    "[]",
                    "grid axis has no candidate values",
                ));
            }
            if self.axes[..i].iter().any(|(n, _)| n == name) {
                return Err(ModelError::invalid_parameter(
                    name.as_str(),
                    "",
                    "grid axis listed twice",
                ));
            }
        }
        Ok(())
    }

    /// Cross product of all axes; the last axis varies fastest.
    /// An empty grid yields exactly one empty assignment.
    pub fn combinations(&self) -> Result<Vec<ParamSet>> {
        self.validate()?;

        let mut combos = vec![ParamSet::new()];
        for (name, values) in &self.axes {
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for base in &combos {
                for value in values {
                    let mut set = base.clone();
                    set.insert(name.clone(), value.clone());
                    next.push(set);
                }
            }
            combos = next;
        }
        Ok(combos)
    }
}

impl fmt::Display for ParamGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.axes.is_empty() {
            return write!(f, "(defaults)");
        }
        for (i, (name, values)) in self.axes.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            write!(f, "{} [{}]", name, rendered.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_grid_single_combination() {
        let grid = ParamGrid::new();
        let combos = grid.combinations().unwrap();
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());
        assert_eq!(grid.n_candidates(), 1);
    }

    #[test]
    fn test_cross_product_last_axis_fastest() {
        let grid = ParamGrid::new()
            .axis("learning_rate", [0.1, 0.01])
            .axis("n_estimators", [8usize, 16, 32]);

        let combos = grid.combinations().unwrap();
        assert_eq!(combos.len(), 6);
        assert_eq!(grid.n_candidates(), 6);

        assert_eq!(combos[0].get("learning_rate"), Some(&ParamValue::Float(0.1)));
        assert_eq!(combos[0].get("n_estimators"), Some(&ParamValue::Int(8)));
        assert_eq!(combos[1].get("n_estimators"), Some(&ParamValue::Int(16)));
        assert_eq!(combos[3].get("learning_rate"), Some(&ParamValue::Float(0.01)));
        assert_eq!(combos[3].get("n_estimators"), Some(&ParamValue::Int(8)));
    }

    #[test]
    fn test_empty_axis_rejected() {
        let grid = ParamGrid::new().axis("n_neighbors", Vec::<usize>::new());
        assert!(matches!(
            grid.combinations(),
            Err(ModelError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_duplicate_axis_rejected() {
        let grid = ParamGrid::new()
            .axis("n_neighbors", [5usize])
            .axis("n_neighbors", [7usize]);
        assert!(grid.validate().is_err());
    }

    #[test]
    fn test_param_set_display_and_replace() {
        let set = ParamSet::new()
            .with("criterion", "poisson")
            .with("max_depth", 3usize)
            .with("max_depth", 4usize);
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_string(), "{criterion=poisson, max_depth=4}");
        assert_eq!(ParamSet::new().to_string(), "{defaults}");
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(expect_float("lr", &ParamValue::Int(1)).unwrap(), 1.0);
        assert!(expect_usize("k", &ParamValue::Int(-1)).is_err());
        assert!(expect_usize("k", &ParamValue::Float(3.0)).is_err());
        assert_eq!(expect_str("c", &"mse".into()).unwrap(), "mse");
    }
}
