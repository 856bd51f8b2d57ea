//! Input loading.
//!
//! Two files describe a fitting problem: a parameters file declaring
//! one parameter per line as
//!
//! ```text
//! # name   min   max   initial   step
//! amplitude  0.0  5.0  1.0  0.1
//! ```
//!
//! and a whitespace-separated numeric data file with at least two
//! columns (x, y, ...). Lines starting with `#` and blank lines are
//! ignored in both.

use std::fs;
use std::path::Path;

use nalgebra::DMatrix;

use crate::error::Error;

/// Declaration of one free parameter.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct ParamSpec {
    pub name: String,
    /// Inclusive lower prior bound.
    pub min: f64,
    /// Inclusive upper prior bound.
    pub max: f64,
    /// Starting value.
    pub init: f64,
    /// Starting proposal step width.
    pub step: f64,
    /// Whether the domain wraps around.
    pub circular: bool,
}

impl ParamSpec {
    pub fn new<S: Into<String>>(name: S, min: f64, max: f64, init: f64, step: f64) -> Self {
        ParamSpec {
            name: name.into(),
            min,
            max,
            init,
            step,
            circular: false,
        }
    }

    pub fn circular(mut self) -> Self {
        self.circular = true;
        self
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(format!("bounds of {} are not finite", self.name));
        }
        if self.min >= self.max {
            return Err(format!("empty prior interval for {}", self.name));
        }
        if !(self.init >= self.min && self.init <= self.max) {
            return Err(format!("starting value of {} is out of bounds", self.name));
        }
        if !(self.step > 0.0) {
            return Err(format!("step width of {} must be positive", self.name));
        }
        Ok(())
    }
}

/// A fitting problem: parameter declarations plus observations.
#[derive(Clone, Debug)]
pub struct Problem {
    pub params: Vec<ParamSpec>,
    /// Observation matrix, rows are samples, columns are x, y, ...
    pub data: DMatrix<f64>,
}

impl Problem {
    /// Bundle parameter declarations and data, validating both.
    pub fn new(params: Vec<ParamSpec>, data: DMatrix<f64>) -> Result<Self, Error> {
        if params.is_empty() {
            return Err(Error::load("no parameters declared"));
        }
        for spec in &params {
            spec.validate().map_err(Error::load)?;
        }
        if data.nrows() == 0 {
            return Err(Error::load("data is empty"));
        }
        if data.ncols() < 2 {
            return Err(Error::load("data needs at least two columns"));
        }
        Ok(Problem { params, data })
    }

    /// Load a problem from a parameters file and a data file.
    pub fn load(params_path: &Path, data_path: &Path) -> Result<Self, Error> {
        let raw = fs::read_to_string(params_path)
            .map_err(|e| Error::load_at(params_path, None, format!("{}", e)))?;
        let params = parse_params(&raw).map_err(|(line, reason)| {
            Error::load_at(params_path, Some(line), reason)
        })?;

        let raw = fs::read_to_string(data_path)
            .map_err(|e| Error::load_at(data_path, None, format!("{}", e)))?;
        let data = parse_data(&raw)
            .map_err(|(line, reason)| Error::load_at(data_path, Some(line), reason))?;

        Problem::new(params, data)
    }

    pub fn n_par(&self) -> usize {
        self.params.len()
    }

    /// Mark parameters as circular by their 1-based indices.
    pub fn mark_circular(&mut self, indices: &[usize]) -> Result<(), Error> {
        for &index in indices {
            if index == 0 || index > self.params.len() {
                return Err(Error::load(format!(
                    "circular parameter index {} out of range (1..={})",
                    index,
                    self.params.len()
                )));
            }
            self.params[index - 1].circular = true;
        }
        Ok(())
    }
}

fn content_lines(raw: &str) -> impl Iterator<Item = (usize, &str)> {
    raw.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn parse_params(raw: &str) -> Result<Vec<ParamSpec>, (usize, String)> {
    let mut params = Vec::new();
    for (lineno, line) in content_lines(raw) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err((
                lineno,
                format!("expected `name min max initial step`, got {} fields", fields.len()),
            ));
        }
        let number = |field: &str| -> Result<f64, (usize, String)> {
            field
                .parse()
                .map_err(|_| (lineno, format!("not a number: {:?}", field)))
        };
        params.push(ParamSpec::new(
            fields[0],
            number(fields[1])?,
            number(fields[2])?,
            number(fields[3])?,
            number(fields[4])?,
        ));
    }
    Ok(params)
}

fn parse_data(raw: &str) -> Result<DMatrix<f64>, (usize, String)> {
    let mut values: Vec<f64> = Vec::new();
    let mut ncols = 0;
    let mut nrows = 0;
    for (lineno, line) in content_lines(raw) {
        let mut row = 0;
        for field in line.split_whitespace() {
            let value: f64 = field
                .parse()
                .map_err(|_| (lineno, format!("not a number: {:?}", field)))?;
            values.push(value);
            row += 1;
        }
        if ncols == 0 {
            ncols = row;
        } else if row != ncols {
            return Err((
                lineno,
                format!("expected {} columns, got {}", ncols, row),
            ));
        }
        nrows += 1;
    }
    if nrows == 0 {
        return Err((0, "data is empty".to_owned()));
    }
    Ok(DMatrix::from_row_slice(nrows, ncols, &values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_file_round_trip() {
        let raw = "# a comment\n\
                   amplitude 0.0 5.0 1.0 0.1\n\
                   \n\
                   phase 0 6.283 0.0 0.3\n";
        let params = parse_params(raw).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "amplitude");
        assert_eq!(params[1].max, 6.283);
        assert!(!params[1].circular);
    }

    #[test]
    fn params_file_rejects_malformed_lines() {
        let err = parse_params("amplitude 0.0 5.0 1.0\n").unwrap_err();
        assert_eq!(err.0, 1);

        let err = parse_params("amplitude 0.0 nan? 1.0 0.1\n").unwrap_err();
        assert!(err.1.contains("nan?"));
    }

    #[test]
    fn data_parses_into_matrix() {
        let data = parse_data("0.0 1.0\n0.1 0.8\n0.2 0.4\n").unwrap();
        assert_eq!(data.nrows(), 3);
        assert_eq!(data.ncols(), 2);
        assert_eq!(data[(1, 1)], 0.8);
    }

    #[test]
    fn data_rejects_ragged_rows() {
        assert!(parse_data("0.0 1.0\n0.1\n").is_err());
    }

    #[test]
    fn problem_validates_bounds() {
        let data = DMatrix::zeros(1, 2);
        assert!(Problem::new(vec![ParamSpec::new("x", 1.0, 1.0, 1.0, 0.1)], data.clone()).is_err());
        assert!(Problem::new(
            vec![ParamSpec::new("x", 0.0, 1.0, 2.0, 0.1)],
            data.clone()
        )
        .is_err());
        assert!(Problem::new(
            vec![ParamSpec::new("x", 0.0, 1.0, 0.5, 0.0)],
            data.clone()
        )
        .is_err());
        assert!(Problem::new(vec![], data).is_err());
    }

    #[test]
    fn problem_rejects_narrow_data() {
        let err = Problem::new(
            vec![ParamSpec::new("x", 0.0, 1.0, 0.5, 0.1)],
            DMatrix::zeros(3, 1),
        );
        assert!(err.is_err());
    }

    #[test]
    fn circular_marking_is_one_based() {
        let mut problem = Problem::new(
            vec![
                ParamSpec::new("a", 0.0, 1.0, 0.5, 0.1),
                ParamSpec::new("phi", 0.0, 6.283, 0.0, 0.3),
            ],
            DMatrix::zeros(1, 2),
        )
        .unwrap();
        problem.mark_circular(&[2]).unwrap();
        assert!(!problem.params[0].circular);
        assert!(problem.params[1].circular);
        assert!(problem.mark_circular(&[3]).is_err());
    }
}
