//! Sample streams and probability dumps.
//!
//! During analysis the cold chain's parameters are appended to one text
//! stream per parameter, one value per line. The log-probability of
//! every appended sample is kept so the recent history can be dumped on
//! request (and the full history at the end of a run).

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use nalgebra::DVector;
use rand::Rng;

use crate::chain::{Chain, Extension};
use crate::error::Error;

/// File suffix of per-parameter sample streams.
const SAMPLES_SUFFIX: &str = "samples";

/// File name of the probability dump.
const PROB_DUMP_NAME: &str = "prob.dump";

/// Collects cold-chain samples into files and/or memory.
pub struct SampleWriter {
    streams: Vec<BufWriter<File>>,
    prob_history: Vec<f64>,
    samples: Option<Vec<DVector<f64>>>,
    dir: Option<PathBuf>,
}

impl SampleWriter {
    /// Open one append-mode stream per parameter under `dir`. With no
    /// directory, only in-memory collection (if requested) happens.
    pub fn new(dir: Option<&Path>, names: &[String], keep_samples: bool) -> Result<Self, Error> {
        let mut streams = Vec::new();
        if let Some(dir) = dir {
            fs::create_dir_all(dir)?;
            for name in names {
                let path = dir.join(format!("{}.{}", name, SAMPLES_SUFFIX));
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                streams.push(BufWriter::new(file));
            }
        }
        Ok(SampleWriter {
            streams,
            prob_history: Vec::new(),
            samples: if keep_samples { Some(Vec::new()) } else { None },
            dir: dir.map(|d| d.to_path_buf()),
        })
    }

    /// Append the chain's current parameters and log-probability.
    pub fn append<R: Rng, X: Extension>(&mut self, chain: &Chain<R, X>) -> Result<(), Error> {
        for (stream, value) in self.streams.iter_mut().zip(chain.params().iter()) {
            writeln!(stream, "{:e}", value)?;
        }
        self.prob_history.push(chain.prob());
        if let Some(samples) = self.samples.as_mut() {
            samples.push(chain.params().clone());
        }
        Ok(())
    }

    /// Flush all sample streams.
    pub fn flush(&mut self) -> Result<(), Error> {
        for stream in self.streams.iter_mut() {
            stream.flush()?;
        }
        Ok(())
    }

    /// Write the last `last` recorded probabilities (all of them with
    /// `None`) to the dump file, replacing any previous dump.
    pub fn dump_probabilities(&mut self, last: Option<usize>) -> Result<(), Error> {
        let dir = match &self.dir {
            Some(dir) => dir,
            None => {
                debug!(
                    "no output directory, holding {} probabilities in memory",
                    self.prob_history.len()
                );
                return Ok(());
            }
        };
        let start = match last {
            Some(n) if n < self.prob_history.len() => self.prob_history.len() - n,
            _ => 0,
        };
        let path = dir.join(PROB_DUMP_NAME);
        let mut file = BufWriter::new(File::create(&path)?);
        for prob in &self.prob_history[start..] {
            writeln!(file, "{:e}", prob)?;
        }
        file.flush()?;
        info!(
            "dumped {} probabilities to {}",
            self.prob_history.len() - start,
            path.display()
        );
        Ok(())
    }

    /// Hand out the in-memory samples, if collection was requested.
    pub fn take_samples(&mut self) -> Option<Vec<DVector<f64>>> {
        self.samples.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::io::{ParamSpec, Problem};
    use nalgebra::DMatrix;
    use std::fs;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ptmcmc-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn toy_chain() -> Chain {
        let problem = Problem::new(
            vec![
                ParamSpec::new("a", -1.0, 1.0, 0.25, 0.1),
                ParamSpec::new("b", 0.0, 10.0, 5.0, 0.5),
            ],
            DMatrix::zeros(1, 2),
        )
        .unwrap();
        Chain::from_problem(&problem, 4)
    }

    #[test]
    fn streams_get_one_value_per_line() {
        let dir = scratch_dir("streams");
        let mut chain = toy_chain();
        let names = vec!["a".to_owned(), "b".to_owned()];
        let mut writer = SampleWriter::new(Some(&dir), &names, false).unwrap();

        chain.set_prob(-1.0);
        writer.append(&chain).unwrap();
        writer.append(&chain).unwrap();
        writer.flush().unwrap();

        let content = fs::read_to_string(dir.join("a.samples")).unwrap();
        assert!(content.ends_with('\n'));
        let values: Vec<f64> = content.lines().map(|l| l.parse().unwrap()).collect();
        assert_eq!(values, vec![0.25, 0.25]);

        let content = fs::read_to_string(dir.join("b.samples")).unwrap();
        assert_eq!(content.lines().count(), 2);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn probability_dump_keeps_only_the_tail() {
        let dir = scratch_dir("probdump");
        let mut chain = toy_chain();
        let names = vec!["a".to_owned(), "b".to_owned()];
        let mut writer = SampleWriter::new(Some(&dir), &names, false).unwrap();

        for i in 0..5 {
            chain.set_prob(-(i as f64));
            writer.append(&chain).unwrap();
        }
        writer.dump_probabilities(Some(2)).unwrap();

        let content = fs::read_to_string(dir.join("prob.dump")).unwrap();
        let values: Vec<f64> = content.lines().map(|l| l.parse().unwrap()).collect();
        assert_eq!(values, vec![-3.0, -4.0]);

        writer.dump_probabilities(None).unwrap();
        let content = fs::read_to_string(dir.join("prob.dump")).unwrap();
        assert_eq!(content.lines().count(), 5);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn memory_collection_is_optional() {
        let mut chain = toy_chain();
        let mut writer = SampleWriter::new(None, &[], true).unwrap();
        writer.append(&chain).unwrap();
        chain.set_param(0, 0.5);
        writer.append(&chain).unwrap();

        let samples = writer.take_samples().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1][0], 0.5);

        let mut writer = SampleWriter::new(None, &[], false).unwrap();
        writer.append(&chain).unwrap();
        assert!(writer.take_samples().is_none());
    }
}
