//! Error kinds reported by loaders, calibrators and the driver.

use std::path::PathBuf;
use std::{error, fmt, io};

/// Errors surfaced to the caller.
///
/// Structural problems (mismatched vector sizes, empty chains) are
/// programmer errors and are handled with assertions instead.
#[derive(Debug)]
pub enum Error {
    /// An input file could not be parsed into a usable problem
    /// description.
    Load {
        /// File the problem was found in, if any.
        path: Option<PathBuf>,
        /// 1-based line number, if the problem is tied to a line.
        line: Option<usize>,
        /// What went wrong.
        reason: String,
    },
    /// A configuration value could not be parsed.
    Config {
        /// Name of the offending variable.
        name: &'static str,
        /// What went wrong.
        reason: String,
    },
    /// Step-width calibration did not converge.
    Calibration {
        /// Name of the offending parameter, when one can be singled out.
        parameter: Option<String>,
        /// What went wrong.
        reason: String,
    },
    /// An output stream or progress file could not be written.
    Io(io::Error),
}

impl Error {
    pub(crate) fn load<S: Into<String>>(reason: S) -> Self {
        Error::Load {
            path: None,
            line: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn load_at<S: Into<String>>(
        path: &std::path::Path,
        line: Option<usize>,
        reason: S,
    ) -> Self {
        Error::Load {
            path: Some(path.to_path_buf()),
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn calibration<S: Into<String>>(parameter: Option<&str>, reason: S) -> Self {
        Error::Calibration {
            parameter: parameter.map(|p| p.to_owned()),
            reason: reason.into(),
        }
    }

    /// Exit status for command-line front ends.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Load { .. } | Error::Config { .. } => 2,
            Error::Calibration { .. } => 3,
            Error::Io(_) => 4,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Load { path, line, reason } => {
                write!(f, "load failed")?;
                if let Some(path) = path {
                    write!(f, " ({})", path.display())?;
                }
                if let Some(line) = line {
                    write!(f, " at line {}", line)?;
                }
                write!(f, ": {}", reason)
            }
            Error::Config { name, reason } => {
                write!(f, "invalid configuration value {}: {}", name, reason)
            }
            Error::Calibration { parameter, reason } => {
                write!(f, "calibration failed")?;
                if let Some(parameter) = parameter {
                    write!(f, " for parameter {}", parameter)?;
                }
                write!(f, ": {}", reason)
            }
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_display_names_parameter() {
        let e = Error::calibration(Some("phase"), "step width became too large");
        let msg = format!("{}", e);
        assert!(msg.contains("phase"));
        assert!(msg.contains("too large"));
    }

    #[test]
    fn load_display_carries_the_location() {
        let e = Error::load_at(std::path::Path::new("params.txt"), Some(3), "not a number");
        let msg = format!("{}", e);
        assert!(msg.contains("params.txt"));
        assert!(msg.contains("line 3"));
    }

    #[test]
    fn exit_codes_are_nonzero() {
        assert_ne!(Error::load("bad").exit_code(), 0);
        assert_ne!(Error::calibration(None, "limit").exit_code(), 0);
        assert_ne!(Error::from(io::Error::new(io::ErrorKind::Other, "x")).exit_code(), 0);
    }
}
