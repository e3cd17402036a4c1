// SPDX-License-Identifier: MIT
//
// Session configuration from the command line.

use std::path::PathBuf;
use std::time::Duration;

use n_comp::{BoundsPolicy, CompositorConfig};

pub const USAGE: &str = "\
usage: n-wm [--strict] [--log <path>] [--tick-ms <ms>]

  --strict         refuse windows that leave the desk instead of clipping them
  --log <path>     write tracing output to <path> (filter with N_WM_LOG)
  --tick-ms <ms>   clock tick for window updates (default 250)
  -h, --help       show this help

keys: Tab focus  hjkl move  HJKL size  n new  x close  Ctrl-L redraw  q quit";

const DEFAULT_TICK_MS: u64 = 250;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("help requested")]
    Help,
    #[error("unknown argument {0:?}")]
    Unknown(String),
    #[error("{0} needs a value")]
    MissingValue(&'static str),
    #[error("invalid tick {0:?}: expected milliseconds between 1 and 10000")]
    BadTick(String),
}

/// Everything a session needs to know before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub strict: bool,
    pub log: Option<PathBuf>,
    pub tick: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strict: false,
            log: None,
            tick: Duration::from_millis(DEFAULT_TICK_MS),
        }
    }
}

impl SessionConfig {
    /// Parse arguments, program name excluded.
    pub fn from_args<I>(args: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Err(ArgsError::Help),
                "--strict" => config.strict = true,
                "--log" => {
                    let path = args.next().ok_or(ArgsError::MissingValue("--log"))?;
                    config.log = Some(PathBuf::from(path));
                }
                "--tick-ms" => {
                    let value = args.next().ok_or(ArgsError::MissingValue("--tick-ms"))?;
                    let ms = value
                        .parse::<u64>()
                        .ok()
                        .filter(|ms| (1..=10_000).contains(ms))
                        .ok_or_else(|| ArgsError::BadTick(value.clone()))?;
                    config.tick = Duration::from_millis(ms);
                }
                _ => return Err(ArgsError::Unknown(arg)),
            }
        }
        Ok(config)
    }

    /// The compositor settings this session runs with.
    pub fn compositor(&self) -> CompositorConfig {
        let bounds = if self.strict {
            BoundsPolicy::Strict
        } else {
            BoundsPolicy::Permissive
        };
        CompositorConfig::default().with_bounds(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Result<SessionConfig, ArgsError> {
        SessionConfig::from_args(args.iter().map(|s| (*s).to_owned()))
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert!(!config.compositor().bounds.is_strict());
    }

    #[test]
    fn all_flags() {
        let config = parse(&["--strict", "--log", "/tmp/n-wm.log", "--tick-ms", "40"]).unwrap();
        assert!(config.strict);
        assert!(config.compositor().bounds.is_strict());
        assert_eq!(config.log, Some(PathBuf::from("/tmp/n-wm.log")));
        assert_eq!(config.tick, Duration::from_millis(40));
    }

    #[test]
    fn errors() {
        assert_eq!(parse(&["--help"]), Err(ArgsError::Help));
        assert_eq!(parse(&["--log"]), Err(ArgsError::MissingValue("--log")));
        assert_eq!(parse(&["--tick-ms", "0"]), Err(ArgsError::BadTick("0".into())));
        assert_eq!(parse(&["--tick-ms", "soon"]), Err(ArgsError::BadTick("soon".into())));
        assert_eq!(parse(&["--verbose"]), Err(ArgsError::Unknown("--verbose".into())));
    }
}
