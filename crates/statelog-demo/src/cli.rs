#![forbid(unsafe_code)]

//! Command-line argument parsing for the demo.
//!
//! Parsed by hand. `STATELOG_DEMO_*` environment variables set defaults;
//! explicit flags override them.

use std::env;
use std::path::PathBuf;
use std::process;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default dashboard width in cells.
pub const DEFAULT_WIDTH: usize = 48;

const HELP_TEXT: &str = "\
statelog demo: a counter and a todo list watched by the state dashboard

USAGE:
    statelog-demo [OPTIONS]

OPTIONS:
    --script             Run a fixed sequence of steps and print the dashboard after each
    --width=N            Dashboard width in cells (default: 48)
    --state-file=PATH    Where the panel position is kept (default: .statelog-demo.json)
    --help, -h           Show this help message
    --version, -V        Show version

KEYBINDINGS:
    + / -                 Change the counter
    a / d                 Add / remove a todo
    t                     Mount or unmount the todo list
    Alt+arrows            Move the dashboard
    Ctrl+Shift+S          Toggle the dashboard
    Esc                   Hide the dashboard
    q / Ctrl+C            Quit

ENVIRONMENT VARIABLES:
    STATELOG_DEMO_WIDTH       Override --width
    STATELOG_DEMO_STATE_FILE  Override --state-file
    STATELOG_ATTRIBUTION      backtrace | caller | off
    STATELOG_KEY_POLICY       name | scoped
    STATELOG_SKIP_FRAMES      Extra frames skipped by backtrace attribution
    STATELOG_LOG              Log filter (default: warn)";

/// Parsed command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opts {
    /// Scripted, non-interactive run.
    pub script: bool,
    /// Dashboard width in cells.
    pub width: usize,
    /// Position store for interactive runs.
    pub state_file: PathBuf,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            script: false,
            width: DEFAULT_WIDTH,
            state_file: PathBuf::from(".statelog-demo.json"),
        }
    }
}

/// Why argument parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    Help,
    Version,
    InvalidValue { flag: &'static str, value: String },
    UnknownArg(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Help => f.write_str("help requested"),
            Self::Version => f.write_str("version requested"),
            Self::InvalidValue { flag, value } => write!(f, "invalid {flag} value: {value}"),
            Self::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl Opts {
    /// Parse the process arguments and environment, exiting on `--help`,
    /// `--version`, or bad input.
    pub fn parse() -> Self {
        match Self::parse_from_env_and_args(env::args().skip(1), |key| env::var(key).ok()) {
            Ok(opts) => opts,
            Err(CliError::Help) => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            Err(CliError::Version) => {
                println!("statelog-demo {VERSION}");
                process::exit(0);
            }
            Err(err) => {
                eprintln!("{err}");
                eprintln!("Run with --help for usage information.");
                process::exit(2);
            }
        }
    }

    pub fn parse_from_env_and_args<I, S, F>(args: I, get_env: F) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        if let Some(val) = get_env("STATELOG_DEMO_WIDTH")
            && let Ok(n) = val.trim().parse::<usize>()
            && n > 0
        {
            opts.width = n;
        }
        if let Some(val) = get_env("STATELOG_DEMO_STATE_FILE")
            && !val.trim().is_empty()
        {
            opts.state_file = PathBuf::from(val);
        }

        for arg in args {
            match arg.as_ref() {
                "--help" | "-h" => return Err(CliError::Help),
                "--version" | "-V" => return Err(CliError::Version),
                "--script" => opts.script = true,
                other => {
                    if let Some(val) = other.strip_prefix("--width=") {
                        match val.parse::<usize>() {
                            Ok(n) if n > 0 => opts.width = n,
                            _ => {
                                return Err(CliError::InvalidValue {
                                    flag: "--width",
                                    value: val.to_string(),
                                });
                            }
                        }
                    } else if let Some(val) = other.strip_prefix("--state-file=") {
                        if val.is_empty() {
                            return Err(CliError::InvalidValue {
                                flag: "--state-file",
                                value: String::new(),
                            });
                        }
                        opts.state_file = PathBuf::from(val);
                    } else {
                        return Err(CliError::UnknownArg(other.to_string()));
                    }
                }
            }
        }
        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse_with_env(args: &[&str], env_pairs: &[(&'static str, &'static str)]) -> Result<Opts, CliError> {
        let map: HashMap<&str, &str> = env_pairs.iter().copied().collect();
        Opts::parse_from_env_and_args(args.iter().copied(), |key| map.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn defaults() {
        let opts = parse_with_env(&[], &[]).unwrap();
        assert_eq!(opts, Opts::default());
        assert_eq!(opts.width, DEFAULT_WIDTH);
        assert!(!opts.script);
    }

    #[test]
    fn help_and_version() {
        assert_eq!(parse_with_env(&["--help"], &[]), Err(CliError::Help));
        assert_eq!(parse_with_env(&["-V"], &[]), Err(CliError::Version));
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn help_text_lists_dashboard_keys_and_env() {
        assert!(HELP_TEXT.contains("Ctrl+Shift+S"));
        assert!(HELP_TEXT.contains("STATELOG_DEMO_WIDTH"));
        assert!(HELP_TEXT.contains("--script"));
    }

    #[test]
    fn env_sets_defaults_and_flags_override() {
        let opts = parse_with_env(&[], &[("STATELOG_DEMO_WIDTH", "30")]).unwrap();
        assert_eq!(opts.width, 30);
        let opts = parse_with_env(&["--width=70"], &[("STATELOG_DEMO_WIDTH", "30")]).unwrap();
        assert_eq!(opts.width, 70);
    }

    #[test]
    fn bad_env_width_is_ignored() {
        let opts = parse_with_env(&[], &[("STATELOG_DEMO_WIDTH", "wide")]).unwrap();
        assert_eq!(opts.width, DEFAULT_WIDTH);
        let opts = parse_with_env(&[], &[("STATELOG_DEMO_WIDTH", "0")]).unwrap();
        assert_eq!(opts.width, DEFAULT_WIDTH);
    }

    #[test]
    fn invalid_width_reports_flag() {
        let err = parse_with_env(&["--width=0"], &[]).unwrap_err();
        assert_eq!(
            err,
            CliError::InvalidValue {
                flag: "--width",
                value: "0".into()
            }
        );
        assert_eq!(err.to_string(), "invalid --width value: 0");
    }

    #[test]
    fn state_file_flag() {
        let opts = parse_with_env(&["--script", "--state-file=/tmp/ui.json"], &[]).unwrap();
        assert!(opts.script);
        assert_eq!(opts.state_file, PathBuf::from("/tmp/ui.json"));
    }

    #[test]
    fn unknown_arg() {
        assert_eq!(
            parse_with_env(&["--frobnicate"], &[]),
            Err(CliError::UnknownArg("--frobnicate".into()))
        );
    }
}
