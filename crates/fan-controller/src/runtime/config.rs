use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub config_path: Option<PathBuf>,
    pub simulate: bool,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub debug: bool,
    pub run_seconds: Option<u64>,
    /// Arguments that were not understood; reported once logging is up.
    pub ignored_args: Vec<String>,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    if i + 1 < args.len() {
                        cfg.config_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--simulate" => {
                    cfg.simulate = true;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    if i + 1 < args.len() {
                        cfg.log_dir = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--debug" => {
                    cfg.debug = true;
                }
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "-h" | "--help" => {
                    cfg.show_help = true;
                }
                other => cfg.ignored_args.push(other.to_string()),
            }
            i += 1;
        }
        cfg
    }

    pub fn print_help() {
        println!(
            r#"fan-controller - temperature driven fan speed controller

USAGE:
    fan-controller [OPTIONS]

OPTIONS:
    --config <PATH>         JSON settings file (PascalCase keys, e.g. MinTemp)
    --simulate              Run against a simulated fan instead of sysfs hardware
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <DIR>         Also write logs to a daily rolling file in DIR
    --debug                 Enable debug logging for the fan crates
    --run-seconds <SECS>    Run for a fixed duration then exit
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Log filter, overrides --debug (e.g. info,fan_core=trace)

EXIT STATUS:
    0 on a clean stop, 1 on invalid settings, missing hardware or a crash
      (the fan is left at maximum speed after a crash)
"#
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("fan-controller")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_all_flags() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--config",
            "/etc/fan.json",
            "--simulate",
            "--json-logs",
            "--log-dir",
            "/var/log/fan",
            "--debug",
            "--run-seconds",
            "30",
        ]));
        assert_eq!(cfg.config_path, Some(PathBuf::from("/etc/fan.json")));
        assert!(cfg.simulate && cfg.json_logs && cfg.debug);
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/var/log/fan")));
        assert_eq!(cfg.run_seconds, Some(30));
        assert!(!cfg.show_help);
        assert!(cfg.ignored_args.is_empty());
    }

    #[test]
    fn collects_unknown_arguments() {
        let cfg = RuntimeConfig::from_args(&args(&["--bogus", "-h"]));
        assert!(cfg.show_help);
        assert_eq!(cfg.ignored_args, vec!["--bogus".to_string()]);
    }

    #[test]
    fn bad_duration_runs_unbounded() {
        let cfg = RuntimeConfig::from_args(&args(&["--run-seconds", "soon"]));
        assert_eq!(cfg.run_seconds, None);
    }
}
