use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::store::StoreConfig;

/// OSB Aggregator - hierarchical averaging of OpenSearch Benchmark results
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,

    #[clap(flatten)]
    pub store: StoreArgs,

    /// Verbose output
    #[clap(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Also write logs (without color) to this file
    #[clap(long, global = true)]
    pub log_file: Option<PathBuf>,
}

/// Aggregation level to run
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Average one test execution across its load-generator hosts
    Nodes {
        /// Test-execution id, or a wildcard pattern such as `8-clients-*`
        #[clap(long)]
        id: String,

        /// Output name; results go to `<NAME>-averaged.json`
        #[clap(short = 'o', long)]
        output_name: String,
    },

    /// Mean and RSD across the rounds of one test configuration
    Rounds {
        /// Wildcard pattern matching every round, e.g. `big5-8-clients-*`
        #[clap(short = 'p', long, conflicts_with = "test_ids")]
        test_id_pattern: Option<String>,

        /// Comma-separated list of test-execution ids
        #[clap(short = 't', long, value_delimiter = ',', num_args = 1..)]
        test_ids: Option<Vec<String>>,

        /// Output name; results go to `<NAME>.json`
        #[clap(short = 'o', long)]
        output_name: String,

        /// Show latency. Default: False
        #[clap(short = 'l', long, default_value_t = false)]
        latency: bool,
    },

    /// Aggregate the persisted round results found in a folder
    CrossPattern {
        /// Folder holding `<name>-<run>.json` result files
        #[clap(short = 'f', long)]
        folder: PathBuf,

        /// Output name; results go to `<NAME>.json`
        #[clap(short = 'o', long)]
        output_name: String,

        /// Show latency. Default: False
        #[clap(short = 'l', long, default_value_t = false)]
        latency: bool,
    },
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Nodes { id, .. } => write!(f, "Node-level aggregation of '{}'", id),
            Command::Rounds {
                test_id_pattern: Some(pattern),
                ..
            } => write!(f, "Round-level aggregation of '{}'", pattern),
            Command::Rounds { test_ids, .. } => write!(
                f,
                "Round-level aggregation of {} test executions",
                test_ids.as_ref().map_or(0, Vec::len)
            ),
            Command::CrossPattern { folder, .. } => {
                write!(f, "Cross-pattern aggregation of {}", folder.display())
            }
        }
    }
}

/// Metrics data store connection options
#[derive(ClapArgs, Debug, Clone)]
pub struct StoreArgs {
    /// Metrics store host name or URL
    #[clap(long, env = "MDS_HOST", global = true, help_heading = "Metrics Store")]
    pub host: Option<String>,

    /// Metrics store port
    #[clap(long, global = true, default_value_t = crate::defaults::STORE_PORT, help_heading = "Metrics Store")]
    pub port: u16,

    /// Basic-auth user name
    #[clap(long, env = "MDS_USERNAME", global = true, help_heading = "Metrics Store")]
    pub username: Option<String>,

    /// Basic-auth password
    #[clap(long, env = "MDS_PASSWORD", hide_env_values = true, global = true, help_heading = "Metrics Store")]
    pub password: Option<String>,

    /// Index pattern holding benchmark results
    #[clap(long, global = true, default_value = crate::defaults::INDEX_PATTERN, help_heading = "Metrics Store")]
    pub index_pattern: String,

    /// Maximum documents returned per query
    #[clap(long, global = true, default_value_t = crate::defaults::MAX_RESULTS, help_heading = "Metrics Store")]
    pub max_results: usize,

    /// Request timeout (e.g. 500ms, 30s, 2m)
    #[clap(long, global = true, value_parser = parse_duration, default_value = "30s", help_heading = "Metrics Store")]
    pub timeout: Duration,

    /// Skip TLS certificate verification
    #[clap(long, global = true, default_value_t = false, help_heading = "Metrics Store")]
    pub insecure: bool,
}

impl TryFrom<&StoreArgs> for StoreConfig {
    type Error = anyhow::Error;

    fn try_from(args: &StoreArgs) -> Result<Self> {
        crate::utils::validate_max_results(args.max_results)?;
        let host = args
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .context("Metrics store host is required (--host or MDS_HOST)")?;
        Ok(Self {
            host,
            port: args.port,
            username: args.username.clone(),
            password: args.password.clone(),
            index_pattern: args.index_pattern.clone(),
            max_results: args.max_results,
            timeout: args.timeout,
            insecure: args.insecure,
        })
    }
}

/// Parse duration from string (e.g., "500ms", "10s", "5m", "1h")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num <= 0.0 {
        return Err(format!("Duration must be positive: {}", s));
    }

    let secs = match unit {
        "ms" => num / 1000.0,
        "s" => num,
        "m" => num * 60.0,
        "h" => num * 3600.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };
    let duration = Duration::try_from_secs_f64(secs)
        .map_err(|e| format!("Duration out of range: {} ({})", s, e))?;
    if duration.is_zero() {
        return Err(format!("Duration must be at least 1ns: {}", s));
    }

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("osb-aggregator").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("0s").is_err());

        // Sub-millisecond values keep their fraction
        let half_ms = parse_duration("0.5ms").unwrap();
        assert!(half_ms.as_nanos().abs_diff(500_000) <= 1);
        assert!(parse_duration("0.0000000001s").is_err());

        // Out of range is an error, not a panic
        assert!(parse_duration("1e20s").is_err());
        assert!(parse_duration("1e300h").is_err());
    }

    #[test]
    fn test_timeout_out_of_range_is_rejected() {
        let result = Args::try_parse_from([
            "osb-aggregator",
            "nodes",
            "--id",
            "big5-*",
            "-o",
            "big5",
            "--timeout",
            "1e20s",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rounds_with_id_list() {
        let args = parse(&["rounds", "--test-ids", "big5-1,big5-2", "-o", "big5", "--latency"]);
        match args.command {
            Command::Rounds {
                test_id_pattern,
                test_ids,
                output_name,
                latency,
            } => {
                assert_eq!(test_id_pattern, None);
                assert_eq!(test_ids, Some(vec!["big5-1".to_string(), "big5-2".to_string()]));
                assert_eq!(output_name, "big5");
                assert!(latency);
            }
            other => panic!("unexpected command: {other}"),
        }
    }

    #[test]
    fn test_pattern_and_ids_conflict() {
        let result = Args::try_parse_from([
            "osb-aggregator",
            "rounds",
            "-p",
            "big5-*",
            "-t",
            "big5-1",
            "-o",
            "out",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_store_options_map_to_config() {
        let args = parse(&[
            "nodes",
            "--id",
            "8-clients-*",
            "-o",
            "8-clients",
            "--host",
            "metrics.example.com",
            "--port",
            "9200",
            "--timeout",
            "5s",
            "--insecure",
        ]);

        let config = StoreConfig::try_from(&args.store).unwrap();
        assert_eq!(config.host, "metrics.example.com");
        assert_eq!(config.port, 9200);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.index_pattern, "benchmark-results-*");
        assert_eq!(config.max_results, 10_000);
        assert!(config.insecure);
    }

    #[test]
    fn test_store_config_rejects_bad_limits() {
        let mut args = parse(&["cross-pattern", "-f", "results", "-o", "all"]).store;

        args.host = Some("localhost".to_string());
        args.max_results = 0;
        assert!(StoreConfig::try_from(&args).is_err());

        args.max_results = 100;
        args.host = Some("  ".to_string());
        assert!(StoreConfig::try_from(&args).is_err());
    }

    #[test]
    fn test_command_display() {
        let args = parse(&["cross-pattern", "-f", "runs", "-o", "all"]);
        assert_eq!(args.command.to_string(), "Cross-pattern aggregation of runs");
    }
}
