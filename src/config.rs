use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::warn;

use crate::model::{Metric, Season, Source};

pub const DEFAULT_DATA_DIR: &str = "data_raw";
pub const DEFAULT_ALIAS_PATH: &str = "team_alias.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "data_processed";
pub const DEFAULT_GAMES_FILE: &str = "games.csv";

/// Everything one pipeline run needs to know about its inputs and outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub alias_path: PathBuf,
    pub output_dir: PathBuf,
    pub metrics: Vec<Metric>,
    pub season: Season,
    pub games_file: PathBuf,
}

impl PipelineConfig {
    /// Resolves from process args and environment. Call [`load_env_files`] and install
    /// logging first, so warnings about bad values are not lost.
    pub fn from_env_and_args() -> Self {
        let args = std::env::args().skip(1).collect::<Vec<_>>();
        let today = chrono::Local::now().date_naive();
        Self::resolve(&args, |key| std::env::var(key).ok(), today)
    }

    /// Flags beat environment variables, which beat defaults.
    pub fn resolve(args: &[String], env: impl Fn(&str) -> Option<String>, today: NaiveDate) -> Self {
        let lookup = |flag: &str, key: &str| {
            arg_value(args, flag).or_else(|| env(key).filter(|v| !v.trim().is_empty()))
        };

        let metrics = match lookup("--metrics", "CBB_COMPOSITE_METRICS") {
            Some(raw) => {
                let parsed = parse_metric_list(&raw);
                if parsed.is_empty() {
                    warn!(raw = %raw, "no usable composite metrics; falling back to defaults");
                    Metric::DEFAULT_COMPOSITE.to_vec()
                } else {
                    parsed
                }
            }
            None => Metric::DEFAULT_COMPOSITE.to_vec(),
        };

        let season = lookup("--season", "CBB_SEASON")
            .and_then(|raw| match raw.trim().parse::<i32>() {
                Ok(year) => Some(Season::new(year)),
                Err(_) => {
                    warn!(raw = %raw, "ignoring unparseable season");
                    None
                }
            })
            .unwrap_or_else(|| Season::containing(today));

        Self {
            data_dir: lookup("--data", "CBB_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            alias_path: lookup("--alias", "CBB_ALIAS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ALIAS_PATH)),
            output_dir: lookup("--out", "CBB_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            metrics,
            season,
            games_file: lookup("--games", "CBB_GAMES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GAMES_FILE)),
        }
    }

    /// Where the raw table for `source` is expected inside the data directory.
    pub fn source_path(&self, source: Source) -> PathBuf {
        match source {
            Source::Espn => self.games_path(),
            other => self.data_dir.join(source_file_name(other)),
        }
    }

    pub fn games_path(&self) -> PathBuf {
        within(&self.data_dir, &self.games_file)
    }

    /// The alias file as configured, or the same name inside the data directory.
    pub fn resolved_alias_path(&self) -> PathBuf {
        if self.alias_path.exists() || self.alias_path.is_absolute() {
            return self.alias_path.clone();
        }
        let fallback = self.data_dir.join(&self.alias_path);
        if fallback.exists() {
            fallback
        } else {
            self.alias_path.clone()
        }
    }
}

/// Loads `.env.local`, then `.env`; neither overrides variables already set.
pub fn load_env_files() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn source_file_name(source: Source) -> &'static str {
    match source {
        Source::Net => "net_rankings.csv",
        Source::Bpi => "bpi_rankings.csv",
        Source::KenPom => "kenpom_rankings.csv",
        Source::Ap => "ap_rankings.csv",
        Source::Sos => "sos_rankings.csv",
        Source::Records => "team_records.csv",
        Source::Espn => DEFAULT_GAMES_FILE,
    }
}

fn within(dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() || file.components().count() > 1 {
        file.to_path_buf()
    } else {
        dir.join(file)
    }
}

/// Value of `--name=value` or `--name value`; blank values are ignored.
pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg
            .strip_prefix(flag)
            .and_then(|rest| rest.strip_prefix('='))
        {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

/// Splits on `,`, `;` or whitespace; unknown names are dropped with a warning.
pub fn parse_metric_list(raw: &str) -> Vec<Metric> {
    let mut out: Vec<Metric> = Vec::new();
    for part in raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        if part.is_empty() {
            continue;
        }
        match part.parse::<Metric>() {
            Ok(metric) if !out.contains(&metric) => out.push(metric),
            Ok(_) => {}
            Err(err) => warn!(%err, "ignoring composite metric"),
        }
    }
    out
}
