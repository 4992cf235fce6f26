use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::canonicalize::{
    UnresolvedName, UnresolvedRow, canonicalize_games, canonicalize_rows, summarize_unresolved,
};
use crate::composite_rank::compute_avg_rank;
use crate::config::PipelineConfig;
use crate::merge::{MergedGameRecord, MergedTeamRecord, merge};
use crate::model::{GameRow, Metric, Season, Source, SourceRow};
use crate::source_tables::{RawTable, RejectedRow, adapter_for, parse_game_table};
use crate::team_alias::AliasRegistry;

/// Raw tables for one run. Missing sources are simply absent.
#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub sources: Vec<(Source, RawTable)>,
    pub games: Option<RawTable>,
}

impl PipelineInput {
    /// Reads every source table that exists under the configured data directory.
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let mut input = Self::default();
        for source in Source::ALL {
            if source == Source::Espn {
                continue;
            }
            let path = config.source_path(source);
            if let Some(table) = load_if_present(source, &path)? {
                input.sources.push((source, table));
            }
        }
        input.games = load_if_present(Source::Espn, &config.games_path())?;
        Ok(input)
    }
}

fn load_if_present(source: Source, path: &Path) -> Result<Option<RawTable>> {
    if !path.exists() {
        info!(%source, path = %path.display(), "source table not found; skipping");
        return Ok(None);
    }
    let table = RawTable::load(path).with_context(|| format!("load {source} table"))?;
    info!(%source, path = %path.display(), rows = table.len(), "loaded source table");
    Ok(Some(table))
}

/// A whole table left out of the run, e.g. because a required column is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub source: Source,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    /// Team-level table, one row per canonical team, ordered by team.
    pub teams: Vec<MergedTeamRecord>,
    /// Game-level table, ordered by date, team, opponent.
    pub games: Vec<MergedGameRecord>,
    pub unresolved: Vec<UnresolvedRow>,
    pub unresolved_games: Vec<GameRow>,
    pub unresolved_opponents: Vec<String>,
    pub rejected: Vec<RejectedRow>,
    pub skipped_sources: Vec<SkippedSource>,
}

impl PipelineOutput {
    pub fn unresolved_summary(&self) -> Vec<UnresolvedName> {
        summarize_unresolved(&self.unresolved, &self.unresolved_games)
    }
}

/// One run: parse every table, resolve names, merge, then annotate the composite rank.
pub fn run(
    registry: &AliasRegistry,
    input: &PipelineInput,
    metrics: &[Metric],
    season: Season,
) -> PipelineOutput {
    let mut out = PipelineOutput::default();
    let mut rows: Vec<SourceRow> = Vec::new();

    for (source, raw) in &input.sources {
        let Some(adapter) = adapter_for(*source) else {
            warn!(%source, "game logs belong in the games slot; skipping table");
            out.skipped_sources.push(SkippedSource {
                source: *source,
                reason: "not a metric table".to_string(),
            });
            continue;
        };
        match adapter.parse_metric_table(raw) {
            Ok(parsed) => {
                rows.extend(parsed.rows);
                out.rejected.extend(parsed.rejected);
            }
            Err(err) => {
                warn!(%source, error = %err, "skipping source table");
                out.skipped_sources.push(SkippedSource {
                    source: *source,
                    reason: err.to_string(),
                });
            }
        }
    }

    let mut game_rows: Vec<GameRow> = Vec::new();
    if let Some(raw) = &input.games {
        match parse_game_table(raw, season) {
            Ok(parsed) => {
                game_rows = parsed.games;
                out.rejected.extend(parsed.rejected);
            }
            Err(err) => {
                warn!(error = %err, "skipping game table");
                out.skipped_sources.push(SkippedSource {
                    source: Source::Espn,
                    reason: err.to_string(),
                });
            }
        }
    }

    let canonical = canonicalize_rows(&rows, registry);
    let canonical_games = canonicalize_games(&game_rows, registry);
    let merged = merge(&canonical.normalized, &canonical_games.resolved);

    out.teams = compute_avg_rank(&merged.teams, metrics);
    out.games = merged.games;
    out.unresolved = canonical.unresolved;
    out.unresolved_games = canonical_games.unresolved;
    out.unresolved_opponents = canonical_games.unresolved_opponents;

    info!(
        teams = out.teams.len(),
        ranked = out.teams.iter().filter(|t| t.avg_rank.is_some()).count(),
        games = out.games.len(),
        unresolved = out.unresolved.len() + out.unresolved_games.len(),
        rejected = out.rejected.len(),
        skipped = out.skipped_sources.len(),
        "pipeline run complete"
    );
    out
}
