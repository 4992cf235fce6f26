use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{GameRow, Location, MetricValue, Source, SourceRow};
use crate::team_alias::{AliasRegistry, CanonicalTeam, Resolution};

/// A source row whose team name resolved to a canonical team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub source: Source,
    pub team: CanonicalTeam,
    pub value: MetricValue,
    pub as_of: Option<NaiveDate>,
}

/// A source row held back because its team name is not in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedRow {
    pub source: Source,
    pub raw_team: String,
    pub value: MetricValue,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct Canonicalized {
    pub normalized: Vec<NormalizedRow>,
    pub unresolved: Vec<UnresolvedRow>,
}

/// Splits `rows` into resolved and unresolved rows, keeping input order in both.
pub fn canonicalize_rows(rows: &[SourceRow], registry: &AliasRegistry) -> Canonicalized {
    let mut out = Canonicalized::default();
    for row in rows {
        match registry.resolve(row.source, &row.raw_team) {
            Resolution::Source(team) | Resolution::Global(team) => {
                out.normalized.push(NormalizedRow {
                    source: row.source,
                    team: team.clone(),
                    value: row.value,
                    as_of: row.as_of,
                });
            }
            Resolution::Unresolved => {
                debug!(
                    source = %row.source,
                    raw_team = %row.raw_team,
                    column = row.value.column(),
                    "unresolved team name"
                );
                out.unresolved.push(UnresolvedRow {
                    source: row.source,
                    raw_team: row.raw_team.clone(),
                    value: row.value,
                    as_of: row.as_of,
                });
            }
        }
    }
    if !out.unresolved.is_empty() {
        warn!(
            resolved = out.normalized.len(),
            unresolved = out.unresolved.len(),
            "some source rows have team names missing from the alias registry"
        );
    }
    out
}

/// Opponent side of a game; non-registry opponents (often non-D1 schools) keep their raw name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TeamRef {
    Resolved(CanonicalTeam),
    Unresolved(String),
}

impl TeamRef {
    pub fn name(&self) -> &str {
        match self {
            TeamRef::Resolved(team) => team.as_str(),
            TeamRef::Unresolved(raw) => raw.as_str(),
        }
    }

    pub fn team(&self) -> Option<&CanonicalTeam> {
        match self {
            TeamRef::Resolved(team) => Some(team),
            TeamRef::Unresolved(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGame {
    pub date: NaiveDate,
    pub team: CanonicalTeam,
    pub opponent: TeamRef,
    pub location: Option<Location>,
    pub team_score: u32,
    pub opponent_score: u32,
    pub win: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CanonicalGames {
    pub resolved: Vec<ResolvedGame>,
    /// Game rows whose own team side did not resolve.
    pub unresolved: Vec<GameRow>,
    /// Distinct raw opponent names that did not resolve, sorted.
    pub unresolved_opponents: Vec<String>,
}

pub fn canonicalize_games(games: &[GameRow], registry: &AliasRegistry) -> CanonicalGames {
    let mut out = CanonicalGames::default();
    let mut opponents: BTreeMap<String, usize> = BTreeMap::new();

    for game in games {
        let Some(team) = registry.resolve(Source::Espn, &game.team).team() else {
            debug!(raw_team = %game.team, date = %game.date, "unresolved game team");
            out.unresolved.push(game.clone());
            continue;
        };
        let opponent = match registry.resolve(Source::Espn, &game.opponent).team() {
            Some(opp) => TeamRef::Resolved(opp.clone()),
            None => {
                *opponents.entry(game.opponent.trim().to_string()).or_default() += 1;
                TeamRef::Unresolved(game.opponent.trim().to_string())
            }
        };
        out.resolved.push(ResolvedGame {
            date: game.date,
            team: team.clone(),
            opponent,
            location: game.location,
            team_score: game.team_score,
            opponent_score: game.opponent_score,
            win: game.win,
        });
    }

    if !out.unresolved.is_empty() || !opponents.is_empty() {
        warn!(
            unresolved_games = out.unresolved.len(),
            unresolved_opponents = opponents.len(),
            "game rows reference names missing from the alias registry"
        );
    }
    out.unresolved_opponents = opponents.into_keys().collect();
    out
}

/// Occurrence count of one unresolved `(source, raw name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedName {
    pub source: Source,
    pub raw_name: String,
    pub occurrences: usize,
}

/// Groups unresolved names for a human to add to the alias file, ordered by source then name.
pub fn summarize_unresolved(rows: &[UnresolvedRow], games: &[GameRow]) -> Vec<UnresolvedName> {
    let mut counts: BTreeMap<(Source, String), usize> = BTreeMap::new();
    for row in rows {
        *counts
            .entry((row.source, row.raw_team.trim().to_string()))
            .or_default() += 1;
    }
    for game in games {
        *counts
            .entry((Source::Espn, game.team.trim().to_string()))
            .or_default() += 1;
    }
    counts
        .into_iter()
        .map(|((source, raw_name), occurrences)| UnresolvedName {
            source,
            raw_name,
            occurrences,
        })
        .collect()
}
