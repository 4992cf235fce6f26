use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::canonicalize::{NormalizedRow, ResolvedGame, TeamRef};
use crate::model::{Location, Metric, MetricValue, Source, WinLoss};
use crate::team_alias::CanonicalTeam;

/// Every rank metric for one team; `None` means the source did not rank it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamMetrics {
    pub net: Option<u32>,
    pub bpi: Option<u32>,
    pub kenpom: Option<u32>,
    pub ap: Option<u32>,
    pub sos: Option<u32>,
}

impl TeamMetrics {
    pub fn get(&self, metric: Metric) -> Option<u32> {
        match metric {
            Metric::Net => self.net,
            Metric::Bpi => self.bpi,
            Metric::KenPom => self.kenpom,
            Metric::Ap => self.ap,
            Metric::Sos => self.sos,
        }
    }

    fn slot_mut(&mut self, metric: Metric) -> &mut Option<u32> {
        match metric {
            Metric::Net => &mut self.net,
            Metric::Bpi => &mut self.bpi,
            Metric::KenPom => &mut self.kenpom,
            Metric::Ap => &mut self.ap,
            Metric::Sos => &mut self.sos,
        }
    }

    pub fn is_empty(&self) -> bool {
        Metric::ALL.iter().all(|m| self.get(*m).is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedTeamRecord {
    pub team: CanonicalTeam,
    pub record: Option<WinLoss>,
    pub metrics: TeamMetrics,
    /// Mean of the configured metrics, rounded to 4 decimals. Set by the composite pass.
    pub avg_rank: Option<f64>,
    /// Competition rank of `avg_rank` (equal averages share a value).
    pub avg_rank_tie_group: Option<u32>,
}

/// Identifies one physical game independent of which side's row it is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameId {
    pub date: NaiveDate,
    pub first: String,
    pub second: String,
}

impl GameId {
    pub fn new(date: NaiveDate, a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            date,
            first: first.to_string(),
            second: second.to_string(),
        }
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}|{}", self.date, self.first, self.second)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedGameRecord {
    pub game_id: GameId,
    pub date: NaiveDate,
    pub team: CanonicalTeam,
    pub opponent: TeamRef,
    pub location: Option<Location>,
    pub team_score: u32,
    pub opponent_score: u32,
    pub win: bool,
    pub team_metrics: TeamMetrics,
    pub opponent_metrics: TeamMetrics,
}

#[derive(Debug, Clone, Default)]
struct TeamValues {
    metrics: TeamMetrics,
    metric_as_of: BTreeMap<Metric, Option<NaiveDate>>,
    record: Option<(WinLoss, RecordPriority)>,
}

/// The records table beats a record carried alongside a rank; then the later `as_of` wins.
type RecordPriority = (bool, Option<NaiveDate>);

/// Per-team metric lookup built from every normalized row of a run.
///
/// When a source reports the same team twice, the later `as_of` wins, then the earlier row.
/// A W-L record from the records table wins over one from any other source.
#[derive(Debug, Clone, Default)]
pub struct TeamIndex {
    teams: BTreeMap<CanonicalTeam, TeamValues>,
}

impl TeamIndex {
    pub fn build(rows: &[NormalizedRow]) -> Self {
        let mut teams: BTreeMap<CanonicalTeam, TeamValues> = BTreeMap::new();
        for row in rows {
            let entry = teams.entry(row.team.clone()).or_default();
            match row.value {
                MetricValue::Rank(metric, rank) => {
                    if let Some(seen) = entry.metric_as_of.get(&metric).copied()
                        && row.as_of <= seen
                    {
                        debug!(team = %row.team, %metric, kept = ?entry.metrics.get(metric), dropped = rank, "duplicate rank");
                        continue;
                    }
                    *entry.metrics.slot_mut(metric) = Some(rank);
                    entry.metric_as_of.insert(metric, row.as_of);
                }
                MetricValue::Record(record) => {
                    let priority = (row.source == Source::Records, row.as_of);
                    if let Some((_, seen)) = entry.record
                        && priority <= seen
                    {
                        debug!(team = %row.team, source = %row.source, dropped = %record, "duplicate record");
                        continue;
                    }
                    entry.record = Some((record, priority));
                }
            }
        }
        Self { teams }
    }

    pub fn metrics(&self, team: &CanonicalTeam) -> TeamMetrics {
        self.teams
            .get(team)
            .map(|values| values.metrics)
            .unwrap_or_default()
    }

    pub fn record(&self, team: &CanonicalTeam) -> Option<WinLoss> {
        self.teams
            .get(team)
            .and_then(|values| values.record.map(|(record, _)| record))
    }

    pub fn teams(&self) -> impl Iterator<Item = &CanonicalTeam> {
        self.teams.keys()
    }
}

/// Team-level full outer join: one record per canonical team seen in any source or game.
pub fn merge_teams(index: &TeamIndex, games: &[ResolvedGame]) -> Vec<MergedTeamRecord> {
    let mut universe: BTreeSet<&CanonicalTeam> = index.teams().collect();
    for game in games {
        universe.insert(&game.team);
        if let Some(opponent) = game.opponent.team() {
            universe.insert(opponent);
        }
    }

    let out: Vec<MergedTeamRecord> = universe
        .into_iter()
        .map(|team| MergedTeamRecord {
            team: team.clone(),
            record: index.record(team),
            metrics: index.metrics(team),
            avg_rank: None,
            avg_rank_tie_group: None,
        })
        .collect();
    info!(teams = out.len(), "merged team table");
    out
}

/// Game-level join: one record per game row, with team and opponent metrics looked up separately.
pub fn merge_games(index: &TeamIndex, games: &[ResolvedGame]) -> Vec<MergedGameRecord> {
    let mut out: Vec<MergedGameRecord> = games
        .iter()
        .map(|game| MergedGameRecord {
            game_id: GameId::new(game.date, game.team.as_str(), game.opponent.name()),
            date: game.date,
            team: game.team.clone(),
            opponent: game.opponent.clone(),
            location: game.location,
            team_score: game.team_score,
            opponent_score: game.opponent_score,
            win: game.win,
            team_metrics: index.metrics(&game.team),
            opponent_metrics: game
                .opponent
                .team()
                .map(|opp| index.metrics(opp))
                .unwrap_or_default(),
        })
        .collect();

    // Stable sort, so equal keys keep input order.
    out.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.team.cmp(&b.team))
            .then_with(|| a.opponent.name().cmp(b.opponent.name()))
    });
    info!(games = out.len(), "merged game table");
    out
}

#[derive(Debug, Clone, Default)]
pub struct Merged {
    pub teams: Vec<MergedTeamRecord>,
    pub games: Vec<MergedGameRecord>,
}

/// Both output modes over one shared index.
pub fn merge(rows: &[NormalizedRow], games: &[ResolvedGame]) -> Merged {
    let index = TeamIndex::build(rows);
    Merged {
        teams: merge_teams(&index, games),
        games: merge_games(&index, games),
    }
}
