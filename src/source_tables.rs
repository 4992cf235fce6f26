use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{GameRow, Location, Metric, MetricValue, Season, Source, SourceRow, WinLoss};

/// A source table as extracted upstream: a header row plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open source table {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("read source table {}", path.display()))
    }

    pub fn from_reader(reader: impl io::Read) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader
            .headers()
            .context("read csv header")?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("read csv record")?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Index of the first header matching one of `candidates`, ignoring case.
    pub fn column(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|c| {
            self.headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(c))
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.trim()).unwrap_or_default()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("{source_id} table has no {column} column (headers: {headers:?})")]
    MissingColumn {
        source_id: Source,
        column: &'static str,
        headers: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    NonNumeric,
    NonPositive,
    Fractional,
    BadRecord,
    BadDate,
    BadScore,
    MissingTeam,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::NonNumeric => "not a number",
            RejectReason::NonPositive => "rank must be 1 or greater",
            RejectReason::Fractional => "rank must be a whole number",
            RejectReason::BadRecord => "not a W-L record",
            RejectReason::BadDate => "unrecognized date",
            RejectReason::BadScore => "unrecognized score",
            RejectReason::MissingTeam => "blank team name",
        };
        f.write_str(s)
    }
}

/// A cell dropped during parsing; the rest of its row and table are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub source: Source,
    pub raw_team: String,
    pub column: String,
    pub raw_value: String,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    pub rows: Vec<SourceRow>,
    pub rejected: Vec<RejectedRow>,
}

/// Column-shape translation for one source. No name resolution, no ranking math.
pub trait SourceAdapter {
    fn source(&self) -> Source;

    fn parse_metric_table(&self, raw: &RawTable) -> Result<ParsedTable, TableError>;
}

/// A table with one rank column, optionally carrying W-L records too (NET does).
#[derive(Debug, Clone, Copy)]
pub struct RankTable {
    source: Source,
    metric: Metric,
    team_columns: &'static [&'static str],
    rank_columns: &'static [&'static str],
    record_columns: &'static [&'static str],
}

impl RankTable {
    pub const fn net() -> Self {
        Self {
            source: Source::Net,
            metric: Metric::Net,
            team_columns: &["team_net", "team", "school"],
            rank_columns: &["net_rank", "net", "rank"],
            record_columns: &["record"],
        }
    }

    pub const fn bpi() -> Self {
        Self {
            source: Source::Bpi,
            metric: Metric::Bpi,
            team_columns: &["team_bpi", "team"],
            rank_columns: &["bpi_rank", "bpi", "rk", "rank"],
            record_columns: &[],
        }
    }

    pub const fn kenpom() -> Self {
        Self {
            source: Source::KenPom,
            metric: Metric::KenPom,
            team_columns: &["team_kenpom", "team"],
            rank_columns: &["kenpom_rank", "kenpom", "rk", "rank"],
            record_columns: &[],
        }
    }

    pub const fn ap() -> Self {
        Self {
            source: Source::Ap,
            metric: Metric::Ap,
            team_columns: &["team_ap", "team"],
            rank_columns: &["ap_rank", "rank", "rk"],
            record_columns: &[],
        }
    }

    pub const fn sos() -> Self {
        Self {
            source: Source::Sos,
            metric: Metric::Sos,
            team_columns: &["team_sos", "team"],
            rank_columns: &["sos_rank", "sos", "rank"],
            record_columns: &[],
        }
    }
}

impl SourceAdapter for RankTable {
    fn source(&self) -> Source {
        self.source
    }

    fn parse_metric_table(&self, raw: &RawTable) -> Result<ParsedTable, TableError> {
        let team_col = require(raw, self.source, self.team_columns, "team")?;
        let rank_col = require(raw, self.source, self.rank_columns, "rank")?;
        let record_col = raw.column(self.record_columns);

        let mut out = ParsedTable::default();
        for (row, as_of) in latest_snapshot(raw) {
            let team = cell(row, team_col);
            if team.is_empty() {
                let value_cols = std::iter::once(rank_col).chain(record_col);
                reject_teamless(&mut out, self.source, raw, row, value_cols);
                continue;
            }
            match parse_rank(cell(row, rank_col)) {
                Ok(Some(rank)) => out.rows.push(SourceRow {
                    source: self.source,
                    raw_team: team.to_string(),
                    value: MetricValue::Rank(self.metric, rank),
                    as_of,
                }),
                Ok(None) => {}
                Err(reason) => out.rejected.push(reject(
                    self.source,
                    team,
                    &raw.headers[rank_col],
                    cell(row, rank_col),
                    reason,
                )),
            }
            if let Some(record_col) = record_col {
                push_record(&mut out, self.source, team, raw, row, record_col, as_of);
            }
        }
        log_parsed(self.source, &out);
        Ok(out)
    }
}

/// Team W-L records, published as their own table.
#[derive(Debug, Clone, Copy)]
pub struct RecordTable;

impl RecordTable {
    const TEAM_COLUMNS: &'static [&'static str] = &["team_espn", "team_net", "team"];
    const RECORD_COLUMNS: &'static [&'static str] = &["record", "w-l"];
}

impl SourceAdapter for RecordTable {
    fn source(&self) -> Source {
        Source::Records
    }

    fn parse_metric_table(&self, raw: &RawTable) -> Result<ParsedTable, TableError> {
        let team_col = require(raw, Source::Records, Self::TEAM_COLUMNS, "team")?;
        let record_col = require(raw, Source::Records, Self::RECORD_COLUMNS, "record")?;

        let mut out = ParsedTable::default();
        for (row, as_of) in latest_snapshot(raw) {
            let team = cell(row, team_col);
            if team.is_empty() {
                reject_teamless(&mut out, Source::Records, raw, row, [record_col]);
                continue;
            }
            push_record(&mut out, Source::Records, team, raw, row, record_col, as_of);
        }
        log_parsed(Source::Records, &out);
        Ok(out)
    }
}

/// The metric-table adapter for `source`; ESPN games go through [`parse_game_table`] instead.
pub fn adapter_for(source: Source) -> Option<Box<dyn SourceAdapter>> {
    let adapter: Box<dyn SourceAdapter> = match source {
        Source::Net => Box::new(RankTable::net()),
        Source::Bpi => Box::new(RankTable::bpi()),
        Source::KenPom => Box::new(RankTable::kenpom()),
        Source::Ap => Box::new(RankTable::ap()),
        Source::Sos => Box::new(RankTable::sos()),
        Source::Records => Box::new(RecordTable),
        Source::Espn => return None,
    };
    Some(adapter)
}

fn require(
    raw: &RawTable,
    source: Source,
    candidates: &[&str],
    column: &'static str,
) -> Result<usize, TableError> {
    raw.column(candidates).ok_or_else(|| TableError::MissingColumn {
        source_id: source,
        column,
        headers: raw.headers.clone(),
    })
}

fn push_record(
    out: &mut ParsedTable,
    source: Source,
    team: &str,
    raw: &RawTable,
    row: &[String],
    record_col: usize,
    as_of: Option<NaiveDate>,
) {
    let value = cell(row, record_col);
    if value.is_empty() || value == "-" {
        return;
    }
    match WinLoss::parse(value) {
        Some(record) => out.rows.push(SourceRow {
            source,
            raw_team: team.to_string(),
            value: MetricValue::Record(record),
            as_of,
        }),
        None => out.rejected.push(reject(
            source,
            team,
            &raw.headers[record_col],
            value,
            RejectReason::BadRecord,
        )),
    }
}

/// A row with no team name but some value is reported once, against its first filled value column.
fn reject_teamless(
    out: &mut ParsedTable,
    source: Source,
    raw: &RawTable,
    row: &[String],
    value_cols: impl IntoIterator<Item = usize>,
) {
    let filled = value_cols
        .into_iter()
        .find(|col| !matches!(cell(row, *col), "" | "-"));
    if let Some(col) = filled {
        out.rejected.push(reject(
            source,
            "",
            &raw.headers[col],
            cell(row, col),
            RejectReason::MissingTeam,
        ));
    }
}

fn reject(source: Source, team: &str, column: &str, value: &str, reason: RejectReason) -> RejectedRow {
    warn!(%source, team, column, value, %reason, "dropping unparseable value");
    RejectedRow {
        source,
        raw_team: team.to_string(),
        column: column.to_string(),
        raw_value: value.to_string(),
        reason,
    }
}

fn log_parsed(source: Source, out: &ParsedTable) {
    debug!(%source, rows = out.rows.len(), rejected = out.rejected.len(), "parsed source table");
}

/// Rows of the most recent snapshot when the table carries a `snapshot_date` column.
fn latest_snapshot(raw: &RawTable) -> Vec<(&[String], Option<NaiveDate>)> {
    let Some(snap_col) = raw.column(&["snapshot_date"]) else {
        return raw.rows.iter().map(|row| (row.as_slice(), None)).collect();
    };
    let latest = raw
        .rows
        .iter()
        .filter_map(|row| parse_iso_date(cell(row, snap_col)))
        .max();
    let Some(latest) = latest else {
        return raw.rows.iter().map(|row| (row.as_slice(), None)).collect();
    };
    raw.rows
        .iter()
        .filter(|row| parse_iso_date(cell(row, snap_col)) == Some(latest))
        .map(|row| (row.as_slice(), Some(latest)))
        .collect()
}

/// Whole numbers from 1 up, optionally written `7.0`. Blank, `-` and `NR` cells mean
/// "not ranked" and parse to `None`.
pub fn parse_rank(raw: &str) -> Result<Option<u32>, RejectReason> {
    let s = raw.trim();
    if s.is_empty()
        || s == "-"
        || s == "\u{2014}"
        || s.eq_ignore_ascii_case("nr")
        || s.eq_ignore_ascii_case("n/a")
    {
        return Ok(None);
    }
    // Poll ties are printed as "T5" or "T-5".
    let s = s
        .strip_prefix(['T', 't'])
        .map(|rest| rest.trim_start_matches('-'))
        .unwrap_or(s);
    let (whole, fraction) = match s.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (s, None),
    };
    let negative = whole.starts_with('-');
    let digits = whole.strip_prefix('-').unwrap_or(whole);
    if !is_digits(digits) || fraction.is_some_and(|f| !is_digits(f)) {
        return Err(RejectReason::NonNumeric);
    }
    if fraction.is_some_and(|f| f.bytes().any(|b| b != b'0')) {
        return Err(RejectReason::Fractional);
    }
    if negative {
        return Err(RejectReason::NonPositive);
    }
    match digits.parse::<u32>() {
        Ok(0) => Err(RejectReason::NonPositive),
        Ok(rank) => Ok(Some(rank)),
        Err(_) => Err(RejectReason::NonNumeric),
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let date_part = s.split(['T', ' ']).next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Accepts `YYYY-MM-DD`, `M/D/YYYY`, `YYYYMMDD`, and season-relative `M/D`.
pub fn parse_game_date(raw: &str, season: Season) -> Option<NaiveDate> {
    let s = raw.trim();
    if let Some(date) = parse_iso_date(s) {
        return Some(date);
    }
    for fmt in ["%m/%d/%Y", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    let (month, day) = s.split_once('/')?;
    season.date_for(month.trim().parse().ok()?, day.trim().parse().ok()?)
}

fn parse_score(raw: &str) -> Option<u32> {
    let value: f64 = raw.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return None;
    }
    Some(value as u32)
}

fn parse_win_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "w" | "win" | "1" => Some(true),
        "no" | "n" | "false" | "l" | "loss" | "0" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedGames {
    pub games: Vec<GameRow>,
    pub rejected: Vec<RejectedRow>,
}

const DATE_COLUMNS: &[&str] = &["date", "game_date"];
const TEAM_COLUMNS: &[&str] = &["team"];
const OPPONENT_COLUMNS: &[&str] = &["opponent", "opp"];
const LOCATION_COLUMNS: &[&str] = &["location", "site", "home_away"];
const TEAM_SCORE_COLUMNS: &[&str] = &["team_score", "pts"];
const OPPONENT_SCORE_COLUMNS: &[&str] = &["opponent_score", "opp_score", "opp_pts"];
const WIN_COLUMNS: &[&str] = &["win?", "win", "win_flag", "result"];
const EVENT_COLUMNS: &[&str] = &["espn_event_id", "event_id"];

/// Identity of one team-perspective game row, used to collapse re-appended rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GameRowKey {
    Event { event_id: String, team: String },
    Line {
        date: NaiveDate,
        team: String,
        opponent: String,
        team_score: u32,
        opponent_score: u32,
    },
}

/// Parses the ESPN game log: one row per team per completed game.
///
/// Repeated rows for the same `(event id, team)`, or for the same date, teams and score
/// when the event id is blank, collapse into one. The last occurrence wins and keeps the
/// position of the first.
pub fn parse_game_table(raw: &RawTable, season: Season) -> Result<ParsedGames, TableError> {
    let date_col = require(raw, Source::Espn, DATE_COLUMNS, "date")?;
    let team_col = require(raw, Source::Espn, TEAM_COLUMNS, "team")?;
    let opp_col = require(raw, Source::Espn, OPPONENT_COLUMNS, "opponent")?;
    let team_score_col = require(raw, Source::Espn, TEAM_SCORE_COLUMNS, "team_score")?;
    let opp_score_col = require(raw, Source::Espn, OPPONENT_SCORE_COLUMNS, "opponent_score")?;
    let location_col = raw.column(LOCATION_COLUMNS);
    let win_col = raw.column(WIN_COLUMNS);
    let event_col = raw.column(EVENT_COLUMNS);

    let mut out = ParsedGames::default();
    let mut seen: HashMap<GameRowKey, usize> = HashMap::new();
    for row in &raw.rows {
        let team = cell(row, team_col);
        let opponent = cell(row, opp_col);
        if team.is_empty() || opponent.is_empty() {
            let column = if team.is_empty() { team_col } else { opp_col };
            out.rejected.push(reject(
                Source::Espn,
                team,
                &raw.headers[column],
                cell(row, column),
                RejectReason::MissingTeam,
            ));
            continue;
        }
        let Some(date) = parse_game_date(cell(row, date_col), season) else {
            out.rejected.push(reject(
                Source::Espn,
                team,
                &raw.headers[date_col],
                cell(row, date_col),
                RejectReason::BadDate,
            ));
            continue;
        };
        let (Some(team_score), Some(opponent_score)) = (
            parse_score(cell(row, team_score_col)),
            parse_score(cell(row, opp_score_col)),
        ) else {
            let column = if parse_score(cell(row, team_score_col)).is_none() {
                team_score_col
            } else {
                opp_score_col
            };
            out.rejected.push(reject(
                Source::Espn,
                team,
                &raw.headers[column],
                cell(row, column),
                RejectReason::BadScore,
            ));
            continue;
        };
        let win = win_col
            .and_then(|col| parse_win_flag(cell(row, col)))
            .unwrap_or(team_score > opponent_score);
        let game = GameRow {
            date,
            team: team.to_string(),
            opponent: opponent.to_string(),
            location: location_col.and_then(|col| Location::parse(cell(row, col))),
            team_score,
            opponent_score,
            win,
        };
        let key = match event_col.map(|col| cell(row, col)).filter(|id| !id.is_empty()) {
            Some(event_id) => GameRowKey::Event {
                event_id: event_id.to_string(),
                team: team.to_string(),
            },
            None => GameRowKey::Line {
                date,
                team: team.to_string(),
                opponent: opponent.to_string(),
                team_score,
                opponent_score,
            },
        };
        match seen.get(&key) {
            Some(&idx) => {
                debug!(team, opponent, %date, "duplicate game row replaces earlier one");
                out.games[idx] = game;
            }
            None => {
                seen.insert(key, out.games.len());
                out.games.push(game);
            }
        }
    }
    debug!(games = out.games.len(), rejected = out.rejected.len(), "parsed game table");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rank_accepts_whole_positive_numbers() {
        assert_eq!(parse_rank("7"), Ok(Some(7)));
        assert_eq!(parse_rank(" 12 "), Ok(Some(12)));
        assert_eq!(parse_rank("25.0"), Ok(Some(25)));
        assert_eq!(parse_rank("T-5"), Ok(Some(5)));
        assert_eq!(parse_rank("T24"), Ok(Some(24)));
    }

    #[test]
    fn parse_rank_treats_blank_and_nr_as_absent() {
        assert_eq!(parse_rank(""), Ok(None));
        assert_eq!(parse_rank("-"), Ok(None));
        assert_eq!(parse_rank("NR"), Ok(None));
    }

    #[test]
    fn parse_rank_rejects_invalid_values() {
        assert_eq!(parse_rank("0"), Err(RejectReason::NonPositive));
        assert_eq!(parse_rank("-3"), Err(RejectReason::NonPositive));
        assert_eq!(parse_rank("4.5"), Err(RejectReason::Fractional));
        assert_eq!(parse_rank("abc"), Err(RejectReason::NonNumeric));
        assert_eq!(parse_rank("NaN"), Err(RejectReason::NonNumeric));
    }

    #[test]
    fn parse_rank_rejects_float_notation() {
        assert_eq!(parse_rank("1e1"), Err(RejectReason::NonNumeric));
        assert_eq!(parse_rank("+3"), Err(RejectReason::NonNumeric));
        assert_eq!(parse_rank("inf"), Err(RejectReason::NonNumeric));
        assert_eq!(parse_rank(".5"), Err(RejectReason::NonNumeric));
        assert_eq!(parse_rank("7."), Err(RejectReason::NonNumeric));
        assert_eq!(parse_rank("99999999999"), Err(RejectReason::NonNumeric));
        assert_eq!(parse_rank("7.00"), Ok(Some(7)));
    }

    #[test]
    fn parse_game_date_handles_all_shapes() {
        let season = Season::new(2025);
        let expected = NaiveDate::from_ymd_opt(2024, 11, 4);
        assert_eq!(parse_game_date("2024-11-04", season), expected);
        assert_eq!(parse_game_date("11/4/2024", season), expected);
        assert_eq!(parse_game_date("20241104", season), expected);
        assert_eq!(parse_game_date("11/4", season), expected);
        assert_eq!(parse_game_date("1/15", season), NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(parse_game_date("yesterday", season), None);
    }

    #[test]
    fn parse_score_accepts_float_formatting() {
        assert_eq!(parse_score("75.0"), Some(75));
        assert_eq!(parse_score("75"), Some(75));
        assert_eq!(parse_score("75.5"), None);
        assert_eq!(parse_score(""), None);
    }
}
