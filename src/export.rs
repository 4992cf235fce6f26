use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::info;

use crate::canonicalize::UnresolvedName;
use crate::composite_rank::{average_rank, ranked_order};
use crate::merge::{MergedGameRecord, MergedTeamRecord, TeamMetrics};
use crate::model::Metric;
use crate::pipeline::PipelineOutput;

pub const TEAM_TABLE_FILE: &str = "site_rankings.csv";
pub const GAME_TABLE_FILE: &str = "games_with_ranks.csv";
pub const DASHBOARD_FILE: &str = "rankings.json";
pub const UNRESOLVED_FILE: &str = "unresolved_names.csv";

const EST_OFFSET_SECS: i32 = 5 * 3600;

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn metric_cells(metrics: &TeamMetrics) -> impl Iterator<Item = String> + '_ {
    Metric::ALL.iter().map(|m| opt(metrics.get(*m)))
}

/// Team-level table in the order given, which is canonical team order for a merged run.
/// Absent values are empty cells.
pub fn write_team_table<W: Write>(writer: W, records: &[MergedTeamRecord]) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    let mut header = vec!["canonical_team".to_string(), "record".to_string()];
    header.extend(Metric::ALL.iter().map(|m| m.column().to_string()));
    header.extend(["avg_rank".to_string(), "avg_rank_tie_group".to_string()]);
    out.write_record(&header).context("write team header")?;

    for record in records {
        let mut row = vec![record.team.to_string(), opt(record.record)];
        row.extend(metric_cells(&record.metrics));
        row.push(record.avg_rank.map(format_avg).unwrap_or_default());
        row.push(opt(record.avg_rank_tie_group));
        out.write_record(&row)
            .with_context(|| format!("write team row {}", record.team))?;
    }
    out.flush().context("flush team table")?;
    Ok(())
}

fn format_avg(value: f64) -> String {
    let s = format!("{value:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

/// Game-level table, one row per team-perspective game row.
pub fn write_game_table<W: Write>(writer: W, games: &[MergedGameRecord]) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    let mut header: Vec<String> = [
        "date",
        "team",
        "opponent",
        "location",
        "team_score",
        "opponent_score",
        "win_flag",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(Metric::ALL.iter().map(|m| format!("team_{}", m.column())));
    header.extend(Metric::ALL.iter().map(|m| format!("opponent_{}", m.column())));
    out.write_record(&header).context("write game header")?;

    for game in games {
        let mut row = vec![
            game.date.format("%Y-%m-%d").to_string(),
            game.team.to_string(),
            game.opponent.name().to_string(),
            game.location.map(|l| l.as_str().to_string()).unwrap_or_default(),
            game.team_score.to_string(),
            game.opponent_score.to_string(),
            if game.win { "1" } else { "0" }.to_string(),
        ];
        row.extend(metric_cells(&game.team_metrics));
        row.extend(metric_cells(&game.opponent_metrics));
        out.write_record(&row)
            .with_context(|| format!("write game row {}", game.game_id))?;
    }
    out.flush().context("flush game table")?;
    Ok(())
}

pub fn write_unresolved<W: Write>(writer: W, names: &[UnresolvedName]) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["source_id", "raw_name", "occurrences"])
        .context("write unresolved header")?;
    for name in names {
        out.write_record([
            name.source.as_str(),
            name.raw_name.as_str(),
            name.occurrences.to_string().as_str(),
        ])
        .context("write unresolved row")?;
    }
    out.flush().context("flush unresolved table")?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardTeam {
    pub team: String,
    pub record: String,
    pub ap_rank: Option<u32>,
    pub avg_rank: Option<u32>,
    pub avg_value: Option<f64>,
    pub net_rank: Option<u32>,
    pub kenpom_rank: Option<u32>,
    pub bpi_rank: Option<u32>,
    pub sos_rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub updated: String,
    pub teams: Vec<DashboardTeam>,
}

/// Teams with at least one composite metric, in dashboard order.
pub fn dashboard(records: &[MergedTeamRecord], metrics: &[Metric], now: DateTime<Utc>) -> Dashboard {
    let teams = ranked_order(records)
        .into_iter()
        .filter(|r| average_rank(&r.metrics, metrics).is_some())
        .map(|r| DashboardTeam {
            team: r.team.to_string(),
            record: opt(r.record),
            ap_rank: r.metrics.ap,
            avg_rank: r.avg_rank_tie_group,
            avg_value: r.avg_rank,
            net_rank: r.metrics.net,
            kenpom_rank: r.metrics.kenpom,
            bpi_rank: r.metrics.bpi,
            sos_rank: r.metrics.sos,
        })
        .collect();
    Dashboard {
        updated: updated_stamp(now),
        teams,
    }
}

/// `"Updated: 01/20/2025 at 02:05 pm EST"`; EST is a fixed UTC-5.
pub fn updated_stamp(now: DateTime<Utc>) -> String {
    let Some(est) = FixedOffset::west_opt(EST_OFFSET_SECS) else {
        return format!("Updated: {} UTC", now.format("%m/%d/%Y at %I:%M %P"));
    };
    let local = now.with_timezone(&est);
    format!("Updated: {} EST", local.format("%m/%d/%Y at %I:%M %P"))
}

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub files: Vec<PathBuf>,
    pub team_rows: usize,
    pub game_rows: usize,
    pub dashboard_teams: usize,
    pub unresolved_names: usize,
}

/// Writes every output of one run into `dir`, creating it if needed.
pub fn write_all(
    dir: &Path,
    output: &PipelineOutput,
    metrics: &[Metric],
    now: DateTime<Utc>,
) -> Result<ExportReport> {
    fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
    let mut report = ExportReport::default();

    let path = dir.join(TEAM_TABLE_FILE);
    write_team_table(create(&path)?, &output.teams)?;
    report.team_rows = output.teams.len();
    report.files.push(path);

    if !output.games.is_empty() {
        let path = dir.join(GAME_TABLE_FILE);
        write_game_table(create(&path)?, &output.games)?;
        report.game_rows = output.games.len();
        report.files.push(path);
    }

    let board = dashboard(&output.teams, metrics, now);
    let path = dir.join(DASHBOARD_FILE);
    let json = serde_json::to_string_pretty(&board).context("serialize dashboard")?;
    fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    report.dashboard_teams = board.teams.len();
    report.files.push(path);

    let names = output.unresolved_summary();
    let path = dir.join(UNRESOLVED_FILE);
    write_unresolved(create(&path)?, &names)?;
    report.unresolved_names = names.len();
    report.files.push(path);

    for file in &report.files {
        info!(path = %file.display(), "wrote output");
    }
    Ok(report)
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("create {}", path.display()))
}
