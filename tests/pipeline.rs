use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};

use cbb_rankings::config::PipelineConfig;
use cbb_rankings::export::{self, DASHBOARD_FILE, GAME_TABLE_FILE, TEAM_TABLE_FILE, UNRESOLVED_FILE};
use cbb_rankings::merge::MergedTeamRecord;
use cbb_rankings::model::{Metric, Season, Source};
use cbb_rankings::pipeline::{self, PipelineInput, PipelineOutput};
use cbb_rankings::source_tables::{RawTable, RejectReason};
use cbb_rankings::team_alias::AliasRegistry;

fn fixtures_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path
}

fn fixture_config() -> PipelineConfig {
    let args = vec![
        format!("--data={}", fixtures_dir().display()),
        "--alias".to_string(),
        fixtures_dir().join("team_alias.csv").display().to_string(),
        "--season=2025".to_string(),
    ];
    let today = NaiveDate::from_ymd_opt(2025, 1, 20).unwrap();
    PipelineConfig::resolve(&args, |_| None, today)
}

fn run_fixtures() -> (PipelineConfig, PipelineOutput) {
    let config = fixture_config();
    let registry =
        AliasRegistry::load(&config.resolved_alias_path()).expect("alias fixture should load");
    let input = PipelineInput::load(&config).expect("fixtures should load");
    let output = pipeline::run(&registry, &input, &config.metrics, config.season);
    (config, output)
}

fn find<'a>(teams: &'a [MergedTeamRecord], name: &str) -> &'a MergedTeamRecord {
    teams
        .iter()
        .find(|t| t.team.as_str() == name)
        .unwrap_or_else(|| panic!("{name} missing from output"))
}

#[test]
fn loads_every_fixture_source() {
    let config = fixture_config();
    let input = PipelineInput::load(&config).expect("fixtures should load");
    let sources: Vec<Source> = input.sources.iter().map(|(s, _)| *s).collect();
    assert_eq!(
        sources,
        vec![
            Source::Net,
            Source::Bpi,
            Source::KenPom,
            Source::Ap,
            Source::Sos,
            Source::Records
        ]
    );
    assert!(input.games.is_some());
}

#[test]
fn team_table_holds_every_canonical_team_once() {
    let (_, output) = run_fixtures();
    let names: Vec<&str> = output.teams.iter().map(|t| t.team.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Alabama",
            "Auburn",
            "Connecticut",
            "Duke",
            "Gonzaga",
            "Houston",
            "Kansas",
            "Miami (FL)",
            "Miami (OH)",
            "Saint Mary's",
            "St. John's",
        ]
    );
}

#[test]
fn metrics_come_from_the_right_sources() {
    let (_, output) = run_fixtures();
    let duke = find(&output.teams, "Duke");
    assert_eq!(
        (duke.metrics.net, duke.metrics.kenpom, duke.metrics.bpi),
        (Some(2), Some(1), Some(2))
    );
    assert_eq!((duke.metrics.ap, duke.metrics.sos), (Some(2), Some(20)));
    assert_eq!(duke.record.map(|r| r.to_string()).as_deref(), Some("16-2"));

    // "Miami" is ambiguous globally, but BPI and SoS pin it down per source.
    let miami_fl = find(&output.teams, "Miami (FL)");
    assert_eq!(miami_fl.metrics.bpi, Some(150));
    assert_eq!(miami_fl.metrics.net, None);
    assert_eq!(miami_fl.record.map(|r| r.to_string()).as_deref(), Some("4-14"));
    let miami_oh = find(&output.teams, "Miami (OH)");
    assert_eq!(miami_oh.metrics.sos, Some(250));
    assert_eq!(miami_oh.metrics.net, Some(95));

    let saint_marys = find(&output.teams, "Saint Mary's");
    assert_eq!(saint_marys.metrics.bpi, None);
    assert_eq!(saint_marys.avg_rank, Some(26.0));
}

#[test]
fn composite_ranks_follow_average() {
    let (_, output) = run_fixtures();
    let expected = [
        ("Auburn", 1.3333, 1),
        ("Duke", 1.6667, 2),
        ("Houston", 3.0, 3),
        ("Alabama", 5.3333, 4),
        ("Gonzaga", 8.0, 5),
        ("Kansas", 10.3333, 6),
        ("St. John's", 17.6667, 7),
        ("Saint Mary's", 26.0, 8),
        ("Connecticut", 28.0, 9),
        ("Miami (OH)", 98.0, 10),
        ("Miami (FL)", 150.0, 11),
    ];
    for (name, avg, group) in expected {
        let team = find(&output.teams, name);
        assert_eq!(team.avg_rank, Some(avg), "{name}");
        assert_eq!(team.avg_rank_tie_group, Some(group), "{name}");
    }
}

#[test]
fn diagnostics_collect_soft_failures() {
    let (_, output) = run_fixtures();
    assert!(output.skipped_sources.is_empty());

    let unresolved: Vec<(Source, &str)> = output
        .unresolved
        .iter()
        .map(|r| (r.source, r.raw_team.as_str()))
        .collect();
    assert_eq!(unresolved, vec![(Source::Net, "Miami"), (Source::Net, "Miami")]);
    assert_eq!(output.unresolved_games.len(), 1);
    assert_eq!(output.unresolved_games[0].team, "Florida Gators");
    assert_eq!(
        output.unresolved_opponents,
        vec!["Kentucky Wildcats".to_string(), "Maine Black Bears".to_string()]
    );

    let reasons: Vec<(Source, RejectReason)> =
        output.rejected.iter().map(|r| (r.source, r.reason)).collect();
    assert_eq!(
        reasons,
        vec![
            (Source::Bpi, RejectReason::NonPositive),
            (Source::Espn, RejectReason::BadDate)
        ]
    );

    let summary = output.unresolved_summary();
    assert_eq!(summary.len(), 2);
    assert_eq!((summary[0].source, summary[0].occurrences), (Source::Net, 2));
    assert_eq!(summary[1].raw_name, "Florida Gators");
}

#[test]
fn game_table_is_sorted_and_keeps_unknown_opponents() {
    let (_, output) = run_fixtures();
    let rows: Vec<(String, &str, &str)> = output
        .games
        .iter()
        .map(|g| (g.date.to_string(), g.team.as_str(), g.opponent.name()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("2024-11-04".to_string(), "Duke", "Maine Black Bears"),
            ("2024-11-12".to_string(), "Duke", "Kentucky Wildcats"),
            ("2024-12-07".to_string(), "Auburn", "Houston"),
            ("2024-12-07".to_string(), "Houston", "Auburn"),
            ("2025-01-04".to_string(), "Duke", "Miami (FL)"),
            ("2025-01-04".to_string(), "Miami (FL)", "Duke"),
        ]
    );

    let duke_at_miami = &output.games[4];
    assert_eq!(duke_at_miami.team_metrics.net, Some(2));
    assert_eq!(duke_at_miami.opponent_metrics.bpi, Some(150));
    assert_eq!(duke_at_miami.opponent_metrics.net, None);
    assert_eq!(duke_at_miami.game_id, output.games[5].game_id);
}

#[test]
fn repeated_runs_are_identical() {
    let (_, first) = run_fixtures();
    let (_, second) = run_fixtures();
    assert_eq!(first.teams, second.teams);
    assert_eq!(first.games, second.games);

    let now = Utc.with_ymd_and_hms(2025, 1, 20, 17, 0, 0).unwrap();
    let mut a = Vec::new();
    let mut b = Vec::new();
    export::write_team_table(&mut a, &first.teams).expect("write team table");
    export::write_team_table(&mut b, &second.teams).expect("write team table");
    assert_eq!(a, b);
    let json_a = serde_json::to_string(&export::dashboard(&first.teams, &Metric::DEFAULT_COMPOSITE, now));
    let json_b = serde_json::to_string(&export::dashboard(&second.teams, &Metric::DEFAULT_COMPOSITE, now));
    assert_eq!(json_a.expect("json"), json_b.expect("json"));
}

#[test]
fn table_missing_its_team_column_is_skipped() {
    let registry = AliasRegistry::load(&fixtures_dir().join("team_alias.csv")).expect("registry");
    let input = PipelineInput {
        sources: vec![
            (
                Source::Net,
                RawTable::new(["team", "net_rank"], [["Duke", "2"]]),
            ),
            (
                Source::KenPom,
                RawTable::new(["school", "kenpom_rank"], [["Duke", "1"]]),
            ),
        ],
        games: None,
    };
    let output = pipeline::run(&registry, &input, &Metric::DEFAULT_COMPOSITE, Season::new(2025));
    assert_eq!(output.skipped_sources.len(), 1);
    assert_eq!(output.skipped_sources[0].source, Source::KenPom);
    assert_eq!(output.teams.len(), 1);
    assert_eq!(output.teams[0].avg_rank, Some(2.0));
    assert!(output.games.is_empty());
}

#[test]
fn writes_all_outputs_with_empty_cells_for_missing() {
    let (config, output) = run_fixtures();
    let dir = tempfile::tempdir().expect("tempdir");
    let now = Utc.with_ymd_and_hms(2025, 1, 20, 17, 0, 0).unwrap();
    let report =
        export::write_all(dir.path(), &output, &config.metrics, now).expect("export should work");
    assert_eq!(report.files.len(), 4);
    assert_eq!(report.team_rows, 11);
    assert_eq!(report.game_rows, 6);
    assert_eq!(report.dashboard_teams, 11);
    assert_eq!(report.unresolved_names, 2);

    let teams = fs::read_to_string(dir.path().join(TEAM_TABLE_FILE)).expect("team table");
    let lines: Vec<&str> = teams.lines().collect();
    assert_eq!(
        lines[0],
        "canonical_team,record,ap_rank,net_rank,kenpom_rank,bpi_rank,sos_rank,avg_rank,avg_rank_tie_group"
    );
    assert_eq!(lines.len(), 12);
    assert_eq!(lines[2], "Auburn,17-1,1,1,2,1,1,1.3333,1");
    assert_eq!(lines[8], "Miami (FL),4-14,,,,150,,150,11");
    let names: Vec<&str> = lines[1..]
        .iter()
        .map(|line| line.split(',').next().unwrap_or_default())
        .collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
    assert!(!teams.contains(",0,"));

    let games = fs::read_to_string(dir.path().join(GAME_TABLE_FILE)).expect("game table");
    let lines: Vec<&str> = games.lines().collect();
    assert_eq!(lines.len(), 7);
    assert!(lines[0].starts_with("date,team,opponent,location,team_score,opponent_score,win_flag,team_ap_rank"));
    assert!(lines[0].ends_with("opponent_sos_rank"));
    assert_eq!(lines[1], "2024-11-04,Duke,Maine Black Bears,Home,96,62,1,2,2,1,2,20,,,,,");

    let json = fs::read_to_string(dir.path().join(DASHBOARD_FILE)).expect("dashboard");
    let value: serde_json::Value = serde_json::from_str(&json).expect("dashboard json");
    assert_eq!(value["updated"], "Updated: 01/20/2025 at 12:00 pm EST");
    let teams = value["teams"].as_array().expect("teams array");
    assert_eq!(teams.len(), 11);
    assert_eq!(teams[0]["team"], "Auburn");
    assert_eq!(teams[0]["avg_rank"], 1);
    assert_eq!(teams[4]["team"], "Gonzaga");
    assert!(teams[4]["net_rank"].is_null());
    assert_eq!(teams[4]["record"], "14-5");

    let unresolved = fs::read_to_string(dir.path().join(UNRESOLVED_FILE)).expect("unresolved");
    assert_eq!(
        unresolved,
        "source_id,raw_name,occurrences\nnet,Miami,2\nespn,Florida Gators,1\n"
    );
}
