use chrono::NaiveDate;

use cbb_rankings::canonicalize::{
    TeamRef, UnresolvedName, canonicalize_games, canonicalize_rows, summarize_unresolved,
};
use cbb_rankings::model::{GameRow, Location, Metric, MetricValue, Source, SourceRow};
use cbb_rankings::team_alias::{AliasEntry, AliasRegistry, CanonicalTeam};

fn registry() -> AliasRegistry {
    AliasRegistry::from_entries([
        AliasEntry::new(Source::Net, "Duke", "DUKE"),
        AliasEntry::new(Source::Bpi, "Duke University", "DUKE"),
        AliasEntry::new(Source::Espn, "Duke Blue Devils", "DUKE"),
        AliasEntry::new(Source::Espn, "UNC Tar Heels", "North Carolina"),
    ])
    .expect("registry should build")
}

fn rank(source: Source, metric: Metric, team: &str, value: u32) -> SourceRow {
    SourceRow {
        source,
        raw_team: team.to_string(),
        value: MetricValue::Rank(metric, value),
        as_of: None,
    }
}

fn game(team: &str, opponent: &str) -> GameRow {
    GameRow {
        date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
        team: team.to_string(),
        opponent: opponent.to_string(),
        location: Some(Location::Home),
        team_score: 80,
        opponent_score: 70,
        win: true,
    }
}

#[test]
fn every_row_lands_in_exactly_one_output() {
    let registry = registry();
    let rows = vec![
        rank(Source::Net, Metric::Net, "Duke", 3),
        rank(Source::Bpi, Metric::Bpi, "Duke University", 5),
        rank(Source::Bpi, Metric::Bpi, "Wofford", 190),
        rank(Source::KenPom, Metric::KenPom, "north carolina", 30),
        rank(Source::Ap, Metric::Ap, "", 9),
    ];
    let out = canonicalize_rows(&rows, &registry);
    assert_eq!(out.normalized.len() + out.unresolved.len(), rows.len());
    assert_eq!(out.normalized.len(), 3);

    let teams: Vec<&str> = out.normalized.iter().map(|r| r.team.as_str()).collect();
    assert_eq!(teams, vec!["DUKE", "DUKE", "North Carolina"]);

    let unresolved: Vec<&str> = out.unresolved.iter().map(|r| r.raw_team.as_str()).collect();
    assert_eq!(unresolved, vec!["Wofford", ""]);
    assert_eq!(out.unresolved[0].value, MetricValue::Rank(Metric::Bpi, 190));
}

#[test]
fn game_rows_are_conserved_and_opponents_kept() {
    let registry = registry();
    let games = vec![
        game("Duke Blue Devils", "UNC Tar Heels"),
        game("Duke Blue Devils", "Army Black Knights"),
        game("Army Black Knights", "Duke Blue Devils"),
        game("UNC Tar Heels", "Army Black Knights"),
    ];
    let out = canonicalize_games(&games, &registry);
    assert_eq!(out.resolved.len() + out.unresolved.len(), games.len());
    assert_eq!(out.resolved.len(), 3);
    assert_eq!(out.unresolved[0].team, "Army Black Knights");

    assert_eq!(
        out.resolved[0].opponent,
        TeamRef::Resolved(CanonicalTeam::new("North Carolina"))
    );
    assert_eq!(
        out.resolved[1].opponent,
        TeamRef::Unresolved("Army Black Knights".to_string())
    );
    assert_eq!(out.resolved[1].opponent.team(), None);
    assert_eq!(out.unresolved_opponents, vec!["Army Black Knights".to_string()]);
}

#[test]
fn unresolved_summary_groups_and_orders() {
    let registry = registry();
    let rows = vec![
        rank(Source::Sos, Metric::Sos, "Wofford", 200),
        rank(Source::Net, Metric::Net, "Wofford", 150),
        rank(Source::Net, Metric::Net, "Wofford ", 150),
        rank(Source::Net, Metric::Net, "Citadel", 300),
    ];
    let out = canonicalize_rows(&rows, &registry);
    let games = canonicalize_games(&[game("Army Black Knights", "Duke")], &registry);
    let summary = summarize_unresolved(&out.unresolved, &games.unresolved);
    assert_eq!(
        summary,
        vec![
            UnresolvedName {
                source: Source::Net,
                raw_name: "Citadel".to_string(),
                occurrences: 1,
            },
            UnresolvedName {
                source: Source::Net,
                raw_name: "Wofford".to_string(),
                occurrences: 2,
            },
            UnresolvedName {
                source: Source::Sos,
                raw_name: "Wofford".to_string(),
                occurrences: 1,
            },
            UnresolvedName {
                source: Source::Espn,
                raw_name: "Army Black Knights".to_string(),
                occurrences: 1,
            },
        ]
    );
}
