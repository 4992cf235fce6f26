use anyhow::{Context, Result};

use cbb_rankings::config::{self, PipelineConfig};
use cbb_rankings::export;
use cbb_rankings::logging;
use cbb_rankings::pipeline::{self, PipelineInput};
use cbb_rankings::team_alias::AliasRegistry;

fn main() -> Result<()> {
    config::load_env_files();
    logging::init();
    let config = PipelineConfig::from_env_and_args();

    let alias_path = config.resolved_alias_path();
    let registry = AliasRegistry::load(&alias_path)
        .with_context(|| format!("load alias registry {}", alias_path.display()))?;
    let input = PipelineInput::load(&config)?;
    let output = pipeline::run(&registry, &input, &config.metrics, config.season);
    let report = export::write_all(&config.output_dir, &output, &config.metrics, chrono::Utc::now())?;

    let metrics = config
        .metrics
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(",");
    println!("Rankings build complete");
    println!("Season: {}", config.season.end_year);
    println!("Composite metrics: {metrics}");
    println!(
        "Registry: {} teams, {} aliases",
        registry.team_count(),
        registry.alias_count()
    );
    println!(
        "Teams: {} ({} on dashboard)",
        report.team_rows, report.dashboard_teams
    );
    println!("Game rows: {}", report.game_rows);
    println!(
        "Unresolved: {} rows, {} game rows, {} distinct opponents",
        output.unresolved.len(),
        output.unresolved_games.len(),
        output.unresolved_opponents.len()
    );
    if !output.rejected.is_empty() {
        println!("Rejected values: {}", output.rejected.len());
        for rejected in output.rejected.iter().take(6) {
            println!(
                "   - {} {} {}={:?}: {}",
                rejected.source,
                rejected.raw_team,
                rejected.column,
                rejected.raw_value,
                rejected.reason
            );
        }
    }
    for skipped in &output.skipped_sources {
        println!("Skipped {}: {}", skipped.source, skipped.reason);
    }
    for file in &report.files {
        println!("Wrote {}", file.display());
    }
    Ok(())
}
