use std::collections::BTreeMap;

use anyhow::{Context, Result};

use cbb_rankings::config::{self, PipelineConfig};
use cbb_rankings::export::{self, UNRESOLVED_FILE};
use cbb_rankings::logging;
use cbb_rankings::model::Source;
use cbb_rankings::pipeline::{self, PipelineInput};
use cbb_rankings::team_alias::AliasRegistry;

const MAX_NAMES_PER_SOURCE: usize = 25;

fn main() -> Result<()> {
    config::load_env_files();
    logging::init();
    let config = PipelineConfig::from_env_and_args();

    let alias_path = config.resolved_alias_path();
    let registry = AliasRegistry::load(&alias_path)
        .with_context(|| format!("load alias registry {}", alias_path.display()))?;
    let input = PipelineInput::load(&config)?;
    let output = pipeline::run(&registry, &input, &config.metrics, config.season);
    let summary = output.unresolved_summary();

    println!("Team name diagnostics");
    println!("Alias file: {}", alias_path.display());
    println!(
        "Registry: {} teams, {} aliases",
        registry.team_count(),
        registry.alias_count()
    );

    let ambiguous = registry.ambiguous_global_keys();
    if !ambiguous.is_empty() {
        println!("Names shared by several teams (source-specific alias required):");
        for key in ambiguous {
            println!("   - {key}");
        }
    }

    let mut by_source: BTreeMap<Source, Vec<_>> = BTreeMap::new();
    for name in &summary {
        by_source.entry(name.source).or_default().push(name);
    }
    if by_source.is_empty() {
        println!("All source names resolved");
    }
    for (source, names) in &by_source {
        let rows: usize = names.iter().map(|n| n.occurrences).sum();
        println!("{source}: {} unresolved names ({rows} rows)", names.len());
        for name in names.iter().take(MAX_NAMES_PER_SOURCE) {
            println!("   - {:?} x{}", name.raw_name, name.occurrences);
        }
        if names.len() > MAX_NAMES_PER_SOURCE {
            println!("   ... {} more", names.len() - MAX_NAMES_PER_SOURCE);
        }
    }

    if !output.unresolved_opponents.is_empty() {
        println!(
            "Opponents outside the registry: {}",
            output.unresolved_opponents.len()
        );
        for name in output.unresolved_opponents.iter().take(MAX_NAMES_PER_SOURCE) {
            println!("   - {name:?}");
        }
    }
    for skipped in &output.skipped_sources {
        println!("Skipped {}: {}", skipped.source, skipped.reason);
    }

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("create output dir {}", config.output_dir.display()))?;
    let path = config.output_dir.join(UNRESOLVED_FILE);
    let file = std::fs::File::create(&path)
        .with_context(|| format!("create {}", path.display()))?;
    export::write_unresolved(file, &summary)?;
    println!("Wrote {}", path.display());
    Ok(())
}
