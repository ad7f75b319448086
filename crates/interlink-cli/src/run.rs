//! `interlink run`: configuration → caches → plan → links.

use anyhow::{Context, Result};
use colored::Colorize;
use interlink_dsl::LinkSpecification;
use interlink_engine::{Cache, CanonicalPlanner, Mapping, RunConfig, SimpleExecutionEngine};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub(crate) fn cmd_run(config_path: &Path, source_path: &Path, target_path: &Path) -> Result<()> {
    let config = RunConfig::from_path(config_path)
        .with_context(|| format!("failed to load run configuration {}", config_path.display()))?;
    let source = Cache::from_json_path(source_path)
        .with_context(|| format!("failed to load source instances {}", source_path.display()))?;
    let target = Cache::from_json_path(target_path)
        .with_context(|| format!("failed to load target instances {}", target_path.display()))?;
    tracing::info!(
        source = %config.source.id,
        target = %config.target.id,
        source_instances = source.size(),
        target_instances = target.size(),
        "loaded knowledge bases"
    );

    // Anything below the verification threshold is discarded anyway.
    let spec = LinkSpecification::parse(&config.metric, config.verification_threshold)
        .with_context(|| format!("failed to parse metric `{}`", config.metric))?;
    let plan = CanonicalPlanner.plan(&spec);

    let engine = SimpleExecutionEngine::new(
        Arc::new(source),
        Arc::new(target),
        config.source.var.clone(),
        config.target.var.clone(),
    );
    let execution = engine.execute_nested(&plan)?;
    for warning in &execution.warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }

    let (accepted, review) = execution
        .mapping
        .split_by_thresholds(config.acceptance_threshold, config.verification_threshold);
    emit("accepted", &accepted, config.acceptance_file.as_deref())?;
    emit("review", &review, config.verification_file.as_deref())?;
    Ok(())
}

fn emit(kind: &str, mapping: &Mapping, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            fs::write(path, mapping.pairs_output())
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "{} {} {} links to {}",
                "wrote".green().bold(),
                mapping.size(),
                kind,
                path.display().to_string().bold()
            );
        }
        None => {
            println!("# {kind} ({} links)", mapping.size());
            print!("{}", mapping.pairs_output());
        }
    }
    Ok(())
}
