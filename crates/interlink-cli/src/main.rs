//! Interlink CLI
//!
//! - `parse`: show how a specification expression is understood
//! - `plan`: show the plan a specification compiles to
//! - `run`: link two entity collections according to a run configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use interlink_dsl::{spec_digest_v1, LinkSpecification};
use interlink_engine::CanonicalPlanner;
use std::path::PathBuf;

mod run;

#[derive(Parser)]
#[command(name = "interlink")]
#[command(author, version, about = "Interlink: declarative link discovery between knowledge bases")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a specification and print its tree.
    Parse {
        /// Specification expression, e.g. `AND(trigrams(x.name,y.label)|0.8, ...)`
        expression: String,
        /// Target threshold of the whole expression
        #[arg(short, long, default_value_t = 1.0)]
        threshold: f64,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Compile a specification into its canonical nested plan.
    Plan {
        expression: String,
        #[arg(short, long, default_value_t = 1.0)]
        threshold: f64,
        /// Print the plan tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute a run configuration over two serialized entity collections.
    Run {
        /// Run configuration (JSON)
        config: PathBuf,
        /// Source instances (JSON array)
        #[arg(long)]
        source: PathBuf,
        /// Target instances (JSON array)
        #[arg(long)]
        target: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Parse {
            expression,
            threshold,
            json,
        } => cmd_parse(&expression, threshold, json),
        Commands::Plan {
            expression,
            threshold,
            json,
        } => cmd_plan(&expression, threshold, json),
        Commands::Run {
            config,
            source,
            target,
        } => run::cmd_run(&config, &source, &target),
    }
}

fn parse_spec(expression: &str, threshold: f64) -> Result<LinkSpecification> {
    LinkSpecification::parse(expression, threshold)
        .with_context(|| format!("failed to parse specification `{expression}`"))
}

fn cmd_parse(expression: &str, threshold: f64, json: bool) -> Result<()> {
    let spec = parse_spec(expression, threshold)?;

    if json {
        let leaves: Vec<_> = spec
            .leaf_paths()
            .into_iter()
            .map(|(path, leaf)| {
                serde_json::json!({
                    "path": path,
                    "expression": leaf.filter_expression(),
                    "threshold": leaf.threshold(),
                })
            })
            .collect();
        let out = serde_json::json!({
            "expression": spec.full_expression(),
            "threshold": spec.threshold(),
            "size": spec.size(),
            "digest": spec_digest_v1(&spec),
            "redundant_properties": spec.contains_redundant_properties(),
            "leaves": leaves,
            "tree": spec,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", spec);
    println!("{} {}", "canonical:".bold(), spec.full_expression());
    println!("{} {}", "size:".bold(), spec.size());
    println!("{} {}", "digest:".bold(), spec_digest_v1(&spec));
    for (path, leaf) in spec.leaf_paths() {
        let shown = leaf
            .shortened_filter_expression()
            .unwrap_or_else(|| leaf.full_expression().to_string());
        println!("  {} {}", shown.cyan(), path.dimmed());
    }
    if spec.contains_redundant_properties() {
        eprintln!(
            "{} two leaves compare the same property pair",
            "info:".yellow().bold()
        );
    }
    Ok(())
}

fn cmd_plan(expression: &str, threshold: f64, json: bool) -> Result<()> {
    let spec = parse_spec(expression, threshold)?;
    let plan = CanonicalPlanner.plan(&spec);

    if json {
        println!("{}", serde_json::to_string_pretty(&plan.to_tree())?);
    } else {
        print!("{}", plan.final_plan());
        if plan.is_atomic() {
            println!();
        }
        eprintln!(
            "{} {} instructions, measures: {}",
            "ok".green().bold(),
            plan.size(),
            plan.all_measures().join(", ")
        );
    }
    Ok(())
}
