//! fedplan CLI: validate, plan, and run federation documents.

use clap::{Parser, Subcommand};
use fedplan_core::config::FederationConfig;
use fedplan_core::context::QueryContext;
use fedplan_exec::{Engine, SourceRegistry};
use fedplan_planner::dsl::yaml::{FederationDoc, ResolvedFederation};
use fedplan_planner::{parse_federation, FederationSettings, Planner};
use fedplan_source::MemorySource;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fedplan")]
#[command(about = "Plan and run conjunctive queries over federated sources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and resolve a federation document
    Validate {
        /// Path to the federation YAML file
        #[arg(short, long)]
        federation: PathBuf,
    },

    /// Show the federated plan (EXPLAIN)
    Plan {
        /// Path to the federation YAML file
        #[arg(short, long)]
        federation: PathBuf,

        /// Skip equivalence cleaning
        #[arg(long)]
        no_clean: bool,
    },

    /// Plan, execute against the in-memory sources, and print solutions
    Run {
        /// Path to the federation YAML file
        #[arg(short, long)]
        federation: PathBuf,

        /// Fail the run on pagination errors after the first page
        #[arg(long)]
        strict_paging: bool,

        /// Cap on pages fetched per leaf
        #[arg(long)]
        max_pages: Option<usize>,
    },
}

/// Flag-level config overrides, applied after env and document settings.
#[derive(Debug, Default)]
struct FlagOverrides {
    no_clean: bool,
    strict_paging: bool,
    max_pages: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { federation } => {
            if let Err(e) = validate_federation(&federation) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Federation is valid");
        }
        Commands::Plan {
            federation,
            no_clean,
        } => {
            let flags = FlagOverrides {
                no_clean,
                ..FlagOverrides::default()
            };
            if let Err(e) = explain_federation(&federation, &flags) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Run {
            federation,
            strict_paging,
            max_pages,
        } => {
            let flags = FlagOverrides {
                no_clean: false,
                strict_paging,
                max_pages,
            };
            if let Err(e) = run_federation(&federation, &flags) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load(path: &Path) -> Result<(FederationDoc, ResolvedFederation), Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(path)?;
    let doc = parse_federation(&yaml_content)?;
    let resolved = doc.resolve()?;
    Ok((doc, resolved))
}

fn resolve_config(
    base: FederationConfig,
    doc: Option<&FederationSettings>,
    flags: &FlagOverrides,
) -> FederationConfig {
    let mut config = base;
    if let Some(settings) = doc {
        settings.apply(&mut config);
    }
    if flags.no_clean {
        config.clean_equivalents = false;
    }
    if flags.strict_paging {
        config.strict_paging = true;
    }
    if let Some(max) = flags.max_pages {
        config.max_pages_per_leaf = Some(max);
    }
    config
}

fn build_planner(resolved: &ResolvedFederation, config: FederationConfig) -> Planner {
    Planner::builder(resolved.catalog.clone())
        .config(config)
        .hints(resolved.hints.clone())
        .build()
}

fn validate_federation(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (doc, resolved) = load(path)?;
    for src in &doc.sources {
        src.paging.build()?;
        src.rate_limit.build()?;
        src.parse_triples()?;
    }
    println!(
        "  {} sources, {} leaves",
        resolved.catalog.iter().count(),
        resolved.bindings.len()
    );
    Ok(())
}

fn explain_federation(path: &Path, flags: &FlagOverrides) -> Result<(), Box<dyn std::error::Error>> {
    let (doc, resolved) = load(path)?;
    let config = resolve_config(FederationConfig::from_env(), doc.config.as_ref(), flags);
    let planner = build_planner(&resolved, config);

    let mut ctx = QueryContext::new();
    let plan = planner.plan(&resolved.bindings, &mut ctx)?;

    println!("Federated Plan");
    println!("==============");
    println!();
    println!("{}", plan.render());
    println!();
    println!("{}", plan.explain());
    println!("Plan hash: {}", plan.fingerprint()?);
    for (key, value) in ctx.iter() {
        println!("  {key}: {value}");
    }
    Ok(())
}

fn run_federation(path: &Path, flags: &FlagOverrides) -> Result<(), Box<dyn std::error::Error>> {
    let (doc, resolved) = load(path)?;
    let config = resolve_config(FederationConfig::from_env(), doc.config.as_ref(), flags);
    let planner = build_planner(&resolved, config.clone());

    let mut registry = SourceRegistry::new();
    for src in &doc.sources {
        let descriptor = resolved
            .catalog
            .find_by_name(&src.name)
            .ok_or_else(|| format!("source '{}' missing from catalog", src.name))?
            .clone();
        let mut source = MemorySource::new(descriptor)
            .with_paging(src.paging.build()?)
            .with_rate_limit(src.rate_limit.build()?)
            .with_triples(src.parse_triples()?);
        if let Some(size) = src.page_size {
            source = source.with_page_size(size);
        }
        tracing::debug!(source = %src.name, triples = source.triple_count(), "registered source");
        registry.register(Arc::new(source))?;
    }

    let mut ctx = QueryContext::new();
    let plan = planner.plan(&resolved.bindings, &mut ctx)?;
    let engine = Engine::new(config, registry);
    let output = engine.run(&plan, &ctx)?;

    for solution in &output.solutions {
        println!("{}", serde_json::to_string(solution)?);
    }
    println!();
    println!("✓ {} solutions", output.manifest.solutions);
    println!(
        "  Duration: {}ms",
        output.manifest.finished_ms.saturating_sub(output.manifest.started_ms)
    );
    println!("  Pages fetched: {}", output.manifest.pages_fetched);
    println!("  Truncated leaves: {}", output.manifest.truncated_leaves);
    println!("  Plan hash: {}", output.manifest.plan_hash);
    tracing::debug!(manifest = %serde_json::to_string(&output.manifest)?, "run manifest");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_document_which_overrides_base() {
        let base = FederationConfig {
            strict_paging: false,
            max_pages_per_leaf: Some(3),
            ..FederationConfig::default()
        };
        let doc = FederationSettings {
            max_pages_per_leaf: Some(5),
            clean_equivalents: Some(false),
            ..FederationSettings::default()
        };
        let flags = FlagOverrides {
            strict_paging: true,
            ..FlagOverrides::default()
        };
        let cfg = resolve_config(base, Some(&doc), &flags);
        assert!(cfg.strict_paging);
        assert_eq!(cfg.max_pages_per_leaf, Some(5));
        assert!(!cfg.clean_equivalents);

        let cfg = resolve_config(
            FederationConfig::default(),
            None,
            &FlagOverrides {
                max_pages: Some(1),
                ..FlagOverrides::default()
            },
        );
        assert_eq!(cfg.max_pages_per_leaf, Some(1));
        assert!(cfg.clean_equivalents);
    }
}
