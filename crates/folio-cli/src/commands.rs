use std::path::Path;

use colored::Colorize;
use serde_json::json;

use folio_gate::ValidatorKind;
use folio_txn::{FolioConfig, Persistency, TxnError};

use crate::cli::*;
use crate::graph::{self, GraphSpec};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Check(args) => cmd_check(args, cli.format),
        Command::Config(args) => cmd_config(args, cli.format),
        Command::Validators => cmd_validators(cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FolioConfig> {
    match path {
        Some(path) => Ok(FolioConfig::load(path)?),
        None => Ok(FolioConfig::default()),
    }
}

fn cmd_check(args: CheckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let spec = GraphSpec::load(&args.path)?;
    let persistency = Persistency::in_memory(config);

    let mut kinds = ValidatorKind::DEFAULT_CHAIN.to_vec();
    if args.top_level {
        kinds.push(ValidatorKind::TopLevelFolder);
    }
    let mut txn = persistency.open_transaction_for(&kinds)?;
    if args.no_validate {
        txn.enable_validators(false);
    }
    let outcome = graph::import(&mut txn, &spec, args.author.as_deref());
    txn.close()?;

    let path = args.path.display().to_string();
    match outcome {
        Ok(report) => {
            match format {
                OutputFormat::Json => println!("{}", json!({ "accepted": true, "report": report })),
                OutputFormat::Text => {
                    println!("{} {} accepted", "✓".green().bold(), path.bold());
                    println!("  Projects: {}", report.projects);
                    println!("  Objects: {}", report.objects);
                    println!("  Connections: {}", report.connections);
                    if args.no_validate {
                        println!("  {}", "validators were disabled".yellow());
                    }
                }
            }
            Ok(())
        }
        Err(TxnError::Validation(violation)) => {
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    json!({
                        "accepted": false,
                        "rule": violation.rule,
                        "object": violation.object,
                        "message": violation.message,
                    })
                ),
                OutputFormat::Text => {
                    println!("{} {} rejected", "✗".red().bold(), path.bold());
                    println!("  Rule: {}", violation.rule.yellow());
                    println!("  Object: {}", violation.object);
                    println!("  Reason: {}", violation.message);
                }
            }
            anyhow::bail!("{path} violates the {} rule", violation.rule)
        }
        Err(other) => Err(other.into()),
    }
}

fn cmd_config(args: ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

fn cmd_validators(format: OutputFormat) -> anyhow::Result<()> {
    let entries: Vec<_> = ValidatorKind::ALL
        .iter()
        .map(|kind| (kind, ValidatorKind::DEFAULT_CHAIN.contains(kind)))
        .collect();
    match format {
        OutputFormat::Json => {
            let list: Vec<_> = entries
                .iter()
                .map(|(kind, default)| json!({ "name": kind.rule_name(), "default": default }))
                .collect();
            println!("{}", serde_json::Value::Array(list));
        }
        OutputFormat::Text => {
            for (kind, default) in entries {
                let marker = if default { "default".green() } else { "opt-in".dimmed() };
                println!("  {:<18} {}", kind.rule_name().bold(), marker);
            }
        }
    }
    Ok(())
}
