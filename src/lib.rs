pub mod cli;
pub mod config;
pub mod event;
pub mod filter;
pub mod parser;
pub mod record;
pub mod report;
pub mod tree;
pub mod value;

use anyhow::{Context, bail};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

pub use cli::{Cli, ColorMode, Commands, OutputFormat, cli_parse};
pub use config::{FilterConfig, load_config};
pub use event::{AspectRegistry, EventAspect, EventFilter, TraceEvent};
pub use filter::{
    CompiledComparison, CompiledExpression, CompiledFilter, Connective, FilterParseError,
    OperatorKind, RecordPredicate, compile, compile_str, generate,
};
pub use parser::{ParseError, RawRecord, parse_record_file};
pub use record::Record;
pub use tree::{FilterNode, FilterTree, NodeId, NodeKind, TreeGenerator, to_tree};
pub use value::{Number, Value};

use crate::filter::{Coercer, PredicateOptions, generate_with};
use crate::tree::{NamedFilterNode, TraceTypeNode};

fn init_logging(verbose: u8, quiet: bool) {
    let default_filter = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A subscriber may already be installed when run() is embedded
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact()
        .with_env_filter(filter)
        .try_init();
}

fn apply_color_mode(mode: ColorMode) {
    match mode {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }
}

fn require_filter(cli: &Cli) -> anyhow::Result<&str> {
    match cli.filter.as_deref() {
        Some(text) => Ok(text),
        None => bail!("This command needs a filter expression (--filter)"),
    }
}

/// Parse and compile `text`, reporting why it failed.
fn compile_strict(text: &str) -> anyhow::Result<CompiledFilter> {
    let tree = filter::parse(text).with_context(|| format!("Invalid filter expression '{text}'"))?;
    match compile(&tree) {
        Some(compiled) => Ok(compiled),
        None => bail!("Filter expression '{text}' does not compile"),
    }
}

fn saved_filters<'a>(config: &'a FilterConfig, names: &[String]) -> anyhow::Result<Vec<(&'a str, CompiledFilter)>> {
    let mut filters = Vec::new();
    for name in names {
        let Some(saved) = config.saved_filter(name) else {
            bail!("Unknown saved filter '{name}'");
        };
        match compile_str(&saved.expression) {
            Some(compiled) => filters.push((saved.name.as_str(), compiled)),
            None => warn!(name = %saved.name, "Saved filter does not compile; ignoring it"),
        }
    }
    Ok(filters)
}

/// Tree for the `filter --tree` path: the main filter plus one named node per
/// saved filter, optionally behind a trace-type gate.
fn build_event_tree(
    generator: &TreeGenerator,
    compiled: Option<&CompiledFilter>,
    saved: &[(&str, CompiledFilter)],
    trace_type: Option<&str>,
) -> anyhow::Result<FilterTree> {
    let mut tree = FilterTree::new();
    let mut parent = tree.root();
    if let Some(id) = trace_type {
        let gate = tree.add_child(parent, FilterNode::TraceTypeGate(TraceTypeNode::new(id)))?;
        parent = tree.add_child(gate, FilterNode::And)?;
    }
    if let Some(compiled) = compiled {
        generator.generate_into(&mut tree, parent, compiled)?;
    }
    for (name, filter) in saved {
        let named = tree.add_child(parent, FilterNode::NamedFilter(NamedFilterNode::new(*name)))?;
        generator.generate_into(&mut tree, named, filter)?;
    }
    Ok(tree)
}

fn read_all(files: &[PathBuf]) -> anyhow::Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    for file in files {
        let mut parsed = parse_record_file(file)?;
        debug!(file = %file.display(), records = parsed.len(), "read record file");
        records.append(&mut parsed);
    }
    Ok(records)
}

fn print_matches(matched: &[&RawRecord], total: usize, format: OutputFormat, count: bool) {
    match (format, count) {
        (OutputFormat::Text, true) => println!("{}", matched.len()),
        (OutputFormat::Text, false) => {
            for record in matched {
                println!("{}", record.text);
            }
        }
        (OutputFormat::Json, true) => {
            println!("{}", serde_json::json!({ "matched": matched.len(), "total": total }));
        }
        (OutputFormat::Json, false) => {
            let records: Vec<_> = matched.iter().map(|r| &r.value).collect();
            println!(
                "{}",
                serde_json::json!({ "matched": matched.len(), "total": total, "records": records })
            );
        }
    }
}

fn run_filter(
    cli: &Cli,
    config: &FilterConfig,
    files: &[PathBuf],
    use_tree: bool,
    saved: &[String],
    trace_type: Option<&str>,
    count: bool,
) -> anyhow::Result<()> {
    let compiled = match cli.filter.as_deref() {
        Some(text) => {
            let compiled = compile_str(text);
            if compiled.is_none() && !cli.quiet {
                eprintln!(
                    "{} filter '{}' is malformed; no filtering applied",
                    "Warning:".yellow().bold(),
                    text
                );
            }
            compiled
        }
        None => None,
    };
    let saved = saved_filters(config, saved)?;
    let records = read_all(files)?;

    let matched: Vec<&RawRecord> = if use_tree || trace_type.is_some() {
        let generator = TreeGenerator::from_config(config, AspectRegistry::builtin());
        let tree = build_event_tree(&generator, compiled.as_ref(), &saved, trace_type)?;
        debug!(tree = %tree.outline(), "evaluating with filter tree");
        records
            .iter()
            .filter(|r| tree.matches(&TraceEvent::from_json(&r.value, &config.records)))
            .collect()
    } else {
        let coercer = Coercer::new(&config.coercion);
        let options = PredicateOptions::from(&config.matching);
        let predicates: Vec<RecordPredicate> = compiled
            .iter()
            .chain(saved.iter().map(|(_, filter)| filter))
            .map(|filter| generate_with(filter, &coercer, &options))
            .collect();
        records
            .iter()
            .filter(|r| {
                let record = TraceEvent::from_json(&r.value, &config.records).to_record();
                predicates.iter().all(|p| p.test(&record))
            })
            .collect()
    };

    info!(matched = matched.len(), total = records.len(), "filtering done");
    print_matches(&matched, records.len(), cli.format, count);
    Ok(())
}

fn run_explain(cli: &Cli, config: &FilterConfig) -> anyhow::Result<()> {
    let text = require_filter(cli)?;
    let compiled = compile_strict(text)?;
    let tree = TreeGenerator::from_config(config, AspectRegistry::builtin()).generate(&compiled);

    match cli.format {
        OutputFormat::Text => print!("{}", report::explain_text(&compiled, &tree)),
        OutputFormat::Json => {
            let value = report::explain_json(text, &compiled, &tree);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn run_check(cli: &Cli) -> anyhow::Result<()> {
    let text = require_filter(cli)?;
    let compiled = compile_strict(text)?;
    match cli.format {
        OutputFormat::Text if !cli.quiet => println!("{} {}", "OK".green().bold(), compiled),
        OutputFormat::Text => {}
        OutputFormat::Json => println!("{}", serde_json::json!({ "valid": true, "rendered": compiled.to_string() })),
    }
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    let cli = cli_parse();
    init_logging(cli.verbose, cli.quiet);
    apply_color_mode(cli.color);

    let config = load_config(cli.config.as_deref()).context("Failed to load config")?;
    debug!(profile = %config.profile_name, "configuration loaded");
    if let Some(text) = &cli.filter {
        debug!(filter = %text, "filter expression");
    }

    match &cli.command {
        Commands::Filter {
            files,
            tree,
            saved,
            trace_type,
            count,
        } => run_filter(&cli, &config, files, *tree, saved, trace_type.as_deref(), *count),
        Commands::Explain => run_explain(&cli, &config),
        Commands::Check => run_check(&cli),
    }
}
