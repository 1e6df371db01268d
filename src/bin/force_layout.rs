//! Lay out a graph from a JSON file
//!
//! Input: `{"config": {...}, "nodes": [...], "links": [...], "fixed": [...], "active": {...}}`
//! where `config` is a force transform definition. The laid out nodes and links are
//! printed as JSON.
//!
//! Run with: cargo run --bin force-layout -- graph.json [--output layout.json]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cim_graph_force::{ChangeSet, DataSource, ForceConfig, ForceTransform, InMemoryDataflow};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Lay out a graph with the force transform
#[derive(Parser, Debug)]
#[command(name = "force-layout", version, about, long_about = None)]
struct Cli {
    /// Graph file with `config`, `nodes`, `links`, `fixed` and `active`
    input: PathBuf,

    /// Write the layout here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct LayoutInput {
    config: Value,
    #[serde(default)]
    nodes: Vec<Value>,
    #[serde(default)]
    links: Vec<Value>,
    #[serde(default)]
    fixed: Vec<Value>,
    #[serde(default)]
    active: Option<Value>,
}

fn main() -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let raw = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let input: LayoutInput = serde_json::from_str(&raw).context("parsing layout input")?;
    let config = ForceConfig::from_json(input.config).context("invalid force configuration")?;

    let dataflow = Arc::new(InMemoryDataflow::new());
    let links_name = config.links_source()?.to_string();
    dataflow.ingest(&links_name, &input.links);
    if let Some(fixed) = config.fixed.as_deref() {
        dataflow.ingest(fixed, &input.fixed);
    }
    if let Some(active) = config.active.as_deref() {
        dataflow.define_signal(active, input.active.clone().unwrap_or(Value::Null));
    }

    let nodes = dataflow.records(&input.nodes);
    let interactive = config.interactive;
    let mut stage = ForceTransform::new(config, dataflow.clone())?.without_runtime();

    let output = stage.transform(ChangeSet::new().with_add(nodes.iter().cloned()))?;
    for diagnostic in &output.diagnostics {
        warn!(%diagnostic, "layout diagnostic");
    }

    if interactive {
        let mut frames = 0usize;
        while stage.advance_frame()?.is_some() {
            frames += 1;
        }
        info!(frames, "interactive layout settled");
    }

    let links = dataflow.source(&links_name).values();
    let result = json!({
        "nodes": nodes.iter().map(|n| n.to_json()).collect::<Vec<_>>(),
        "links": links.iter().map(|l| l.to_json()).collect::<Vec<_>>(),
    });
    let rendered = serde_json::to_string_pretty(&result)?;

    match cli.output {
        Some(path) => {
            std::fs::write(&path, rendered).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), nodes = nodes.len(), "layout written");
        }
        None => println!("{rendered}"),
    }

    stage.shutdown();
    Ok(())
}
