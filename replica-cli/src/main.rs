//! Replica snapshot CLI
//!
//! Rebuilds serialized snapshots into an in-memory DOM for inspection.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use replica_css::{BuildCache, adapt_css_for_replay, try_adapt_css};
use replica_dom::{NodeId, print_tree};
use replica_snapshot::{
    ArenaHost, BuildOptions, CaptureState, Mirror, SerializePolicy, SerializedNode, Serializer,
    rebuild,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Replica: stable-identity DOM snapshot tooling
#[derive(Parser, Debug)]
#[command(name = "replica")]
#[command(author, version, about, long_about = None)]
#[command(after_help = r#"EXAMPLES:
    # Rebuild a snapshot and print the resulting tree
    replica rebuild snapshot.json

    # Rebuild without replay CSS adaptation
    replica rebuild --no-hack-css snapshot.json

    # Rebuild, capture again and compare
    replica roundtrip --policy policy.json snapshot.json

    # Show how a stylesheet is adapted for replay
    replica adapt theme.css
"#)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild a snapshot into a fresh document and print it
    Rebuild {
        /// Serialized snapshot (JSON)
        #[arg(value_name = "FILE")]
        snapshot: PathBuf,

        /// Keep style text as captured
        #[arg(long)]
        no_hack_css: bool,

        /// Build only the top node
        #[arg(long)]
        skip_child: bool,
    },
    /// Rebuild a snapshot, serialize the result and compare with the input
    Roundtrip {
        /// Serialized snapshot (JSON)
        #[arg(value_name = "FILE")]
        snapshot: PathBuf,

        /// Capture policy (JSON); defaults apply to missing fields
        #[arg(long, value_name = "FILE")]
        policy: Option<PathBuf>,

        /// Print the recaptured snapshot
        #[arg(long)]
        print: bool,
    },
    /// Print a stylesheet adapted for replay
    Adapt {
        /// Stylesheet file
        #[arg(value_name = "FILE")]
        stylesheet: PathBuf,

        /// Fail on scan errors instead of passing the text through
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Rebuild {
            snapshot,
            no_hack_css,
            skip_child,
        } => run_rebuild(&snapshot, &BuildOptions {
            hack_css: !no_hack_css,
            skip_child,
        }),
        Command::Roundtrip {
            snapshot,
            policy,
            print,
        } => run_roundtrip(&snapshot, policy.as_deref(), print),
        Command::Adapt { stylesheet, strict } => run_adapt(&stylesheet, strict),
    }
}

fn load_snapshot(path: &Path) -> Result<SerializedNode> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read snapshot {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid snapshot {}", path.display()))
}

/// Rebuild into a fresh arena; returns the host, the built node and the
/// number of mirrored nodes.
fn materialize(
    snapshot: &SerializedNode,
    options: &BuildOptions,
) -> Result<(ArenaHost, NodeId, usize)> {
    let mut host = ArenaHost::default();
    let mut mirror = Mirror::new();
    let mut cache = BuildCache::new();
    let built = rebuild(snapshot, &mut host, &mut mirror, &mut cache, options)
        .context("snapshot did not rebuild")?;
    info!(nodes = mirror.len(), css_cache = cache.len(), "rebuilt snapshot");
    Ok((host, built, mirror.len()))
}

fn run_rebuild(path: &Path, options: &BuildOptions) -> Result<()> {
    let snapshot = load_snapshot(path)?;
    let (host, built, mirrored) = materialize(&snapshot, options)?;

    println!("{}", "=== DOM Tree ===".bold());
    print_tree(host.tree(), built, 0);

    println!("\n{}", "=== Mirror ===".bold());
    println!("{mirrored} nodes registered");
    Ok(())
}

fn run_roundtrip(path: &Path, policy_path: Option<&Path>, print: bool) -> Result<()> {
    let snapshot = load_snapshot(path)?;
    let policy: SerializePolicy = match policy_path {
        Some(policy_path) => {
            let text = fs::read_to_string(policy_path)
                .with_context(|| format!("cannot read policy {}", policy_path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid policy {}", policy_path.display()))?
        }
        None => SerializePolicy::default(),
    };
    // Unadapted, so style text compares equal.
    let options = BuildOptions {
        hack_css: false,
        ..BuildOptions::default()
    };
    let (host, built, _) = materialize(&snapshot, &options)?;

    let mut state = CaptureState::new();
    let mut serializer = Serializer::new(&host, &mut state, &policy);
    let recaptured = serializer
        .serialize(built)
        .context("rebuilt tree did not serialize")?;
    let waits = serializer.finish().len();
    if waits > 0 {
        info!(waits, "skipped resource waits during recapture");
    }

    if print {
        println!("{}", serde_json::to_string_pretty(&recaptured)?);
    }
    if recaptured == snapshot {
        println!("{}", "round trip identical".green());
    } else {
        println!("{}", "round trip differs".red());
        let before = serde_json::to_value(&snapshot)?;
        let after = serde_json::to_value(&recaptured)?;
        let _ = report_difference(&before, &after, "$");
    }
    Ok(())
}

/// Print the first path where two JSON values diverge.
fn report_difference(before: &serde_json::Value, after: &serde_json::Value, path: &str) -> bool {
    use serde_json::Value;
    match (before, after) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            keys.into_iter().any(|key| {
                let missing = Value::Null;
                report_difference(
                    a.get(key).unwrap_or(&missing),
                    b.get(key).unwrap_or(&missing),
                    &format!("{path}.{key}"),
                )
            })
        }
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => a
            .iter()
            .zip(b)
            .enumerate()
            .any(|(i, (x, y))| report_difference(x, y, &format!("{path}[{i}]"))),
        _ if before == after => false,
        _ => {
            println!("  at {}: {} -> {}", path.yellow(), before, after);
            true
        }
    }
}

fn run_adapt(path: &Path, strict: bool) -> Result<()> {
    let css = fs::read_to_string(path)
        .with_context(|| format!("cannot read stylesheet {}", path.display()))?;
    let adapted = if strict {
        try_adapt_css(&css).with_context(|| format!("cannot adapt {}", path.display()))?
    } else {
        adapt_css_for_replay(&css, &mut BuildCache::new())
    };
    println!("{adapted}");
    Ok(())
}
