#![deny(unsafe_code)]
//! Accord demo binary.
//!
//! Runs the shared-todo protocol end to end on an in-process network:
//! 1. PartyA creates a todo assigned to PartyB
//! 2. PartyB completes it
//! 3. Both parties print their view of the record
//!
//! No external services required; every party and the ordering authority run
//! in this process.

use std::sync::Arc;

use accord_flow::telemetry::init_tracing;
use accord_flow::{NodeConfig, PartyNode, ProgressEvent, SimNetwork, VaultConfig};
use accord_notary::OrderingAuthority;
use accord_types::TodoItem;
use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;

/// Accord demo CLI
#[derive(Parser)]
#[command(name = "accord-demo")]
#[command(about = "Create and complete a shared todo between two parties", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (logging and vault settings)
    #[arg(short, long, env = "ACCORD_CONFIG")]
    config: Option<String>,

    /// Title of the todo PartyA assigns to PartyB
    #[arg(long, default_value = "buy milk")]
    title: String,

    #[arg(long, default_value = "two pints, semi-skimmed")]
    description: String,

    /// Directory for per-party journals; omit for in-memory vaults
    #[arg(long)]
    journal_dir: Option<std::path::PathBuf>,

    /// Enable JSON logging
    #[arg(long)]
    json: bool,
}

const BANNER: &str = r#"
 ╔══════════════════════════════════════════════════════╗
 ║        Accord  --  shared todo protocol demo         ║
 ╚══════════════════════════════════════════════════════╝
"#;

fn section(title: &str) {
    println!();
    println!(" ── {title} {}", "─".repeat(50usize.saturating_sub(title.len())));
}

fn ok(msg: &str) {
    println!("   [OK]  {msg}");
}

fn note(msg: &str) {
    println!("   [--]  {msg}");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut base = NodeConfig::load(cli.config.as_deref()).context("loading configuration")?;
    base.logging.json |= cli.json;
    init_tracing(&base.logging).context("installing tracing subscriber")?;

    println!("{BANNER}");

    let node_config = |party: &str| {
        let mut config = base.clone();
        config.party = party.to_string();
        if let Some(dir) = &cli.journal_dir {
            config.vault = VaultConfig::Journal {
                path: dir.join(format!("{party}.jsonl")),
            };
        }
        config
    };

    section("Network");
    let mut sim = SimNetwork::new("Notary");
    let a = sim.add_node(&node_config("PartyA")).await?;
    let b = sim.add_node(&node_config("PartyB")).await?;
    ok(&format!("authority {}", sim.notary().identity()));
    for node in sim.nodes() {
        let peers: Vec<_> = node.peers().into_iter().map(|p| p.name).collect();
        ok(&format!("{} online, peers {:?}", node.whoami(), peers));
    }

    section("Create");
    let printer = spawn_progress_printer("PartyA", a.subscribe());
    let created = a
        .propose_create(TodoItem::new(&cli.title, &cli.description), "PartyB")
        .await
        .context("create run failed")?;
    ok(&format!(
        "committed {} (sequence {}) for record {}",
        created.id,
        created.attestation.sequence,
        created.linear_id()
    ));

    section("Complete");
    let completed = b
        .propose_complete(created.linear_id())
        .await
        .context("complete run failed")?;
    ok(&format!(
        "committed {} (sequence {}) consuming {}",
        completed.id,
        completed.attestation.sequence,
        created.output_ref()
    ));

    section("Views");
    print_view(&a)?;
    print_view(&b)?;

    printer.abort();
    info!("demo finished");
    Ok(())
}

fn spawn_progress_printer(
    party: &'static str,
    mut rx: broadcast::Receiver<ProgressEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                ProgressEvent::Step(step) => note(&format!("{party}: {}", step.label())),
                ProgressEvent::Session {
                    counterparty,
                    state,
                } => note(&format!("{party}: session with {counterparty} {state:?}")),
                ProgressEvent::Committed { transition, .. } => {
                    note(&format!("{party}: committed {transition}"))
                }
                ProgressEvent::RecordFailed { transition, reason } => {
                    note(&format!("{party}: could not record {transition}: {reason}"))
                }
                ProgressEvent::DistributionFailed { party: peer, reason } => {
                    note(&format!("{party}: {peer} missed the commit: {reason}"))
                }
            }
        }
    })
}

fn print_view(node: &Arc<PartyNode>) -> anyhow::Result<()> {
    let me = node.whoami();
    note(&format!(
        "{me}: {} todos, {} open for me, {} completed by me, {} owned",
        node.todos()?.count(),
        node.my_todos()?.count(),
        node.my_completed_todos()?.count(),
        node.my_owned_todos()?.count(),
    ));
    for entry in node.todos()?.iter() {
        let record = &entry.record;
        note(&format!(
            "{me}:   [{}] {} ({} -> {}) @ {}",
            if record.is_complete() { "x" } else { " " },
            record.payload.title,
            record.owner,
            record.assignee,
            entry.reference
        ));
    }
    Ok(())
}
