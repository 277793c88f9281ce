mod config;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sigil_core::time::{format_span, millis_to_iso8601};
use sigil_core::{
    Braider, Category, ConsciousnessSnapshot, Encoder, PatternRecognizer, RelationKind, Sigil,
    SigilTags, SourceKind,
};
use sigil_store::Workspace;
use uuid::Uuid;

use crate::config::{CliConfig, load_config};

#[derive(Parser)]
#[command(name = "sigil", about = "Sigil encoding and pattern-fusion engine")]
struct Cli {
    /// Data directory (default: $SIGIL_DATA_DIR, then ~/.sigil)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode free text into a sigil and store it
    Encode {
        /// Text to encode
        text: String,

        /// Source kind (dream, meditation, breath, composite, consciousness)
        #[arg(long, value_parser = parse_kind)]
        kind: Option<SourceKind>,

        /// Human-readable label
        #[arg(long)]
        label: Option<String>,

        /// External entity id (dream, session, journal entry)
        #[arg(long)]
        external_id: Option<String>,

        /// Session the input belongs to
        #[arg(long)]
        session: Option<String>,

        /// Sigil that triggered this one
        #[arg(long)]
        triggered_by: Option<Uuid>,

        /// Print the sigil without storing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Encode a JSON consciousness snapshot ("-" reads stdin)
    Snapshot {
        path: PathBuf,

        #[arg(long, value_parser = parse_kind, default_value = "consciousness")]
        kind: SourceKind,

        #[arg(long)]
        label: Option<String>,
    },

    /// Show one sigil
    Show {
        id: Uuid,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored sigils, optionally filtered
    List {
        #[arg(long, value_parser = parse_kind)]
        kind: Option<SourceKind>,

        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,

        #[arg(long)]
        external_id: Option<String>,
    },

    /// Find sigils similar to a stored one
    Similar {
        id: Uuid,

        /// Minimum cosine similarity in [-1, 1] (default from config)
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,

        /// Show at most this many matches
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Cluster all stored sigils
    Cluster {
        /// Number of clusters (default: n/5, between 1 and 10)
        #[arg(long)]
        k: Option<usize>,
    },

    /// Summarize stored sigils over time
    Flow,

    /// Fuse two or more stored sigils into a braid
    Braid {
        #[arg(required = true)]
        ids: Vec<Uuid>,

        /// Also store the braid as a composite sigil
        #[arg(long)]
        composite: bool,

        /// Print the braid without storing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete a stored sigil
    Delete { id: Uuid },

    /// Show store statistics
    Stats,

    /// Export sigils and braids to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// Import sigils and braids from a JSON file, replacing the store
    Import {
        /// Input file path
        path: PathBuf,
    },
}

fn parse_kind(s: &str) -> std::result::Result<SourceKind, String> {
    SourceKind::parse(s).ok_or_else(|| {
        let names: Vec<&str> = SourceKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown source kind '{s}' (expected one of: {})", names.join(", "))
    })
}

fn parse_category(s: &str) -> std::result::Result<Category, String> {
    Category::parse(s).ok_or_else(|| {
        let names: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown category '{s}' (expected one of: {})", names.join(", "))
    })
}

fn open_workspace(cli: &Cli) -> Result<(Workspace, CliConfig)> {
    let base_dir = cli
        .data_dir
        .clone()
        .or_else(|| std::env::var("SIGIL_DATA_DIR").ok().map(PathBuf::from));
    let ws = Workspace::open(base_dir.as_deref()).context("failed to open sigil store")?;
    let config = load_config(&ws.config_path())?;
    Ok((ws, config))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Encode {
            text,
            kind,
            label,
            external_id,
            session,
            triggered_by,
            dry_run,
        } => {
            let tags = SigilTags {
                triggered_by: *triggered_by,
                linked_entity_id: external_id.clone(),
                session_id: session.clone(),
                label: label.clone(),
                ..Default::default()
            };
            cmd_encode(&cli, text, *kind, tags, *dry_run)
        }
        Commands::Snapshot { path, kind, label } => {
            cmd_snapshot(&cli, path, *kind, label.clone())
        }
        Commands::Show { id, json } => cmd_show(&cli, *id, *json),
        Commands::List {
            kind,
            category,
            external_id,
        } => cmd_list(&cli, *kind, *category, external_id.as_deref()),
        Commands::Similar {
            id,
            threshold,
            limit,
        } => cmd_similar(&cli, *id, *threshold, *limit),
        Commands::Cluster { k } => cmd_cluster(&cli, *k),
        Commands::Flow => cmd_flow(&cli),
        Commands::Braid {
            ids,
            composite,
            dry_run,
        } => cmd_braid(&cli, ids, *composite, *dry_run),
        Commands::Delete { id } => cmd_delete(&cli, *id),
        Commands::Stats => cmd_stats(&cli),
        Commands::Export { path } => cmd_export(&cli, path),
        Commands::Import { path } => cmd_import(&cli, path),
    }
}

fn print_sigil(sigil: &Sigil) {
    println!("id:        {}", sigil.id());
    println!("label:     {}", sigil.display_label());
    println!("kind:      {}", sigil.source_kind());
    println!("category:  {}", sigil.category());
    println!("strength:  {:.3}", sigil.strength());
    println!("hash:      {}", sigil.origin_hash());
    println!("created:   {}", millis_to_iso8601(sigil.created_at()));
    if let Some(external) = &sigil.tags().linked_entity_id {
        println!("external:  {external}");
    }
    if let Some(cause) = sigil.tags().triggered_by {
        println!("triggered: {cause}");
    }
}

fn cmd_encode(
    cli: &Cli,
    text: &str,
    kind: Option<SourceKind>,
    tags: SigilTags,
    dry_run: bool,
) -> Result<()> {
    let (ws, config) = open_workspace(cli)?;
    let kind = kind.or(config.default_kind).unwrap_or(SourceKind::Dream);

    if let Some(cause) = tags.triggered_by
        && ws.store().load_sigil(cause)?.is_none()
    {
        tracing::warn!("triggering sigil {cause} is not stored");
    }

    let sigil = Encoder::new().encode_text(text, kind).with_tags(tags);
    if !dry_run {
        ws.store()
            .save_sigil(&sigil)
            .context("failed to save sigil")?;
    }
    print_sigil(&sigil);
    Ok(())
}

fn cmd_snapshot(cli: &Cli, path: &Path, kind: SourceKind, label: Option<String>) -> Result<()> {
    let json = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read snapshot from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };
    let snapshot: ConsciousnessSnapshot =
        serde_json::from_str(&json).context("invalid snapshot JSON")?;

    let (ws, _) = open_workspace(cli)?;
    let sigil = Encoder::new()
        .encode_snapshot_sigil(&snapshot, kind)
        .with_tags(SigilTags {
            label,
            ..Default::default()
        });
    ws.store()
        .save_sigil(&sigil)
        .context("failed to save sigil")?;
    print_sigil(&sigil);
    Ok(())
}

fn cmd_show(cli: &Cli, id: Uuid, json: bool) -> Result<()> {
    let (ws, _) = open_workspace(cli)?;
    let Some(sigil) = ws.store().load_sigil(id).context("failed to load sigil")? else {
        bail!("sigil {id} not found");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&sigil)?);
        return Ok(());
    }
    print_sigil(&sigil);
    let braids = ws
        .store()
        .braids_with_sigil(id)
        .context("failed to load braids")?;
    if !braids.is_empty() {
        println!("braids:    {}", braids.len());
    }
    Ok(())
}

fn cmd_list(
    cli: &Cli,
    kind: Option<SourceKind>,
    category: Option<Category>,
    external_id: Option<&str>,
) -> Result<()> {
    let (ws, _) = open_workspace(cli)?;
    let index = ws.store().load_index().context("failed to load sigils")?;

    let mut sigils: Vec<&Sigil> = match (kind, external_id) {
        (Some(kind), _) => index.by_source_kind(kind),
        (None, Some(external)) => index.find_by_external_tag(external),
        (None, None) => index.iter().collect(),
    };
    if let Some(external) = external_id {
        sigils.retain(|s| s.tags().linked_entity_id.as_deref() == Some(external));
    }
    if let Some(category) = category {
        sigils.retain(|s| s.category() == category);
    }

    if sigils.is_empty() {
        println!("(no sigils)");
    }
    for sigil in sigils {
        println!(
            "{}  {:<13} {:<13} {:.2}  {}",
            sigil.id(),
            sigil.source_kind().as_str(),
            sigil.category().as_str(),
            sigil.strength(),
            sigil.display_label()
        );
    }
    Ok(())
}

fn cmd_similar(cli: &Cli, id: Uuid, threshold: Option<f64>, limit: Option<usize>) -> Result<()> {
    let (ws, config) = open_workspace(cli)?;
    let index = ws.store().load_index().context("failed to load sigils")?;
    let Some(target) = index.get(id) else {
        bail!("sigil {id} not found");
    };

    let recognizer = PatternRecognizer::new(config.engine.recognizer);
    let threshold = threshold.unwrap_or(recognizer.config().similarity_threshold);
    let matches = recognizer.find_similar(target, index.iter(), threshold);

    if matches.is_empty() {
        println!("(no similar sigils at threshold {threshold:.2})");
        return Ok(());
    }
    for m in matches.iter().take(limit.unwrap_or(usize::MAX)) {
        println!(
            "{:>3}%  {}  {:<13} {}",
            m.percent(),
            m.sigil_id,
            m.category.as_str(),
            m.label
        );
    }
    Ok(())
}

fn cmd_cluster(cli: &Cli, k: Option<usize>) -> Result<()> {
    let (ws, config) = open_workspace(cli)?;
    let index = ws.store().load_index().context("failed to load sigils")?;

    let result = PatternRecognizer::new(config.engine.recognizer).cluster(index.iter(), k);
    if result.clusters.is_empty() {
        println!("(no sigils to cluster)");
        return Ok(());
    }

    for (i, cluster) in result.clusters.iter().enumerate() {
        println!("cluster {i}: {}  strength={:.2}", cluster.label, cluster.strength);
        for member in cluster.members.iter().filter_map(|id| index.get(*id)) {
            println!("    {}  {}", member.id(), member.display_label());
        }
    }
    if cli.verbose {
        eprintln!(
            "--- iterations={}, converged={} ---",
            result.iterations, result.converged
        );
    }
    Ok(())
}

fn cmd_flow(cli: &Cli) -> Result<()> {
    let (ws, config) = open_workspace(cli)?;
    let index = ws.store().load_index().context("failed to load sigils")?;

    let windows = PatternRecognizer::new(config.engine.recognizer).temporal_flow(index.iter());
    if windows.is_empty() {
        println!("(need at least 2 sigils for a flow)");
        return Ok(());
    }
    for w in windows {
        println!(
            "window {}: {} .. {}  count={}  dominant={}  mean_strength={:.2}",
            w.index,
            millis_to_iso8601(w.start),
            millis_to_iso8601(w.end),
            w.count,
            w.dominant_category,
            w.mean_strength
        );
    }
    Ok(())
}

fn cmd_braid(cli: &Cli, ids: &[Uuid], composite: bool, dry_run: bool) -> Result<()> {
    let (ws, config) = open_workspace(cli)?;
    let index = ws.store().load_index().context("failed to load sigils")?;
    let participants = index.get_many(ids)?;

    let braid = Braider::new(config.engine.braid).braid(participants)?;

    println!("braid:        {}", braid.id);
    println!("participants: {}", braid.participant_labels.join(", "));
    println!("fusion:       {:.3}", braid.fusion_score);
    println!("class:        {}", braid.classification);
    println!(
        "scores:       complexity={:.3} resonance={:.3} stability={:.3}",
        braid.complexity, braid.resonance, braid.stability
    );
    let counts: Vec<String> = [
        RelationKind::Temporal,
        RelationKind::Causal,
        RelationKind::Resonant,
        RelationKind::Symbolic,
    ]
    .iter()
    .map(|k| format!("{}={}", k.as_str(), braid.count_relations(*k)))
    .collect();
    println!("relations:    {}", counts.join(" "));

    if dry_run {
        return Ok(());
    }
    ws.store()
        .save_braid(&braid)
        .context("failed to save braid")?;
    if composite {
        let sigil = braid.to_composite_sigil();
        ws.store()
            .save_sigil(&sigil)
            .context("failed to save composite sigil")?;
        println!("composite:    {}", sigil.id());
    }
    Ok(())
}

fn cmd_delete(cli: &Cli, id: Uuid) -> Result<()> {
    let (ws, _) = open_workspace(cli)?;
    ws.store()
        .delete_sigil(id)
        .with_context(|| format!("failed to delete sigil {id}"))?;
    println!("deleted {id}");
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let (ws, _) = open_workspace(cli)?;
    let stats = ws.store().stats().context("failed to get stats")?;

    let span = match (stats.oldest, stats.newest) {
        (Some(lo), Some(hi)) => format_span(hi - lo),
        _ => "-".to_string(),
    };
    let categories: Vec<String> = stats
        .by_category
        .iter()
        .map(|(c, n)| format!("{c}={n}"))
        .collect();
    let kinds: Vec<String> = stats
        .by_source_kind
        .iter()
        .map(|(k, n)| format!("{k}={n}"))
        .collect();

    println!("sigils:     {}", stats.sigils);
    println!("braids:     {}", stats.braids);
    println!("span:       {span}");
    println!("categories: {}", categories.join(" "));
    println!("kinds:      {}", kinds.join(" "));
    println!("schema:     v{}", stats.schema_version.unwrap_or(0));
    println!("db:         {}", ws.db_path().display());
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path) -> Result<()> {
    let (ws, _) = open_workspace(cli)?;
    ws.store()
        .export_json_file(path)
        .with_context(|| format!("failed to export to {}", path.display()))?;

    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let (ws, _) = open_workspace(cli)?;
    let count = ws
        .store()
        .import_json_file(path)
        .context("failed to import JSON")?;
    let braids = ws
        .store()
        .load_braids()
        .context("failed to load braids after import")?;

    println!(
        "imported from {}. sigils={}, braids={}",
        path.display(),
        count,
        braids.len()
    );
    Ok(())
}
