//! wd-reconcile CLI: push RDF statement descriptions to Wikidata.

use std::io::Read;
use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};

use wd_reconcile::api::{ApiConfig, WikidataApi};
use wd_reconcile::driver::{self, DriverConfig};
use wd_reconcile::loader::load_document;
use wd_reconcile::reconcile::EditOp;

#[derive(Parser)]
#[command(
    name = "wd-reconcile",
    version,
    about = "Reconcile RDF statement descriptions against live Wikidata items"
)]
struct Cli {
    /// Turtle input file, or "-" for stdin.
    #[arg(long, default_value = "-")]
    input: String,

    /// Account name (bot password form: User@botname).
    #[arg(long, env = "WIKIDATA_USERNAME")]
    username: Option<String>,

    /// Account password.
    #[arg(long, env = "WIKIDATA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Compute and print edit scripts without applying anything.
    #[arg(long)]
    dry_run: bool,

    /// URL of a page listing blocked item ids; listed items are skipped.
    #[arg(long)]
    blocklist_url: Option<String>,

    /// MediaWiki Action API endpoint.
    #[arg(long, default_value = wd_reconcile::api::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Mark edits as bot edits and assert a bot session.
    #[arg(long)]
    bot: bool,

    /// Minimum seconds between consecutive edits.
    #[arg(long, default_value = "1.0")]
    edit_interval: f64,

    /// Edit summary for entities without an editSummary directive.
    #[arg(long, default_value = "reconcile statements")]
    summary: String,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let input = if cli.input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .into_diagnostic()?;
        buffer
    } else {
        std::fs::read_to_string(&cli.input).into_diagnostic()?
    };

    let mut document = load_document(&input)?;
    if document.is_empty() {
        println!("Nothing to do: input describes no statements.");
        return Ok(());
    }

    let api = WikidataApi::new(ApiConfig {
        endpoint: cli.endpoint,
        bot: cli.bot,
        edit_interval: Duration::from_secs_f64(cli.edit_interval),
        ..ApiConfig::default()
    });

    let blocklist = match &cli.blocklist_url {
        Some(url) => api.fetch_page_qids(url)?,
        None => Default::default(),
    };

    if !cli.dry_run {
        let (Some(username), Some(password)) = (&cli.username, &cli.password) else {
            miette::bail!(
                "credentials required to edit; pass --username/--password \
                 or set WIKIDATA_USERNAME/WIKIDATA_PASSWORD (or use --dry-run)"
            );
        };
        api.login(username, password)?;
    }

    let config = DriverConfig {
        dry_run: cli.dry_run,
        default_summary: cli.summary,
        ..DriverConfig::default()
    };
    let outcome = driver::run(&mut document, &api, &blocklist, &config)?;

    for report in &outcome.reports {
        if report.skipped {
            println!("{}: skipped (blocklisted)", report.entity);
            continue;
        }
        if let Some(error) = &report.fetch_error {
            println!("{}: fetch failed: {error}", report.entity);
            continue;
        }
        if report.script.is_empty() {
            println!("{}: up to date", report.entity);
            continue;
        }
        println!("{}:", report.entity);
        for op in &report.script {
            println!("  {}", describe(op));
        }
        if let Some(apply) = &report.apply {
            for failure in &apply.failures {
                println!("  ! operation {} failed: {}", failure.index, failure.error);
            }
        }
    }

    let summary = &outcome.summary;
    println!(
        "{} entities, {} skipped, {} operations{}",
        summary.entities,
        summary.skipped,
        summary.operations,
        if cli.dry_run {
            " (dry run)".to_string()
        } else {
            format!(
                ", {} applied, {} failed",
                summary.applied, summary.failed_operations
            )
        }
    );

    if !outcome.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn describe(op: &EditOp) -> String {
    match op {
        EditOp::Add(statement) => {
            format!("+ {} {:?}", statement.property, statement.value)
        }
        EditOp::UpdateQualifiers { id, .. } => format!("~ qualifiers of {id}"),
        EditOp::UpdateReferences { id, .. } => format!("~ references of {id}"),
        EditOp::UpdateRank { id, rank } => format!("~ rank of {id} -> {rank}"),
        EditOp::Remove { id } => format!("- {id}"),
    }
}
