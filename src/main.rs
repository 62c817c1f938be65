use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};
use taxonomy_remap::{
    open_warehouse, remove_liveramp_provider, AudienceDb, AudienceServiceClient, BatchDriver,
    CandidateScope, Config, DataSourceId, DeprecationNotifier, Mapping, RemapError, Rewriter,
    RunReport,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "taxonomy-remap", version, about = "Move audience expressions from retired data sources to a new one")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rewrite every stored expression, push the changed ones and deprecate the remapped categories.
    Run(RunArgs),
    /// Rewrite the expressions read from stdin, one per line, and print them to stdout.
    Rewrite(RemapArgs),
}

#[derive(Debug, Args)]
struct RemapArgs {
    /// The data source receiving the remapped categories.
    #[arg(long)]
    target: i64,
    /// An origin data source, paired by position with a --mapping file.
    #[arg(long = "origin")]
    origins: Vec<i64>,
    /// A CSV file mapping the categories of the origin at the same position.
    #[arg(long = "mapping")]
    mappings: Vec<PathBuf>,
    /// An origin data source whose categories move unchanged to the target.
    #[arg(long = "relabel")]
    relabels: Vec<i64>,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// The TOML configuration file.
    #[arg(long, short, default_value = "taxonomy-remap.toml")]
    config: PathBuf,
    #[command(flatten)]
    remap: RemapArgs,
    /// Rewrite and report without pushing nor deprecating anything.
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long, value_enum)]
    scope: Option<CandidateScope>,
    /// Keep the remapped categories active.
    #[arg(long)]
    skip_deprecation: bool,
    /// Stop the automated LiveRamp updates of this provider once its LiveRamp categories are
    /// deprecated. Only applies when LiveRamp is an origin.
    #[arg(long, value_name = "NAME")]
    remove_liveramp_provider: Option<String>,
}

#[derive(Serialize)]
struct Summary<'a> {
    target: DataSourceId,
    origins: Vec<DataSourceId>,
    dry_run: bool,
    deprecation_attempted: bool,
    #[serde(flatten)]
    report: &'a RunReport,
}

impl RemapArgs {
    fn rewriter(&self) -> Result<Rewriter> {
        if self.origins.len() != self.mappings.len() {
            bail!(
                "every --origin needs a --mapping ({} origins, {} mappings)",
                self.origins.len(),
                self.mappings.len()
            );
        }

        let mut builder = Rewriter::builder(DataSourceId(self.target));
        for (origin, path) in self.origins.iter().zip(&self.mappings) {
            let categories = builder
                .with_mapping_file(DataSourceId(*origin), path)
                .with_context(|| format!("failed to load mapping {}", path.display()))?;
            info!(origin, mapping = %path.display(), categories, "loaded mapping");
        }
        for origin in &self.relabels {
            builder
                .with_origin(DataSourceId(*origin), Mapping::Relabel)
                .map_err(RemapError::from)?;
        }
        Ok(builder.build().map_err(RemapError::from)?)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Rewrite(args) => rewrite(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let rewriter = args.remap.rewriter()?;

    let mut options = config.run_options();
    options.dry_run = args.dry_run;
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if let Some(scope) = args.scope {
        options.scope = scope;
    }

    let service = config.audience_service()?;
    let client = AudienceServiceClient::new(
        &service.url,
        &service.path,
        &service.user_id,
        service.host.as_deref(),
        service.timeout(),
        config.retry.clone(),
    )?;
    let operational = AudienceDb::open(&config.operational.path)
        .with_context(|| format!("failed to open {}", config.operational.path))?;

    info!(
        environment = %config.environment,
        target = %rewriter.target(),
        dry_run = options.dry_run,
        "starting the remap"
    );
    let report = BatchDriver::new(&rewriter, &operational, &client, options).run()?;

    // Nothing below may abort the run once the expressions are pushed.
    let deprecation_attempted = if args.dry_run || args.skip_deprecation {
        info!("skipping the deprecation of the remapped categories");
        false
    } else if !report.failed.is_empty() {
        warn!(
            failed = report.failed.len(),
            "some expressions were not pushed, keeping the remapped categories active"
        );
        false
    } else {
        let warehouse = open_warehouse(&config.warehouse);
        DeprecationNotifier::new(warehouse.as_ref(), &operational).deprecate_origins(&rewriter);
        if let Some(provider_name) = &args.remove_liveramp_provider {
            remove_liveramp_provider(&operational, &rewriter, provider_name);
        }
        true
    };

    let summary = Summary {
        target: rewriter.target(),
        origins: rewriter
            .origins()
            .iter()
            .map(|rule| rule.data_source_id)
            .collect(),
        dry_run: args.dry_run,
        deprecation_attempted,
        report: &report,
    };
    serde_json::to_writer_pretty(io::stdout().lock(), &summary)?;
    println!();
    Ok(())
}

fn rewrite(args: RemapArgs) -> Result<()> {
    let rewriter = args.rewriter()?;
    let mut stdout = io::stdout().lock();
    for (index, line) in io::stdin().lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match rewriter.rewrite_text(&line) {
            Ok(rewritten) => writeln!(stdout, "{}", rewritten.expression)?,
            Err(error) => {
                warn!(line = index + 1, %error, "skipping malformed expression");
                writeln!(stdout, "{line}")?;
            }
        }
    }
    Ok(())
}
