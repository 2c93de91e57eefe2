use std::fs;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use snp_genotype_resolver::client::HttpGenotypeApi;
use snp_genotype_resolver::config::{ConfigLoader, resolve_token};
use snp_genotype_resolver::domain::{DatasetId, SnpId};
use snp_genotype_resolver::error::ResolverError;
use snp_genotype_resolver::output::JsonOutput;
use snp_genotype_resolver::resolver::Resolver;

#[derive(Parser)]
#[command(name = "snp-resolve")]
#[command(about = "Resolve SNP genotype calls from a remote dataset")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve through batched remote genotype queries")]
    Query(QueryArgs),
    #[command(about = "Resolve by downloading and decoding the genotype archive")]
    Archive(TargetArgs),
}

#[derive(Args)]
struct TargetArgs {
    #[arg(long)]
    dataset: String,

    #[arg(long)]
    token: Option<String>,

    /// File with one SNP id per line.
    #[arg(long)]
    snps_file: Option<String>,

    snps: Vec<String>,
}

#[derive(Args)]
struct QueryArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Minimum call quality; defaults to the configured value.
    #[arg(long)]
    quality: Option<f64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<ResolverError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ResolverError) -> u8 {
    match error {
        ResolverError::ArchiveNotFound { .. } => 2,
        ResolverError::Transport(_) | ResolverError::TransportStatus { .. } => 3,
        _ => 1,
    }
}

async fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let api = HttpGenotypeApi::new(&config)?;
    let resolver = Resolver::new(api, config);

    match cli.command {
        Commands::Query(args) => {
            let (token, dataset, snps) = parse_target(args.target)?;
            let quality = args.quality.unwrap_or(resolver.config().quality);
            let records = resolver
                .resolve_via_remote_query(&token, &dataset, &snps, quality)
                .await?;
            JsonOutput::print_records(&records).into_diagnostic()?;
        }
        Commands::Archive(args) => {
            let (token, dataset, snps) = parse_target(args)?;
            let calls = resolver.resolve_via_archive(&token, &dataset, &snps).await?;
            JsonOutput::print_calls(&calls).into_diagnostic()?;
        }
    }
    Ok(())
}

fn parse_target(args: TargetArgs) -> Result<(String, DatasetId, Vec<SnpId>), ResolverError> {
    let token = resolve_token(args.token)?;
    let dataset: DatasetId = args.dataset.parse()?;

    let mut raw = args.snps;
    if let Some(path) = args.snps_file {
        let content = fs::read_to_string(&path)
            .map_err(|err| ResolverError::Filesystem(format!("read {path}: {err}")))?;
        raw.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }

    // Ids must be unique within one request.
    let mut seen = std::collections::HashSet::new();
    let mut snps = Vec::new();
    for value in raw {
        let id: SnpId = value.parse()?;
        if seen.insert(id.clone()) {
            snps.push(id);
        }
    }
    Ok((token, dataset, snps))
}
