use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use metadata_repository::app::Repository;
use metadata_repository::config::{AliasPolicy, ConfigLoader};
use metadata_repository::derive::CreateDataset;
use metadata_repository::domain::{Document, EntityKind};
use metadata_repository::error::RepoError;
use metadata_repository::output::JsonOutput;
use metadata_repository::store::FileStore;

#[derive(Parser)]
#[command(name = "metadata-repo")]
#[command(about = "Metadata repository: ingest submissions, compose datasets, read linked entities")]
#[command(version, author)]
struct Cli {
    /// Config file (defaults to ./metadata-repo.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Directory holding the collections
    #[arg(long, global = true)]
    store: Option<String>,

    /// Override the configured handling of unresolved aliases
    #[arg(long, global = true)]
    alias_policy: Option<AliasPolicy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Ingest a nested submission payload")]
    Submit(PayloadArgs),
    #[command(about = "Replace a stored submission graph")]
    Replace(ReplaceArgs),
    #[command(about = "Show one entity")]
    Get(GetArgs),
    #[command(about = "List entity ids of a kind")]
    List(ListArgs),
    #[command(about = "Set the status of a Dataset or Submission")]
    Status(StatusArgs),
    #[command(about = "Dataset operations")]
    Dataset(DatasetArgs),
    #[command(about = "Create a DataAccessCommittee")]
    Dac(PayloadArgs),
    #[command(about = "Create a DataAccessPolicy")]
    Dap(PayloadArgs),
}

#[derive(Args)]
struct PayloadArgs {
    payload: String,
}

#[derive(Args)]
struct ReplaceArgs {
    submission_id: String,
    payload: String,
}

#[derive(Args)]
struct GetArgs {
    kind: EntityKind,
    identifier: String,

    #[arg(long)]
    by_accession: bool,

    #[arg(long)]
    embedded: bool,
}

#[derive(Args)]
struct ListArgs {
    kind: EntityKind,
}

#[derive(Args)]
struct StatusArgs {
    kind: EntityKind,
    identifier: String,
    status: String,
}

#[derive(Args)]
struct DatasetArgs {
    #[command(subcommand)]
    command: DatasetCommand,
}

#[derive(Subcommand)]
enum DatasetCommand {
    #[command(about = "Create a Dataset from file and policy accessions")]
    Create(PayloadArgs),
    #[command(about = "Summarize a Dataset")]
    Summary(SummaryArgs),
}

#[derive(Args)]
struct SummaryArgs {
    dataset_id: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<RepoError>() {
            return ExitCode::from(error.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(policy) = cli.alias_policy {
        config.alias_policy = policy;
    }

    let root = match (&cli.store, &config.store_root) {
        (Some(path), _) => Utf8PathBuf::from(path),
        (None, Some(path)) => path.clone(),
        (None, None) => FileStore::default_root()?,
    };
    let store = FileStore::new(root)?;
    let repo = Repository::new(store, config);

    match cli.command {
        Commands::Submit(args) => {
            let payload = read_payload(&args.payload)?;
            let root = repo.ingest_submission(&payload)?;
            JsonOutput::print_document(&root).into_diagnostic()
        }
        Commands::Replace(args) => {
            let payload = read_payload(&args.payload)?;
            let root = repo.replace_submission(&args.submission_id, &payload)?;
            JsonOutput::print_document(&root).into_diagnostic()
        }
        Commands::Get(args) => {
            let document = if args.by_accession {
                repo.get_entity_by_accession(args.kind, &args.identifier, args.embedded)?
            } else {
                repo.get_entity(args.kind, &args.identifier, args.embedded)?
            };
            JsonOutput::print_document(&document).into_diagnostic()
        }
        Commands::List(args) => {
            let ids = repo.list_ids(args.kind)?;
            JsonOutput::print_ids(&ids).into_diagnostic()
        }
        Commands::Status(args) => {
            let document = repo.patch_status(args.kind, &args.identifier, &args.status)?;
            JsonOutput::print_document(&document).into_diagnostic()
        }
        Commands::Dataset(args) => match args.command {
            DatasetCommand::Create(args) => {
                let content = read_file(&args.payload)?;
                let request: CreateDataset = serde_json::from_str(&content)
                    .map_err(|err| RepoError::Payload(err.to_string()))?;
                let dataset = repo.compose_dataset(request)?;
                JsonOutput::print_document(&dataset).into_diagnostic()
            }
            DatasetCommand::Summary(args) => {
                let summary = repo.dataset_summary(&args.dataset_id)?;
                JsonOutput::print_summary(&summary).into_diagnostic()
            }
        },
        Commands::Dac(args) => {
            let payload = read_payload(&args.payload)?;
            let committee = repo.create_data_access_committee(&payload)?;
            JsonOutput::print_document(&committee).into_diagnostic()
        }
        Commands::Dap(args) => {
            let payload = read_payload(&args.payload)?;
            let policy = repo.create_data_access_policy(&payload)?;
            JsonOutput::print_document(&policy).into_diagnostic()
        }
    }
}

fn read_file(path: &str) -> Result<String, RepoError> {
    fs::read_to_string(path).map_err(|err| RepoError::Filesystem(format!("read {path}: {err}")))
}

fn read_payload(path: &str) -> Result<Document, RepoError> {
    let content = read_file(path)?;
    serde_json::from_str(&content).map_err(|err| RepoError::Payload(err.to_string()))
}
