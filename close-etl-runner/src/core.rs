use anyhow::{Context, bail};
use clap::Parser;
use close_etl::entity::EntityKind;
use close_etl::pipeline::Pipeline;
use close_etl::source::ApiSource;
use close_etl::source::close::CloseApiClient;
use close_etl::store::TableStore;
use close_etl::store::bigquery::BigQueryTableStore;
use close_etl::store::memory::MemoryTableStore;
use close_etl_config::load::load_config;
use close_etl_config::shared::{DestinationConfig, RunnerConfig};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{info, warn};

/// Runs one extraction for a single entity table.
#[derive(Debug, Parser)]
#[command(name = "close-etl-runner")]
struct Args {
    /// Full run request as a JSON object, for example
    /// '{"table": "Lead", "start": "2024-01-01", "end": "2024-02-01"}'.
    #[arg(long, conflicts_with_all = ["table", "start", "end"])]
    request: Option<String>,
    /// Entity table to extract: Lead, Activity, Opportunity or User.
    #[arg(long)]
    table: Option<String>,
    /// Explicit window start date, `%Y-%m-%d`. Requires `--end`.
    #[arg(long, requires = "end")]
    start: Option<String>,
    /// Explicit window end date, `%Y-%m-%d`. Requires `--start`.
    #[arg(long, requires = "start")]
    end: Option<String>,
}

/// One extraction request, either parsed from `--request` JSON or assembled
/// from the individual flags.
#[derive(Debug, Deserialize)]
struct RunRequest {
    table: String,
    start: Option<String>,
    end: Option<String>,
}

// Macro to statically dispatch the pipeline over the configured store.
macro_rules! run_pipeline_dispatch {
    ($pipeline_config:expr, $source:expr, $store:expr, $kind:expr, $request:expr) => {{
        let pipeline = Pipeline::new($pipeline_config, $source, $store);
        run_pipeline(pipeline, $kind, $request).await
    }};
}

pub async fn start_runner() -> anyhow::Result<()> {
    let args = Args::parse();
    let request = parse_request(args)?;

    let config: RunnerConfig = load_config().context("failed to load runner configuration")?;

    let kind: EntityKind = request.table.parse()?;
    info!(table = %kind, "starting extraction run");

    let source = CloseApiClient::new(
        config.api.base_url.clone(),
        SecretString::new(config.api.api_key.expose_secret().to_owned()),
    );

    match &config.destination {
        DestinationConfig::Memory => {
            warn!("using the in-memory store, loaded data will not survive the process");
            run_pipeline_dispatch!(
                config.pipeline.clone(),
                source,
                MemoryTableStore::new(),
                kind,
                &request
            )
        }
        DestinationConfig::BigQuery {
            project_id,
            dataset_id,
            service_account_key,
        } => {
            let store = BigQueryTableStore::new_with_key(
                project_id.clone(),
                dataset_id.clone(),
                service_account_key.expose_secret(),
            )
            .await?;
            run_pipeline_dispatch!(config.pipeline.clone(), source, store, kind, &request)
        }
    }
}

fn parse_request(args: Args) -> anyhow::Result<RunRequest> {
    if let Some(raw) = args.request {
        return serde_json::from_str(&raw).context("failed to parse --request JSON");
    }

    let Some(table) = args.table else {
        bail!("either --request or --table must be given");
    };

    Ok(RunRequest {
        table,
        start: args.start,
        end: args.end,
    })
}

async fn run_pipeline<S, T>(
    pipeline: Pipeline<S, T>,
    kind: EntityKind,
    request: &RunRequest,
) -> anyhow::Result<()>
where
    S: ApiSource + Sync,
    T: TableStore + Sync,
{
    let result = pipeline
        .run(kind, request.start.as_deref(), request.end.as_deref())
        .await?;

    println!("{}", serde_json::to_string(&result)?);

    Ok(())
}
