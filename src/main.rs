//! dashq - drive a latest-wins query executor from the command line.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use cli::{Cli, Input};
use dash_query::config::Config;
use dash_query::db::MockFetcher;
use dash_query::error::{DashError, Result};
use dash_query::logging;
use dash_query::query::{ExecutionState, QueryExecutor, QueryFetcher};
use dash_query::warehouse::{Statement, WarehouseClient};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One line of stdout output.
#[derive(Serialize)]
struct Transition<'a> {
    seq: u64,
    #[serde(flatten)]
    state: &'a ExecutionState,
}

#[tokio::main]
async fn main() {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    if cli.log_file {
        logging::init_file_logging(cli.verbose);
    } else {
        logging::init_stderr_logging(cli.verbose);
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e.message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    config.warehouse.apply_env_defaults();

    let mut options = config.executor.options();
    if cli.no_cancel {
        options = options.with_cancel_superseded(false);
    }

    let fetcher: Arc<dyn QueryFetcher<Statement>> = if cli.mock {
        info!("Using mock fetcher ({}ms latency)", cli.latency_ms);
        Arc::new(MockFetcher::new().with_latency(Duration::from_millis(cli.latency_ms)))
    } else {
        Arc::new(WarehouseClient::new(config.warehouse)?)
    };

    let executor = QueryExecutor::from_shared(fetcher, options);
    let printer = spawn_printer(executor.subscribe());

    if cli.queries.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| DashError::internal(format!("Failed to read stdin: {e}")))?
        {
            match Input::parse(&line).map_err(DashError::query)? {
                Some(input) => apply(&executor, input).await?,
                None => continue,
            }
        }
    } else {
        for input in cli.positional_inputs().map_err(DashError::query)? {
            apply(&executor, input).await?;
        }
    }

    wait_settled(&executor).await?;
    let last = executor.state();
    if last.is_error() {
        warn!("Last query failed: {}", last.error.as_deref().unwrap_or_default());
    }
    let stats = executor.stats();
    info!(
        issued = stats.issued,
        applied = stats.applied,
        discarded = stats.discarded,
        cancelled = stats.cancelled,
        "done"
    );

    // Closing the channel ends the printer once it has flushed the last state.
    drop(executor);
    printer
        .await
        .map_err(|e| DashError::internal(format!("Printer task failed: {e}")))
}

async fn apply(executor: &QueryExecutor<Statement>, input: Input) -> Result<()> {
    debug!("Input: {:?}", input);
    match input {
        Input::Query(sql) => {
            executor.observe(Some(Statement::new(sql)));
        }
        Input::Refetch => executor.refetch(),
        Input::Clear => {
            executor.observe(None);
        }
        Input::Wait => wait_settled(executor).await?,
    }
    Ok(())
}

async fn wait_settled(executor: &QueryExecutor<Statement>) -> Result<()> {
    let mut rx = executor.subscribe();
    rx.wait_for(ExecutionState::is_settled)
        .await
        .map(|_| ())
        .map_err(|_| DashError::internal("Executor closed while waiting"))
}

/// Prints the current state and every change until the executor is dropped.
fn spawn_printer(mut rx: watch::Receiver<ExecutionState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seq = 0;
        loop {
            let state = rx.borrow_and_update().clone();
            print_transition(seq, &state);
            seq += 1;
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

fn print_transition(seq: u64, state: &ExecutionState) {
    match serde_json::to_string(&Transition { seq, state }) {
        Ok(line) => println!("{line}"),
        Err(e) => error!("Failed to serialize state: {}", e),
    }
}
