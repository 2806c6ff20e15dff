use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use weaver::intent::types::ActionContext;
use weaver::services::board::{GraphDocument, InMemoryBoard};
use weaver::services::llm::LlmClient;
use weaver::{ActionDetector, ExecutionCapabilities, ExecutionContext, Orchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays pure JSON.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let capabilities = match std::env::var("WEAVER_CONFIG") {
        Ok(path) => ExecutionCapabilities::load(&path)?,
        Err(_) => ExecutionCapabilities::default(),
    }
    .with_env_overrides()?;
    tracing::info!("Weaver starting with {:?}", capabilities);

    let board = Arc::new(InMemoryBoard::new());
    let mut orchestrator = Orchestrator::new(capabilities, board.clone());
    if std::env::var("LLM_API_URL").is_ok() {
        let client = LlmClient::from_env();
        tracing::info!("Node text will be written by the language model");
        orchestrator = orchestrator.with_gateway(Arc::new(client));
    }
    let detector = ActionDetector::new();

    tracing::info!("Ready. One request per line; Ctrl+D to stop.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let request = line.trim();
        if request.is_empty() {
            continue;
        }

        let state = board.snapshot().await?;
        let context = ActionContext::with_board(state.nodes.len(), state.edges.len());
        let actions = detector.detect(request, &context);
        tracing::debug!("Detected {} actions", actions.len());

        let ctx = ExecutionContext::new(request, context);
        let report = orchestrator
            .execute(actions, &ctx, |progress| {
                tracing::debug!(
                    "Progress {:?}: step {}/{}, {}/{} done",
                    progress.status,
                    progress.current_step,
                    progress.total_steps,
                    progress.completed_actions,
                    progress.total_actions
                );
            })
            .await;

        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let telemetry = orchestrator.telemetry_snapshot();
    tracing::info!(
        "Session: {} runs completed, {} failed, {} retries, board has {} nodes",
        telemetry.run_stats.completed,
        telemetry.run_stats.failed,
        telemetry.unit_stats.retries,
        board.node_count()
    );
    Ok(())
}
