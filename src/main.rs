use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use qa_pipeline::{AuditError, IndicatifProgress, Pipeline, PipelineConfig, PipelineError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file when present.
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_default();

    let service = Arc::new(llm_service::LlmService::from_env()?);
    let config = PipelineConfig::from_env()?;
    let pipeline = Pipeline::from_config(service, config)?
        .with_progress(Arc::new(IndicatifProgress::spinner()));

    // Ctrl-C aborts in-flight work between provider calls.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            signal_cancel.cancel();
        }
    });

    match command.as_str() {
        "ingest" => {
            let paths: Vec<PathBuf> = args.map(PathBuf::from).collect();
            if paths.is_empty() {
                bail!("usage: equiqa ingest <file>...");
            }
            let report = pipeline.ingest(&paths, &cancel).await?;
            println!(
                "indexed {} documents into {} chunks",
                report.stats.documents, report.stats.chunks
            );
            for skip in &report.skipped {
                println!("skipped {}: {}", skip.path.display(), skip.reason);
            }
        }
        "ask" => {
            let question = args.collect::<Vec<_>>().join(" ");
            if question.trim().is_empty() {
                bail!("usage: equiqa ask <question>");
            }
            let result = pipeline.ask(&question, &cancel).await?;
            println!("{}", result.answer_text);
            if !result.cited_chunk_ids.is_empty() {
                println!("\ncited chunks:");
                for id in &result.cited_chunk_ids {
                    println!("  {id}");
                }
            }
            tracing::info!(
                latency_ms = result.latency_ms,
                prompt_tokens = result.token_usage.prompt_tokens,
                completion_tokens = result.token_usage.completion_tokens,
                "answer complete"
            );
        }
        "audit" => {
            let report = match pipeline.audit(&cancel).await {
                Ok(report) => report,
                // The partial per-group metrics are the diagnosis; print
                // them before failing.
                Err(PipelineError::Audit(AuditError::Inconclusive { group, partial })) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&partial)
                            .context("serializing partial audit report")?
                    );
                    bail!("fairness audit inconclusive: group {group:?} had no successful probes");
                }
                Err(e) => return Err(e.into()),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("serializing audit report")?
            );
            if !report.pass {
                bail!(
                    "fairness audit failed: max disparity ratio {:.3} exceeds threshold {:.3}",
                    report.max_disparity_ratio,
                    report.threshold
                );
            }
        }
        _ => {
            bail!("usage: equiqa <ingest|ask|audit> [args...]");
        }
    }

    Ok(())
}
