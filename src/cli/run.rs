use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::open_context;
use crate::core::llm::anthropic::AnthropicClient;
use crate::core::orchestrator::Orchestrator;
use crate::core::terminal::{GuideSection, print_event};

/// Runs one session in-process, printing lifecycle events as they arrive.
pub async fn run_session(candidate_id: i64, session_id: Option<String>) -> Result<()> {
    crate::logging::init_logging(true);
    let ctx = open_context().await?;
    let client = Arc::new(AnthropicClient::from_config(&ctx.config.model)?);
    let orchestrator =
        Orchestrator::from_config(client, ctx.store.clone(), ctx.store.clone(), &ctx.config);
    let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let result = orchestrator.run_session(&session_id, candidate_id, &tx).await;
    drop(tx);
    let _ = printer.await;

    let outcome = result?;
    GuideSection::new("Blueprint")
        .status("Session", &outcome.session_id)
        .status("Blueprint", &outcome.blueprint.id.to_string())
        .status("Version", &outcome.blueprint.version.to_string())
        .status(
            "Success probability",
            &format!("{:.2}%", outcome.blueprint.success_probability),
        )
        .status("Summary", &outcome.blueprint.executive_summary)
        .blank()
        .hint(&format!("studio blueprint {}", outcome.blueprint.id), "")
        .print();
    println!();
    Ok(())
}
