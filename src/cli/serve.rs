use anyhow::Result;
use console::style;
use std::sync::Arc;

use super::{open_context, parse_api_server_flags};
use crate::core::delivery::DeliveryHub;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::llm::anthropic::AnthropicClient;
use crate::core::orchestrator::Orchestrator;
use crate::core::terminal::{self, GuideSection};
use crate::interfaces::web::{ApiServer, ApiServerConfig};

pub async fn run_serve(args: &[String]) -> Result<()> {
    let log_tx = crate::logging::init_logging(false);
    let ctx = open_context().await?;
    let (api_host, api_port) = parse_api_server_flags(
        args,
        2,
        ctx.config.server.host.clone(),
        ctx.config.server.port,
    );

    let client = Arc::new(AnthropicClient::from_config(&ctx.config.model)?);
    let orchestrator = Arc::new(Orchestrator::from_config(
        client,
        ctx.store.clone(),
        ctx.store.clone(),
        &ctx.config,
    ));

    let mut server = ApiServer::new(ApiServerConfig {
        store: ctx.store.clone(),
        hub: DeliveryHub::new(),
        orchestrator,
        log_tx,
        api_host: api_host.clone(),
        api_port,
    });
    server.on_init().await?;
    server.on_start().await?;

    let base = format!("http://{}:{}", api_host, api_port);
    terminal::print_step("Studio API is running");
    terminal::print_link("API", &format!("{base}/api/studio"));
    terminal::print_link("Logs", &format!("{base}/api/logs"));
    terminal::print_status("Data", &ctx.data_dir.display().to_string());
    GuideSection::new("Sessions")
        .hint(
            &format!("curl -X POST {base}/api/studio/sessions -H 'content-type: application/json' -d '{{\"candidate_id\":1}}'"),
            "create",
        )
        .hint(&format!("{base}/api/studio/ws/<session_id>"), "stream events")
        .blank()
        .text(&format!("Press {} to stop the server.", style("Ctrl+C").bold().yellow()))
        .print();
    println!();

    tokio::signal::ctrl_c().await?;
    server.on_shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}
