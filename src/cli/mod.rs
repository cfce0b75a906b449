mod records;
mod run;
mod serve;

use anyhow::Result;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::StudioConfig;
use crate::core::store::SqliteStore;
use crate::core::store::types::NewCandidate;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Core")
        .command("serve", "Start the studio API and websocket server")
        .command("run", "Run one analysis session in this terminal")
        .print();

    GuideSection::new("Records")
        .command("candidate add", "Store a candidate idea")
        .command("candidate list", "List stored candidates")
        .command("session <id>", "Show a session record")
        .command("blueprint <id>", "Show a blueprint")
        .print();

    GuideSection::new("Examples")
        .hint(
            "studio candidate add --title \"Pet CRM\" --description \"CRM for vets\" --category SaaS",
            "",
        )
        .hint("studio run --candidate 1", "")
        .hint("studio serve --api-port 18000", "")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("studio").green()
    );
}

/// Shared state for commands that touch the data directory.
pub(crate) struct Context {
    pub data_dir: PathBuf,
    pub config: StudioConfig,
    pub store: Arc<SqliteStore>,
}

pub(crate) async fn open_context() -> Result<Context> {
    let data_dir = NativePlatform::data_dir();
    let store = SqliteStore::open(&data_dir).await?;
    let config = StudioConfig::load(&data_dir).await?;
    Ok(Context {
        data_dir,
        config,
        store: Arc::new(store),
    })
}

fn flag_value(args: &[String], i: usize) -> Option<String> {
    args.get(i + 1).cloned()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct RunCommandArgs {
    pub candidate_id: Option<i64>,
    pub session_id: Option<String>,
}

pub(crate) fn parse_run_command_args(args: &[String], start: usize) -> RunCommandArgs {
    let mut parsed = RunCommandArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--candidate" | "-c" => {
                parsed.candidate_id = flag_value(args, i).and_then(|v| v.parse().ok());
                i += 2;
            }
            "--session" | "-s" => {
                parsed.session_id = flag_value(args, i);
                i += 2;
            }
            _ => i += 1,
        }
    }
    parsed
}

pub(crate) fn parse_api_server_flags(
    args: &[String],
    start: usize,
    mut api_host: String,
    mut api_port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if let Some(port) = flag_value(args, i).and_then(|v| v.parse().ok()) {
                    api_port = port;
                }
                i += 2;
            }
            "--api-host" => {
                if let Some(host) = flag_value(args, i) {
                    api_host = host;
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    (api_host, api_port)
}

pub(crate) fn parse_candidate_flags(args: &[String], start: usize) -> NewCandidate {
    let mut candidate = NewCandidate::default();
    let mut i = start;
    while i < args.len() {
        let value = flag_value(args, i);
        match args[i].as_str() {
            "--title" => candidate.title = value.unwrap_or_default(),
            "--description" => candidate.description = value.unwrap_or_default(),
            "--category" => candidate.category = value.unwrap_or_default(),
            "--target-market" => candidate.target_market = value,
            "--revenue-model" => candidate.revenue_model = value,
            "--competitors" => candidate.competitors = value,
            "--trend-data" => candidate.trend_data = value,
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    candidate
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");

    match cmd {
        "serve" => serve::run_serve(&args).await,
        "run" => {
            let parsed = parse_run_command_args(&args, 2);
            let Some(candidate_id) = parsed.candidate_id else {
                print_error("Error: --candidate <id> is required for run.");
                print_help();
                return Ok(());
            };
            run::run_session(candidate_id, parsed.session_id).await
        }
        "candidate" | "candidates" => {
            let sub_cmd = args.get(2).map(String::as_str).unwrap_or("");
            match sub_cmd {
                "add" => records::add_candidate(parse_candidate_flags(&args, 3)).await,
                "list" => records::list_candidates().await,
                _ => {
                    GuideSection::new("studio candidate")
                        .command("add", "Store a candidate idea")
                        .command("list", "List stored candidates")
                        .blank()
                        .text("add requires --title, --description and --category.")
                        .text(
                            "Optional: --target-market, --revenue-model, --competitors, --trend-data",
                        )
                        .print();
                    println!();
                    Ok(())
                }
            }
        }
        "session" => match args.get(2) {
            Some(session_id) => records::show_session(session_id).await,
            None => {
                print_error("Usage: studio session <session_id>");
                Ok(())
            }
        },
        "blueprint" => match args.get(2).and_then(|v| v.parse::<i64>().ok()) {
            Some(id) => records::show_blueprint(id).await,
            None => {
                print_error("Usage: studio blueprint <blueprint_id>");
                Ok(())
            }
        },
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}
