use anyhow::{Result, bail};
use serde::Serialize;

use super::open_context;
use crate::core::store::types::NewCandidate;
use crate::core::terminal::{GuideSection, print_info, print_success, print_warn};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn add_candidate(candidate: NewCandidate) -> Result<()> {
    let missing: Vec<&str> = [
        ("--title", &candidate.title),
        ("--description", &candidate.description),
        ("--category", &candidate.category),
    ]
    .iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(flag, _)| *flag)
    .collect();
    if !missing.is_empty() {
        bail!("Missing required flags: {}", missing.join(", "));
    }

    let ctx = open_context().await?;
    let stored = ctx.store.insert_candidate(&candidate).await?;
    print_success(&format!("Candidate {} added", stored.id));
    print_json(&stored)
}

pub async fn list_candidates() -> Result<()> {
    let ctx = open_context().await?;
    let candidates = ctx.store.list_candidates().await?;
    if candidates.is_empty() {
        print_info("No candidates yet. Add one with 'studio candidate add'.");
        return Ok(());
    }
    let mut section = GuideSection::new("Candidates");
    for candidate in &candidates {
        section = section.command(
            &format!("#{}", candidate.id),
            &format!("{} ({})", candidate.title, candidate.category),
        );
    }
    section.print();
    println!();
    Ok(())
}

pub async fn show_session(session_id: &str) -> Result<()> {
    let ctx = open_context().await?;
    match ctx.store.find_session(session_id).await? {
        Some(session) => print_json(&session),
        None => {
            print_warn(&format!("Session {} not found", session_id));
            Ok(())
        }
    }
}

pub async fn show_blueprint(blueprint_id: i64) -> Result<()> {
    let ctx = open_context().await?;
    match ctx.store.get_blueprint(blueprint_id).await? {
        Some(blueprint) => print_json(&blueprint),
        None => {
            print_warn(&format!("Blueprint {} not found", blueprint_id));
            Ok(())
        }
    }
}
