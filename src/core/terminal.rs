use console::{Emoji, style};

use crate::core::events::LifecycleEvent;

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

pub fn print_banner() {
    let lines: &[&str] = &[
        "     _             _ _       ",
        " ___| |_ _   _  __| (_) ___  ",
        "/ __| __| | | |/ _` | |/ _ \\ ",
        "\\__ \\ |_| |_| | (_| | | (_) |",
        "|___/\\__|\\__,_|\\__,_|_|\\___/ ",
    ];

    // Gradient: #818cf8 → #a78bfa → #22d3ee (diagonal top-left → bottom-right)
    let stops: [(u8, u8, u8); 3] = [(129, 140, 248), (167, 139, 250), (34, 211, 238)];
    let max_w = 29u32;
    let max_d = max_w + 4 * 10;

    println!();
    for (y, line) in lines.iter().enumerate() {
        for (x, ch) in line.chars().enumerate() {
            if ch == ' ' {
                print!(" ");
                continue;
            }
            let d = ((x as u32 + y as u32 * 10) * 1000 / max_d).min(1000);
            let (r, g, b) = if d <= 500 {
                lerp_color(stops[0], stops[1], d * 2)
            } else {
                lerp_color(stops[1], stops[2], (d - 500) * 2)
            };
            print!("\x1b[38;2;{};{};{}m{}", r, g, b, ch);
        }
        println!();
    }
    print!("\x1b[0m");

    println!("\x1b[38;2;34;211;238mFrom raw idea to blueprint in three passes.\x1b[0m\n");
}

pub fn print_goodbye() {
    println!("\n{} {}\n", ROCKET, style("Studio stopped. See you next idea.").bold());
}

fn lerp_color(a: (u8, u8, u8), b: (u8, u8, u8), t: u32) -> (u8, u8, u8) {
    let r = (a.0 as u32 * (1000 - t) + b.0 as u32 * t) / 1000;
    let g = (a.1 as u32 * (1000 - t) + b.1 as u32 * t) / 1000;
    let b_val = (a.2 as u32 * (1000 - t) + b.2 as u32 * t) / 1000;
    (r as u8, g as u8, b_val as u8)
}

/// One-line rendering of a lifecycle event, or `None` for stream chunks.
pub fn describe_event(event: &LifecycleEvent) -> Option<String> {
    match event {
        LifecycleEvent::SessionStart {
            session_id,
            candidate_summary,
        } => Some(format!(
            "Session {} started for \"{}\"",
            session_id, candidate_summary.title
        )),
        LifecycleEvent::AgentStart {
            agent_type,
            attempt,
        } if *attempt > 1 => Some(format!("{} retrying (attempt {})", agent_type, attempt)),
        LifecycleEvent::AgentStart { agent_type, .. } => Some(format!("{} running", agent_type)),
        LifecycleEvent::AgentStream { .. } => None,
        LifecycleEvent::AgentComplete {
            agent_type,
            metrics,
            ..
        } => Some(format!(
            "{} done: {} tokens, ${:.4}, {:.1}s",
            agent_type, metrics.tokens_used, metrics.cost_usd, metrics.duration_seconds
        )),
        LifecycleEvent::SessionComplete {
            blueprint_id,
            total_tokens,
            total_cost_usd,
            duration_seconds,
            ..
        } => Some(format!(
            "Blueprint {} ready: {} tokens, ${:.4}, {:.1}s",
            blueprint_id, total_tokens, total_cost_usd, duration_seconds
        )),
        LifecycleEvent::SessionError { error, .. } => Some(format!("Session failed: {}", error)),
    }
}

pub fn print_event(event: &LifecycleEvent) {
    let Some(line) = describe_event(event) else {
        return;
    };
    match event {
        LifecycleEvent::SessionComplete { .. } => print_success(&line),
        LifecycleEvent::SessionError { .. } => print_error(&line),
        LifecycleEvent::AgentStart { attempt, .. } if *attempt > 1 => print_warn(&line),
        LifecycleEvent::AgentComplete { .. } => print_status("stage", &line),
        _ => print_step(&line),
    }
}

enum GuideLine {
    Command(String, String),
    Status(String, String),
    Text(String),
    Hint(String, String),
    Blank,
}

/// Titled block of help output, built up line by line and printed at once.
pub struct GuideSection {
    title: String,
    lines: Vec<GuideLine>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.lines
            .push(GuideLine::Command(name.to_string(), description.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(GuideLine::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Text(text.to_string()));
        self
    }

    pub fn hint(mut self, example: &str, note: &str) -> Self {
        self.lines
            .push(GuideLine::Hint(example.to_string(), note.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(GuideLine::Blank);
        self
    }

    pub fn print(self) {
        println!("\n {}", style(&self.title).bold().underlined());
        let width = self
            .lines
            .iter()
            .filter_map(|line| match line {
                GuideLine::Command(name, _) => Some(name.chars().count()),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        for line in self.lines {
            match line {
                GuideLine::Command(name, description) => println!(
                    "   {}  {}",
                    style(format!("{:<width$}", name)).green(),
                    style(description).dim()
                ),
                GuideLine::Status(label, value) => {
                    println!("   {}: {}", style(label).bold().cyan(), value)
                }
                GuideLine::Text(text) => println!("   {}", text),
                GuideLine::Hint(example, note) if note.is_empty() => {
                    println!("   {} {}", style("$").dim(), style(example).yellow())
                }
                GuideLine::Hint(example, note) => println!(
                    "   {} {}  {}",
                    style("$").dim(),
                    style(example).yellow(),
                    style(note).dim()
                ),
                GuideLine::Blank => println!(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::StageMetrics;
    use crate::core::stages::StageKind;

    #[test]
    fn stream_chunks_are_not_described() {
        let chunk = LifecycleEvent::agent_stream(StageKind::Researcher, "{".into());
        assert!(describe_event(&chunk).is_none());
    }

    #[test]
    fn retries_mention_the_attempt() {
        let first = LifecycleEvent::AgentStart {
            agent_type: StageKind::Validator,
            attempt: 1,
        };
        let retry = LifecycleEvent::AgentStart {
            agent_type: StageKind::Validator,
            attempt: 3,
        };
        assert_eq!(describe_event(&first).unwrap(), "validator running");
        assert_eq!(
            describe_event(&retry).unwrap(),
            "validator retrying (attempt 3)"
        );
    }

    #[test]
    fn completion_lines_carry_metrics() {
        let done = LifecycleEvent::AgentComplete {
            agent_type: StageKind::Strategist,
            output: serde_json::json!({}),
            metrics: StageMetrics {
                tokens_used: 2000,
                cost_usd: 0.018,
                duration_seconds: 1.5,
            },
        };
        assert_eq!(
            describe_event(&done).unwrap(),
            "strategist done: 2000 tokens, $0.0180, 1.5s"
        );
    }
}
