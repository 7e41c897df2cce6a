//! Interactive REPL with readline editing and persistent history.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use tinyclaw_agent::AgentLoop;
use tinyclaw_core::bus::InboundMessage;

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Run the interactive REPL loop, streaming replies as they arrive.
pub async fn run(agent: Arc<AgentLoop>, channel: &str, chat_id: &str) -> Result<()> {
    helpers::print_banner();

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_exit_command(trimmed) {
            println!("\nGoodbye! 👋");
            break;
        }

        let _ = editor.add_history_entry(&input);
        debug!(channel, chat_id, input = trimmed, "processing input");

        let msg = InboundMessage::new(channel, "user", chat_id, trimmed);

        println!();
        println!("{}", "🦀 TinyClaw".cyan().bold());
        let streamed = std::sync::atomic::AtomicBool::new(false);
        let result = agent
            .process_direct_stream(&msg, &|chunk| {
                streamed.store(true, std::sync::atomic::Ordering::Relaxed);
                print!("{chunk}");
                use std::io::Write;
                let _ = std::io::stdout().flush();
            })
            .await;

        match result {
            Ok(response) => {
                if !streamed.load(std::sync::atomic::Ordering::Relaxed) {
                    // Nothing streamed (e.g. tool-only turns); print the
                    // final text instead.
                    print!("{response}");
                }
                println!();
                println!();
            }
            Err(e) => {
                eprintln!("\n❌ Error: {e}\n");
            }
        }
    }

    save_history(&mut editor);
    Ok(())
}

fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.iter().any(|cmd| *cmd == lower)
}

/// Create a rustyline editor with persistent history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let path = history_path();
    if path.exists() {
        let _ = editor.load_history(&path);
        debug!("loaded REPL history from {}", path.display());
    }

    Ok(editor)
}

fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = editor.save_history(&path);
}

fn history_path() -> std::path::PathBuf {
    tinyclaw_core::utils::get_data_path()
        .join("history")
        .join("cli_history")
}
