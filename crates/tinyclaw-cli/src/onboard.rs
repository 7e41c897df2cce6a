//! `tinyclaw onboard` — initialize configuration and workspace.

use anyhow::{Context, Result};
use colored::Colorize;

use tinyclaw_core::config::{get_config_path, save_config, Config};

const AGENTS_MD: &str = "# Agent Guidelines\n\n\
Keep replies short and useful. Prefer tools over guessing. When a task \
will take a while, say so and use the spawn tool.\n";

const MEMORY_MD: &str = "# Long-term Memory\n\n\
(Things worth remembering land here.)\n";

const HEARTBEAT_MD: &str = "# Heartbeat Tasks\n\n\
<!-- Lines that aren't headers or comments are executed on each \
heartbeat tick. -->\n";

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🦀 TinyClaw Onboarding".cyan().bold());
    println!();

    let config_path = get_config_path();
    if config_path.exists() {
        println!("  Config already exists at {}", config_path.display());
    } else {
        let config = Config::default();
        save_config(&config, None).context("failed to write config")?;
        println!("  Wrote default config to {}", config_path.display());
    }

    let config = Config::default();
    let workspace = config.workspace_path();
    std::fs::create_dir_all(workspace.join("memory"))
        .with_context(|| format!("failed to create workspace: {}", workspace.display()))?;
    std::fs::create_dir_all(workspace.join("skills"))?;
    std::fs::create_dir_all(workspace.join("sessions"))?;

    for (relative, content) in [
        ("AGENTS.md", AGENTS_MD),
        ("memory/MEMORY.md", MEMORY_MD),
        ("memory/HEARTBEAT.md", HEARTBEAT_MD),
    ] {
        let path = workspace.join(relative);
        if !path.exists() {
            std::fs::write(&path, content)?;
            println!("  Created {}", path.display());
        }
    }

    println!();
    println!("  Next steps:");
    println!("    1. Set an API key (e.g. {})", "OPENAI_API_KEY".bold());
    println!("    2. Run {}", "tinyclaw agent".bold());
    println!();
    Ok(())
}
