//! `tinyclaw status` — show configuration and provider readiness.

use anyhow::Result;
use colored::Colorize;

use tinyclaw_core::config::{get_config_path, load_config};
use tinyclaw_providers::PROVIDERS;

pub fn run() -> Result<()> {
    let config = load_config(None)?;
    let config_path = get_config_path();

    println!();
    println!("{}", "🦀 TinyClaw Status".cyan().bold());
    println!();

    let config_exists = config_path.exists();
    println!(
        "  {:<14} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_exists {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".dimmed().to_string()
        }
    );

    let workspace = config.workspace_path();
    println!(
        "  {:<14} {} {}",
        "Workspace:".bold(),
        workspace.display(),
        if workspace.exists() {
            "✓".green().to_string()
        } else {
            "(not created yet)".dimmed().to_string()
        }
    );

    println!("  {:<14} {}", "Model:".bold(), config.agent.model);
    println!(
        "  {:<14} temp {} | max_tokens {} | iterations {}",
        "Tuning:".bold(),
        config.agent.temperature,
        config.agent.max_tokens,
        config.agent.max_tool_iterations
    );
    println!(
        "  {:<14} workers {} | bus capacity {}",
        "Gateway:".bold(),
        config.gateway.workers,
        config.bus.capacity
    );
    println!(
        "  {:<14} {}",
        "Sandbox:".bold(),
        if config.security.restrict_to_workspace {
            "workspace-confined".green().to_string()
        } else {
            "unrestricted".yellow().to_string()
        }
    );

    println!();
    println!("  {}", "Providers:".bold());
    for spec in PROVIDERS {
        let configured = config
            .providers
            .get(spec.name)
            .map(|p| !p.api_key.is_empty())
            .unwrap_or(false);
        let mark = if configured {
            "✓ key set".green().to_string()
        } else if spec.key_optional {
            "no key needed".dimmed().to_string()
        } else {
            "no key".dimmed().to_string()
        };
        println!("    {:<12} {mark}", spec.display_name);
    }

    println!();
    Ok(())
}
