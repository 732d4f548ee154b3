//! Config command - Show and validate the onboarding task file

use colored::Colorize;
use std::path::Path;

use crate::config::loader::{read_config, validate_config};
use crate::config::paths::resolve_config_path;
use crate::types::SetupScheme;

pub fn run(config: Option<&str>) -> anyhow::Result<()> {
    let location = resolve_config_path(config);

    println!("{}", "\nOnboarding Configuration\n".bold());

    println!("{}", "Config location:".dimmed());
    if Path::new(&location.config_path).is_file() {
        println!(
            "  {} {} ({:?})",
            "●".green(),
            location.config_path,
            location.source
        );
    } else {
        println!("  {} {} (not found)", "○".red(), location.config_path);
        println!(
            "\n  {}",
            "Create onboard.config.yaml or pass --config <path>.\n".dimmed()
        );
        std::process::exit(1);
    }

    let scheme = match read_config(&location.config_path) {
        Ok(scheme) => scheme,
        Err(e) => {
            eprintln!("\n{}", "Error reading config:".red());
            eprintln!("  {}", format!("{e}").dimmed());
            std::process::exit(1);
        }
    };

    print_summary(&scheme);

    match validate_config(&scheme) {
        Ok(()) => {
            println!("\n  {} {}\n", "✓".green(), "Configuration is valid".green());
            Ok(())
        }
        Err(e) => {
            eprintln!("\n{}", format!("{e}").red());
            std::process::exit(1);
        }
    }
}

fn print_summary(scheme: &SetupScheme) {
    println!("{}", "\nRepository:".dimmed());
    println!(
        "  organization:  {}",
        display_or_missing(&scheme.github_organization)
    );
    println!(
        "  repository:    {}",
        display_or_missing(&scheme.github_repository)
    );
    println!(
        "  clientId:      {}",
        if scheme.client_id.is_empty() {
            "(not set)".dimmed().to_string()
        } else {
            "set".cyan().to_string()
        }
    );

    if !scheme.task_owners.is_empty() {
        println!("{}", "\nTask owners:".dimmed());
        for (role, owner) in &scheme.task_owners {
            println!("  {:<14} @{}", role, owner.github_username.cyan());
        }
    }

    println!("{}", format!("\nTasks ({}):", scheme.tasks.len()).dimmed());
    if scheme.tasks.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (index, task) in scheme.tasks.iter().enumerate() {
        let assignee = if task.assignee.github_username.trim().is_empty() {
            "unassigned".yellow().to_string()
        } else {
            format!("@{}", task.assignee.github_username).cyan().to_string()
        };
        println!("  {:>2}. {} {}", index + 1, task.title, assignee);
    }
}

fn display_or_missing(value: &str) -> String {
    if value.trim().is_empty() {
        "(missing)".red().to_string()
    } else {
        value.cyan().to_string()
    }
}
