//! `reflace config` — validate and print the resolved configuration.

use reflace_config::{AgentKind, ExperimentConfig};
use std::path::Path;

pub async fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match ExperimentConfig::load_with_env(path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    if config.agent == AgentKind::Reflace {
        warnings.push("agent = \"reflace\" is not supported by the experiment driver");
    }
    if config.agent == AgentKind::Ace && config.ace.playbook_path.is_none() {
        warnings.push("ace.playbook_path is unset; learned insights are lost when the run ends");
    }
    if config.reflexion.ground_truth && config.agent != AgentKind::Reflexion {
        warnings.push("reflexion.ground_truth only applies to agent = \"reflexion\"");
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Experiment:  {}", config.experiment_name);
    println!("   Agent:       {}", config.agent);
    println!("   Dataset:     {}", config.dataset);
    match config.first_k_tasks {
        Some(k) => println!("   Tasks:       first {k}"),
        None => println!("   Tasks:       all"),
    }
    println!(
        "   Model:       {} (temperature {}, {} attempts)",
        config.model.name, config.model.temperature, config.model.max_retries
    );
    println!("   Max steps:   {}", config.actor.max_steps);
    match config.agent {
        AgentKind::Reflexion => println!(
            "   Reflexion:   {} retries, history {}, ground truth {}",
            config.reflexion.max_retries, config.reflexion.max_history, config.reflexion.ground_truth
        ),
        AgentKind::Ace => println!(
            "   ACE:         {} rounds, threshold {}, policy {}",
            config.ace.max_rounds, config.ace.similarity_threshold, config.ace.merge_policy
        ),
        _ => {}
    }
    println!("   Report:       {}", config.report_path().display());
    println!("   Trajectories: {}", config.trajectories_path().display());

    Ok(())
}
