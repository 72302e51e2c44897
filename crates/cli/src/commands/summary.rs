//! `reflace summary` — print a saved performance report.

use reflace_agent::PerformanceReport;
use reflace_agent::results::load_json;
use reflace_config::ExperimentConfig;
use std::path::{Path, PathBuf};

pub async fn run(
    config_path: &Path,
    file: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = match file {
        Some(path) => path,
        None => ExperimentConfig::load_with_env(config_path)?.report_path(),
    };

    let report: PerformanceReport = load_json(&path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("📝 EVALUATION REPORT");
    println!("══════════════════════════════════════════════════");
    print!("{}", report.render());

    if !report.metrics.is_empty() {
        println!();
        println!("{:<28} {:>8} {:>10} {:>10} {:>10}", "Task", "Calls", "Tokens", "Cost", "Latency");
        for (task_id, m) in &report.metrics {
            println!(
                "{:<28} {:>8} {:>10} {:>9.4}$ {:>8}ms",
                task_id, m.model_calls, m.total_tokens, m.cost_usd, m.latency_ms
            );
        }
    }

    Ok(())
}
