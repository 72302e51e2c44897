//! `reflace show` — render one task's saved trajectory.

use reflace_agent::TrajectoryArchive;
use reflace_agent::results::load_json;
use reflace_config::ExperimentConfig;
use reflace_core::transcript::Transcript;
use std::path::{Path, PathBuf};

pub async fn run(
    config_path: &Path,
    task_id: &str,
    file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = match file {
        Some(path) => path,
        None => ExperimentConfig::load_with_env(config_path)?.trajectories_path(),
    };

    let archive: TrajectoryArchive = load_json(&path)?;
    let Some(record) = archive.get(task_id) else {
        println!("❌ Task '{task_id}' not found in {}", path.display());
        if !archive.is_empty() {
            println!();
            println!("Available tasks:");
            for id in archive.keys() {
                println!("  {id}");
            }
        }
        return Err(format!("unknown task id '{task_id}'").into());
    };

    let transcript = Transcript::from_records(record.trajectory.clone())?;

    println!("📜 Trajectory — {task_id}");
    println!("═════════════════════════════════════════════════════");
    println!(
        "  {} turns, {} tool calls",
        transcript.len(),
        transcript.invocation_count()
    );

    if let Some(history) = &record.reflection_history {
        println!();
        println!("Reflection History:");
        if history.is_empty() {
            println!("  None");
        }
        for (i, critique) in history.iter().enumerate() {
            println!("  {}. {}", i + 1, critique);
        }
    }

    println!();
    println!("{}", transcript.render_human_readable());

    Ok(())
}
