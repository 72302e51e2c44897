//! `reflace init` — write a default experiment config.

use reflace_config::ExperimentConfig;
use std::path::Path;

pub async fn run(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        println!("  Config already exists: {}", path.display());
        println!("  Use --force to overwrite it.");
        return Ok(());
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, ExperimentConfig::default_toml())?;
    tracing::info!(path = %path.display(), "Default config written");

    println!("✅ Wrote {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Pick a strategy:   agent = \"react\" | \"reflexion\" | \"ace\"");
    println!("  2. Set the model:     [model] name = \"gpt-4o-mini\"");
    println!("  3. Check the result:  reflace config");

    Ok(())
}
