//! `reflace pricing` — list model prices used for cost estimates.

use reflace_telemetry::PricingTable;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let table = PricingTable::with_defaults();
    let entries = table.entries();

    println!("💰 Model Pricing (per 1M tokens)");
    println!("─────────────────────────────────────────────────────");
    println!("{:<40} {:>10} {:>10}", "Model", "Input", "Output");
    println!("{:<40} {:>10} {:>10}", "─────", "─────", "──────");

    for (name, p) in &entries {
        println!(
            "{:<40} ${:>8.3} ${:>8.3}",
            name, p.input_per_m, p.output_per_m
        );
    }

    println!();
    println!("  {} models with pricing data", entries.len());

    Ok(())
}
