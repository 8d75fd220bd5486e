use std::path::PathBuf;

use anyhow::Context;
use wardrobe_toolkit::{optimize_bytes, OptimizerConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let mut args = std::env::args().skip(1);
    let input = PathBuf::from(args.next().context("usage: compress_trace <IMAGE> [TARGET_KB]")?);
    let target_kb = match args.next() {
        Some(kb) => kb.parse().context("TARGET_KB must be a positive integer")?,
        None => 150,
    };

    let raw = std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    let config = OptimizerConfig { target_size_kb: target_kb, ..Default::default() };

    println!("Compressing {} toward {} KB...", input.display(), target_kb);
    let result = optimize_bytes(&raw, &config)?;

    println!("\n=== Trace ===");
    for attempt in &result.attempts {
        println!("  q{:>3}: {:>8.1} KB", attempt.quality, attempt.size_bytes as f64 / 1024.0);
    }

    println!("\nDecoded size: {}x{}", result.width, result.height);
    println!("Final: {:.1} KB at quality {}", result.size_kb, result.final_quality);
    if result.target_met {
        println!("✓ Target met");
    } else {
        println!("✗ Quality floor reached above target");
    }

    Ok(())
}
