use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use wardrobe_toolkit::{DirectorySink, Pipeline, PipelineConfig, SegmentationStrategy};

#[derive(Parser)]
#[command(name = "wardrobe-toolkit")]
#[command(version, about = "Background removal and size-bounded compression for product photos", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment, normalize and compress image(s) into a directory
    Process {
        /// Input files
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,

        /// Pipeline config (JSON)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Skip background removal, only normalize and compress
        #[arg(long)]
        no_segment: bool,

        /// Segmentation strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Size target in KB
        #[arg(long, value_name = "N")]
        target_kb: Option<u32>,
    },

    /// Export the extracted foreground as PNG
    Cutout {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Pipeline config (JSON)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Center,
    Edge,
}

impl From<StrategyArg> for SegmentationStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Center => SegmentationStrategy::CenterFill,
            StrategyArg::Edge => SegmentationStrategy::EdgeGradient,
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_file(p).with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

async fn cmd_process(
    inputs: Vec<PathBuf>,
    out: PathBuf,
    config: Option<PathBuf>,
    no_segment: bool,
    strategy: Option<StrategyArg>,
    target_kb: Option<u32>,
) -> anyhow::Result<()> {
    let mut config = load_config(config.as_deref())?;
    if no_segment {
        config.segmentation = None;
    } else if let Some(strategy) = strategy {
        config.segmentation.get_or_insert_with(Default::default).strategy = strategy.into();
    }
    if let Some(kb) = target_kb {
        config.optimizer.target_size_kb = kb;
    }
    let pipeline = Pipeline::new(config)?;

    let (entries, manifest) = tokio::task::spawn_blocking(move || {
        let mut sink = DirectorySink::new(out);
        let entries = pipeline.process_files_into(&inputs, &mut sink);
        sink.write_manifest(&entries).map(|manifest| (entries, manifest))
    })
    .await??;

    for entry in &entries {
        match (&entry.image, &entry.error) {
            (Some(image), _) => println!(
                "{} -> {} ({}x{}, {:.1} KB, q{})",
                entry.name,
                entry.location.as_deref().unwrap_or("-"),
                image.width,
                image.height,
                image.size_kb,
                image.quality
            ),
            (None, Some(e)) => println!("{} FAILED: {}", entry.name, e),
            (None, None) => {}
        }
    }

    let failed = entries.iter().filter(|e| !e.is_ok()).count();
    println!("\n{} processed, {} failed", entries.len() - failed, failed);
    println!("Manifest: {}", manifest.display());

    if failed == entries.len() {
        bail!("All {} inputs failed", failed);
    }
    Ok(())
}

async fn cmd_cutout(input: PathBuf, output: PathBuf, config: Option<PathBuf>) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(load_config(config.as_deref())?)?;
    let raw = tokio::fs::read(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let png = pipeline.cutout_async(raw).await?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&output, &png).await?;
    println!("Cutout saved to: {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Process { inputs, out, config, no_segment, strategy, target_kb } => {
            cmd_process(inputs, out, config, no_segment, strategy, target_kb).await
        }
        Commands::Cutout { input, output, config } => cmd_cutout(input, output, config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
