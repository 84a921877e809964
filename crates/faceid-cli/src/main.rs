use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceid_core::{spawn_engine, EngineError, EngineHandle, FaceRegistry, OnnxBackend};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "faceid", about = "Register faces and classify photos against them")]
struct Cli {
    /// Directory containing det_10g.onnx and w600k_r50.onnx [env: FACEID_MODEL_DIR]
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    /// Maximum descriptor distance for a match [env: FACEID_TOLERANCE]
    #[arg(long, global = true)]
    tolerance: Option<f32>,
    /// Use the slower, more sensitive detector profile [env: FACEID_HIGH_ACCURACY]
    #[arg(long, global = true)]
    high_accuracy: bool,
    /// Detect on a grayscale copy of each image [env: FACEID_GRAYSCALE]
    #[arg(long, global = true)]
    grayscale: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every face found in an image
    Detect { image: PathBuf },
    /// Extract the descriptor of the single face in an image
    Recognize { image: PathBuf },
    /// Register every image in a gallery directory, then classify the queries
    Classify {
        /// Directory of single-face images; each file stem becomes an identity key
        #[arg(short, long)]
        gallery: PathBuf,
        /// Images to classify
        #[arg(required = true)]
        queries: Vec<PathBuf>,
    },
}

#[derive(Serialize)]
struct Classification {
    query: String,
    id: Option<String>,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }
    if let Some(tolerance) = cli.tolerance {
        config.tolerance = tolerance;
    }
    config.high_accuracy |= cli.high_accuracy;
    config.grayscale |= cli.grayscale;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Detect { image } => detect(&config, &image),
        Commands::Recognize { image } => recognize(&config, &image).await,
        Commands::Classify { gallery, queries } => classify(&config, &gallery, &queries).await,
    }
}

fn detect(config: &Config, image: &Path) -> Result<()> {
    let mut backend = OnnxBackend::init(&config.model_dir).context("loading face models")?;
    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let faces = backend.detect_faces(&bytes, config.classifier()?.detect_options())?;

    let boxes: Vec<_> = faces.iter().map(|f| &f.geometry).collect();
    println!("{}", serde_json::to_string_pretty(&boxes)?);
    tracing::info!(count = faces.len(), "detection finished");
    Ok(())
}

async fn recognize(config: &Config, image: &Path) -> Result<()> {
    let engine = start_engine(config)?;
    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let descriptor = engine.recognize_single(bytes).await?;
    println!("{}", serde_json::to_string(&descriptor)?);
    Ok(())
}

async fn classify(config: &Config, gallery: &Path, queries: &[PathBuf]) -> Result<()> {
    let engine = start_engine(config)?;

    let mut registered = 0usize;
    for path in gallery_images(gallery)? {
        let Some(id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        match engine.add_one(id, bytes).await {
            Ok(()) => registered += 1,
            Err(EngineError::Registry(err)) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping gallery image");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let indexed = engine.reload_index().await?;
    tracing::info!(registered, indexed, "gallery loaded");

    for query in queries {
        let bytes = std::fs::read(query).with_context(|| format!("reading {}", query.display()))?;
        let (id, error) = match engine.classify_single(bytes).await {
            Ok(entry) => (Some(entry.id), None),
            Err(EngineError::Registry(err)) => (None, Some(err.to_string())),
            Err(err) => return Err(err.into()),
        };
        let result = Classification {
            query: query.display().to_string(),
            id,
            error,
        };
        println!("{}", serde_json::to_string(&result)?);
    }

    Ok(())
}

fn start_engine(config: &Config) -> Result<EngineHandle<String>> {
    let mut registry = FaceRegistry::<String, OnnxBackend>::init(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;
    registry.set_config(config.classifier()?);
    Ok(spawn_engine(registry)?)
}

/// Regular files in `dir`, sorted by name so keys register in a stable order.
fn gallery_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading gallery {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
