//! Background Removal CLI Tool
//!
//! Command-line interface for batch background removal: one-shot mode
//! processes the inputs and exits, interactive mode keeps a session open.

use super::config::{CliConfigBuilder, RunSettings};
use super::interactive::{self, InteractiveSession, PromptOptions};
use super::reporters::create_cli_progress_reporter;
use crate::{
    backends::OnnxSegmenterFactory,
    cache::{format_size, ModelCache},
    config::BatchConfig,
    dispatcher::Dispatcher,
    download::ModelDownloader,
    models::ModelKind,
    services::{is_accepted_image, ImageIOService, ARCHIVE_FILE_NAME},
    session::Session,
    tracing_config::{events, init_cli_tracing, spans},
    types::UploadedImage,
};
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;

/// Batch background removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-batch")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories (.jpg, .jpeg, .png)
    #[arg(value_name = "INPUT", required_unless_present_any = &["show_providers", "list_models", "clear_cache", "interactive"])]
    pub input: Vec<String>,

    /// Output directory for the processed images [default: current directory]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Model identifier (see --list-models)
    #[arg(short, long, default_value = "u2net")]
    pub model: String,

    /// List the model catalog with cache status and exit
    #[arg(long)]
    pub list_models: bool,

    /// Remove every downloaded model file from the model directory and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Also write every result into a zip archive [default: processed_images.zip]
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = ARCHIVE_FILE_NAME)]
    pub zip: Option<PathBuf>,

    /// Also write a side-by-side before/after image per result (<stem>_compare.png)
    #[arg(long)]
    pub compare: bool,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Filename pattern for directory inputs (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Images processed at the same time (0 = one per CPU core)
    #[arg(short, long, default_value_t = 0)]
    pub workers: usize,

    /// Execution provider: auto, cpu, cuda or coreml
    #[arg(short, long, default_value = "auto")]
    pub execution_provider: String,

    /// Intra-op threads per model session (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Directory holding the ONNX model files [default: $BGREMOVE_MODEL_DIR, $U2NET_HOME or ~/.u2net]
    #[arg(long, value_name = "PATH")]
    pub model_dir: Option<PathBuf>,

    /// Fail instead of downloading missing model files
    #[arg(long)]
    pub no_download: bool,

    /// Emit progress and results as JSON lines on stdout
    #[arg(long)]
    pub json: bool,

    /// Write log output to this file instead of stderr
    #[cfg(feature = "tracing-files")]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Start an interactive session
    #[arg(short, long)]
    pub interactive: bool,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "tracing-files")]
    let log_file = cli.log_file.clone();
    #[cfg(not(feature = "tracing-files"))]
    let log_file = None;

    let _tracing_guard = init_cli_tracing(cli.verbose, cli.json, log_file)
        .context("Failed to initialize tracing")?;

    // Contained worker panics become item failures; log them as one line
    // instead of letting the default hook print a backtrace mid-progress
    std::panic::set_hook(Box::new(|info| {
        tracing::error!("{}", info);
    }));

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let RunSettings { config, model } =
        CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    if cli.list_models {
        return list_models(&config, cli.json);
    }

    if cli.clear_cache {
        return clear_cache(&config);
    }

    let mode = if cli.interactive { "interactive" } else { "batch" };
    let span = spans::session(mode, model.id(), &config.execution_provider.to_string());
    let dispatcher = Dispatcher::new(Arc::new(OnnxSegmenterFactory::new()), config);

    if cli.interactive {
        let options = PromptOptions {
            output_dir: output_dir(&cli),
            recursive: cli.recursive,
            pattern: cli.pattern.clone(),
            json: cli.json,
            verbose: cli.verbose,
            fetch_models: true,
        };
        let mut state = InteractiveSession::new(dispatcher, model, options);
        if !cli.input.is_empty() {
            let paths = cli.input.iter().map(PathBuf::from).collect();
            state.execute(interactive::Command::Add(paths)).await?;
        }
        return interactive::run(state).instrument(span).await;
    }

    run_batch(&cli, &dispatcher, model).instrument(span).await
}

fn output_dir(cli: &Cli) -> PathBuf {
    cli.output.clone().unwrap_or_else(|| PathBuf::from("."))
}

/// One-shot mode: process every input, write the outputs and exit
async fn run_batch(cli: &Cli, dispatcher: &Dispatcher, model: ModelKind) -> Result<()> {
    let files = collect_input_files(&cli.input, cli.recursive, cli.pattern.as_deref())?;
    if files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(());
    }
    info!("Found {} image file(s) to process", files.len());

    ensure_model_available(model, dispatcher.config(), !cli.json).await?;

    let uploads = load_uploads(&files);
    if uploads.is_empty() {
        anyhow::bail!("None of the {} input file(s) could be read", files.len());
    }

    let reporter = create_cli_progress_reporter(cli.json, cli.verbose);
    let mut session = Session::new();
    let outcome = session
        .process(dispatcher, &uploads, model, reporter.as_ref())
        .instrument(spans::batch_processing(uploads.len(), model.id()))
        .await
        .context("Batch processing failed")?;

    let out_dir = output_dir(cli);
    let written = ImageIOService::save_results(session.results(), &out_dir)
        .context("Failed to save results")?;

    let comparisons = if cli.compare {
        ImageIOService::save_comparisons(session.results(), &out_dir)
            .context("Failed to save comparison images")?
    } else {
        Vec::new()
    };

    let archive = match &cli.zip {
        Some(path) if !session.is_empty() => {
            let path = out_dir.join(path);
            let size = ImageIOService::write_archive(session.results(), &path)
                .context("Failed to write archive")?;
            Some((path, size))
        },
        Some(_) => {
            warn!("No images were processed, skipping archive");
            None
        },
        None => None,
    };

    if cli.json {
        let line = serde_json::json!({
            "event": "exported",
            "files": written,
            "comparisons": comparisons,
            "archive": archive.as_ref().map(|(path, _)| path),
        });
        println!("{}", line);
    } else {
        println!("✅ Saved {} image(s) to {}", written.len(), out_dir.display());
        if !comparisons.is_empty() {
            println!("🔍 Saved {} comparison image(s)", comparisons.len());
        }
        if let Some((path, size)) = &archive {
            println!("📦 Archive: {} ({})", path.display(), format_size(*size));
        }
    }

    if !outcome.failed.is_empty() {
        warn!(
            "Some files failed to process. Processed: {}, Failed: {}",
            outcome.processed.len(),
            outcome.failed.len()
        );
        for failure in &outcome.failed {
            warn!("  {}: {}", failure.name, failure.error);
        }
    }

    Ok(())
}

/// Read every input file, skipping the ones that cannot be read
pub(crate) fn load_uploads(files: &[PathBuf]) -> Vec<UploadedImage> {
    files
        .iter()
        .filter_map(|file| match ImageIOService::load_upload(file) {
            Ok(upload) => Some(upload),
            Err(e) => {
                warn!("Skipping {}: {}", file.display(), e);
                None
            },
        })
        .collect()
}

/// Make sure the model file exists locally, downloading it when allowed
pub(crate) async fn ensure_model_available(
    model: ModelKind,
    config: &BatchConfig,
    show_progress: bool,
) -> Result<()> {
    if model.preprocessing().is_none() {
        events::warning_with_recommendation(
            &format!("Model '{}' is not supported by the ONNX backend", model),
            "Pick a u2net, isnet or birefnet model",
        );
        return Ok(());
    }

    let cache = ModelCache::from_config(config).context("Failed to resolve model directory")?;
    let path = cache.model_path(model);
    if cache.is_model_cached(model) {
        return Ok(());
    }

    if !config.auto_download {
        anyhow::bail!(
            "Model '{}' not found at {}. Run without --no-download to fetch it",
            model,
            path.display()
        );
    }

    if show_progress {
        println!("📦 Model {} not cached. Downloading...", model);
    }
    let downloader = ModelDownloader::new(cache).context("Failed to create model downloader")?;
    downloader
        .ensure_model(model, show_progress)
        .instrument(spans::download(model.id(), &path))
        .await
        .map_err(|e| {
            events::error_with_context(&e, "model download");
            e
        })
        .with_context(|| format!("Failed to download model '{}'", model))?;

    Ok(())
}

/// Expand files and directories into the sorted list of accepted images
pub(crate) fn collect_input_files(
    inputs: &[String],
    recursive: bool,
    pattern: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let mut all_files = Vec::new();

    for input in inputs {
        let path = PathBuf::from(input);

        if path.is_file() {
            if is_accepted_image(&path) {
                all_files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            all_files.extend(find_image_files(&path, recursive, pattern)?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    // Alphanumerical order regardless of the order the inputs were given in
    all_files.sort();
    all_files.dedup();
    Ok(all_files)
}

/// Find accepted image files in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry.with_context(|| format!("Failed to scan {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_accepted_image(path) && matches_pattern(path, pattern) {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// Check if file matches the given pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => {
            if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            } else {
                false
            }
        },
        None => true,
    }
}

/// Display execution provider diagnostics
fn show_provider_diagnostics() {
    println!("🔍 Execution Provider Diagnostics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    println!("\n🚀 Execution Providers:");
    for (name, available, description) in OnnxSegmenterFactory::list_providers() {
        let status = if available {
            "✅ Available"
        } else {
            "❌ Not Available"
        };
        println!("  • {}: {} - {}", name, status, description);
    }

    println!("\n💡 Usage Examples:");
    println!("  --execution-provider auto    # Best available provider (default)");
    println!("  --execution-provider coreml  # Apple CoreML (macOS)");
    println!("  --execution-provider cuda    # NVIDIA CUDA");
    println!("  --execution-provider cpu     # Force CPU execution");
}

/// Delete the downloaded model files
fn clear_cache(config: &BatchConfig) -> Result<()> {
    let cache = ModelCache::from_config(config).context("Failed to resolve model directory")?;
    println!("🗑️  Clearing model files in {}", cache.cache_dir().display());

    let removed = cache.clear_all_models().context("Failed to clear model cache")?;
    if removed.is_empty() {
        println!("💡 No model files were cached");
    } else {
        println!("✅ Removed {} model(s):", removed.len());
        for model in &removed {
            println!("   • {}", model);
        }
    }
    Ok(())
}

/// Print the model catalog with cache status
fn list_models(config: &BatchConfig, json: bool) -> Result<()> {
    let cache = ModelCache::from_config(config).context("Failed to resolve model directory")?;
    let cached = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;
    let cached_size = |model: ModelKind| {
        cached
            .iter()
            .find(|info| info.model == model)
            .map(|info| info.size_bytes)
    };

    if json {
        let models: Vec<_> = ModelKind::ALL
            .iter()
            .map(|&model| {
                serde_json::json!({
                    "id": model.id(),
                    "description": model.description(),
                    "file_name": model.file_name(),
                    "supported": model.preprocessing().is_some(),
                    "cached_bytes": cached_size(model),
                })
            })
            .collect();
        println!("{}", serde_json::Value::Array(models));
        return Ok(());
    }

    println!("📦 Models (directory: {})", cache.cache_dir().display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for model in ModelKind::ALL {
        let status = match cached_size(model) {
            Some(size) => format!("✅ {}", format_size(size)),
            None => "⬇️  not downloaded".to_string(),
        };
        let default_marker = if model == ModelKind::default() {
            " (default)"
        } else {
            ""
        };
        println!("  • {}{}: {}", model.id(), default_marker, model.description());
        println!("    └─ {}", status);
    }

    println!("\n💡 To use a model:");
    println!("  bgremove-batch --model MODEL_ID input.jpg");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern(Path::new("any_file.jpg"), None));
        assert!(matches_pattern(Path::new("test.jpg"), Some("*.jpg")));
        assert!(matches_pattern(Path::new("img_001.jpg"), Some("img_*.jpg")));
        assert!(matches_pattern(Path::new("image001.png"), Some("image???.png")));
        assert!(!matches_pattern(Path::new("test.png"), Some("*.jpg")));
        assert!(!matches_pattern(Path::new(""), Some("*.jpg")));
    }

    #[test]
    fn test_collect_input_files_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.jpg");
        touch(dir.path(), "a.PNG");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "anim.gif");
        touch(dir.path(), "nested/c.jpeg");

        let inputs = vec![dir.path().display().to_string()];
        let files = collect_input_files(&inputs, false, None).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.jpg"]);

        let files = collect_input_files(&inputs, true, None).unwrap();
        assert_eq!(files.len(), 3);

        let files = collect_input_files(&inputs, true, Some("*.jp*g")).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_collect_input_files_skips_unsupported_files() {
        let dir = TempDir::new().unwrap();
        let txt = touch(dir.path(), "readme.txt");
        let png = touch(dir.path(), "z.png");
        let inputs = vec![txt.display().to_string(), png.display().to_string()];

        let files = collect_input_files(&inputs, false, None).unwrap();
        assert_eq!(files, vec![png]);
    }

    #[test]
    fn test_load_uploads_skips_unreadable_files() {
        let dir = TempDir::new().unwrap();
        let good = touch(dir.path(), "good.png");
        let missing = dir.path().join("gone.png");
        let unsupported = touch(dir.path(), "notes.txt");

        let uploads = load_uploads(&[good, missing, unsupported]);
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name, "good.png");
    }

    #[test]
    fn test_collect_input_files_missing_path() {
        let inputs = vec!["/nonexistent/path/image.png".to_string()];
        assert!(collect_input_files(&inputs, false, None).is_err());
    }

    #[tokio::test]
    async fn test_missing_model_without_download_fails() {
        let dir = TempDir::new().unwrap();
        let config = BatchConfig::builder()
            .model_dir(Some(dir.path()))
            .auto_download(false)
            .build()
            .unwrap();

        let err = ensure_model_available(ModelKind::U2NetP, &config, false)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("u2netp.onnx"));
    }

    #[tokio::test]
    async fn test_cached_model_is_accepted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("u2net.onnx"), b"model").unwrap();
        let config = BatchConfig::builder()
            .model_dir(Some(dir.path()))
            .auto_download(false)
            .build()
            .unwrap();

        assert!(ensure_model_available(ModelKind::U2Net, &config, false)
            .await
            .is_ok());
        // Unsupported models are left to fail per item
        assert!(ensure_model_available(ModelKind::Sam, &config, false)
            .await
            .is_ok());
    }

    #[test]
    fn test_cli_parses_zip_flag() {
        let cli = Cli::try_parse_from(["bgremove-batch", "--zip", "all.zip", "in.png"]).unwrap();
        assert_eq!(cli.zip, Some(PathBuf::from("all.zip")));

        let cli = Cli::try_parse_from(["bgremove-batch", "in.png", "--zip"]).unwrap();
        assert_eq!(cli.zip, Some(PathBuf::from(ARCHIVE_FILE_NAME)));
        assert_eq!(cli.input, vec!["in.png".to_string()]);
        assert_eq!(cli.model, "u2net");
    }

    #[test]
    fn test_cli_parses_compare_flag() {
        let cli = Cli::try_parse_from(["bgremove-batch", "--compare", "in.png"]).unwrap();
        assert!(cli.compare);
        let cli = Cli::try_parse_from(["bgremove-batch", "in.png"]).unwrap();
        assert!(!cli.compare);
    }

    #[cfg(feature = "tracing-files")]
    #[test]
    fn test_cli_parses_log_file() {
        let cli =
            Cli::try_parse_from(["bgremove-batch", "--log-file", "run.log", "in.png"]).unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("run.log")));
    }

    #[test]
    fn test_cli_requires_input_unless_listing() {
        assert!(Cli::try_parse_from(["bgremove-batch"]).is_err());
        assert!(Cli::try_parse_from(["bgremove-batch", "--list-models"]).is_ok());
        assert!(Cli::try_parse_from(["bgremove-batch", "-i"]).is_ok());
    }
}
