//! Line-oriented interactive session
//!
//! Stands in for a form-based frontend: the user holds a list of uploads and a
//! model selection, triggers runs, and exports whatever the session stored.

use super::main_impl::{collect_input_files, ensure_model_available, load_uploads};
use super::reporters::create_cli_progress_reporter;
use crate::{
    dispatcher::Dispatcher,
    models::ModelKind,
    services::{ImageIOService, ARCHIVE_FILE_NAME},
    session::Session,
    tracing_config::spans,
    types::UploadedImage,
};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Instrument;

const HELP: &str = "\
Commands:
  model [ID]        show or change the selected model
  add PATH...       add image files or directories
  remove NAME...    remove uploads by file name
  process           remove backgrounds from every upload
  clear             discard stored results
  save [DIR]        write stored results to DIR
  zip [PATH]        write stored results as a zip archive
  compare [DIR]     write before/after images of stored results to DIR
  list              show uploads and stored results
  help              show this message
  quit              leave the session";

/// A parsed prompt line
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Model(Option<String>),
    Add(Vec<PathBuf>),
    Remove(Vec<String>),
    Process,
    Clear,
    Save(Option<PathBuf>),
    Zip(Option<PathBuf>),
    Compare(Option<PathBuf>),
    List,
    Help,
    Quit,
}

/// Parse one prompt line; blank lines yield `None`
pub(crate) fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_lowercase().as_str(), args.as_slice()) {
        ("model", []) => Command::Model(None),
        ("model", [id]) => Command::Model(Some((*id).to_string())),
        ("add", paths) if !paths.is_empty() => {
            Command::Add(paths.iter().map(PathBuf::from).collect())
        },
        ("remove" | "rm", names) if !names.is_empty() => {
            Command::Remove(names.iter().map(|n| (*n).to_string()).collect())
        },
        ("process" | "run", []) => Command::Process,
        ("clear", []) => Command::Clear,
        ("save", []) => Command::Save(None),
        ("save", [dir]) => Command::Save(Some(PathBuf::from(dir))),
        ("zip", []) => Command::Zip(None),
        ("zip", [path]) => Command::Zip(Some(PathBuf::from(path))),
        ("compare", []) => Command::Compare(None),
        ("compare", [dir]) => Command::Compare(Some(PathBuf::from(dir))),
        ("list" | "ls", []) => Command::List,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit" | "q", []) => Command::Quit,
        (verb, _) => anyhow::bail!("Invalid command '{}'. Type 'help' for usage", verb),
    };

    Ok(Some(command))
}

/// Frontend options the prompt carries over from the command line
#[derive(Debug, Clone, Default)]
pub(crate) struct PromptOptions {
    pub(crate) output_dir: PathBuf,
    pub(crate) recursive: bool,
    pub(crate) pattern: Option<String>,
    pub(crate) json: bool,
    pub(crate) verbose: u8,
    /// Check and download model files before each run
    pub(crate) fetch_models: bool,
}

/// Whether the prompt loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

/// State of one interactive session
pub(crate) struct InteractiveSession {
    dispatcher: Dispatcher,
    options: PromptOptions,
    uploads: Vec<UploadedImage>,
    model: ModelKind,
    session: Session,
}

impl InteractiveSession {
    pub(crate) fn new(dispatcher: Dispatcher, model: ModelKind, options: PromptOptions) -> Self {
        Self {
            dispatcher,
            options,
            uploads: Vec::new(),
            model,
            session: Session::new(),
        }
    }

    /// Execute one command
    pub(crate) async fn execute(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Model(None) => self.show_models(),
            Command::Model(Some(id)) => {
                self.model = id.parse().context("Invalid model")?;
                println!("Model set to {}", self.model);
                self.sync();
            },
            Command::Add(paths) => self.add(&paths)?,
            Command::Remove(names) => self.remove(&names),
            Command::Process => self.process().await?,
            Command::Clear => {
                self.session.clear();
                println!("Stored results cleared");
            },
            Command::Save(dir) => self.save(dir)?,
            Command::Zip(path) => self.zip(path)?,
            Command::Compare(dir) => self.compare(dir)?,
            Command::List => self.list(),
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Invalidate stored results if the uploads or model changed
    fn sync(&mut self) {
        let had_results = !self.session.is_empty();
        if self.session.sync_inputs(&self.uploads, self.model) && had_results {
            println!("Inputs changed, stored results discarded");
        }
    }

    fn show_models(&self) {
        println!("Current model: {}", self.model);
        for model in ModelKind::ALL {
            let marker = if model == self.model { "*" } else { " " };
            println!("  {} {:<22} {}", marker, model.id(), model.description());
        }
    }

    fn add(&mut self, paths: &[PathBuf]) -> Result<()> {
        let inputs: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let files = collect_input_files(
            &inputs,
            self.options.recursive,
            self.options.pattern.as_deref(),
        )?;

        let loaded = load_uploads(&files);
        let added = loaded.len();
        self.uploads.extend(loaded);

        println!("Added {} file(s), {} upload(s) total", added, self.uploads.len());
        self.sync();
        Ok(())
    }

    fn remove(&mut self, names: &[String]) {
        for name in names {
            let before = self.uploads.len();
            self.uploads.retain(|upload| &upload.name != name);
            if self.uploads.len() == before {
                println!("No upload named {}", name);
            }
        }
        self.sync();
    }

    async fn process(&mut self) -> Result<()> {
        if self.uploads.is_empty() {
            println!("Nothing to process. Add files with 'add PATH'");
            return Ok(());
        }

        if self.options.fetch_models {
            ensure_model_available(self.model, self.dispatcher.config(), !self.options.json)
                .await?;
        }

        let reporter = create_cli_progress_reporter(self.options.json, self.options.verbose);
        let span = spans::batch_processing(self.uploads.len(), self.model.id());
        let outcome = self
            .session
            .process(&self.dispatcher, &self.uploads, self.model, reporter.as_ref())
            .instrument(span)
            .await
            .context("Batch processing failed")?;

        for failure in &outcome.failed {
            println!("  ❌ {}: {}", failure.name, failure.error);
        }
        println!(
            "Processed {}/{} image(s), {} result(s) stored",
            outcome.processed.len(),
            outcome.total,
            self.session.len()
        );
        Ok(())
    }

    fn save(&self, dir: Option<PathBuf>) -> Result<()> {
        if self.session.is_empty() {
            println!("No stored results. Run 'process' first");
            return Ok(());
        }

        let dir = dir.unwrap_or_else(|| self.options.output_dir.clone());
        let written = ImageIOService::save_results(self.session.results(), &dir)
            .context("Failed to save results")?;
        println!("Saved {} image(s) to {}", written.len(), dir.display());
        Ok(())
    }

    fn compare(&self, dir: Option<PathBuf>) -> Result<()> {
        if self.session.is_empty() {
            println!("No stored results. Run 'process' first");
            return Ok(());
        }

        let dir = dir.unwrap_or_else(|| self.options.output_dir.clone());
        let written = ImageIOService::save_comparisons(self.session.results(), &dir)
            .context("Failed to save comparison images")?;
        println!("Saved {} comparison image(s) to {}", written.len(), dir.display());
        Ok(())
    }

    fn zip(&self, path: Option<PathBuf>) -> Result<()> {
        if self.session.is_empty() {
            println!("No stored results. Run 'process' first");
            return Ok(());
        }

        let path = path.unwrap_or_else(|| self.options.output_dir.join(ARCHIVE_FILE_NAME));
        let size = ImageIOService::write_archive(self.session.results(), &path)
            .context("Failed to write archive")?;
        println!(
            "Wrote {} ({} entries, {} bytes)",
            path.display(),
            self.session.len(),
            size
        );
        Ok(())
    }

    fn list(&self) {
        println!("Model: {}", self.model);
        println!("Uploads ({}):", self.uploads.len());
        for upload in &self.uploads {
            println!("  {} ({} bytes)", upload.name, upload.len());
        }
        println!("Stored results ({}):", self.session.len());
        for item in self.session.results() {
            println!(
                "  {} ({}x{}, original {}x{})",
                item.name,
                item.processed.width(),
                item.processed.height(),
                item.original.width(),
                item.original.height()
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    #[cfg(test)]
    pub(crate) fn uploads(&self) -> &[UploadedImage] {
        &self.uploads
    }
}

/// Read commands from stdin until `quit` or end of input
pub(crate) async fn run(mut state: InteractiveSession) -> Result<()> {
    println!("bgremove-batch interactive session. Type 'help' for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("bgremove> ");
        std::io::stdout().flush().context("Failed to flush prompt")?;

        let Some(line) = lines.next_line().await.context("Failed to read command")? else {
            println!();
            break;
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            },
        };

        match state.execute(command).await {
            Ok(Flow::Continue) => {},
            Ok(Flow::Quit) => break,
            Err(e) => println!("Error: {:#}", e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::BatchConfig, inference::IdentitySegmenterFactory};
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_png(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    fn state(output_dir: PathBuf) -> InteractiveSession {
        let dispatcher = Dispatcher::new(Arc::new(IdentitySegmenterFactory), BatchConfig::default());
        InteractiveSession::new(
            dispatcher,
            ModelKind::U2Net,
            PromptOptions {
                output_dir,
                ..PromptOptions::default()
            },
        )
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("model").unwrap(), Some(Command::Model(None)));
        assert_eq!(
            parse_command("MODEL isnet-anime").unwrap(),
            Some(Command::Model(Some("isnet-anime".to_string())))
        );
        assert_eq!(
            parse_command("add a.png dir").unwrap(),
            Some(Command::Add(vec![PathBuf::from("a.png"), PathBuf::from("dir")]))
        );
        assert_eq!(
            parse_command("rm a.png").unwrap(),
            Some(Command::Remove(vec!["a.png".to_string()]))
        );
        assert_eq!(parse_command("process").unwrap(), Some(Command::Process));
        assert_eq!(parse_command("zip out.zip").unwrap(), Some(Command::Zip(Some(PathBuf::from("out.zip")))));
        assert_eq!(
            parse_command("compare views").unwrap(),
            Some(Command::Compare(Some(PathBuf::from("views"))))
        );
        assert_eq!(parse_command("quit").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn test_parse_rejects_bad_commands() {
        assert!(parse_command("add").is_err());
        assert!(parse_command("frobnicate").is_err());
        assert!(parse_command("process now").is_err());
        assert!(parse_command("model a b").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_workflow() {
        let inputs = TempDir::new().unwrap();
        let outputs = TempDir::new().unwrap();
        let a = write_png(&inputs, "a.png");
        let b = write_png(&inputs, "b.png");

        let mut state = state(outputs.path().to_path_buf());
        state.execute(Command::Add(vec![a, b])).await.unwrap();
        assert_eq!(state.uploads().len(), 2);

        state.execute(Command::Process).await.unwrap();
        assert_eq!(state.session().len(), 2);

        state.execute(Command::Save(None)).await.unwrap();
        assert!(outputs.path().join("a_no_bg.png").exists());
        assert!(outputs.path().join("b_no_bg.png").exists());

        state.execute(Command::Zip(None)).await.unwrap();
        assert!(outputs.path().join(ARCHIVE_FILE_NAME).exists());

        state.execute(Command::Compare(None)).await.unwrap();
        let view = image::open(outputs.path().join("a_compare.png"))
            .unwrap()
            .to_rgba8();
        assert_eq!(view.dimensions(), (8, 3));

        // Changing the model discards the stored results
        state
            .execute(Command::Model(Some("isnet-anime".to_string())))
            .await
            .unwrap();
        assert!(state.session().is_empty());

        state.execute(Command::Process).await.unwrap();
        assert_eq!(state.session().len(), 2);

        // Removing an upload changes the file set
        state
            .execute(Command::Remove(vec!["a.png".to_string()]))
            .await
            .unwrap();
        assert!(state.session().is_empty());
        assert_eq!(state.uploads().len(), 1);

        // Clear keeps the uploads
        state.execute(Command::Process).await.unwrap();
        state.execute(Command::Clear).await.unwrap();
        assert!(state.session().is_empty());
        assert_eq!(state.uploads().len(), 1);

        assert_eq!(state.execute(Command::Quit).await.unwrap(), Flow::Quit);
    }

    #[tokio::test]
    async fn test_unknown_model_is_an_error() {
        let outputs = TempDir::new().unwrap();
        let mut state = state(outputs.path().to_path_buf());
        assert!(state
            .execute(Command::Model(Some("u2net-xl".to_string())))
            .await
            .is_err());
        assert_eq!(state.model, ModelKind::U2Net);
    }
}
