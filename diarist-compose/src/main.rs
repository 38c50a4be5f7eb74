//! diarist-compose - add photos to a diary entry as a new post
//!
//! Uploads local images straight to storage, waits until the backend has
//! processed them and prints the resulting posts of the entry.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use libdiarist::authoring::{state_label, Action, AuthoringState};
use libdiarist::config::resolve_config_path;
use libdiarist::logging::LoggingConfig;
use libdiarist::service::{AuthoringService, EventReceiver};
use libdiarist::types::{EntryId, ImageState, PostPatch, UploadFile};
use libdiarist::{Config, DiaristError};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "diarist-compose")]
#[command(version)]
#[command(about = "Add photos to a diary entry as a new post")]
#[command(long_about = "\
diarist-compose - add photos to a diary entry as a new post

DESCRIPTION:
    Starts a new post in the given entry, uploads every image file directly
    to storage and waits until the backend has processed all of them. The
    resulting posts are printed to stdout.

    Supported images: JPEG, PNG, GIF and WebP. Other files are skipped with
    a warning, as are images beyond the per-post limit.

USAGE:
    # New post with two photos
    diarist-compose --entry 67e55044-10b1-426f-9247-bb680e5fe0c8 a.jpg b.png

    # Continue an existing entry, title the new post and store the result
    diarist-compose --entry <ID> --resume --title \"Day 2\" --save *.jpg

    # Machine-readable output
    diarist-compose --entry <ID> --format json photo.webp

CONFIGURATION:
    Configuration file: ~/.config/diarist/config.toml (or $DIARIST_CONFIG)

    [backend]
    base_url = \"https://diary.example.com/api\"
    api_key = \"...\"
    timeout = \"30s\"

    [authoring]
    max_images_per_post = 10

    [polling]
    interval = \"2s\"

LOGGING:
    DIARIST_LOG_FORMAT=text|json|pretty, DIARIST_LOG_LEVEL=info, RUST_LOG

EXIT CODES:
    0 - All uploads processed
    1 - Runtime error, or uploads still pending at timeout/interrupt
    2 - Configuration or authentication error
    3 - Invalid input
")]
struct Cli {
    /// Entry to add the post to
    #[arg(long, value_name = "UUID")]
    entry: EntryId,

    /// Image files to upload
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Configuration file (overrides $DIARIST_CONFIG and the default location)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend base URL (overrides the configuration file)
    #[arg(long, value_name = "URL", env = "DIARIST_BACKEND_URL")]
    backend_url: Option<String>,

    /// Load the posts already stored for the entry first
    #[arg(long)]
    resume: bool,

    /// Title of the new post
    #[arg(long)]
    title: Option<String>,

    /// Description of the new post
    #[arg(long)]
    description: Option<String>,

    /// Store the resulting posts in the backend
    #[arg(long)]
    save: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// How long to wait for uploads to be processed
    #[arg(long, value_name = "DURATION", default_value = "2m", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<DiaristError>()
        .map(|e| e.exit_code())
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(1)
}

/// Returns whether every upload settled before the deadline
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let has_new_post = !cli.files.is_empty() || cli.title.is_some() || cli.description.is_some();
    if !has_new_post && !cli.resume {
        return Err(DiaristError::InvalidInput(
            "Nothing to do: give image files, --title/--description or --resume".to_string(),
        )
        .into());
    }

    let config = load_config(&cli)?;

    // Read everything up front so a typo fails before anything is uploaded
    let mut files = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let file = UploadFile::from_path(path)
            .await
            .map_err(DiaristError::from)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }

    let service = AuthoringService::from_config(&config, cli.entry)?;
    let notices = tokio::spawn(print_notices(service.subscribe()));

    if cli.resume {
        let count = service.resume().await?;
        info!("Loaded {} existing posts", count);
    }

    if has_new_post {
        service.submit(Action::start_new_post());

        service.submit(Action::UpdatePost(PostPatch {
            title: cli.title.clone(),
            description: cli.description.clone(),
            location: None,
        }));
    }

    let poller = service.start_polling();
    let report = service.uploads().add_files(files).await;
    info!(
        added = report.added.len(),
        skipped = report.unsupported.len() + report.duplicates.len() + report.over_capacity.len(),
        "Files submitted"
    );

    let settled = tokio::select! {
        result = tokio::time::timeout(cli.timeout, service.session().wait_until_settled()) => {
            if result.is_err() {
                warn!("Timed out after {:?} with uploads still pending", cli.timeout);
            }
            result.is_ok()
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted with uploads still pending");
            false
        }
    };
    poller.shutdown().await;

    let state = service.snapshot();
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
        OutputFormat::Text => print!("{}", render_text(cli.entry, &state)),
    }

    if cli.save {
        service.save().await?;
        info!("Saved entry {}", cli.entry);
    }

    notices.abort();
    Ok(settled)
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => {
            let default = resolve_config_path()?;
            // Without a config file a backend URL on the command line is enough
            if cli.backend_url.is_some() && !default.exists() {
                None
            } else {
                Some(default)
            }
        }
    };

    let mut config = match path {
        Some(path) => load_config_file(&path)?,
        None => Config::for_backend(String::new()),
    };

    if let Some(url) = &cli.backend_url {
        config.backend.base_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn load_config_file(path: &Path) -> anyhow::Result<Config> {
    Config::load_from_path(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

async fn print_notices(mut receiver: EventReceiver) {
    while let Ok(event) = receiver.recv().await {
        eprintln!("{}", event.describe());
    }
}

fn render_text(entry: EntryId, state: &AuthoringState) -> String {
    let mut out = format!("Entry {}\n", entry);

    for post in &state.posts {
        let marker = if post.is_selected { "*" } else { " " };
        let title = if post.title.is_empty() { "(untitled)" } else { post.title.as_str() };
        out.push_str(&format!(
            "{} Post {}: {} ({} images)\n",
            marker,
            post.order + 1,
            title,
            post.images.len()
        ));

        for image in &post.images {
            let detail = match &image.state {
                ImageState::Uploading { name, .. } => name.clone(),
                ImageState::Loaded { url } => url.clone(),
                ImageState::CompressionError { key } => key.clone(),
            };
            out.push_str(&format!(
                "    [{}] {:<17} {}\n",
                image.order,
                state_label(&image.state),
                detail
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use libdiarist::error::ConfigError;
    use libdiarist::types::{ImageMimeType, NewImage};

    #[test]
    fn test_cli_parses_arguments() {
        let cli = Cli::try_parse_from([
            "diarist-compose",
            "--entry",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "--timeout",
            "30s",
            "--format",
            "json",
            "a.jpg",
            "b.png",
        ])
        .unwrap();

        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.timeout, Duration::from_secs(30));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(!cli.resume);
    }

    #[test]
    fn test_cli_rejects_bad_entry() {
        let result = Cli::try_parse_from(["diarist-compose", "--entry", "yesterday", "a.jpg"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_exit_code_from_wrapped_error() {
        let error = anyhow::Error::from(DiaristError::Config(ConfigError::MissingField(
            "backend.base_url".to_string(),
        )))
        .context("Failed to load configuration");

        assert_eq!(exit_code(&error), 2);
        assert_eq!(exit_code(&anyhow::anyhow!("something else")), 1);
    }

    #[test]
    fn test_render_text() {
        let entry = EntryId::new_v4();
        let state = libdiarist::reduce(
            AuthoringState::new(10),
            Action::AddImages(vec![NewImage {
                id: libdiarist::ImageId::new_v4(),
                key: "k1".to_string(),
                name: "harbour.jpg".to_string(),
                size: 10,
                mimetype: ImageMimeType::Jpeg,
            }]),
        );

        let text = render_text(entry, &state);

        assert!(text.starts_with(&format!("Entry {}\n", entry)));
        assert!(text.contains("* Post 1: (untitled) (1 images)"));
        assert!(text.contains("uploading"));
        assert!(text.contains("harbour.jpg"));
    }
}
