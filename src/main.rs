use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use stylegen::{
    config::{parse_timeout_secs, Config, DEFAULT_CONFIG_FILE},
    logger::{self, LogLevel, LoggerConfig},
    batch::{self, BatchOptions, BatchStatus},
    persist::default_base_path,
    GeminiClient, GenError, GenerationRequest, Resolution, Result,
};

/// Generate images with Gemini, optionally guided by a style reference image.
#[derive(Debug, Parser)]
#[command(name = "stylegen", version)]
struct Cli {
    /// Text description of the image to generate
    #[arg(required_unless_present_any = ["list_styles", "batch"])]
    prompt: Option<String>,

    /// Style reference name, resolved to style_<NAME>.<ext> in the styles directory
    #[arg(short, long)]
    style: Option<String>,

    /// Image resolution as WIDTHxHEIGHT
    #[arg(short, long, default_value = "1024x1024")]
    resolution: String,

    /// Number of images to generate
    #[arg(short = 'n', long, default_value_t = 1)]
    num_images: u32,

    /// Output base path (default: <output root>/<timestamp>_<id>/image).
    /// In batch mode, the directory that receives every entry
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON array of {name, prompt, style?, resolution?, num_images?} to run in turn
    #[arg(long, value_name = "FILE", conflicts_with_all = ["prompt", "style", "all_styles"])]
    batch: Option<PathBuf>,

    /// Run the prompt once per style reference in the styles directory
    #[arg(long, conflicts_with = "style")]
    all_styles: bool,

    /// Seconds to wait between two requests in batch mode
    #[arg(long, default_value_t = 0)]
    delay_secs: u64,

    /// Regenerate batch entries that already have a metadata record
    #[arg(long)]
    force: bool,

    /// Gemini API key; overrides GEMINI_API_KEY and the config file
    #[arg(long)]
    api_key: Option<String>,

    /// Directory holding style reference images
    #[arg(long)]
    styles_dir: Option<PathBuf>,

    /// Model identifier
    #[arg(long)]
    model: Option<String>,

    /// Dotenv-style file consulted for the API key
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config_file: PathBuf,

    /// Request timeout in seconds (at least 1)
    #[arg(long, value_parser = parse_timeout)]
    timeout: Option<Duration>,

    /// List available style references and exit
    #[arg(long)]
    list_styles: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::from_env().with_config_file(&self.config_file);
        if let Some(dir) = &self.styles_dir {
            config = config.with_styles_dir(dir);
        }
        if let Some(model) = &self.model {
            config.gemini = config.gemini.with_model(model);
        }
        if let Some(timeout) = self.timeout {
            config.gemini = config.gemini.with_timeout(timeout);
        }
        config
    }

    fn logger_config(&self) -> LoggerConfig {
        match (self.json_logs, self.verbose) {
            (true, false) => LoggerConfig::production(),
            (true, true) => LoggerConfig::production().with_level(LogLevel::Debug),
            (false, true) => LoggerConfig::development(),
            (false, false) => LoggerConfig::new(),
        }
    }
}

fn parse_timeout(raw: &str) -> std::result::Result<Duration, String> {
    parse_timeout_secs(raw).ok_or_else(|| "expected a whole number of seconds above 0".to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logger::init_with_config(cli.logger_config()) {
        eprintln!("{}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config();

    if cli.list_styles {
        let styles = stylegen::list_styles(&config.styles_dir)?;
        if styles.is_empty() {
            log::warn!("No style references in {}", config.styles_dir.display());
        }
        for style in styles {
            println!("{}\t{}", style.name, style.path.display());
        }
        return Ok(());
    }

    if cli.batch.is_some() || cli.all_styles {
        return run_batch_mode(&cli, config).await;
    }

    let mut builder = GenerationRequest::builder(cli.prompt.clone().unwrap_or_default())
        .resolution(&cli.resolution)
        .num_images(cli.num_images)
        .maybe_style(cli.style.clone());
    if let Some(output) = &cli.output {
        builder = builder.output_path(output);
    }
    let request = builder.build()?;

    let config = config.resolve_api_key(cli.api_key.as_deref())?;
    let client = GeminiClient::new(&config.gemini)?;

    let result = match request.style() {
        Some(style) => {
            client
                .image()
                .generate_with_style_reference(&request, style, &config.styles_dir)
                .await?
        }
        None => client.image().generate(&request).await?,
    };

    let base = request.output_path().cloned().unwrap_or_else(|| {
        default_base_path(&config.output_root, Local::now(), result.request_id)
    });
    let report = stylegen::persist(&result, &base)?;

    for path in &report.written {
        println!("{}", path.display());
    }

    match report.failed.first() {
        None => {
            log::info!("✨ Generation successful: {} file(s) written", report.written.len());
            Ok(())
        }
        Some(first) => Err(GenError::Io(format!(
            "{} file(s) could not be written; first failure: {}",
            report.failed.len(),
            first.error
        ))),
    }
}

async fn run_batch_mode(cli: &Cli, config: Config) -> Result<()> {
    cli.resolution.parse::<Resolution>()?;
    if cli.num_images == 0 {
        return Err(GenError::Validation(
            "number of images must be at least 1".into(),
        ));
    }

    let entries = match &cli.batch {
        Some(file) => batch::load_entries(file)?,
        None => {
            let prompt = cli.prompt.as_deref().unwrap_or_default();
            if prompt.trim().is_empty() {
                return Err(GenError::Validation("prompt must not be empty".into()));
            }
            batch::entries_for_all_styles(prompt, &config.styles_dir)?
        }
    };

    let config = config.resolve_api_key(cli.api_key.as_deref())?;
    let client = GeminiClient::new(&config.gemini)?;
    let options = BatchOptions {
        output_dir: cli.output.clone().unwrap_or_else(|| config.output_root.clone()),
        styles_dir: config.styles_dir.clone(),
        resolution: cli.resolution.clone(),
        num_images: cli.num_images,
        delay: Duration::from_secs(cli.delay_secs),
        force: cli.force,
    };

    let report = batch::run_batch(client.image(), &entries, &options).await?;
    let summary = report.write_summary(&options.output_dir)?;
    for path in report.outcomes.iter().flat_map(|o| &o.files) {
        println!("{}", path.display());
    }

    let failed = report.count(BatchStatus::Failed);
    if failed == 0 {
        log::info!(
            "✨ Batch successful: {} generated, {} skipped",
            report.count(BatchStatus::Generated),
            report.count(BatchStatus::Skipped)
        );
        Ok(())
    } else {
        Err(GenError::Provider(format!(
            "{} of {} batch entries failed; see {}",
            failed,
            report.outcomes.len(),
            summary.display()
        )))
    }
}
