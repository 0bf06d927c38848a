use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shortcast::captions::{CaptionGenerator, CaptionLimits, ChatCompletionClient, PromptBuilder};
use shortcast::cli::{AuthPlatform, Cli, Commands};
use shortcast::config::Config;
use shortcast::models::Platform;
use shortcast::output;
use shortcast::platforms::oauth::{self, AuthorizationRequest};
use shortcast::platforms::{http_client, tiktok::TikTokAdapter, youtube::ClientCredentials, UploadDispatcher};
use shortcast::transcribe::{FfmpegAudioExtractor, TranscriptResolver, WhisperClient};
use shortcast::utils;
use shortcast::validate::{FfprobeValidator, VideoValidator};
use shortcast::{Pipeline, PublishError};

const EXIT_PARTIAL_FAILURE: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load().await?;

    init_tracing(&config, cli.verbose)?;

    if matches!(cli.command, Commands::Upload { .. } | Commands::Check { .. }) {
        // Check for required external dependencies (non-fatal)
        let missing_deps = utils::check_dependencies().await;
        if !missing_deps.is_empty() {
            eprintln!("⚠️  Dependency check warnings:");
            for dep in missing_deps {
                eprintln!("   • {}", dep);
            }
            eprintln!("   (Continuing anyway - tools may be available)");
        }
    }

    match cli.command {
        Commands::Upload {
            video,
            title,
            only,
            skip,
            preview,
            no_confirm,
            json,
        } => {
            let options = UploadOptions {
                title,
                preview,
                confirm: !no_confirm && !json,
                json,
                quiet: cli.quiet || json,
            };
            let enabled = config.enabled_platforms(&only, &skip);

            tokio::select! {
                code = upload(&config, &video, &enabled, &options) => code,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\nInterrupted, nothing further will be uploaded");
                    Ok(ExitCode::from(EXIT_INTERRUPTED))
                }
            }
        }
        Commands::Check { video } => {
            check(&config, &video).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Auth { platform } => {
            authorize(&config, platform).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                config.interactive_setup().await?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Platforms => {
            let dispatcher = UploadDispatcher::from_config(&config, &Platform::ALL)?;
            println!("Supported platforms:");
            for (platform, configured) in dispatcher.configuration_status() {
                let enabled = if config.platforms.is_enabled(platform) {
                    "enabled"
                } else {
                    "disabled"
                };
                let credentials = if configured {
                    "credentials found"
                } else {
                    "credentials missing"
                };
                println!("  • {} ({}, {})", platform, enabled, credentials);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { config.app.log_level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("shortcast={}", level).into());

    let file_layer = match &config.app.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs_err::create_dir_all(parent)?;
            }
            let file = fs_err::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context("Failed to open log file")?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

struct UploadOptions {
    title: Option<String>,
    preview: bool,
    confirm: bool,
    json: bool,
    quiet: bool,
}

fn build_pipeline(config: &Config, enabled: &[Platform]) -> Result<Pipeline> {
    let resolver = TranscriptResolver::new(
        Box::new(FfmpegAudioExtractor::new()),
        Box::new(WhisperClient::new(&config.openai)?),
    )
    .with_temp_root(config.app.temp_dir.clone());

    let generator = CaptionGenerator::new(
        Box::new(ChatCompletionClient::new(&config.openai, &config.captions)?),
        PromptBuilder::new(&config.captions, CaptionLimits::default()),
    );

    Ok(Pipeline::new(
        Box::new(FfprobeValidator::new(&config.app)),
        resolver,
        generator,
        UploadDispatcher::from_config(config, enabled)?,
    ))
}

/// Finish the spinner according to the stage result
fn settle<T>(progress: &ProgressBar, result: Result<T, PublishError>, done: &str) -> Result<T, PublishError> {
    match &result {
        Ok(_) => progress.finish_with_message(done.to_string()),
        Err(_) => progress.abandon_with_message("Failed"),
    }
    result
}

async fn upload(
    config: &Config,
    video: &Path,
    enabled: &[Platform],
    options: &UploadOptions,
) -> Result<ExitCode> {
    if enabled.is_empty() && !options.preview {
        anyhow::bail!("No platforms enabled, check the config file or --only/--skip");
    }

    let pipeline = build_pipeline(config, enabled)?;
    let video: PathBuf = video.to_path_buf();
    let mut run = pipeline.start(&video);
    let human = !options.json;

    if human {
        output::print_banner(&video);
    }

    let progress = output::spinner("Validating video...", options.quiet);
    settle(&progress, run.validate().await.map(|_| ()), "Video validated")?;
    if let (true, Some(metadata)) = (human, run.result().metadata()) {
        output::print_metadata(metadata);
    }

    let progress = output::spinner("Resolving transcript...", options.quiet);
    settle(&progress, run.resolve_transcript().await.map(|_| ()), "Transcript ready")?;
    if let (true, Some(transcript)) = (human, run.result().transcript()) {
        output::print_transcript(transcript, run.transcript_source());
    }

    let progress = output::spinner("Generating captions...", options.quiet);
    settle(&progress, run.generate_captions().await.map(|_| ()), "Captions generated")?;
    if let (true, Some(captions)) = (human, run.result().captions()) {
        output::print_captions(captions, &CaptionLimits::default());
    }

    if options.preview {
        if options.json {
            output::print_json(run.result())?;
        } else {
            println!("Preview only, nothing was uploaded.");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if options.confirm {
        let mut input = tokio::io::BufReader::new(tokio::io::stdin());
        if !output::review_captions(&mut run, &mut input).await? {
            println!("Cancelled, nothing was uploaded.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let progress = output::spinner(
        format!("Uploading to {} platform(s)...", enabled.len()),
        options.quiet,
    );
    run.dispatch(options.title.as_deref()).await?;
    progress.finish_and_clear();

    let result = run.finish();
    if options.json {
        output::print_json(&result)?;
    } else {
        output::print_results(&result);
    }

    if result.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
    }
}

async fn check(config: &Config, video: &Path) -> Result<()> {
    let metadata = FfprobeValidator::new(&config.app).validate(video).await?;
    output::print_metadata(&metadata);

    let source = TranscriptResolver::detect_source(video);
    println!("Transcript source: {}", source);

    let enabled = config.enabled_platforms(&[], &[]);
    let dispatcher = UploadDispatcher::from_config(config, &enabled)?;
    println!("Enabled platforms:");
    output::print_platform_status(&dispatcher.configuration_status());
    Ok(())
}

async fn authorize(config: &Config, platform: AuthPlatform) -> Result<()> {
    let client = http_client()?;
    let (provider, token_file) = match platform {
        AuthPlatform::Youtube => {
            let credentials = ClientCredentials::load(&config.youtube.client_secret_file)?;
            (credentials.provider(), config.youtube.token_file.clone())
        }
        AuthPlatform::Tiktok => {
            let adapter = TikTokAdapter::new(client.clone(), config.tiktok.clone());
            (adapter.provider()?, config.tiktok.token_file.clone())
        }
    };

    let request = AuthorizationRequest::new(&provider);
    println!("Open this URL in your browser and approve access:");
    println!();
    println!("  {}", request.url);
    println!();
    println!("Then paste the full URL you were redirected to:");

    let mut callback = String::new();
    std::io::stdin()
        .read_line(&mut callback)
        .context("Failed to read the redirected URL")?;

    let code = oauth::parse_callback(&callback, &request.state)?;
    let token = oauth::exchange_code(&client, &provider, &code, &request.pkce).await?;
    token.save(&token_file)?;

    tracing::info!(platform = %Platform::from(platform), "Authorization complete");
    println!("Token saved to {}", token_file.display());
    Ok(())
}
