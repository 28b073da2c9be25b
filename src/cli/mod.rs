use anyhow::{Context, Result};
use std::fs;
use std::future;
use std::path::{Path, PathBuf};
use std::time::Instant;

mod progress;

use newsreel::clients::{AnthropicClient, NewsApiClient};
use newsreel::config::{CONFIG_FILE, Credentials, Settings};
use newsreel::contexts::{
    ContentProvider, Pipeline, PipelineOutcome, build_story, keywords_or_default,
};
use newsreel::data::SCENE_NAME;
use progress::ProgressIndicator;

#[derive(Clone, Copy)]
pub struct Config {
    pub verbose: bool,
    pub dry_run: bool,
}

pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = Settings::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load settings from {}", path.display()),
        None => format!("Failed to load settings from {}", CONFIG_FILE),
    })?;
    Ok(settings)
}

pub fn apply_content_overrides(
    settings: &mut Settings,
    keywords: Option<String>,
    language: Option<String>,
) {
    if let Some(keywords) = keywords {
        settings.news.keywords = keywords;
    }
    if let Some(language) = language {
        settings.news.language = language;
    }
}

fn build_pipeline(
    settings: &Settings,
    credentials: &Credentials,
) -> Result<Pipeline<NewsApiClient, AnthropicClient>> {
    settings.validate().context("Invalid settings")?;

    let provider = settings
        .news_client(credentials)
        .context("Failed to create news client")?;
    let synthesizer = settings
        .synthesizer(credentials)
        .context("Failed to create code synthesizer")?;
    let renderer = settings.renderer().context("Failed to create renderer")?;

    Ok(Pipeline::new(provider, synthesizer, settings.extractor(), renderer)
        .with_keywords(settings.news.keywords.clone())
        .with_language(settings.news.language.clone()))
}

/// Completes on Ctrl-C; never completes if the handler cannot be installed
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        future::pending::<()>().await;
    }
}

pub async fn run(settings: &Settings, config: &Config) -> Result<()> {
    let credentials = Credentials::from_env();
    if config.verbose {
        println!("Credentials: {:?}", credentials);
    }
    let pipeline = build_pipeline(settings, &credentials)?;
    let start_time = Instant::now();

    // Step 1: Fetch content and build the story
    let fetched = pipeline.story().await;
    println!("get news:");
    println!("{}", fetched.story.text);
    if !fetched.used_content {
        println!("(no news available, using the built-in story)");
    }

    // Dry run: show what would be sent and executed, then stop
    if config.dry_run {
        let request = pipeline
            .synthesizer()
            .prepare(&fetched.story)
            .context("Failed to populate synthesis prompt")?;
        println!("[DRY RUN] Would ask model '{}' with system prompt:", request.model);
        println!("{}", request.system);
        println!("[DRY RUN] and user message:");
        println!("{}", request.user);
        let argv = pipeline
            .renderer()
            .command_line(&settings.output.source_path, SCENE_NAME);
        println!("[DRY RUN] Would run: {}", shell_words::join(&argv));
        return Ok(());
    }

    // Step 2: Run the remaining stages; Ctrl-C kills the engine
    let report = pipeline.run_story(fetched, interrupted()).await;

    let mut progress = ProgressIndicator::new(start_time);
    for record in &report.stages {
        progress.complete_stage(record);
    }
    progress.finish();

    // Step 3: Report the outcome
    match &report.outcome {
        PipelineOutcome::Rendered {
            source_path,
            result,
        } => {
            println!("✓ success generate manim code: {}", source_path.display());
            println!("✓ animation render success!");
            if config.verbose {
                print!("{}", result.stdout);
            }
            Ok(())
        }
        PipelineOutcome::SynthesisFailed(e) => {
            anyhow::bail!("generate code error: {}", e)
        }
        PipelineOutcome::ExtractionFailed(e) => {
            anyhow::bail!("Failed to write generated code: {}", e)
        }
        PipelineOutcome::RenderFailed {
            source_path,
            result,
        } => {
            if config.verbose {
                print!("{}", result.stdout);
            }
            eprintln!("error[render]: {}", source_path.display());
            if let Some(failure) = &result.failure {
                eprintln!("  {}", failure);
            }
            if let Some(diagnostic) = &result.diagnostic_output {
                eprintln!();
                for line in diagnostic.lines() {
                    eprintln!("  {}", line);
                }
                eprintln!();
            }
            anyhow::bail!("Render failed")
        }
    }
}

pub async fn story(settings: &Settings, config: &Config) -> Result<()> {
    let credentials = Credentials::from_env();
    let provider = settings
        .news_client(&credentials)
        .context("Failed to create news client")?;

    if config.dry_run {
        println!(
            "[DRY RUN] Would search news for '{}' ({})",
            keywords_or_default(&settings.news.keywords),
            settings.news.language
        );
        return Ok(());
    }

    let item = provider
        .fetch(keywords_or_default(&settings.news.keywords), &settings.news.language)
        .await;
    let story = build_story(item.as_ref());

    println!("{}", story.display_title);
    println!("{}", "=".repeat(60));
    println!("{}", story.text);
    Ok(())
}

pub fn extract(reply_file: &Path, settings: &Settings, config: &Config) -> Result<()> {
    let raw = fs::read_to_string(reply_file)
        .with_context(|| format!("Failed to read reply file {}", reply_file.display()))?;

    let extraction = newsreel::contexts::extract(&raw);
    if config.verbose {
        println!("Extraction method: {:?}", extraction.method);
    }

    if config.dry_run {
        println!(
            "[DRY RUN] Would write {} bytes to {}",
            extraction.code.len(),
            settings.output.source_path.display()
        );
        return Ok(());
    }

    // persist repeats the extraction before writing
    let path = settings
        .extractor()
        .persist(&raw)
        .context("Failed to write generated source")?;
    println!("✓ Written generated source to: {}", path.display());
    Ok(())
}

pub async fn render(source: Option<PathBuf>, settings: &Settings, config: &Config) -> Result<()> {
    settings.validate().context("Invalid settings")?;
    let source = source.unwrap_or_else(|| settings.output.source_path.clone());
    let renderer = settings.renderer().context("Failed to create renderer")?;

    if config.dry_run {
        let argv = renderer.command_line(&source, SCENE_NAME);
        println!("[DRY RUN] Would run: {}", shell_words::join(&argv));
        return Ok(());
    }

    if !source.exists() {
        anyhow::bail!("Source file {} not found", source.display());
    }

    let result = renderer.render_until(&source, SCENE_NAME, interrupted()).await;

    // Engine output is only interesting when asked for or when rendering failed
    if config.verbose || !result.is_success() {
        print!("{}", result.stdout);
        if let Some(diagnostic) = &result.diagnostic_output {
            eprint!("{}", diagnostic);
        }
    }

    if result.is_success() {
        println!(
            "✓ animation render success! ({:.2}s)",
            result.duration.as_secs_f64()
        );
        Ok(())
    } else {
        let reason = result
            .failure
            .map(|f| f.to_string())
            .unwrap_or_else(|| "unknown failure".to_string());
        anyhow::bail!("Render failed: {}", reason);
    }
}
