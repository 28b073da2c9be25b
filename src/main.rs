use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "newsreel")]
#[command(about = "Turn the latest news into a generated Manim animation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Perform a dry run without executing actions")]
    dry_run: bool,

    #[arg(long, global = true, help = "Path to a YAML settings file (defaults to newsreel.yml)")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct ContentArgs {
    #[arg(long, help = "Search keywords for the news query")]
    keywords: Option<String>,

    #[arg(long, help = "Two-letter language code for the news query")]
    language: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch news, generate scene code and render it")]
    Run {
        #[command(flatten)]
        content: ContentArgs,

        #[arg(long, help = "Where to write the generated source")]
        output: Option<PathBuf>,

        #[arg(long, help = "Kill the rendering engine after this many seconds")]
        render_timeout: Option<u64>,
    },

    #[command(about = "Fetch news and print the story that would be animated")]
    Story {
        #[command(flatten)]
        content: ContentArgs,
    },

    #[command(about = "Extract code from a saved model reply and write the source file")]
    Extract {
        #[arg(help = "File containing the raw model reply")]
        reply: PathBuf,

        #[arg(long, help = "Where to write the generated source")]
        output: Option<PathBuf>,
    },

    #[command(about = "Render an existing scene source file")]
    Render {
        #[arg(help = "Scene source file (defaults to the configured output path)")]
        source: Option<PathBuf>,

        #[arg(long, help = "Kill the rendering engine after this many seconds")]
        render_timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    cli::init_tracing(cli.verbose);
    dotenvy::dotenv().ok();

    let config = cli::Config {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
    };
    let mut settings = cli::load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            content,
            output,
            render_timeout,
        } => {
            cli::apply_content_overrides(&mut settings, content.keywords, content.language);
            if let Some(output) = output {
                settings.output.source_path = output;
            }
            if render_timeout.is_some() {
                settings.render.timeout_secs = render_timeout;
            }
            cli::run(&settings, &config).await?;
        }
        Commands::Story { content } => {
            cli::apply_content_overrides(&mut settings, content.keywords, content.language);
            cli::story(&settings, &config).await?;
        }
        Commands::Extract { reply, output } => {
            if let Some(output) = output {
                settings.output.source_path = output;
            }
            cli::extract(&reply, &settings, &config)?;
        }
        Commands::Render {
            source,
            render_timeout,
        } => {
            if render_timeout.is_some() {
                settings.render.timeout_secs = render_timeout;
            }
            cli::render(source, &settings, &config).await?;
        }
    }

    Ok(())
}
