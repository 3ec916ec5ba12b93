use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docs_qa::Result;
use docs_qa::answer::AnswerComposer;
use docs_qa::completion::CompletionClient;
use docs_qa::config::Config;
use docs_qa::corpus::build_corpus;
use docs_qa::embeddings::{TextEncoder, build_encoder};
use docs_qa::server;

#[derive(Parser)]
#[command(name = "docs-qa")]
#[command(about = "Retrieval-augmented question answering over a directory of office documents")]
#[command(version)]
struct Cli {
    /// Path to the TOML settings file
    #[arg(
        long,
        global = true,
        env = "DOCS_QA_CONFIG",
        default_value = "docs-qa.toml"
    )]
    config: PathBuf,

    /// Override the documents directory from the settings file
    #[arg(long, global = true, env = "DOCS_QA_DOCUMENTS_DIR")]
    documents_dir: Option<PathBuf>,

    /// Override how many chunks are retrieved per question
    #[arg(long, global = true, env = "DOCS_QA_TOP_K")]
    top_k: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the corpus and start the HTTP server
    Serve,
    /// Build the corpus and answer a single question from the terminal
    Ask {
        /// The question to answer
        question: String,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Serve => {
            server::run(config).await?;
        }
        Commands::Ask { question } => {
            ask(config, &question)?;
        }
        Commands::Config => {
            print!(
                "{}",
                config
                    .to_toml()
                    .map_err(|e| docs_qa::QaError::Config(e.to_string()))?
            );
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.config)?;

    if let Some(dir) = &cli.documents_dir {
        config.documents.dir.clone_from(dir);
    }
    if let Some(top_k) = cli.top_k {
        config.retrieval.top_k = top_k;
    }

    // Overrides go through the same validation as the file
    config
        .validate()
        .map_err(|e| docs_qa::QaError::Config(e.to_string()))?;

    Ok(config)
}

/// One-shot question answering without the HTTP layer
fn ask(config: Config, question: &str) -> Result<()> {
    let encoder: Arc<dyn TextEncoder> = Arc::from(build_encoder(&config.embedding)?);
    let completion = CompletionClient::new(&config.completion, config.completion_api_key());
    let composer = AnswerComposer::new(Arc::clone(&encoder), completion, config.retrieval.top_k);

    let corpus = build_corpus(&config, encoder.as_ref())?;

    let retrieved = composer.retrieve(&corpus, question)?;
    let answer = composer.answer(Some(&corpus), question)?;

    println!("{answer}");

    if !retrieved.is_empty() {
        let mut sources: Vec<&str> = Vec::new();
        for chunk in &retrieved {
            if !sources.contains(&chunk.source) {
                sources.push(chunk.source);
            }
        }
        println!();
        println!("Sources: {}", sources.join(", "));
    }

    Ok(())
}
