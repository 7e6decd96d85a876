use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use textlens_core::analysis::{AnalyzeOptions, ContentAnalyzer, Document};
use textlens_core::completion::CompletionClient;
use textlens_core::config::{AnalyzerConfig, CompletionConfig};

/// Analyze a text file (or stdin) and print the result as JSON.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let text = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read input file '{path}'"))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let config = CompletionConfig::from_env().context("invalid completion configuration")?;
    let client = Arc::new(CompletionClient::new(config)?);

    let analyzer = ContentAnalyzer::new(client, AnalyzerConfig::default());
    let options = AnalyzeOptions {
        progress: Some(Arc::new(|stage: &str| eprintln!("[textlens] {stage}"))),
        ..AnalyzeOptions::default()
    };

    let document = Document::from_text(text);
    let result = analyzer.analyze_with(&document, options).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
