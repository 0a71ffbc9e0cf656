use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};

use phish_agent::agent::PhishingAnalyzer;
use phish_agent::config::AgentConfig;
use phish_agent::email::FileSource;
use phish_agent::llm::{LlmConfig, create_provider};
use phish_agent::pipeline::BatchAnalyzer;
use phish_agent::tools::CapabilityRegistry;
use phish_agent::tools::builtin::StubLinkAnalyzer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the JSON results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: phish-agent <message.eml | emails.json>...");
    }

    let llm_config = LlmConfig::from_env().context("loading LLM configuration")?;
    let agent_config = AgentConfig::from_env().context("loading agent configuration")?;

    eprintln!("🎣 {} v{}", agent_config.name, env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Max steps: {}", agent_config.max_steps);
    eprintln!("   Inputs: {}\n", paths.len());

    let llm = create_provider(&llm_config)?;
    let registry = Arc::new(CapabilityRegistry::new(
        Arc::new(StubLinkAnalyzer),
        agent_config.link_timeout,
    ));
    let analyzer = Arc::new(PhishingAnalyzer::new(llm, registry, &agent_config));
    let batch = BatchAnalyzer::new(analyzer, agent_config.batch_concurrency);

    let source = FileSource::new(paths);
    let (results, summary) = batch
        .run_source(&source)
        .await
        .context("reading input emails")?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &results)?;
    writeln!(stdout)?;

    eprintln!(
        "\n   Analyzed {} of {} ({} phishing, {} failed, {} skipped)",
        summary.analyzed, summary.received, summary.phishing, summary.failed, summary.skipped
    );
    Ok(())
}
