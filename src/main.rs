use std::sync::Arc;

use anyhow::Context;

use agent_relay::channels::StdioChannel;
use agent_relay::config::RouterConfig;
use agent_relay::llm::{LlmConfig, create_backend};
use agent_relay::moderation::KeywordModerator;
use agent_relay::pipeline::{ModerationFailurePolicy, Router, RouterDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing. Logs go to stderr; stdout carries the topic.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = RouterConfig::from_env().context("Invalid relay configuration")?;
    let llm_config = LlmConfig::from_env().context("Invalid LLM configuration")?;

    eprintln!("🛰️  Agent Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Name: {}", config.name);
    eprintln!("   Topic: {}", config.topic);
    eprintln!(
        "   Backend: {}/{}",
        llm_config.backend.as_str(),
        llm_config.model
    );
    eprintln!("   Backend timeout: {}s", config.backend_timeout.as_secs());
    eprintln!(
        "   Moderation: {}",
        match config.moderation_failure {
            ModerationFailurePolicy::FailClosed => "fail closed",
            ModerationFailurePolicy::FailOpen => "fail open",
        }
    );

    let backend = create_backend(&llm_config).context("Failed to create inference backend")?;
    let moderator = KeywordModerator::default_rules();
    eprintln!("   Moderation rules: {}", moderator.rule_count());
    eprintln!("   Channel: stdio (one JSON record per line)\n");

    let router = Router::new(
        config,
        RouterDeps {
            channel: Box::new(StdioChannel::stdio()),
            backend,
            moderator: Arc::new(moderator),
        },
    );

    let summary = router.run().await?;
    eprintln!(
        "\n   Handled {} messages: {} replied ({} filtered), {} skipped, {} failed",
        summary.received, summary.replied, summary.filtered, summary.skipped, summary.failed
    );
    Ok(())
}
