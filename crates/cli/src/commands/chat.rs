//! `memoria chat`: interactive or single-message conversation.

use super::{CmdResult, has_credentials, open_room, parse_user};
use memoria_agent::{AgentLoop, ConsolidationReport, ProviderSummarizer, TurnOutcome, TurnReply};
use memoria_config::AppConfig;
use memoria_core::event::EventBus;
use memoria_memory::ConsolidationMechanism;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// How often (in rounds) the interactive loop prints a memory digest.
const DIGEST_EVERY: u32 = 5;

pub async fn run(
    mut config: AppConfig,
    user: &str,
    message: Option<String>,
    provider: Option<String>,
    model: Option<String>,
) -> CmdResult {
    let user = parse_user(user)?;

    if let Some(provider) = provider {
        config.default_provider = provider;
    }
    if let Some(model) = model {
        config.default_model = model;
    }

    if !has_credentials(&config) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export DEEPSEEK_API_KEY=sk-...     (default provider)");
        eprintln!("    export OPENAI_API_KEY=sk-...       (with --provider openai)");
        eprintln!("    export MEMORIA_API_KEY=sk-...      (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = memoria_providers::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;

    let room = open_room(&config).await?;
    let summarizer = ProviderSummarizer::new(provider.clone(), &config.default_model)
        .with_temperature(config.agent.summarizer_temperature);
    let consolidation = Arc::new(
        ConsolidationMechanism::new(Arc::new(summarizer), config.memory.update_interval)
            .with_timeout(Duration::from_secs(config.agent.summarizer_timeout_secs)),
    );

    let agent = AgentLoop::new(
        provider,
        &config.default_model,
        room,
        consolidation,
        Arc::new(EventBus::default()),
    )
    .with_temperature(config.default_temperature)
    .with_max_tokens(config.default_max_tokens)
    .with_system_prompt(&config.agent.system_prompt)
    .with_fallback_reply(&config.agent.fallback_reply)
    .with_generation_timeout(Duration::from_secs(config.agent.generation_timeout_secs));

    info!(
        user = %user,
        provider = agent.provider_name(),
        model = agent.model(),
        summarizer = agent.consolidation().summarizer_name(),
        max_rounds = config.memory.max_short_term_rounds,
        update_interval = config.memory.update_interval,
        "Chat session started"
    );

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let reply = agent.chat(&user, &msg).await;
        eprint!("\r              \r");
        println!("{}", reply.text);
        report_outcome(&reply);
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║           Memoria Interactive Chat           ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Companion: {}", config.agent.name);
    println!("  User:      {user}");
    println!("  Provider:  {}", agent.provider_name());
    println!("  Model:     {}", agent.model());
    println!("  Memory:    {}", agent.memory_digest(&user).await);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'quit' or 'exit' to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut rounds: u32 = 0;

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "quit" | "exit") {
            break;
        }

        eprint!("  ...");
        let reply = agent.chat(&user, input).await;
        eprint!("\r     \r");
        println!();
        for line in reply.text.lines() {
            println!("  {} > {line}", config.agent.name);
        }
        println!();
        report_outcome(&reply);

        rounds += 1;
        if rounds % DIGEST_EVERY == 0 {
            println!("  🧠 {}", agent.memory_digest(&user).await);
            println!();
        }
    }

    println!();
    println!("  Goodbye! See you among the stars.");
    println!();
    Ok(())
}

fn report_outcome(reply: &TurnReply) {
    match &reply.outcome {
        TurnOutcome::Recorded {
            consolidation: ConsolidationReport::Promoted,
            ..
        } => eprintln!("  [memory] Long-term memory updated."),
        TurnOutcome::Recorded {
            consolidation: ConsolidationReport::Degraded(reason),
            ..
        } => eprintln!("  [memory] Consolidation skipped: {reason}"),
        TurnOutcome::Recorded {
            consolidation: ConsolidationReport::StorageFailed(reason),
            ..
        } => eprintln!("  [memory] Could not save long-term memory: {reason}"),
        TurnOutcome::NotRecorded { reason } => eprintln!("  [memory] Turn not saved: {reason}"),
        TurnOutcome::GenerationFailed { reason } => eprintln!("  [error] {reason}"),
        TurnOutcome::MissingUser => eprintln!("  [error] missing user id"),
        TurnOutcome::Recorded { .. } => {}
    }
}
