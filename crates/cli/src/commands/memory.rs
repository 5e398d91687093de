//! `memoria memory`: inspect, export and clear a user's memory.

use super::{CmdResult, open_room, parse_user};
use memoria_config::AppConfig;
use memoria_core::memory::{FactualKey, LongTermMemory, SemanticKey, Turn, UpdateRecord, preview};
use std::path::PathBuf;

pub async fn stats(config: &AppConfig, user: &str) -> CmdResult {
    let user = parse_user(user)?;
    let room = open_room(config).await?;
    let stats = room.stats(&user).await?;

    println!("🧠 Memory Statistics");
    println!("====================");
    println!("  User:        {user}");
    println!("  Backend:     {}", room.backend_name());
    if let Some(location) = room.location() {
        match std::fs::metadata(location) {
            Ok(meta) => println!("  DB file:     {location} ({:.1} KB)", meta.len() as f64 / 1024.0),
            Err(_) => println!("  DB file:     {location}"),
        }
    }
    println!("  Window:      {} rounds max", room.max_rounds());
    println!("  Interval:    consolidate every {} rounds", config.memory.update_interval);
    println!();
    println!("  Short-term:  {} turns", stats.short_term_count);
    println!("  Factual:     {}", stats.factual_count);
    println!("  Episodic:    {}", stats.episodic_count);
    println!("  Semantic:    {}", stats.semantic_count);
    println!("  Long-term:   {} items total", stats.long_term_count());

    Ok(())
}

pub async fn show(config: &AppConfig, user: &str) -> CmdResult {
    let user = parse_user(user)?;
    let room = open_room(config).await?;
    let long_term = room.get_long_term(&user).await?;
    let window = room.get_short_term(&user).await?;

    println!("🧠 Memory for {user}");
    println!();
    print!("{}", format_long_term(&long_term));
    println!();
    print!("{}", format_window(&window));
    Ok(())
}

pub async fn history(config: &AppConfig, user: &str, limit: usize) -> CmdResult {
    let user = parse_user(user)?;
    let room = open_room(config).await?;
    let records = room.update_history(&user, limit).await?;

    println!("📜 Memory updates for {user} (most recent first)");
    println!();
    if records.is_empty() {
        println!("   No updates recorded yet.");
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

pub async fn export(config: &AppConfig, user: &str, output: Option<&str>) -> CmdResult {
    let user = parse_user(user)?;
    let room = open_room(config).await?;
    let export = room.export(&user).await?;

    let path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(export.default_file_name()));
    export.write_to(&path)?;

    println!(
        "📤 Exported {} turns and {} long-term items to {}",
        export.short_term_memory.count,
        export.stats.long_term_count(),
        path.display()
    );
    Ok(())
}

pub async fn clear(config: &AppConfig, user: &str, short_term_only: bool, confirm: bool) -> CmdResult {
    let user = parse_user(user)?;
    let scope = if short_term_only { "short-term memory" } else { "ALL memory" };

    if !confirm {
        println!("⚠️  This will permanently delete {scope} for user '{user}'.");
        println!("   Run with --confirm to proceed:");
        let flag = if short_term_only { " --short-term-only" } else { "" };
        println!("   memoria memory clear --user {user}{flag} --confirm");
        return Ok(());
    }

    let room = open_room(config).await?;
    let removed = if short_term_only {
        room.clear_short_term(&user).await?
    } else {
        room.clear_all(&user).await?
    };
    println!("🗑️  Cleared {scope} for '{user}' ({removed} items removed).");
    Ok(())
}

fn format_long_term(memory: &LongTermMemory) -> String {
    let mut out = String::from("  Long-term memory\n");
    if memory.is_empty() {
        out.push_str("    (nothing remembered yet)\n");
        return out;
    }

    out.push_str("    Facts:\n");
    for key in FactualKey::ALL {
        let value = memory.fact(key);
        if !value.is_empty() {
            out.push_str(&format!("      {}: {value}\n", key.label()));
        }
    }
    out.push_str(&format!("    Episodes ({}):\n", memory.episodic.len()));
    for episode in &memory.episodic {
        let when = if episode.timestamp.is_empty() {
            String::new()
        } else {
            format!(" ({})", episode.timestamp)
        };
        out.push_str(&format!("      [{}] {}{when}\n", episode.kind, episode.content));
    }
    out.push_str("    Understanding:\n");
    for key in SemanticKey::ALL {
        let value = memory.semantic_value(key);
        if !value.is_empty() {
            out.push_str(&format!("      {}: {value}\n", key.label()));
        }
    }
    out
}

fn format_window(turns: &[Turn]) -> String {
    let mut out = format!("  Short-term window ({} turns)\n", turns.len());
    for (i, turn) in turns.iter().enumerate() {
        out.push_str(&format!(
            "    {:>2}. [{}] you: {}\n        agent: {}\n",
            i + 1,
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            preview(&turn.user_text, 80),
            preview(&turn.agent_text, 80)
        ));
    }
    out
}

fn format_record(record: &UpdateRecord) -> String {
    format!(
        "  {}  {:<16} {:>3}  {}",
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.kind.as_str(),
        record.item_count,
        record.description
    )
}
