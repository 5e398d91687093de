//! `memoria onboard`: first-time setup.

use super::CmdResult;
use memoria_config::AppConfig;

pub async fn run() -> CmdResult {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🌹 Memoria: First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Set DEEPSEEK_API_KEY (or add api_key to {})", config_path.display());
        println!("   2. Run: memoria chat --user <your-name>");
        println!("   3. Talk for a while; every {} rounds memories are consolidated.\n", AppConfig::default().memory.update_interval);
    }

    println!("🎉 Setup complete! Run `memoria chat` to start talking.\n");
    Ok(())
}
