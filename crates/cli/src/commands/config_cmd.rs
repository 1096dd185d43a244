//! `microclaw config`: Configuration management commands.

use microclaw_config::AppConfig;

/// Print a default config file to stdout.
pub fn default_toml() {
    print!("{}", AppConfig::default_toml());
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Model:     {}", config.model);
            println!(
                "   History:   {} entries / {} bytes",
                config.history.max_entries, config.history.max_bytes
            );
            println!(
                "   Retry:     {} attempts, {}ms..{}ms",
                config.retry.max_retries, config.retry.base_delay_ms, config.retry.max_delay_ms
            );
            println!("   Interval:  {}s", config.agent.interval_seconds);
            println!("   Pins:      {:?}", config.board.allowed_pins);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Non-fatal problems worth pointing out.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set MICROCLAW_API_KEY or ANTHROPIC_API_KEY)");
    }
    if config.board.allowed_pins.is_empty() {
        warnings.push("board.allowed_pins is empty: the model may drive every pin");
    }
    if config.agent.interval_seconds == 0 {
        warnings.push("agent.interval_seconds is 0: cycles will run back to back");
    }
    warnings
}

/// Print the effective configuration with the API key redacted.
pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}
