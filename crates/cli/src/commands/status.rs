//! `pairwire status` — show the resolved configuration and config file state.

use pairwire_config::BrokerConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = BrokerConfig::load().map_err(|e| format!("failed to load config: {e}"))?;

    println!("pairwire status");
    println!("===============");
    println!("  config dir:   {}", BrokerConfig::config_dir().display());
    println!("  gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  store:        {}", config.store.backend);
    println!("  runners:      {}", config.auth.runner_credentials.len());
    println!("  code ttl:     {}s", config.pairing.code_ttl_secs);
    println!("  heartbeat:    {}s (online grace {}s)", config.pairing.heartbeat_ttl_secs, config.pairing.heartbeat_online_grace_secs);
    println!("  rate limit:   {} failures / {}s window, {}s ban", config.pairing.rate_limit_max_failures, config.pairing.rate_limit_window_secs, config.pairing.rate_limit_ban_secs);

    let config_path = BrokerConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  config file found at {}", config_path.display());
    } else {
        println!("\n  no config file — run `pairwire config init` first");
    }

    Ok(())
}
