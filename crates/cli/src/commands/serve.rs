//! `pairwire serve` — start the WebSocket gateway.

use pairwire_config::BrokerConfig;

pub async fn run(port_override: Option<u16>, host_override: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = BrokerConfig::load().map_err(|e| format!("failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if let Some(host) = host_override {
        config.gateway.host = host;
    }

    println!("pairwire gateway");
    println!("  listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("  store:      {}", config.store.backend);
    println!("  runners:    {}", config.auth.runner_credentials.len());

    pairwire_gateway::start(config).await?;
    Ok(())
}
