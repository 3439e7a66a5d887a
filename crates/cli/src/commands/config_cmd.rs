//! `pairwire config` — configuration management commands.

use pairwire_config::BrokerConfig;

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = BrokerConfig::load().map_err(|e| format!("failed to load config: {e}"))?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", BrokerConfig::config_dir().join("config.toml").display());
    Ok(())
}

/// Write a default config file to the config directory, if one doesn't
/// already exist.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = BrokerConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() {
        println!("config already exists at {}", config_path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, BrokerConfig::default_toml())?;
    println!("wrote default config to {}", config_path.display());
    println!("set auth.app_token_secret before starting the gateway — it is empty by default and will fail validation");
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = pairwire_config::BrokerConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }
}
