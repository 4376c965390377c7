// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::{
    fmt::{self, Display, Formatter},
    net::SocketAddr,
};

use clap::ArgAction;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Listener {
    pub address: SocketAddr,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 9000).into(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Redis {
    pub url: String,
}

impl Default for Redis {
    fn default() -> Self {
        Redis {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Endpoints {
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Logging {
    #[serde(default)]
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Cron {
    /// How often due cron rules are evaluated, in seconds.
    pub check_interval: u64,
}

impl Default for Cron {
    fn default() -> Self {
        Self { check_interval: 60 }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default)]
    pub redis: Redis,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub log: Logging,
    #[serde(default)]
    pub cron: Cron,
}

impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", toml::to_string_pretty(self).unwrap_or_default())
    }
}

impl Config {
    fn load_etc() -> Option<Self> {
        let config = std::fs::read_to_string("/etc/orchd/orchd.toml").unwrap_or_default();
        toml::from_str(&config).ok()
    }

    fn load_user() -> Option<Self> {
        match std::env::var("HOME") {
            Ok(home) => {
                let path = format!("{}/.config/orchd/orchd.toml", home);
                let config = std::fs::read_to_string(path).unwrap_or_default();
                toml::from_str(&config).ok()
            }
            Err(_) => None,
        }
    }

    fn from_file(path: &str) -> Option<Self> {
        let config = std::fs::read_to_string(path).ok()?;
        toml::from_str(&config).ok()
    }

    pub fn load() -> Self {
        let cmds = clap::Command::new("orchd")
            .arg(
                clap::Arg::new("config")
                    .short('c')
                    .env("ORCHD_CONFIG")
                    .long("config")
                    .action(ArgAction::Set)
                    .help("path to toml config file"),
            )
            .arg(
                clap::Arg::new("listening")
                    .env("LISTENING")
                    .long("listening")
                    .short('l')
                    .value_name("IP:PORT")
                    .value_parser(clap::value_parser!(SocketAddr))
                    .help("the address to listen to (e.g. 127.0.0.1:9000)"),
            )
            .arg(
                clap::Arg::new("redis-url")
                    .env("REDIS_URL")
                    .long("redis-url")
                    .action(ArgAction::Set)
                    .help("redis url of the queue and control bus"),
            )
            .arg(
                clap::Arg::new("api-key")
                    .env("API_KEY")
                    .long("api-key")
                    .action(ArgAction::Set)
                    .help("API key that must be set as X-API-KEY header to gain access"),
            )
            .arg(
                clap::Arg::new("cron-check-interval")
                    .env("CRON_CHECK_INTERVAL")
                    .long("cron-check-interval")
                    .value_parser(clap::value_parser!(u64))
                    .value_name("SECONDS")
                    .help("interval to evaluate cron rules in seconds"),
            )
            .arg(
                clap::Arg::new("log-level")
                    .env("ORCHD_LOG")
                    .long("log-level")
                    .short('L')
                    .action(ArgAction::Set)
                    .help("log level: TRACE, DEBUG, INFO, WARN, ERROR"),
            )
            .get_matches();

        let mut config = match cmds.get_one::<String>("config") {
            Some(path) => Self::from_file(path).unwrap_or_default(),
            None => Self::load_user()
                .or_else(Self::load_etc)
                .unwrap_or_default(),
        };
        if let Some(address) = cmds.get_one::<SocketAddr>("listening") {
            config.listener.address = *address;
        }
        if let Some(url) = cmds.get_one::<String>("redis-url") {
            config.redis.url = url.clone();
        }
        if let Some(key) = cmds.get_one::<String>("api-key") {
            config.endpoints.key = Some(key.clone());
        }
        if let Some(interval) = cmds.get_one::<u64>("cron-check-interval") {
            config.cron.check_interval = *interval;
        }
        if let Some(level) = cmds.get_one::<String>("log-level") {
            config.log.level = level.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.listener.address.port(), 9000);
        assert!(config.redis.url.starts_with("redis://"));
        assert_eq!(config.cron.check_interval, 60);
        assert!(config.endpoints.key.is_none());
    }

    #[test]
    fn toml_round_trip() {
        let config = Config::default();
        let raw = config.to_string();
        let parsed: Config = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.listener.address, config.listener.address);
    }
}
