/*
 * This file is a part of spd
 *
 * spd is an in-memory key-value server speaking the Serialization Protocol (SP)
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
*/

//! # Configuration
//!
//! The config file is a flat list of `<key> <value>` lines; `#` starts a line comment, blank
//! lines are ignored. There's no section nesting because there's only one keyspace and one
//! listener to configure. `ConfigurationSet::default()` is a complete, valid configuration on its
//! own, so a config file is optional.

use crate::corestore::shard::DEFAULT_SHARD_COUNT;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 2003;
const MIN_PORT: u16 = 1025;
const MAX_PORT: u16 = 65534;
const DEFAULT_LOG_DIR: &str = ".";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    UnknownKey(String),
    BadValue { key: &'static str, value: String },
    PortOutOfRange(u16),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {e}"),
            Self::UnknownKey(k) => write!(f, "unknown config key '{k}'"),
            Self::BadValue { key, value } => write!(f, "bad value '{value}' for config key '{key}'"),
            Self::PortOutOfRange(p) => {
                write!(f, "port {p} is out of the allowed range {MIN_PORT}-{MAX_PORT}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// A fully resolved, validated server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSet {
    pub host: IpAddr,
    pub port: u16,
    pub shard_count: usize,
    pub log_dir: String,
    pub log_level: String,
}

impl Default for ConfigurationSet {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.parse().unwrap(),
            port: DEFAULT_PORT,
            shard_count: DEFAULT_SHARD_COUNT,
            log_dir: DEFAULT_LOG_DIR.to_owned(),
            log_level: DEFAULT_LOG_LEVEL.to_owned(),
        }
    }
}

impl ConfigurationSet {
    fn validate(self) -> Result<Self, ConfigError> {
        if self.port < MIN_PORT || self.port > MAX_PORT {
            return Err(ConfigError::PortOutOfRange(self.port));
        }
        Ok(self)
    }
}

fn parse_field<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::BadValue {
        key,
        value: value.to_owned(),
    })
}

/// Parse a flat `<key> <value>` config file's contents into a validated `ConfigurationSet`,
/// layered on top of the defaults (a file only needs to mention the keys it wants to override).
pub fn parse(contents: &str) -> Result<ConfigurationSet, ConfigError> {
    let mut cfg = ConfigurationSet::default();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default().trim();
        match key {
            "host" => cfg.host = parse_field("host", value)?,
            "port" => cfg.port = parse_field("port", value)?,
            "shard_count" => cfg.shard_count = parse_field("shard_count", value)?,
            "log_dir" => cfg.log_dir = value.to_owned(),
            "log_level" => cfg.log_level = value.to_owned(),
            other => return Err(ConfigError::UnknownKey(other.to_owned())),
        }
    }
    cfg.validate()
}

/// Load configuration from `path` if given, falling back to the default configuration when
/// `path` is `None`.
pub fn load(path: Option<&str>) -> Result<ConfigurationSet, ConfigError> {
    match path {
        Some(path) => parse(&std::fs::read_to_string(path)?),
        None => Ok(ConfigurationSet::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ConfigurationSet::default().validate().is_ok());
    }

    #[test]
    fn parses_overrides_and_keeps_remaining_defaults() {
        let cfg = parse("host 0.0.0.0\nport 7878\n# a comment\n\nshard_count 16\n").unwrap();
        assert_eq!(cfg.host, "0.0.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(cfg.port, 7878);
        assert_eq!(cfg.shard_count, 16);
        assert_eq!(cfg.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn rejects_unknown_key() {
        assert!(matches!(parse("bogus 1"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(matches!(parse("port 80"), Err(ConfigError::PortOutOfRange(80))));
    }

    #[test]
    fn rejects_malformed_host() {
        assert!(matches!(
            parse("host not-an-ip"),
            Err(ConfigError::BadValue { key: "host", .. })
        ));
    }
}
