// Interpreter settings, loadable from a RON file.

use std::fmt;
use std::fs::File;

use ron::de::from_reader;
use serde::Deserialize;

use crate::heap;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Collection is due after this many fresh cons allocations.
    pub gc_step: usize,
    /// Log a summary line after every collection cycle.
    pub gc_logging: bool,
    /// The REPL prompt.
    pub prompt: String,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            gc_step: heap::GC_STEP,
            gc_logging: false,
            prompt: "> ".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read(String),
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Read(msg) => write!(f, "couldn't read config: {}", msg),
            ConfigError::Parse(msg) => write!(f, "couldn't parse config: {}", msg),
        }
    }
}

pub fn load(path: &str) -> Result<Config, ConfigError> {
    let reader = File::open(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    from_reader(reader).map_err(|e| ConfigError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gc_step, heap::GC_STEP);
        assert_eq!(config.prompt, "> ");
        assert!(!config.gc_logging);
    }

    #[test]
    fn test_parse_partial() {
        let config: Config = ron::de::from_str("(gc_step: 100)").unwrap();
        assert_eq!(config.gc_step, 100);
        assert_eq!(config.prompt, "> ");
    }

    #[test]
    fn test_parse_full() {
        let config: Config =
            ron::de::from_str("(gc_step: 5, gc_logging: true, prompt: \"pico> \")").unwrap();
        assert_eq!(config.gc_step, 5);
        assert!(config.gc_logging);
        assert_eq!(config.prompt, "pico> ");
    }
}
