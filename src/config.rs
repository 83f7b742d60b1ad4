//! Configuration loading from a JSON config file, `.env` files and flags.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{Error, Result},
    relay::DEFAULT_TIMEOUT,
    signer::Keys,
};

/// Config file names looked up in the working directory, in order. The second
/// is the name used by earlier releases.
pub const CONFIG_FILES: [&str; 2] = ["nostr-publisher.conf", "nostr-publisher-cli.conf"];

/// Runtime settings after all layers are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Private key, hex or `nsec`.
    pub key: Option<String>,
    /// Relay host or `ws(s)://` URL.
    pub relay: Option<String>,
    /// Deadline for one relay exchange.
    pub timeout: Duration,
    /// Optional SOCKS5 proxy (host:port).
    pub proxy: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            key: None,
            relay: None,
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
        }
    }
}

/// Values given on the command line. They win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub key: Option<String>,
    pub relay: Option<String>,
    pub timeout_secs: Option<u64>,
    pub proxy: Option<String>,
}

/// Shape of the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    key: Option<String>,
    relay: Option<String>,
    timeout_secs: Option<u64>,
    proxy: Option<String>,
}

impl Settings {
    /// Defaults, then the config file, then `env_path` and the process
    /// environment, then `overrides`. Without `config_path` the first of
    /// [`CONFIG_FILES`] present in the working directory is used. Missing
    /// files are skipped.
    pub fn load(config_path: Option<&Path>, env_path: &str, overrides: Overrides) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => default_config_in(Path::new(".")),
        };
        let mut cfg = Settings::default();
        cfg.apply_file(&config_path)?;
        cfg.apply_env(env_path)?;
        cfg.apply_overrides(overrides);
        debug!(
            relay = ?cfg.relay,
            timeout = ?cfg.timeout,
            proxy = ?cfg.proxy,
            has_key = cfg.key.is_some(),
            "settings loaded"
        );
        Ok(cfg)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::Config(format!("{}: {e}", path.display()))),
        };
        let file: FileConfig = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        set_if_some(&mut self.key, file.key);
        set_if_some(&mut self.relay, file.relay);
        set_if_some(&mut self.proxy, file.proxy);
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn apply_env(&mut self, path: &str) -> Result<()> {
        match dotenvy::from_filename(path) {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("{path}: {e}"))),
        }
        set_if_some(&mut self.key, env_var("NOSTR_KEY"));
        set_if_some(&mut self.relay, env_var("NOSTR_RELAY"));
        set_if_some(&mut self.proxy, env_var("NOSTR_PROXY"));
        if let Some(secs) = env_var("NOSTR_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("NOSTR_TIMEOUT_SECS={secs}: {e}")))?;
            self.timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, o: Overrides) {
        set_if_some(&mut self.key, o.key);
        set_if_some(&mut self.relay, o.relay);
        set_if_some(&mut self.proxy, o.proxy);
        if let Some(secs) = o.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
    }

    /// Parsed signing keys, if a key is configured.
    pub fn keys(&self) -> Result<Option<Keys>> {
        self.key.as_deref().map(Keys::parse).transpose()
    }
}

/// First of [`CONFIG_FILES`] that exists in `dir`, else the first name.
pub fn default_config_in(dir: &Path) -> PathBuf {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
        .unwrap_or_else(|| dir.join(CONFIG_FILES[0]))
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn set_if_some(slot: &mut Option<String>, value: Option<String>) {
    if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
        *slot = Some(v);
    }
}
