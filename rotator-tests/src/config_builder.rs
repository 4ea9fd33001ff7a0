//! Fluent API for building test configurations
//!
//! Log and lock directories live inside a temp dir owned by the builder.

use snapshot_rotator::config::{Config, CreationFailurePolicy, GlobalConfig, NotificationConfig};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    global: GlobalConfig,
    notifications: NotificationConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let log_directory = temp_dir.path().join("logs");
        fs::create_dir_all(&log_directory).expect("Failed to create log_directory");

        let lock_directory = temp_dir.path().join("locks");
        fs::create_dir_all(&lock_directory).expect("Failed to create lock_directory");

        let global = GlobalConfig {
            log_directory,
            log_level: "debug".to_string(),
            log_max_files: 5,
            lock_directory,
            ..GlobalConfig::default()
        };

        Self {
            temp_dir,
            global,
            notifications: NotificationConfig::default(),
        }
    }

    pub fn share_account(mut self, account: &str) -> Self {
        self.global.share_account = Some(account.to_string());
        self
    }

    pub fn creation_failure(mut self, policy: CreationFailurePolicy) -> Self {
        self.global.creation_failure = policy;
        self
    }

    pub fn endpoint_url(mut self, url: &str) -> Self {
        self.global.endpoint_url = Some(url.to_string());
        self
    }

    pub fn notifications(mut self, enabled: bool) -> Self {
        self.notifications.enabled = enabled;
        self
    }

    pub fn build(&self) -> Config {
        Config {
            global: self.global.clone(),
            notifications: self.notifications.clone(),
        }
    }

    /// Build and write the config to `config.toml`, keeping the temp dir alive
    pub fn persist(self) -> (Config, TempDir, PathBuf) {
        let config = self.build();
        let path = self.temp_dir.path().join("config.toml");
        let contents = toml::to_string_pretty(&config).expect("Failed to serialize config");
        fs::write(&path, contents).expect("Failed to write config file");
        (config, self.temp_dir, path)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
