use std::{env, fmt, fs, io, path};

use isp_health::{ConfigError, MonitorConfig, SensorType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },

    #[error("failed to parse {path}: {source}")]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },

    #[error("failed to serialize configuration: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),

    #[error("neither XDG_CONFIG_HOME nor a home directory is available")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub service: Service,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    /// Log a full report this often; 0 disables it
    pub report_interval_seconds: u64,
}

impl Default for Service {
    fn default() -> Self {
        Self { report_interval_seconds: 300 }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/isp-health/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("isp-health/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Service")?;
        write_1(f, "Report Interval (s)", &self.service.report_interval_seconds)?;
        write_1(f, "Max Concurrency", &self.monitor.max_concurrency)?;

        write_title_1(f, "Sensors")?;
        for sensor in SensorType::ALL {
            let schedule = if self.monitor.is_enabled(sensor) {
                format!("every {}s", self.monitor.interval_secs(sensor))
            } else {
                "disabled".to_string()
            };
            write_1(f, sensor.display_name(), &schedule)?;
            if let Some(targets) = self.monitor.sensors.targets(sensor) {
                let addresses: Vec<&str> = targets.iter().map(|target| target.address.as_str()).collect();
                write_2(f, "Targets", &addresses.join(", "))?;
            }
        }

        write_title_1(f, "Identity Providers")?;
        for provider in self.monitor.identity.ordered_providers() {
            let limit = provider.effective_rate_limit();
            let summary = format!(
                "{}{}, {} per {}s",
                if provider.enabled { "enabled" } else { "disabled" },
                if provider.has_credential() { ", keyed" } else { "" },
                limit.requests,
                limit.period_secs
            );
            write_1(f, &provider.name, &summary)?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/isp-health/config.toml
    ///  or the specified path, with the name config.toml if one does not exist.
    ///  The monitor section is validated before it is returned.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path = Self::resolve_path(optional_path)?;

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str::<Self>(raw_string.as_str())
                .map_err(|source| Error::ParseFailed { path: config_path.clone(), source })?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.monitor.validate()?;
        Ok(config)
    }

    /// Path the configuration is read from
    pub fn resolve_path(optional_path: Option<impl AsRef<path::Path>>) -> Result<path::PathBuf, Error> {
        match optional_path {
            Some(path) => Ok(normalize_toml_path(path.as_ref())),
            None => default_config_path(),
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str).map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_writes_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        // Second call reads back what was written
        let reloaded = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_extension_is_normalized() {
        let dir = tempdir().unwrap();
        let config = Config::from_config(Some(dir.path().join("monitor"))).unwrap();
        assert_eq!(config.service.report_interval_seconds, 300);
        assert!(dir.path().join("monitor.toml").exists());
    }

    #[test]
    fn test_sections_are_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [service]
            report_interval_seconds = 0

            [sensors.throughput]
            enabled = false

            [sensors.route_stability]
            interval_seconds = 600
            targets = ["example.net"]
            "#,
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.service.report_interval_seconds, 0);
        assert!(!config.monitor.is_enabled(SensorType::Throughput));
        assert_eq!(config.monitor.interval_secs(SensorType::RouteStability), 600);
        assert_eq!(config.monitor.sensors.route_stability.targets[0].address, "example.net");
    }

    #[test]
    fn test_invalid_monitor_section_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sensors.throughput]\ninterval_seconds = 1800\n").unwrap();

        let error = Config::from_config(Some(&path)).unwrap_err();
        assert!(matches!(error, Error::Invalid(ConfigError::InvalidInterval { .. })));
    }

    #[test]
    fn test_unparsable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[service\n").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed { .. })));
    }

    #[test]
    fn test_display_lists_sensors() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("WAN Throughput: every 3600s"));
        assert!(rendered.contains("ipapi: enabled, 45 per 60s"));
    }
}
