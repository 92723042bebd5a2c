use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::{InstallError, Result};

pub const DEFAULT_SERVICE: &str = "fact-checker-api";
pub const DEFAULT_UNIT_FILE: &str = "resources/systemd/fact-checker-api.service";
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

pub const ENV_UNIT_DIR: &str = "UNIT_INSTALLER_UNIT_DIR";
pub const ENV_SERVICE: &str = "UNIT_INSTALLER_SERVICE";

/// What to do when a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop at the first failing step
    #[default]
    Abort,
    /// Run every step regardless of earlier failures
    Continue,
}

/// Whether root is checked for before any step runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PrivilegePolicy {
    #[default]
    Require,
    Ignore,
}

/// One source of settings: a config file, the environment or the command line.
/// Unset fields leave the lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub service: Option<String>,
    pub unit_file: Option<PathBuf>,
    pub unit_dir: Option<PathBuf>,
    pub failure_policy: Option<FailurePolicy>,
    pub privilege_policy: Option<PrivilegePolicy>,
}

impl ConfigLayer {
    /// Read a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            InstallError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            InstallError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// `UNIT_INSTALLER_*` variables, looked up through `var`. Empty values are ignored.
    pub fn from_env<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).filter(|value| !value.is_empty());

        Self {
            service: non_empty(ENV_SERVICE),
            unit_dir: non_empty(ENV_UNIT_DIR).map(PathBuf::from),
            ..Default::default()
        }
    }

    pub fn from_process_env() -> Self {
        Self::from_env(|key| std::env::var(key).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerConfig {
    /// systemd service name, without the `.service` suffix
    pub service: String,

    /// Unit file shipped alongside the installer
    pub unit_file: PathBuf,

    /// System unit directory the file is copied into
    pub unit_dir: PathBuf,

    pub failure_policy: FailurePolicy,

    pub privilege_policy: PrivilegePolicy,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            unit_file: PathBuf::from(DEFAULT_UNIT_FILE),
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            failure_policy: FailurePolicy::default(),
            privilege_policy: PrivilegePolicy::default(),
        }
    }
}

impl InstallerConfig {
    /// Defaults, then the config file, then the environment, then flags.
    /// The result is validated.
    pub fn resolve(file: Option<&Path>, env: ConfigLayer, flags: ConfigLayer) -> Result<Self> {
        let mut config = InstallerConfig::default();
        if let Some(path) = file {
            config = config.merge(ConfigLayer::from_file(path)?);
        }
        config = config.merge(env).merge(flags);
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(InstallerConfig::default().merge(ConfigLayer::from_file(path)?))
    }

    /// Apply a layer. A unit file without a service name renames the service
    /// after the file stem.
    pub fn merge(mut self, layer: ConfigLayer) -> Self {
        if let Some(unit_file) = layer.unit_file {
            self = self.with_unit_file(unit_file);
        }
        if let Some(service) = layer.service {
            self.service = service;
        }
        if let Some(unit_dir) = layer.unit_dir {
            self.unit_dir = unit_dir;
        }
        if let Some(policy) = layer.failure_policy {
            self.failure_policy = policy;
        }
        if let Some(policy) = layer.privilege_policy {
            self.privilege_policy = policy;
        }
        self
    }

    /// Point at another unit file, deriving the service name from its stem
    pub fn with_unit_file(mut self, unit_file: PathBuf) -> Self {
        if let Some(service) = service_name_from_unit_file(&unit_file) {
            self.service = service;
        }
        self.unit_file = unit_file;
        self
    }

    /// File name the unit is installed under
    pub fn unit_file_name(&self) -> Result<String> {
        self.unit_file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                InstallError::Config(format!(
                    "unit file path has no file name: {}",
                    self.unit_file.display()
                ))
            })
    }

    pub fn destination(&self) -> Result<PathBuf> {
        Ok(self.unit_dir.join(self.unit_file_name()?))
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.trim().is_empty() {
            return Err(InstallError::Config("service name is empty".to_string()));
        }
        if self.service.contains('/') || self.service.chars().any(char::is_whitespace) {
            return Err(InstallError::Config(format!(
                "invalid service name: {:?}",
                self.service
            )));
        }
        self.unit_file_name()?;

        // systemd names the service after the installed file
        if service_name_from_unit_file(&self.unit_file).as_deref() != Some(self.service.as_str()) {
            return Err(InstallError::Config(format!(
                "service {:?} does not match unit file {}",
                self.service,
                self.unit_file.display()
            )));
        }
        Ok(())
    }
}

/// `/path/to/api.service` -> `api`
pub fn service_name_from_unit_file(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let stem = name.strip_suffix(".service").unwrap_or(&name);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn config_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json).unwrap();
        file
    }

    fn env(vars: &[(&str, &str)]) -> ConfigLayer {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigLayer::from_env(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = InstallerConfig::default();
        assert_eq!(config.service, "fact-checker-api");
        assert_eq!(config.unit_dir, PathBuf::from("/etc/systemd/system"));
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.privilege_policy, PrivilegePolicy::Require);
        assert_eq!(
            config.destination().unwrap(),
            PathBuf::from("/etc/systemd/system/fact-checker-api.service")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_service_name_from_unit_file() {
        assert_eq!(
            service_name_from_unit_file(Path::new("/srv/units/api.service")),
            Some("api".to_string())
        );
        assert_eq!(
            service_name_from_unit_file(Path::new("worker")),
            Some("worker".to_string())
        );
        assert_eq!(service_name_from_unit_file(Path::new(".service")), None);
    }

    #[test]
    fn test_with_unit_file_derives_service() {
        let config =
            InstallerConfig::default().with_unit_file(PathBuf::from("deploy/billing.service"));
        assert_eq!(config.service, "billing");
        assert_eq!(config.unit_file_name().unwrap(), "billing.service");
    }

    #[test]
    fn test_from_file_partial() {
        let file =
            config_file(r#"{"unit_dir": "/run/systemd/system", "failure_policy": "continue"}"#);

        let config = InstallerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.unit_dir, PathBuf::from("/run/systemd/system"));
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.service, DEFAULT_SERVICE);
    }

    #[test]
    fn test_from_file_unit_file_only_derives_service() {
        let file = config_file(r#"{"unit_file": "deploy/billing.service"}"#);

        let config = InstallerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.service, "billing");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_invalid_json() {
        let file = config_file("not json");

        let err = InstallerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, InstallError::Config(_)));
    }

    #[test]
    fn test_from_file_unknown_field() {
        let file = config_file(r#"{"services": "billing"}"#);

        let err = ConfigLayer::from_file(file.path()).unwrap_err();
        assert!(matches!(err, InstallError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_service_names() {
        let mut config = InstallerConfig::default();
        config.service = "   ".to_string();
        assert!(config.validate().is_err());

        config.service = "../etc".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_service_not_matching_unit_file() {
        let config = InstallerConfig {
            service: "billing".to_string(),
            ..Default::default()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, InstallError::Config(msg) if msg.contains("does not match")));
    }

    #[test]
    fn test_env_layer_ignores_empty_values() {
        let layer = env(&[(ENV_UNIT_DIR, ""), (ENV_SERVICE, "billing")]);
        assert_eq!(layer.unit_dir, None);
        assert_eq!(layer.service, Some("billing".to_string()));
    }

    #[test]
    fn test_resolve_precedence() {
        let file = config_file(
            r#"{
                "unit_file": "deploy/billing.service",
                "unit_dir": "/from/file",
                "failure_policy": "continue"
            }"#,
        );
        let env = env(&[(ENV_UNIT_DIR, "/from/env")]);
        let flags = ConfigLayer {
            unit_dir: Some(PathBuf::from("/from/flags")),
            privilege_policy: Some(PrivilegePolicy::Ignore),
            ..Default::default()
        };

        let config = InstallerConfig::resolve(Some(file.path()), env, flags).unwrap();

        assert_eq!(config.service, "billing");
        assert_eq!(config.unit_file, PathBuf::from("deploy/billing.service"));
        assert_eq!(config.unit_dir, PathBuf::from("/from/flags"));
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.privilege_policy, PrivilegePolicy::Ignore);
    }

    #[test]
    fn test_resolve_env_over_file() {
        let file = config_file(r#"{"unit_dir": "/from/file"}"#);
        let env = env(&[(ENV_UNIT_DIR, "/from/env")]);

        let config =
            InstallerConfig::resolve(Some(file.path()), env, ConfigLayer::default()).unwrap();

        assert_eq!(config.unit_dir, PathBuf::from("/from/env"));
    }

    #[test]
    fn test_resolve_flag_unit_file_overrides_env_service() {
        let env = env(&[(ENV_SERVICE, "billing")]);
        let flags = ConfigLayer {
            unit_file: Some(PathBuf::from("deploy/orders.service")),
            ..Default::default()
        };

        let config = InstallerConfig::resolve(None, env, flags).unwrap();

        assert_eq!(config.service, "orders");
    }

    #[test]
    fn test_resolve_rejects_env_service_mismatch() {
        let env = env(&[(ENV_SERVICE, "billing")]);

        let err = InstallerConfig::resolve(None, env, ConfigLayer::default()).unwrap_err();
        assert!(matches!(err, InstallError::Config(_)));
    }

    #[test]
    fn test_resolve_rejects_flag_service_mismatch() {
        let flags = ConfigLayer {
            service: Some("billing".to_string()),
            ..Default::default()
        };

        let err = InstallerConfig::resolve(None, ConfigLayer::default(), flags).unwrap_err();
        assert!(matches!(err, InstallError::Config(_)));
    }

    #[test]
    fn test_resolve_accepts_matching_service_and_unit_file() {
        let flags = ConfigLayer {
            service: Some("billing".to_string()),
            unit_file: Some(PathBuf::from("deploy/billing.service")),
            ..Default::default()
        };

        let config = InstallerConfig::resolve(None, ConfigLayer::default(), flags).unwrap();
        assert_eq!(config.service, "billing");
    }
}
