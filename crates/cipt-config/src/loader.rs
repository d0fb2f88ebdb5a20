use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use cipt_common::{Error, Result};
use tracing::{debug, info, warn};

use crate::model::{AppConfig, DEFAULT_DB_FILE, DEFAULT_TIMEZONE};

/// Overrides the storage file location. Relative values resolve against the
/// current working directory.
pub const STORAGE_ENV: &str = "SQLITE_STORAGE";

/// Overrides the business timezone (IANA name, e.g. `America/Fortaleza`).
/// POSIX forms the C library accepts (`:/etc/localtime`, `EST5EDT4`) are
/// ignored with a warning.
pub const TIMEZONE_ENV: &str = "TZ";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Config file names searched for in the project root when no explicit path is given.
const CONFIG_CANDIDATES: [&str; 3] = ["cipt.yaml", "cipt.yml", "cipt.toml"];

/// Settings after layering defaults, the config file, `.env` and the process environment.
///
/// The timezone is only resolved on demand through [`ResolvedConfig::timezone`],
/// so commands that never look at dates are not affected by a bad `TZ`.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub storage_path: PathBuf,
    pub busy_timeout: Duration,
    timezone_env: Option<String>,
    timezone_file: Option<String>,
}

impl ResolvedConfig {
    /// `TZ` if it names an IANA zone, else the config file's `timezone`, else
    /// `America/Fortaleza`. Only a bad name in the config file is an error.
    pub fn timezone(&self) -> Result<Tz> {
        if let Some(raw) = &self.timezone_env {
            match env_timezone(raw) {
                Some(tz) => return Ok(tz),
                None => warn!("{TIMEZONE_ENV}={raw} is not an IANA timezone name, ignoring it"),
            }
        }
        let name = self.timezone_file.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        let tz = parse_timezone(name)?;
        debug!("using timezone {}", tz.name());
        Ok(tz)
    }
}

/// Builds a [`ResolvedConfig`] for a given project root.
pub struct ConfigLoader {
    project_root: PathBuf,
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            config_path: None,
        }
    }

    /// Use the current working directory as the project root.
    pub fn from_cwd() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Load `.env`, read the config file (if any) and resolve against the
    /// process environment.
    pub fn load(&self) -> Result<ResolvedConfig> {
        let dotenv = self.project_root.join(".env");
        if dotenv.exists() {
            dotenvy::from_path(&dotenv)
                .map_err(|e| Error::Config(format!("failed to load {}: {e}", dotenv.display())))?;
            debug!("loaded environment from {}", dotenv.display());
        }

        let file_config = self.read_config_file()?;
        let cwd = std::env::current_dir()?;
        self.resolve(file_config, &cwd, |key| std::env::var(key).ok())
    }

    /// Layer `file_config` under the variables returned by `env`.
    pub fn resolve<F>(&self, file_config: AppConfig, cwd: &Path, env: F) -> Result<ResolvedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_path = match env(STORAGE_ENV).filter(|v| !v.trim().is_empty()) {
            Some(value) => absolutize(cwd, Path::new(value.trim())),
            None => match &file_config.storage.path {
                Some(path) => absolutize(&self.project_root, path),
                None => self.project_root.join(DEFAULT_DB_FILE),
            },
        };

        let busy_timeout = Duration::from_millis(
            file_config
                .storage
                .busy_timeout_ms
                .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
        );

        info!("storage at {}", storage_path.display());
        Ok(ResolvedConfig {
            storage_path,
            busy_timeout,
            timezone_env: env(TIMEZONE_ENV).filter(|v| !v.trim().is_empty()),
            timezone_file: file_config.timezone,
        })
    }

    fn read_config_file(&self) -> Result<AppConfig> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => match CONFIG_CANDIDATES
                .iter()
                .map(|name| self.project_root.join(name))
                .find(|p| p.exists())
            {
                Some(path) => path,
                None => return Ok(AppConfig::default()),
            },
        };
        parse_config_file(&path)
    }
}

fn parse_config_file(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}

/// A `TZ` value as an IANA zone: a bare name, `:Name`, or a path ending in
/// `zoneinfo/Name`.
fn env_timezone(raw: &str) -> Option<Tz> {
    let name = raw.trim().trim_start_matches(':');
    let name = match name.rsplit_once("zoneinfo/") {
        Some((_, zone)) => zone,
        None => name,
    };
    name.parse::<Tz>().ok()
}

fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| Error::Config(format!("unknown timezone: {name}")))
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_project_root_database() {
        let loader = ConfigLoader::new("/srv/cipt");
        let resolved = loader
            .resolve(AppConfig::default(), Path::new("/tmp"), env_from(&[]))
            .unwrap();
        assert_eq!(resolved.storage_path, PathBuf::from("/srv/cipt/sistemacipt.db"));
        assert_eq!(resolved.timezone().unwrap(), chrono_tz::America::Fortaleza);
        assert_eq!(resolved.busy_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn env_storage_overrides_config_and_resolves_against_cwd() {
        let loader = ConfigLoader::new("/srv/cipt");
        let mut file = AppConfig::default();
        file.storage.path = Some(PathBuf::from("data/other.db"));

        let resolved = loader
            .resolve(
                file,
                Path::new("/home/op"),
                env_from(&[(STORAGE_ENV, "./local.db")]),
            )
            .unwrap();
        assert_eq!(resolved.storage_path, PathBuf::from("/home/op/./local.db"));
    }

    #[test]
    fn config_file_path_resolves_against_project_root() {
        let loader = ConfigLoader::new("/srv/cipt");
        let mut file = AppConfig::default();
        file.storage.path = Some(PathBuf::from("data/other.db"));
        file.storage.busy_timeout_ms = Some(250);

        let resolved = loader
            .resolve(file, Path::new("/tmp"), env_from(&[]))
            .unwrap();
        assert_eq!(resolved.storage_path, PathBuf::from("/srv/cipt/data/other.db"));
        assert_eq!(resolved.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn timezone_env_overrides_file() {
        let loader = ConfigLoader::new("/srv/cipt");
        let file = AppConfig {
            timezone: Some("Europe/Lisbon".into()),
            ..AppConfig::default()
        };
        let resolved = loader
            .resolve(file, Path::new("/tmp"), env_from(&[(TIMEZONE_ENV, "UTC")]))
            .unwrap();
        assert_eq!(resolved.timezone().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn posix_tz_values_fall_back_to_the_config_file() {
        let loader = ConfigLoader::new("/srv/cipt");
        for raw in [":/etc/localtime", "EST5EDT4", "Mars/Olympus"] {
            let file = AppConfig {
                timezone: Some("Europe/Lisbon".into()),
                ..AppConfig::default()
            };
            let resolved = loader
                .resolve(file, Path::new("/tmp"), env_from(&[(TIMEZONE_ENV, raw)]))
                .unwrap();
            assert_eq!(resolved.timezone().unwrap(), chrono_tz::Europe::Lisbon, "{raw}");
        }

        let resolved = loader
            .resolve(
                AppConfig::default(),
                Path::new("/tmp"),
                env_from(&[(TIMEZONE_ENV, ":/etc/localtime")]),
            )
            .unwrap();
        assert_eq!(resolved.timezone().unwrap(), chrono_tz::America::Fortaleza);
    }

    #[test]
    fn colon_and_zoneinfo_forms_name_a_zone() {
        let loader = ConfigLoader::new("/srv/cipt");
        for raw in [":America/Recife", "/usr/share/zoneinfo/America/Recife"] {
            let resolved = loader
                .resolve(
                    AppConfig::default(),
                    Path::new("/tmp"),
                    env_from(&[(TIMEZONE_ENV, raw)]),
                )
                .unwrap();
            assert_eq!(resolved.timezone().unwrap(), chrono_tz::America::Recife, "{raw}");
        }
    }

    #[test]
    fn unknown_timezone_in_config_file_is_config_error() {
        let loader = ConfigLoader::new("/srv/cipt");
        let file = AppConfig {
            timezone: Some("Mars/Olympus".into()),
            ..AppConfig::default()
        };
        let resolved = loader
            .resolve(file, Path::new("/tmp"), env_from(&[]))
            .unwrap();
        assert!(matches!(resolved.timezone(), Err(Error::Config(_))));
    }

    #[test]
    fn reads_yaml_and_toml_files() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("cipt.yaml");
        std::fs::write(&yaml, "storage:\n  path: db/cipt.db\ntimezone: UTC\n").unwrap();
        let cfg = parse_config_file(&yaml).unwrap();
        assert_eq!(cfg.storage.path, Some(PathBuf::from("db/cipt.db")));
        assert_eq!(cfg.timezone.as_deref(), Some("UTC"));

        let toml_path = dir.path().join("cipt.toml");
        std::fs::write(&toml_path, "[storage]\nbusy_timeout_ms = 100\n").unwrap();
        let cfg = parse_config_file(&toml_path).unwrap();
        assert_eq!(cfg.storage.busy_timeout_ms, Some(100));
        assert!(cfg.timezone.is_none());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cipt.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(parse_config_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn finds_config_file_in_project_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cipt.yml"), "timezone: UTC\n").unwrap();
        let loader = ConfigLoader::new(dir.path());
        let cfg = loader.read_config_file().unwrap();
        assert_eq!(cfg.timezone.as_deref(), Some("UTC"));
    }
}
