use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use confique::Config as _;
use serde::Deserialize;

use crate::prelude::*;


/// The locations where we look for a configuration file. The first existing
/// file in this list is used.
const DEFAULT_PATHS: &[&str] = &["config.toml", "/etc/store-graphql/config.toml"];

const CONFIG_PATH_ENV: &str = "STORE_GRAPHQL_CONFIG_PATH";

/// Configuration for the GraphQL server.
///
/// All relative paths are relative to the location of this configuration file.
/// Duration values are specified as string with a unit, e.g. "27s". Valid
/// units: 'ms', 's', 'min', 'h' and 'd'.
#[derive(Debug, confique::Config)]
pub(crate) struct Config {
    #[config(nested)]
    pub(crate) http: crate::http::HttpConfig,

    /// Authentication of API requests via `Authorization: Bearer` tokens.
    #[config(nested)]
    pub(crate) jwt: crate::auth::JwtConfig,

    #[config(nested)]
    pub(crate) cors: crate::http::CorsConfig,

    #[config(nested)]
    pub(crate) store: crate::store::StoreConfig,

    #[config(nested)]
    pub(crate) log: crate::logger::LogConfig,
}

impl Config {
    /// Tries to find a config file by checking `STORE_GRAPHQL_CONFIG_PATH`
    /// and a list of default locations. The first config file is loaded via
    /// [`Self::load_from`]. Returns the loaded config and its path.
    pub(crate) fn from_env_or_default_locations() -> Result<(Self, PathBuf)> {
        let path = if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            PathBuf::from(path)
        } else {
            DEFAULT_PATHS.iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!(
                    "no configuration file found. Note: we checked the following paths: {}",
                    DEFAULT_PATHS.join(", "),
                ))?
        };

        let config = Self::load_from(&path)
            .with_context(|| format!("failed to load configuration from '{}'", path.display()))?;

        Ok((config, path))
    }

    /// Loads the configuration from a specific TOML file.
    pub(crate) fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Config::from_file(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;

        config.validate().context("failed to validate configuration")?;
        config.fix_paths(path)?;

        Ok(config)
    }

    /// Finds illegal values that the type system does not catch.
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.http.path.starts_with('/'),
            "'http.path' has to start with '/', but is '{}'",
            self.http.path,
        );
        self.cors.layer().context("invalid 'cors' configuration")?;

        Ok(())
    }

    /// Goes through all paths in the configuration and changes relative paths
    /// to be absolute based on the path of the configuration file itself.
    fn fix_paths(&mut self, config_path: &Path) -> Result<()> {
        let absolute_config_path = config_path.canonicalize()
            .context("failed to canonicalize config path")?;
        let base = absolute_config_path.parent()
            .ok_or_else(|| anyhow!("config file path has no parent"))?;

        if let Some(p) = &mut self.log.file {
            if p.is_relative() {
                *p = base.join(&p);
            }
        }

        Ok(())
    }
}

/// Writes the generated TOML config template file to the given destination or
/// stdout.
pub(crate) fn write_template(path: Option<&PathBuf>) -> Result<()> {
    use confique::toml::FormatOptions;

    info!(
        "Writing configuration template to '{}'",
        path.map(|p| p.display().to_string()).unwrap_or("<stdout>".into()),
    );

    let mut options = FormatOptions::default();
    options.general.nested_field_gap = 2;
    let template = confique::toml::template::<Config>(options);
    match path {
        Some(path) => fs::write(path, template)
            .with_context(|| format!("failed to write '{}'", path.display()))?,
        None => io::stdout().write_all(template.as_bytes())?,
    }

    Ok(())
}

/// Our custom format for durations. We allow a couple useful units and require
/// a unit to increase readability of config files.
pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(D::Error::custom)
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    // Allow unit-less zeroes
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let start_unit = s.find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| "no time unit for duration".to_owned())?;
    let (num, unit) = s.split_at(start_unit);
    let num: u32 = num.parse()
        .map_err(|e| format!("invalid integer for duration: {e}"))?;
    let num: u64 = num.into();

    match unit {
        "ms" => Ok(Duration::from_millis(num)),
        "s" => Ok(Duration::from_secs(num)),
        "min" => Ok(Duration::from_secs(num * 60)),
        "h" => Ok(Duration::from_secs(num * 60 * 60)),
        "d" => Ok(Duration::from_secs(num * 60 * 60 * 24)),
        _ => Err(format!("invalid unit of time for duration: '{unit}'")),
    }
}


#[cfg(test)]
impl Config {
    /// Loads a configuration from the given TOML source.
    pub(crate) fn from_toml(src: &str) -> Result<Self> {
        let path = std::env::temp_dir()
            .join(format!("store-graphql-test-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, src)?;
        let out = Self::load_from(&path);
        let _ = fs::remove_file(&path);
        out
    }
}
