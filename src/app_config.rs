//! File configuration for CLI defaults.
//!
//! A flat `key = value` subset of TOML, parsed line by line: double-quoted
//! strings, non-negative integers, `true`/`false`, `#` comments.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Values read from `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    pub max_downloads: Option<usize>,
    pub cache_path: Option<PathBuf>,
    /// Contact address sent to the registry and the open-access resolver.
    pub mailto: Option<String>,
    pub semantic_scholar_api_key: Option<String>,
    /// Fixed tertiary mirror; disables discovery.
    pub scihub_mirror: Option<String>,
    /// Secondary mirror URL prefix.
    pub scidb_mirror: Option<String>,
    pub use_doi_as_filename: Option<bool>,
    /// Pause between registry queries in milliseconds.
    pub query_delay_ms: Option<u64>,
    /// Document fetch connect timeout.
    pub connect_timeout_secs: Option<u64>,
    /// Document fetch read timeout.
    pub read_timeout_secs: Option<u64>,
    pub min_document_bytes: Option<u64>,
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(delay) = self.query_delay_ms
            && delay > 60_000
        {
            bail!("Invalid config value for `query_delay_ms`: {delay}. Expected range: 0..=60000");
        }
        check_timeout("connect_timeout_secs", self.connect_timeout_secs)?;
        check_timeout("read_timeout_secs", self.read_timeout_secs)?;
        if let Some(bytes) = self.min_document_bytes
            && bytes <= 10
        {
            bail!("Invalid config value for `min_document_bytes`: {bytes}. Expected a value above 10");
        }
        for (field, value) in [
            ("scihub_mirror", &self.scihub_mirror),
            ("scidb_mirror", &self.scidb_mirror),
        ] {
            if let Some(url) = value
                && !(url.starts_with("http://") || url.starts_with("https://"))
            {
                bail!("Invalid config value for `{field}`: '{url}'. Expected an http(s) URL");
            }
        }
        Ok(())
    }
}

fn check_timeout(field: &str, value: Option<u64>) -> Result<()> {
    if let Some(secs) = value
        && !(1..=3600).contains(&secs)
    {
        bail!("Invalid config value for `{field}`: {secs}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Verbosity labels accepted in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// `tracing` filter directive for this setting.
    #[must_use]
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose | Self::Debug => "debug",
            Self::Quiet => "error",
        }
    }
}

/// Where configuration came from, for the startup log line.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub config: FileConfig,
    pub loaded_from_file: bool,
}

/// Default config location.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/paperbot/config.toml`
/// 2. `$HOME/.config/paperbot/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = non_empty_env("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join("paperbot").join("config.toml"));
    }
    let home = non_empty_env("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("paperbot")
            .join("config.toml"),
    )
}

fn non_empty_env(name: &str) -> Option<std::ffi::OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}

/// Loads `explicit` when given (it must exist), otherwise the default path if present.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(default_path) if default_path.exists() => {
            let config = load_file_config(default_path)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (index, raw_line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = key.trim();
        let value = value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => cfg.output_dir = Some(parse_string(value).with_context(invalid)?.into()),
            "cache_path" => cfg.cache_path = Some(parse_string(value).with_context(invalid)?.into()),
            "mailto" => cfg.mailto = Some(parse_string(value).with_context(invalid)?),
            "semantic_scholar_api_key" => {
                cfg.semantic_scholar_api_key = Some(parse_string(value).with_context(invalid)?);
            }
            "scihub_mirror" => cfg.scihub_mirror = Some(parse_string(value).with_context(invalid)?),
            "scidb_mirror" => cfg.scidb_mirror = Some(parse_string(value).with_context(invalid)?),
            "max_downloads" => {
                let parsed = parse_u64(value).with_context(invalid)?;
                cfg.max_downloads = Some(usize::try_from(parsed).with_context(invalid)?);
            }
            "use_doi_as_filename" => {
                cfg.use_doi_as_filename = Some(parse_bool(value).with_context(invalid)?);
            }
            "query_delay_ms" => cfg.query_delay_ms = Some(parse_u64(value).with_context(invalid)?),
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_u64(value).with_context(invalid)?);
            }
            "min_document_bytes" => {
                cfg.min_document_bytes = Some(parse_u64(value).with_context(invalid)?);
            }
            "verbosity" => {
                let label = parse_string(value).with_context(invalid)?;
                cfg.verbosity = Some(
                    parse_verbosity(&label)
                        .with_context(|| format!("Invalid `verbosity` value '{label}' on line {line_no}"))?,
                );
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut quoted = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string(raw: &str) -> Result<String> {
    raw.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(ToString::to_string)
        .context("Expected double-quoted string")
}

fn parse_u64(raw: &str) -> Result<u64> {
    let token = raw.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    if token.starts_with('-') {
        bail!("Expected non-negative integer");
    }
    Ok(token.parse::<u64>()?)
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
