//! Configuration file support.
use std::{
    env, fs,
    io,
    path::{Path, PathBuf},
};
use toml_edit::DocumentMut;

use crate::common::*;

/// Find the path to our configuration directory.
pub(crate) fn config_dir() -> Result<PathBuf> {
    // Use `var_os` instead of `var`, because if it returns a non-Unicode path,
    // we can hand it off directly to `PathBuf`.
    match env::var_os("GCS2BQ_CONFIG_DIR") {
        // The user specified a config directory, so use that.
        Some(dir) => Ok(PathBuf::from(dir)),
        // Use `gcs2bq/` in the system configuration directory.
        None => Ok(dirs::config_dir()
            .ok_or_else(|| format_err!("could not find user config dir"))?
            .join("gcs2bq")),
    }
}

/// Find the path to our configuration file.
pub(crate) fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("gcs2bq.toml"))
}

/// Our `gcs2bq.toml` configuration file.
///
/// Every key is optional. Command-line arguments take precedence.
#[derive(Debug)]
pub(crate) struct Configuration {
    /// The path from which we read this file.
    path: PathBuf,
    /// Our raw configuration data.
    doc: DocumentMut,
}

impl Configuration {
    /// Load our default configuration.
    pub(crate) fn try_default() -> Result<Self> {
        Self::from_path(&config_file()?)
    }

    /// Load the configuration file at `path`. A missing file is treated as
    /// empty.
    pub(crate) fn from_path(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::from_str_at(path.to_owned(), &text)
                .with_context(|| format!("could not read file {}", path.display()))?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self {
                path: path.to_owned(),
                doc: DocumentMut::default(),
            }),
            Err(err) => {
                Err(err).context(format!("could not open file {}", path.display()))
            }
        }
    }

    /// Parse configuration data which was read from `path`.
    fn from_str_at(path: PathBuf, text: &str) -> Result<Self> {
        let doc = text.parse::<DocumentMut>()?;
        Ok(Self { path, doc })
    }

    /// The default Google Cloud project.
    pub(crate) fn project(&self) -> Result<Option<&str>> {
        self.string_value("project")
    }

    /// The default BigQuery dataset.
    pub(crate) fn dataset(&self) -> Result<Option<&str>> {
        self.string_value("dataset")
    }

    /// The default BigQuery job location.
    pub(crate) fn location(&self) -> Result<Option<&str>> {
        self.string_value("location")
    }

    /// Get a top-level string from our config file.
    fn string_value(&self, key: &str) -> Result<Option<&str>> {
        match self.doc.as_table().get(key) {
            None => Ok(None),
            Some(raw_value) => match raw_value.as_str() {
                Some(value) => Ok(Some(value)),
                None => Err(format_err!(
                    "expected string for {}, found {:?} in {}",
                    key,
                    raw_value.to_string().trim(),
                    self.path.display(),
                )),
            },
        }
    }
}
