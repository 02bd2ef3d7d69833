//! Configuration file loading and error types.

use std::{fs, io::Read, path::Path};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("unsupported config format")]
    UnsupportedFormat,
    #[error("section {name}: {source}")]
    Section {
        name: String,
        #[source]
        source: Box<ConfigError>,
    },
}

/// Serialization format of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

/// Read a configuration file and detect its format from the extension.
///
/// `.jsonc` files have their comments stripped before being handed out as JSON.
pub fn read_config(path: impl AsRef<Path>) -> Result<(Format, Vec<u8>), ConfigError> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    match path.extension().and_then(|s| s.to_str()).unwrap_or("") {
        "json" => Ok((Format::Json, data)),
        "jsonc" => {
            let mut stripped = Vec::with_capacity(data.len());
            json_comments::StripComments::new(data.as_slice()).read_to_end(&mut stripped)?;
            Ok((Format::Json, stripped))
        }
        "yaml" | "yml" => Ok((Format::Yaml, data)),
        "toml" => Ok((Format::Toml, data)),
        _ => Err(ConfigError::UnsupportedFormat),
    }
}
