//! Registry of named configuration sections.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::context::{Context, Section};
use crate::loader::{ConfigError, Format, read_config};

type Decoder = fn(&[u8]) -> Result<Section, ConfigError>;

/// Monomorphized constructors for one registered section type.
#[derive(Clone, Copy)]
struct SectionCodec {
    default: fn() -> Section,
    json: Decoder,
    yaml: Decoder,
    toml: Decoder,
}

fn default_section<T: Default + Send + Sync + 'static>() -> Section {
    Arc::new(T::default())
}

fn decode_json<T: DeserializeOwned + Send + Sync + 'static>(
    data: &[u8],
) -> Result<Section, ConfigError> {
    let value: T = serde_json::from_slice(data)?;
    Ok(Arc::new(value))
}

fn decode_yaml<T: DeserializeOwned + Send + Sync + 'static>(
    data: &[u8],
) -> Result<Section, ConfigError> {
    let value: T = serde_yaml::from_slice(data)?;
    Ok(Arc::new(value))
}

fn decode_toml<T: DeserializeOwned + Send + Sync + 'static>(
    data: &[u8],
) -> Result<Section, ConfigError> {
    let value: T = toml::from_str(std::str::from_utf8(data)?)?;
    Ok(Arc::new(value))
}

/// Table of configuration sections owned by independent components.
///
/// Each component registers its own section type; binding a document
/// deserializes the *whole* document into every registered type, so a
/// section type usually wraps its options in a field named after its key
/// and marks the struct `#[serde(default)]`. Unknown fields are ignored.
///
/// # Example
///
/// ```
/// use serde::Deserialize;
/// use trojan_config::{ConfigRegistry, Context};
///
/// #[derive(Debug, Default, Deserialize)]
/// #[serde(default)]
/// struct Section {
///     demo: Demo,
/// }
///
/// #[derive(Debug, Default, Deserialize)]
/// #[serde(default)]
/// struct Demo {
///     level: u8,
/// }
///
/// let mut registry = ConfigRegistry::new();
/// registry.register::<Section>("demo");
///
/// let ctx = registry
///     .with_json(&Context::new(), br#"{"demo": {"level": 3}}"#)
///     .unwrap();
/// assert_eq!(ctx.from_config::<Section>("demo").unwrap().demo.level, 3);
/// ```
#[derive(Default)]
pub struct ConfigRegistry {
    sections: BTreeMap<String, SectionCodec>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a section type under `name` (case-insensitive).
    ///
    /// `T::default()` is the zero value used for absent fields and for
    /// [`with_defaults`](Self::with_defaults). Registering a name twice
    /// replaces the earlier type.
    pub fn register<T>(&mut self, name: &str) -> &mut Self
    where
        T: DeserializeOwned + Default + Send + Sync + 'static,
    {
        let codec = SectionCodec {
            default: default_section::<T>,
            json: decode_json::<T>,
            yaml: decode_yaml::<T>,
            toml: decode_toml::<T>,
        };
        self.sections.insert(name.to_ascii_lowercase(), codec);
        self
    }

    /// Registered section names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.sections.contains_key(&name.to_ascii_lowercase())
    }

    /// Bind the default value of every section into a derived context.
    pub fn with_defaults(&self, ctx: &Context) -> Context {
        let bound = self
            .sections
            .iter()
            .map(|(name, codec)| (name.clone(), (codec.default)()))
            .collect();
        ctx.with_sections(bound)
    }

    /// Bind every section from a JSON document.
    pub fn with_json(&self, ctx: &Context, data: &[u8]) -> Result<Context, ConfigError> {
        self.bind(ctx, data, Format::Json)
    }

    /// Bind every section from a YAML document.
    pub fn with_yaml(&self, ctx: &Context, data: &[u8]) -> Result<Context, ConfigError> {
        self.bind(ctx, data, Format::Yaml)
    }

    /// Bind every section from a TOML document.
    pub fn with_toml(&self, ctx: &Context, data: &[u8]) -> Result<Context, ConfigError> {
        self.bind(ctx, data, Format::Toml)
    }

    /// Load a configuration file (format chosen by extension) and bind it.
    pub fn load_file(&self, ctx: &Context, path: impl AsRef<Path>) -> Result<Context, ConfigError> {
        let (format, data) = read_config(path)?;
        self.bind(ctx, &data, format)
    }

    /// Decode `data` for every section; the first failure aborts the whole bind.
    pub fn bind(&self, ctx: &Context, data: &[u8], format: Format) -> Result<Context, ConfigError> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(self.with_defaults(ctx));
        }

        let mut bound = HashMap::with_capacity(self.sections.len());
        for (name, codec) in &self.sections {
            let decode = match format {
                Format::Json => codec.json,
                Format::Yaml => codec.yaml,
                Format::Toml => codec.toml,
            };
            let section = decode(data).map_err(|e| ConfigError::Section {
                name: name.clone(),
                source: Box::new(e),
            })?;
            bound.insert(name.clone(), section);
        }

        debug!(sections = bound.len(), ?format, "configuration bound");
        Ok(ctx.with_sections(bound))
    }
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("sections", &self.sections.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct StoreSection {
        store: StoreOptions,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct StoreOptions {
        path: String,
        interval: u64,
    }

    impl Default for StoreOptions {
        fn default() -> Self {
            Self {
                path: "store.db".into(),
                interval: 30,
            }
        }
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct PortSection {
        listener: Listener,
    }

    #[derive(Debug, Default, Deserialize)]
    struct Listener {
        port: u16,
    }

    fn registry() -> ConfigRegistry {
        let mut registry = ConfigRegistry::new();
        registry
            .register::<StoreSection>("store")
            .register::<PortSection>("listener");
        registry
    }

    #[test]
    fn test_json_absent_fields_keep_defaults() {
        let ctx = registry()
            .with_json(&Context::new(), br#"{"store": {"interval": 5}, "other": true}"#)
            .unwrap();

        let store = ctx.from_config::<StoreSection>("store").unwrap();
        assert_eq!(store.store.path, "store.db");
        assert_eq!(store.store.interval, 5);
        assert_eq!(ctx.from_config::<PortSection>("listener").unwrap().listener.port, 0);
    }

    #[test]
    fn test_yaml_binds_sections() {
        let yaml = b"store:\n  path: /var/lib/stat.db\nlistener:\n  port: 443\n";
        let ctx = registry().with_yaml(&Context::new(), yaml).unwrap();

        assert_eq!(
            ctx.from_config::<StoreSection>("STORE").unwrap().store.path,
            "/var/lib/stat.db"
        );
        assert_eq!(ctx.from_config::<PortSection>("listener").unwrap().listener.port, 443);
    }

    #[test]
    fn test_toml_binds_sections() {
        let toml = b"[store]\ninterval = 60\n";
        let ctx = registry().with_toml(&Context::new(), toml).unwrap();
        assert_eq!(ctx.from_config::<StoreSection>("store").unwrap().store.interval, 60);
    }

    #[test]
    fn test_first_failing_section_aborts() {
        let parent = Context::new();
        let err = registry()
            .with_json(&parent, br#"{"listener": {"port": "not a port"}}"#)
            .unwrap_err();

        assert!(matches!(err, ConfigError::Section { ref name, .. } if name == "listener"));
        assert!(!parent.has_config("store"));
    }

    #[test]
    fn test_empty_document_binds_defaults() {
        let ctx = registry().with_yaml(&Context::new(), b"  \n").unwrap();
        assert_eq!(
            *ctx.from_config::<StoreSection>("store").unwrap(),
            StoreSection::default()
        );
    }

    #[test]
    fn test_reregister_replaces() {
        let mut registry = registry();
        registry.register::<PortSection>("store");
        let ctx = registry.with_defaults(&Context::new());

        assert!(ctx.from_config::<StoreSection>("store").is_none());
        assert!(ctx.from_config::<PortSection>("store").is_some());
        assert_eq!(registry.names().collect::<Vec<_>>(), ["listener", "store"]);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "store:\n  interval: 7").unwrap();

        let ctx = registry().load_file(&Context::new(), file.path()).unwrap();
        assert_eq!(ctx.from_config::<StoreSection>("store").unwrap().store.interval, 7);
    }

    #[test]
    fn test_binding_keeps_lifetime() {
        let parent = Context::new();
        let ctx = registry().with_defaults(&parent);
        parent.cancel();
        assert!(ctx.is_cancelled());
    }
}
