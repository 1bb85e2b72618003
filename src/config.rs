//! Host Configuration
//!
//! The host application is configured via a TOML file, usually called
//! `dexload.toml`. Every key except `version` is optional and has a default,
//! so an empty configuration (or none at all) runs the bundled demo setup:
//!
//! ```toml
//! version = 1
//!
//! [application]
//! id = "com.shellever.dexclassloader"
//! storage-root = "./storage"
//!
//! [contract]
//! archive = "libplugin_impl.so"
//! class = "com.shellever.plugin.PluginImpl"
//!
//! [declared]
//! archive = "libplugin_devinfo.so"
//! manifest = "./device_class_module.xml"
//! module = "COMMON"
//! function = "getDeviceInfo"
//! duplicate-keys = "reject"
//! lenient = false
//! ```
//!
//! Relative paths are relative to the working directory.

use serde;
use toml;

use crate::layout::Layout;
use crate::manifest::DuplicateKeys;

/// Default application identifier.
pub const DEFAULT_APPLICATION_ID: &str = "com.shellever.dexclassloader";

/// Default storage root.
pub const DEFAULT_STORAGE_ROOT: &str = "./storage";

/// Default module key of the declared invocation.
pub const DEFAULT_MODULE: &str = "COMMON";

/// Default function of the declared invocation.
pub const DEFAULT_FUNCTION: &str = "getDeviceInfo";

/// Configuration Errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration file cannot be read.
    #[error("cannot read {0:?}: {1}")]
    Read(std::path::PathBuf, std::io::Error),
    /// The content is not valid TOML or does not fit the expected types.
    #[error("invalid configuration: {0}")]
    Syntax(#[from] toml::de::Error),
    /// The configuration format version is not supported.
    #[error("unsupported configuration version {0}")]
    Version(u32),
    /// The value of the specified key is invalid.
    #[error("invalid value for '{0}'")]
    Invalid(&'static str),
}

/// Raw Application Table
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawApplication {
    /// Identifier of the host application. Names its private storage
    /// directory. Alphanumeric segments separated by `.`, with `-` and `_`
    /// allowed within segments.
    pub id: Option<String>,
    /// Directory below which the application keeps its private storage.
    pub storage_root: Option<String>,
}

/// Raw Contract Table
///
/// Configuration of the contract invocation.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawContract {
    /// File name of the archive inside the archive directory.
    pub archive: Option<String>,
    /// Fully-qualified name of the class implementing the contract.
    pub class: Option<String>,
}

/// Raw Declared Table
///
/// Configuration of the declared invocation.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawDeclared {
    /// File name of the archive inside the archive directory.
    pub archive: Option<String>,
    /// Path to a module manifest replacing the bundled one.
    pub manifest: Option<String>,
    /// Manifest key of the module to construct.
    pub module: Option<String>,
    /// Name of the module function to invoke.
    pub function: Option<String>,
    /// Treatment of duplicate manifest keys.
    pub duplicate_keys: Option<DuplicateKeys>,
    /// Whether malformed manifests are used up to the first fault.
    pub lenient: Option<bool>,
}

/// Raw Configuration Content
///
/// The configuration as parsed by `toml` and converted into rust types via
/// `serde`. Content is not verified beyond syntactic correctness.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Raw {
    /// Version of the configuration format. Only version `1` is supported.
    pub version: u32,

    pub application: Option<RawApplication>,
    pub contract: Option<RawContract>,
    pub declared: Option<RawDeclared>,
}

impl Raw {
    fn parse_str(content: &str) -> Result<Self, Error> {
        Ok(toml::from_str(content)?)
    }
}

/// Host Configuration
///
/// A verified configuration. Accessors return the configured value or its
/// default.
#[derive(Clone, Debug)]
pub struct Config {
    pub raw: Raw,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raw: Raw {
                version: 1,
                application: None,
                contract: None,
                declared: None,
            },
        }
    }
}

// Platform file name of a dynamic library.
fn library_file_name(name: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX,
    )
}

impl Config {
    // Check whether a string is a valid application identifier
    //
    // Segments separated by `.` must be non-empty and consist of alphanumeric
    // characters plus `-`, `_`.
    fn is_application_id(s: &str) -> bool {
        s.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|v| v.is_alphanumeric() || v == '-' || v == '_')
        })
    }

    // Check whether a string contains no control characters.
    fn is_plain(s: &str) -> bool {
        !s.is_empty() && s.chars().all(|v| !v.is_control())
    }

    /// Verify raw configuration
    ///
    /// Take the raw configuration and verify it for semantic correctness.
    fn parse_raw(raw: Raw) -> Result<Self, Error> {
        // Other versions are explicitly defined to be incompatible. Unknown
        // fields are ignored, so version `1` can be extended compatibly.
        if raw.version != 1 {
            return Err(Error::Version(raw.version));
        }

        if let Some(application) = &raw.application {
            if let Some(v) = &application.id {
                if !Self::is_application_id(v) {
                    return Err(Error::Invalid("application.id"));
                }
            }
            if let Some(v) = &application.storage_root {
                if !Self::is_plain(v) {
                    return Err(Error::Invalid("application.storage-root"));
                }
            }
        }

        if let Some(contract) = &raw.contract {
            if let Some(v) = &contract.archive {
                if !crate::layout::is_file_name(v) {
                    return Err(Error::Invalid("contract.archive"));
                }
            }
            if let Some(v) = &contract.class {
                if !Self::is_plain(v) {
                    return Err(Error::Invalid("contract.class"));
                }
            }
        }

        if let Some(declared) = &raw.declared {
            if let Some(v) = &declared.archive {
                if !crate::layout::is_file_name(v) {
                    return Err(Error::Invalid("declared.archive"));
                }
            }
            if let Some(v) = &declared.manifest {
                if !Self::is_plain(v) {
                    return Err(Error::Invalid("declared.manifest"));
                }
            }
            if let Some(v) = &declared.module {
                if !Self::is_plain(v) {
                    return Err(Error::Invalid("declared.module"));
                }
            }
            if let Some(v) = &declared.function {
                if !Self::is_plain(v) {
                    return Err(Error::Invalid("declared.function"));
                }
            }
        }

        Ok(Self { raw })
    }

    /// Parse configuration from string
    ///
    /// Parse the given string as TOML and verify its content.
    pub fn parse_str(content: &str) -> Result<Self, Error> {
        Raw::parse_str(content).and_then(Self::parse_raw)
    }

    /// Parse configuration from file-system
    ///
    /// The file is completely read into memory before it is parsed.
    pub fn parse_path(path: &std::path::Path) -> Result<Self, Error> {
        std::fs::read_to_string(path)
            .map_err(
                |v| Error::Read(path.to_path_buf(), v),
            )
            .and_then(|v| Self::parse_str(&v))
    }

    /// Replace the configured storage root.
    pub fn with_storage_root(mut self, root: String) -> Self {
        self.raw
            .application
            .get_or_insert_with(RawApplication::default)
            .storage_root = Some(root);
        self
    }

    pub fn application_id(&self) -> &str {
        self.raw
            .application
            .as_ref()
            .and_then(|v| v.id.as_deref())
            .unwrap_or(DEFAULT_APPLICATION_ID)
    }

    pub fn storage_root(&self) -> std::path::PathBuf {
        self.raw
            .application
            .as_ref()
            .and_then(|v| v.storage_root.as_deref())
            .unwrap_or(DEFAULT_STORAGE_ROOT)
            .into()
    }

    /// Storage layout of the host application.
    pub fn layout(&self) -> Layout {
        Layout::new(self.storage_root(), self.application_id())
    }

    pub fn contract_archive(&self) -> String {
        self.raw
            .contract
            .as_ref()
            .and_then(|v| v.archive.clone())
            .unwrap_or_else(|| library_file_name("plugin_impl"))
    }

    pub fn contract_class(&self) -> &str {
        self.raw
            .contract
            .as_ref()
            .and_then(|v| v.class.as_deref())
            .unwrap_or(crate::op::contract::PLUGIN_IMPL_CLASS)
    }

    pub fn declared_archive(&self) -> String {
        self.raw
            .declared
            .as_ref()
            .and_then(|v| v.archive.clone())
            .unwrap_or_else(|| library_file_name("plugin_devinfo"))
    }

    /// Path of the module manifest, or `None` for the bundled one.
    pub fn manifest_path(&self) -> Option<std::path::PathBuf> {
        self.raw
            .declared
            .as_ref()
            .and_then(|v| v.manifest.as_deref())
            .map(std::path::PathBuf::from)
    }

    pub fn module(&self) -> &str {
        self.raw
            .declared
            .as_ref()
            .and_then(|v| v.module.as_deref())
            .unwrap_or(DEFAULT_MODULE)
    }

    pub fn function(&self) -> &str {
        self.raw
            .declared
            .as_ref()
            .and_then(|v| v.function.as_deref())
            .unwrap_or(DEFAULT_FUNCTION)
    }

    pub fn duplicate_keys(&self) -> DuplicateKeys {
        self.raw
            .declared
            .as_ref()
            .and_then(|v| v.duplicate_keys)
            .unwrap_or_default()
    }

    pub fn lenient(&self) -> bool {
        self.raw
            .declared
            .as_ref()
            .and_then(|v| v.lenient)
            .unwrap_or(false)
    }
}
