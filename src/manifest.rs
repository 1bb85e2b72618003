//! Module Manifest
//!
//! The module manifest is an XML document declaring which class implements
//! a module, and which methods of that class can be invoked. It consists of
//! `module` and `function` elements, each carrying an `id`, a `name`, and an
//! optional `args` attribute:
//!
//! ```xml
//! <device>
//!     <module id="COMMON" name="com.shellever.plugin.common.Common" args="Context" />
//!     <function id="COMMON" name="getDeviceInfo" args="" />
//! </device>
//! ```
//!
//! A `module` is stored under its `id`. A `function` is scoped to the module
//! with the same `id` by storing it under the concatenation of `id` and
//! `name` (`COMMONgetDeviceInfo` above). Any other element is ignored, so
//! the document root and nesting are free-form.

use serde;

use crate::error::{Error, Result};

/// Manifest bundled with the host application.
pub const BUNDLED: &str = include_str!("../res/xml/device_class_module.xml");

/// Duplicate Key Policy
///
/// Selects how the parser treats two elements that produce the same key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateKeys {
    /// Refuse the manifest.
    #[default]
    Reject,
    /// Keep the entry parsed last.
    LastWins,
}

/// Manifest Entry
///
/// For modules, `name` is the fully-qualified class name and `args` the
/// parameter tags of the constructor. For functions, `name` is the method
/// name and `args` the parameter tags of the method.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ModuleEntry {
    pub key: String,
    pub name: String,
    pub args: Option<String>,
}

/// Manifest Table
///
/// All entries of a manifest, keyed as described in the module
/// documentation.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct Table {
    entries: std::collections::BTreeMap<String, ModuleEntry>,
}

// Read a mandatory attribute of a manifest element.
fn attribute(
    element: &quick_xml::events::BytesStart<'_>,
    name: &str,
) -> Result<Option<String>> {
    let attr = element
        .try_get_attribute(name)
        .map_err(|v| Error::ManifestParse(v.to_string()))?;

    match attr {
        None => Ok(None),
        Some(v) => v
            .unescape_value()
            .map(|v| Some(v.into_owned()))
            .map_err(|v| Error::ManifestParse(v.to_string())),
    }
}

// Read an attribute that must be present.
fn required_attribute(
    element: &quick_xml::events::BytesStart<'_>,
    tag: &str,
    name: &str,
) -> Result<String> {
    attribute(element, name)?.ok_or_else(|| {
        Error::ManifestParse(format!("<{}> lacks the `{}` attribute", tag, name))
    })
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    // Insert an entry according to the duplicate key policy.
    fn insert(&mut self, entry: ModuleEntry, policy: DuplicateKeys) -> Result<()> {
        if policy == DuplicateKeys::Reject && self.entries.contains_key(&entry.key) {
            return Err(Error::DuplicateKey(entry.key));
        }
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    // Stream the document and add an entry for each `module` and `function`
    // element. Entries parsed before a fault remain in the table.
    fn parse_into(&mut self, content: &str, policy: DuplicateKeys) -> Result<()> {
        let mut reader = quick_xml::Reader::from_str(content);

        loop {
            let element = match reader.read_event() {
                Err(v) => {
                    return Err(Error::ManifestParse(format!(
                        "at byte {}: {}",
                        reader.buffer_position(),
                        v,
                    )));
                },
                Ok(quick_xml::events::Event::Eof) => break,
                Ok(quick_xml::events::Event::Start(v)) => v,
                Ok(quick_xml::events::Event::Empty(v)) => v,
                Ok(_) => continue,
            };

            let tag = match element.local_name().as_ref() {
                b"module" => "module",
                b"function" => "function",
                _ => continue,
            };

            let id = required_attribute(&element, tag, "id")?;
            let name = required_attribute(&element, tag, "name")?;
            let args = attribute(&element, "args")?;

            let key = if tag == "module" {
                id
            } else {
                format!("{}{}", id, name)
            };

            self.insert(ModuleEntry { key, name, args }, policy)?;
        }

        Ok(())
    }

    /// Parse manifest from string
    ///
    /// Parse the given XML document into a table. Malformed documents and
    /// elements lacking `id` or `name` are refused. Duplicate keys are
    /// handled according to `policy`.
    pub fn parse_str(content: &str, policy: DuplicateKeys) -> Result<Self> {
        let mut table = Self::new();
        table.parse_into(content, policy)?;
        Ok(table)
    }

    /// Parse manifest from string, failing open
    ///
    /// Like `parse_str()`, but faults do not fail the call. A fault is
    /// logged, and the entries parsed up to that point are returned. With
    /// `DuplicateKeys::Reject`, a duplicate key is such a fault and truncates
    /// the table at the duplicate.
    pub fn parse_str_lenient(content: &str, policy: DuplicateKeys) -> Self {
        let mut table = Self::new();
        if let Err(e) = table.parse_into(content, policy) {
            log::warn!("Manifest truncated after {} entries: {}", table.len(), e);
        }
        table
    }

    // Read a manifest file completely into memory.
    fn read_path(path: &std::path::Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(
            |v| Error::FileRead { path: path.to_path_buf(), source: v },
        )
    }

    /// Parse manifest from file-system
    ///
    /// Read the specified file completely into memory and parse it via
    /// `parse_str()`.
    pub fn parse_path(path: &std::path::Path, policy: DuplicateKeys) -> Result<Self> {
        Self::parse_str(&Self::read_path(path)?, policy)
    }

    /// Parse manifest from file-system, failing open
    ///
    /// Read the specified file and parse it via `parse_str_lenient()`. Only
    /// a file that cannot be read fails the call.
    pub fn parse_path_lenient(path: &std::path::Path, policy: DuplicateKeys) -> Result<Self> {
        Ok(Self::parse_str_lenient(&Self::read_path(path)?, policy))
    }

    pub fn get(&self, key: &str) -> Option<&ModuleEntry> {
        self.entries.get(key)
    }

    /// Return the entry of the module `id`.
    pub fn module(&self, id: &str) -> Option<&ModuleEntry> {
        self.get(id)
    }

    /// Return the entry of function `name` of the module `id`.
    pub fn function(&self, id: &str, name: &str) -> Option<&ModuleEntry> {
        self.get(&format!("{}{}", id, name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
