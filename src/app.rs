//! Host Application
//!
//! The host application ties the pieces together. On activation it runs the
//! contract invocation and the declared invocation in sequence and shows
//! their results on a text display. This is the one place where faults are
//! swallowed: each failing invocation is logged and leaves the display as it
//! was, so activation itself never fails.

use crate::config::Config;
use crate::error::Result;
use crate::layout::Context;
use crate::loader::{Archive, ArchiveSource, ModuleResolver, NativeArchives, PluginLoader};
use crate::manifest::{Table, BUNDLED};
use crate::object::Registry;
use crate::op;

/// Text Display
///
/// The single text surface of the host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Display {
    text: String,
}

impl Display {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
    }

    pub fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Host Application
pub struct App {
    config: Config,
    host: Archive,
    source: std::sync::Arc<dyn ArchiveSource>,
}

impl App {
    /// Create the host application
    ///
    /// Archives are opened as dynamic libraries, and the host contributes no
    /// classes of its own.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            host: Archive::linked(Registry::new()),
            source: std::sync::Arc::new(NativeArchives),
        }
    }

    /// Replace the source archives are opened from.
    pub fn with_source(mut self, source: std::sync::Arc<dyn ArchiveSource>) -> Self {
        self.source = source;
        self
    }

    /// Replace the classes of the host. They serve as fallback for every
    /// loader.
    pub fn with_host_classes(mut self, registry: Registry) -> Self {
        self.host = Archive::linked(registry);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Return the host context handed to plugins.
    pub fn context(&self) -> Result<Context> {
        self.config.layout().context()
    }

    /// Create a loader for an archive
    ///
    /// `archive_file_name` is looked up in the archive directory. Anything
    /// but a bare file name is refused as a missing archive. All directories
    /// of the storage layout exist once this returns, whether or not the
    /// archive does. The loader falls back to the classes of the host.
    pub fn resolve_loader(&self, archive_file_name: &str) -> Result<PluginLoader> {
        let layout = self.config.layout();

        if !crate::layout::is_file_name(archive_file_name) {
            return Err(crate::error::Error::ArchiveMissing(
                layout.jar_dir()?.join(archive_file_name),
            ));
        }

        let archive_path = layout.jar_dir()?.join(archive_file_name);
        let parent: std::sync::Arc<dyn ModuleResolver> = std::sync::Arc::new(self.host.clone());

        Ok(PluginLoader::new(
            archive_path,
            layout.dex_dir()?,
            layout.lib_dir()?,
            Some(parent),
            self.source.clone(),
        ))
    }

    /// Parse the module manifest
    ///
    /// Use the configured manifest, or the bundled one. The table is
    /// rebuilt on every call. In lenient mode, faults in the content
    /// truncate the table instead of failing, and the configured duplicate
    /// policy still applies.
    pub fn parse_device_info(&self) -> Result<Table> {
        let policy = self.config.duplicate_keys();

        match (self.config.manifest_path(), self.config.lenient()) {
            (None, false) => Table::parse_str(BUNDLED, policy),
            (None, true) => Ok(Table::parse_str_lenient(BUNDLED, policy)),
            (Some(path), false) => Table::parse_path(&path, policy),
            (Some(path), true) => Table::parse_path_lenient(&path, policy),
        }
    }

    /// Run the contract invocation against the configured archive.
    pub fn run_contract(&self) -> Result<String> {
        let loader = self.resolve_loader(&self.config.contract_archive())?;
        op::contract::invoke_via_contract_class(&loader, self.config.contract_class())
    }

    /// Run the declared invocation against the configured archive.
    pub fn run_declared(&self) -> Result<Option<String>> {
        self.run_declared_function(self.config.module(), self.config.function())
    }

    /// Run the declared invocation of a specific module function.
    pub fn run_declared_function(&self, module: &str, function: &str) -> Result<Option<String>> {
        let table = self.parse_device_info()?;
        let loader = self.resolve_loader(&self.config.declared_archive())?;
        let context = self.context()?;
        op::declared::invoke_declared(&loader, &table, module, function, &context)
    }

    /// Activate the host
    ///
    /// Show the contract result on the display, then append the declared
    /// result on a new line. Failures are logged and leave the display
    /// unmodified.
    pub fn on_create(&self, display: &mut Display) {
        log::debug!("Invoking via contract");
        match self.run_contract() {
            Ok(v) => display.set_text(&v),
            Err(e) => log::warn!("Contract invocation failed: {}", e),
        }

        log::debug!("Invoking via manifest");
        match self.run_declared() {
            Ok(Some(v)) => display.append(&format!("\n{}", v)),
            Ok(None) => log::debug!("Declared function returned no string"),
            Err(e) => log::warn!("Declared invocation failed: {}", e),
        }
    }
}
