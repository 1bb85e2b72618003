//! Filesystem Layout
//!
//! The host application keeps all plugin related files below its private
//! home directory, mirroring the external-storage layout of Android
//! applications:
//!
//! ```text
//! <storage-root>/
//! └── Android/
//!     └── data/
//!         └── <application-id>/
//!             └── driver/
//!                 ├── jar/    plugin archives, placed by the deployer
//!                 ├── dex/    staged copies of opened archives
//!                 └── lib/    native libraries the plugins depend on
//! ```
//!
//! Every accessor creates its directory on first access. Creation is
//! idempotent, so accessors can be called repeatedly.

use crate::error::{Error, Result};

// Create `path` and any missing parents, then hand it back. Succeeds if the
// directory already exists.
fn ensure_dir(path: std::path::PathBuf) -> Result<std::path::PathBuf> {
    std::fs::create_dir_all(&path).map_err(
        |_| Error::DirectoryCreation(path.clone()),
    )?;
    Ok(path)
}

/// Check whether a string is a bare file name
///
/// Archives are looked up by file name inside the archive directory. Names
/// that are empty, refer to the directory itself or its parent, or contain a
/// path separator would resolve outside of it and are refused.
pub fn is_file_name(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s.chars().all(|v| !v.is_control() && v != '/' && v != '\\')
}

/// Application Storage Layout
///
/// Describes where the host application keeps its plugin archives. The
/// layout itself is just two values; directories are only touched when one
/// of the accessors is called.
#[derive(Clone, Debug)]
pub struct Layout {
    root: std::path::PathBuf,
    application_id: String,
}

impl Layout {
    /// Create a layout for the given application below `root`.
    pub fn new(root: impl Into<std::path::PathBuf>, application_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            application_id: application_id.into(),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Return the application home directory
    ///
    /// This is `<root>/Android/data/<application-id>/`. The directory is
    /// created if missing.
    pub fn home_dir(&self) -> Result<std::path::PathBuf> {
        let mut path = self.root.clone();
        path.push("Android");
        path.push("data");
        path.push(&self.application_id);
        ensure_dir(path)
    }

    // Return `<home>/driver/<leaf>/`, creating it if missing.
    fn driver_dir(&self, leaf: &str) -> Result<std::path::PathBuf> {
        let mut path = self.home_dir()?;
        path.push("driver");
        path.push(leaf);
        ensure_dir(path)
    }

    /// Directory holding the plugin archives.
    pub fn jar_dir(&self) -> Result<std::path::PathBuf> {
        self.driver_dir("jar")
    }

    /// Directory holding staged copies of opened archives.
    pub fn dex_dir(&self) -> Result<std::path::PathBuf> {
        self.driver_dir("dex")
    }

    /// Directory holding native libraries plugins depend on.
    pub fn lib_dir(&self) -> Result<std::path::PathBuf> {
        self.driver_dir("lib")
    }

    /// Build the host context
    ///
    /// The context is the handle plugins receive from the host. It is
    /// derived from the layout and makes sure the directories it names
    /// exist.
    pub fn context(&self) -> Result<Context> {
        Ok(Context {
            application_id: self.application_id.clone(),
            home_dir: self.home_dir()?,
            native_library_dir: self.lib_dir()?,
        })
    }
}

/// Host Context
///
/// The value the host hands to plugin constructors declaring a `Context`
/// parameter. Plugins may keep a clone of it for the lifetime of their
/// instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Context {
    pub application_id: String,
    pub home_dir: std::path::PathBuf,
    pub native_library_dir: std::path::PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify directory creation
    //
    // All driver directories are created on first access below the
    // application home directory.
    #[test]
    fn layout_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path(), "com.example.host");

        let jar = layout.jar_dir().unwrap();
        let dex = layout.dex_dir().unwrap();
        let lib = layout.lib_dir().unwrap();

        let home = tmp.path().join("Android/data/com.example.host");
        assert_eq!(jar, home.join("driver/jar"));
        assert_eq!(dex, home.join("driver/dex"));
        assert_eq!(lib, home.join("driver/lib"));
        assert!(jar.is_dir() && dex.is_dir() && lib.is_dir());
    }

    // Verify repeated access
    //
    // Accessors must be idempotent and keep existing content in place.
    #[test]
    fn layout_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path(), "app");

        let jar = layout.jar_dir().unwrap();
        std::fs::write(jar.join("keep"), b"x").unwrap();

        assert_eq!(layout.jar_dir().unwrap(), jar);
        assert!(jar.join("keep").is_file());
    }

    // Verify failure reporting
    //
    // A regular file blocking the path makes creation fail with a
    // `ResourceMissing` error rather than a panic.
    #[test]
    fn layout_blocked_path() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Android"), b"").unwrap();
        let layout = Layout::new(tmp.path(), "app");

        let e = layout.jar_dir().unwrap_err();
        assert_eq!(e.kind(), crate::error::ErrorKind::ResourceMissing);
    }

    // Verify the host context
    //
    // The context names the application and the native library directory.
    #[test]
    fn layout_context() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path(), "app");

        let ctx = layout.context().unwrap();
        assert_eq!(ctx.application_id, "app");
        assert_eq!(ctx.native_library_dir, layout.lib_dir().unwrap());
    }
}
