//! Dynamic Plugin Archive Loading
//!
//! The dexload crate lets a host application load pre-built plugin archives
//! at runtime and call into them. Archives are dynamic libraries placed into
//! the private storage of the host. They are not linked against the host,
//! and the host does not know their classes at compile time.
//!
//! Model
//! -----
//!
//! An archive registers class descriptors with a registry when it is opened.
//! A descriptor names a class, the parameters of its constructors, and the
//! names, parameters and result kinds of its methods. The host resolves
//! classes by name through a `PluginLoader`, which is bound to one archive
//! and falls back to the classes of the host itself.
//!
//! Two styles of binding are supported:
//!
//!  * **Contract**: the host knows the name of a class implementing the
//!    shared `DeviceInfo` contract. It constructs the class without
//!    arguments and calls the contract directly. See `op::contract`.
//!
//!  * **Declared**: the host reads a module manifest naming the class of a
//!    module, the constructor to use, and the method to call. It constructs
//!    the class with its `Context` and invokes the method. Nothing but the
//!    manifest is known up front. See `op::declared`.
//!
//! In both styles signatures are checked before plugin code runs, and
//! faults raised by plugin code are caught and reported as errors. The host
//! application (`app`) runs both styles on activation, logs failures, and
//! never fails itself.
//!
//! Storage
//! -------
//!
//! Archives live in `<root>/Android/data/<application-id>/driver/jar/`.
//! Opened archives are staged into `driver/dex/`, and native libraries the
//! plugins depend on go into `driver/lib/`. See `layout` for details.
//!
//! Plugins
//! -------
//!
//! Plugin archives are `cdylib` crates depending on this crate. They build
//! class descriptors from `object` and export them via
//! `declare_archive!()`. The workspace contains two demo archives,
//! `plugin-impl` for the contract style and `plugin-devinfo` for the
//! declared style.

pub mod app;
pub mod config;
pub mod error;
pub mod layout;
pub mod loader;
pub mod manifest;
pub mod object;

/// Invocation Operations
///
/// The `op` module is a collection of the ways the host can call into a
/// plugin archive. Each operation is implemented in a submodule and can be
/// used independently.
pub mod op {
    pub mod contract;
    pub mod declared;
}

pub use error::{Error, ErrorKind, Result};
