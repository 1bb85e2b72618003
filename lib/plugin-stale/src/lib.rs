//! Archive Built Against a Different ABI
//!
//! Exports the entry points of a plugin archive, but reports an ABI version
//! other than the one of the host. Hosts refuse to open it, and its classes
//! are never registered.

use dexload::object::{Class, Registry};

#[no_mangle]
pub extern "C" fn dexload_abi_version() -> u32 {
    dexload::loader::ABI_VERSION + 1
}

#[no_mangle]
#[allow(improper_ctypes_definitions)]
pub extern "C" fn dexload_register(registry: &mut Registry) {
    registry.register(Class::new("com.shellever.plugin.Stale"));
}
