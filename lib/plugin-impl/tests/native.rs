//! Native Archive Loading
//!
//! Opens the dynamic libraries built from this workspace through
//! `NativeArchives`, the archive source the host application uses by
//! default.

use dexload::error::ErrorKind;
use dexload::loader::{ModuleResolver, NativeArchives, PluginLoader};
use dexload::object::{DeviceInfo, Value};

const CLASS_NAME: &str = "com.shellever.plugin.PluginImpl";

fn library_file_name(name: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX,
    )
}

// Locate a dynamic library built by cargo alongside this test. Libraries of
// dependencies end up in `deps/`, next to the test binary; the one of the
// package under test may be copied one level up.
fn built_library(name: &str) -> std::path::PathBuf {
    let file_name = library_file_name(name);
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap();

    [deps.join(&file_name), deps.parent().unwrap().join(&file_name)]
        .into_iter()
        .find(|v| v.is_file())
        .unwrap_or_else(|| panic!("{} was not built next to {:?}", file_name, exe))
}

fn expected_device_info() -> String {
    format!(
        "os: {}\narch: {}\nfamily: {}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::consts::FAMILY,
    )
}

// Copy the built library `name` into `<root>/jar/` and create a native
// loader for it.
fn native_loader(root: &std::path::Path, name: &str) -> PluginLoader {
    let jar = root.join("jar");
    let dex = root.join("dex");
    let lib = root.join("lib");
    for dir in [&jar, &dex, &lib] {
        std::fs::create_dir_all(dir).unwrap();
    }

    let archive = jar.join(library_file_name(name));
    std::fs::copy(built_library(name), &archive).unwrap();

    PluginLoader::new(archive, dex, lib, None, std::sync::Arc::new(NativeArchives))
}

// Verify the host application
//
// With the built archive placed into the archive directory, the default
// host setup reaches the contract implementation. The archive is staged
// into the optimized directory unmodified.
#[test]
fn native_app_contract() {
    let tmp = tempfile::tempdir().unwrap();
    let config = dexload::config::Config::default()
        .with_storage_root(tmp.path().to_string_lossy().into_owned());
    let app = dexload::app::App::new(config);
    let layout = app.config().layout();
    let archive = layout.jar_dir().unwrap().join(app.config().contract_archive());

    std::fs::copy(built_library("plugin_impl"), &archive).unwrap();

    assert_eq!(app.run_contract().unwrap(), expected_device_info());

    let staged = layout.dex_dir().unwrap().join(app.config().contract_archive());
    assert_eq!(std::fs::read(staged).unwrap(), std::fs::read(&archive).unwrap());
}

// Verify library lifetime
//
// Classes are registered across the library boundary, and objects keep the
// library loaded after the loader and its classes are gone.
#[test]
fn native_object_outlives_loader() {
    let tmp = tempfile::tempdir().unwrap();
    let loader = native_loader(tmp.path(), "plugin_impl");

    let class = loader.resolve(CLASS_NAME).unwrap();
    assert!(class.archive().is_native());
    assert!(class.archive().registry().contains(CLASS_NAME));

    let mut object = class.construct(&[], &[]).unwrap();
    drop(class);
    drop(loader);

    assert_eq!(
        object.call("getDeviceInfo", &[], &[]).unwrap(),
        Value::String(expected_device_info()),
    );
    assert_eq!(
        object.instance().device_info().unwrap().get_device_info(),
        expected_device_info(),
    );
}

// Verify ABI versioning
//
// An archive reporting a different ABI version is refused before any of
// its classes are registered.
#[test]
fn native_abi_mismatch() {
    let tmp = tempfile::tempdir().unwrap();
    let loader = native_loader(tmp.path(), "plugin_stale");

    let e = loader.resolve("com.shellever.plugin.Stale").unwrap_err();

    assert_eq!(e.kind(), ErrorKind::ResourceMissing);
    assert!(e.to_string().contains("ABI version"), "{}", e);
    assert!(loader.archive().is_err());
}
