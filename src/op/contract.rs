//! Contract Invocation
//!
//! The `contract` operation calls into a plugin archive through the shared
//! `DeviceInfo` contract. The implementing class is known up front by name,
//! has a constructor without parameters, and its objects expose the contract
//! via `Instance::device_info()`. No manifest is involved.

use crate::error::{Error, Result};
use crate::loader::{panic_reason, ModuleResolver};

/// Class implementing the contract in the `plugin-impl` archive.
pub const PLUGIN_IMPL_CLASS: &str = "com.shellever.plugin.PluginImpl";

/// Invoke the contract of `PLUGIN_IMPL_CLASS`.
pub fn invoke_via_contract(loader: &dyn ModuleResolver) -> Result<String> {
    invoke_via_contract_class(loader, PLUGIN_IMPL_CLASS)
}

/// Invoke the contract of the named class
///
/// Resolve `class_name` via `loader`, construct it without arguments, and
/// return the result of `DeviceInfo::get_device_info()`. A class without a
/// parameterless constructor cannot be instantiated; an object not
/// implementing the contract is a type mismatch.
pub fn invoke_via_contract_class(loader: &dyn ModuleResolver, class_name: &str) -> Result<String> {
    let class = loader.resolve(class_name)?;

    let object = class.construct(&[], &[]).map_err(|e| match e {
        Error::NoSuchConstructor { class, .. } => Error::Construction {
            class,
            reason: "no parameterless constructor".to_string(),
        },
        e => e,
    })?;

    let contract = object.instance().device_info().ok_or_else(|| Error::TypeMismatch {
        what: format!("instance of {}", class_name),
        expected: "DeviceInfo".to_string(),
        found: "no contract implementation".to_string(),
    })?;

    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| contract.get_device_info()))
        .map_err(panic_reason)
        .map_err(
            |reason| Error::Invocation {
                class: class_name.to_string(),
                method: "getDeviceInfo".to_string(),
                reason,
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::loader::{LinkedArchives, PluginLoader};
    use crate::object::{Class, DeviceInfo, Instance, Kind, Registry, Value};

    struct Impl;

    impl DeviceInfo for Impl {
        fn get_device_info(&self) -> String {
            "model: test".to_string()
        }
    }

    impl Instance for Impl {
        fn invoke(&mut self, _method: &str, _args: &[Value]) -> std::result::Result<Value, String> {
            Ok(Value::String(self.get_device_info()))
        }

        fn device_info(&self) -> Option<&dyn DeviceInfo> {
            Some(self)
        }
    }

    struct Fragile;

    impl DeviceInfo for Fragile {
        fn get_device_info(&self) -> String {
            panic!("sensor offline")
        }
    }

    impl Instance for Fragile {
        fn invoke(&mut self, _method: &str, _args: &[Value]) -> std::result::Result<Value, String> {
            Ok(Value::Void)
        }

        fn device_info(&self) -> Option<&dyn DeviceInfo> {
            Some(self)
        }
    }

    struct Plain;

    impl Instance for Plain {
        fn invoke(&mut self, _method: &str, _args: &[Value]) -> std::result::Result<Value, String> {
            Ok(Value::Void)
        }
    }

    fn impl_new(_args: &[Value]) -> std::result::Result<Box<dyn Instance>, String> {
        Ok(Box::new(Impl))
    }

    fn fragile_new(_args: &[Value]) -> std::result::Result<Box<dyn Instance>, String> {
        Ok(Box::new(Fragile))
    }

    fn plain_new(_args: &[Value]) -> std::result::Result<Box<dyn Instance>, String> {
        Ok(Box::new(Plain))
    }

    fn register(registry: &mut Registry) {
        registry.register(Class::new(PLUGIN_IMPL_CLASS).with_constructor(vec![], impl_new));
        registry.register(Class::new("test.Plain").with_constructor(vec![], plain_new));
        registry.register(Class::new("test.Fragile").with_constructor(vec![], fragile_new));
        registry.register(Class::new("test.Wide").with_constructor(vec![Kind::Context], impl_new));
        registry.register(Class::new("test.Hidden").with_private_constructor(vec![], impl_new));
    }

    fn loader(file_name: &str) -> PluginLoader {
        PluginLoader::new(
            std::path::Path::new("/nonexistent/driver/jar").join(file_name),
            "/nonexistent/driver/dex".into(),
            "/nonexistent/driver/lib".into(),
            None,
            std::sync::Arc::new(LinkedArchives::new().with_archive("impl.so", register)),
        )
    }

    // Verify contract invocation
    //
    // The result is exactly what the contract implementation returns.
    #[test]
    fn contract_result() {
        assert_eq!(invoke_via_contract(&loader("impl.so")).unwrap(), "model: test");
    }

    // Verify missing archives
    //
    // A missing archive is reported, not raised.
    #[test]
    fn contract_missing_archive() {
        let e = invoke_via_contract(&loader("absent.so")).unwrap_err();

        assert_eq!(e.kind(), ErrorKind::ResourceMissing);
    }

    // Verify contract faults
    //
    // Missing classes, missing parameterless constructors, private
    // constructors and objects without the contract each map to their own
    // error kind.
    #[test]
    fn contract_faults() {
        let l = loader("impl.so");
        let kind = |name: &str| invoke_via_contract_class(&l, name).unwrap_err().kind();

        assert_eq!(kind("test.Absent"), ErrorKind::LookupFailure);
        assert_eq!(kind("test.Wide"), ErrorKind::ConstructionFailure);
        assert_eq!(kind("test.Hidden"), ErrorKind::AccessDenied);
        assert_eq!(kind("test.Plain"), ErrorKind::TypeMismatch);
    }

    // Verify contract panics
    //
    // A panic in the contract implementation is an invocation failure that
    // carries the panic message, like panics of declared methods.
    #[test]
    fn contract_panic() {
        let e = invoke_via_contract_class(&loader("impl.so"), "test.Fragile").unwrap_err();

        assert_eq!(e.kind(), ErrorKind::InvocationFailure);
        assert!(e.to_string().contains("panicked: sensor offline"));
    }
}
