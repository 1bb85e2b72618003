//! Device Info via the Shared Contract
//!
//! A plugin archive exporting `com.shellever.plugin.PluginImpl`, which
//! implements the `DeviceInfo` contract of the host. The host constructs it
//! without arguments and calls the contract directly.

use dexload::object::{Class, DeviceInfo, Instance, Registry, Value};

pub const CLASS_NAME: &str = "com.shellever.plugin.PluginImpl";

pub struct PluginImpl;

impl DeviceInfo for PluginImpl {
    fn get_device_info(&self) -> String {
        format!(
            "os: {}\narch: {}\nfamily: {}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            std::env::consts::FAMILY,
        )
    }
}

impl Instance for PluginImpl {
    fn invoke(&mut self, method: &str, _args: &[Value]) -> Result<Value, String> {
        match method {
            "getDeviceInfo" => Ok(Value::String(self.get_device_info())),
            _ => Err(format!("unknown method {}", method)),
        }
    }

    fn device_info(&self) -> Option<&dyn DeviceInfo> {
        Some(self)
    }
}

fn construct(_args: &[Value]) -> Result<Box<dyn Instance>, String> {
    Ok(Box::new(PluginImpl))
}

/// Register the classes of this archive.
pub fn register(registry: &mut Registry) {
    registry.register(
        Class::new(CLASS_NAME)
            .with_constructor(vec![], construct)
            .with_method("getDeviceInfo", vec![], Some(dexload::object::Kind::String)),
    );
}

dexload::declare_archive!(register);
