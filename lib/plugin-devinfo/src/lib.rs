//! Device Info via the Module Manifest
//!
//! A plugin archive exporting `com.shellever.plugin.common.Common`. The host
//! knows nothing about this class but what the module manifest declares: it
//! is constructed with the host `Context`, and `getDeviceInfo` returns a
//! string.

use dexload::layout::Context;
use dexload::object::{Class, Instance, Kind, Registry, Value};

pub const CLASS_NAME: &str = "com.shellever.plugin.common.Common";

pub struct Common {
    context: Context,
}

impl Common {
    fn device_info(&self) -> String {
        format!(
            "application: {}\nhome: {}\nos: {}\narch: {}",
            self.context.application_id,
            self.context.home_dir.display(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

impl Instance for Common {
    fn invoke(&mut self, method: &str, _args: &[Value]) -> Result<Value, String> {
        match method {
            "getDeviceInfo" => Ok(Value::String(self.device_info())),
            _ => Err(format!("unknown method {}", method)),
        }
    }
}

fn construct(args: &[Value]) -> Result<Box<dyn Instance>, String> {
    match args {
        [Value::Context(v)] => Ok(Box::new(Common { context: v.clone() })),
        _ => Err("expected the host context".to_string()),
    }
}

/// Register the classes of this archive.
pub fn register(registry: &mut Registry) {
    registry.register(
        Class::new(CLASS_NAME)
            .with_constructor(vec![Kind::Context], construct)
            .with_method("getDeviceInfo", vec![], Some(Kind::String)),
    );
}

dexload::declare_archive!(register);
