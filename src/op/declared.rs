//! Declared Invocation
//!
//! The `declared` operation calls into a plugin archive without compile-time
//! knowledge of its classes. The module manifest names the class
//! implementing a module, the parameters of the constructor to use, and the
//! name and parameters of the method to call. The operation materializes an
//! instance of the class and invokes the method on it.
//!
//! The host always passes exactly one constructor argument, its `Context`,
//! and no method arguments. Signatures declaring something else are refused
//! with a type mismatch before any plugin code runs.

use crate::error::{Error, Result};
use crate::layout::Context;
use crate::loader::ModuleResolver;
use crate::manifest::Table;
use crate::object::{Kind, Value};

/// Invoke a declared module function
///
/// Look up the module `module_key` and its function `function_suffix` in the
/// manifest table, resolve the module class via `loader`, construct it with
/// the host context, and call the function without arguments.
///
/// If the function is declared to return a string, the string is returned.
/// Results of any other kind are discarded and `None` is returned.
pub fn invoke_declared(
    loader: &dyn ModuleResolver,
    table: &Table,
    module_key: &str,
    function_suffix: &str,
    context: &Context,
) -> Result<Option<String>> {
    let module = table
        .module(module_key)
        .ok_or_else(|| Error::EntryMissing(module_key.to_string()))?;
    let function = table
        .function(module_key, function_suffix)
        .ok_or_else(|| Error::EntryMissing(format!("{}{}", module_key, function_suffix)))?;

    log::debug!("Module {} is implemented by {}", module_key, module.name);
    log::debug!("Function {}{} is {}", module_key, function_suffix, function.name);

    let ctor_params = Kind::parse_spec(module.args.as_deref());
    let method_params = Kind::parse_spec(function.args.as_deref());

    let class = loader.resolve(&module.name)?;
    let mut object = class.construct(&ctor_params, &[Value::Context(context.clone())])?;

    match object.call(&function.name, &method_params, &[])? {
        Value::String(v) => Ok(Some(v)),
        _ => Ok(None),
    }
}
