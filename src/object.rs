//! Plugin Object Model
//!
//! Archives do not expose arbitrary code. Instead, every archive registers a
//! set of class descriptors with a `Registry`. A descriptor names the class,
//! lists its constructors and methods together with the kinds of their
//! parameters and results, and carries the constructor entry points. Objects
//! created through a constructor implement `Instance`, which dispatches
//! method calls by name.
//!
//! Invokers never call into a class blindly. They first select a member by
//! its declared signature, check the actual values against it, and only then
//! run plugin code.

use crate::layout::Context;

/// Value Kind
///
/// The closed set of kinds parameters and results can have. Manifests name
/// kinds via textual tags (see `Kind::from_tag()`). Tags that are not
/// recognized map to `Kind::Unknown`, which never matches any declared
/// signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Context,
    String,
    Integer,
    StringArray,
    ByteArray,
    Unknown(String),
}

impl Kind {
    /// Map a manifest tag to its kind
    ///
    /// This is total: unrecognized tags yield `Kind::Unknown` carrying the
    /// original tag.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Context" => Kind::Context,
            "String" => Kind::String,
            "Int" => Kind::Integer,
            "StringArray" => Kind::StringArray,
            "ByteArray" => Kind::ByteArray,
            v => Kind::Unknown(v.to_string()),
        }
    }

    /// Map an argument specification to a sequence of kinds
    ///
    /// The specification is a whitespace separated list of tags. A missing or
    /// empty specification means no parameters.
    pub fn parse_spec(spec: Option<&str>) -> Vec<Self> {
        spec.map(|v| v.split_whitespace().map(Self::from_tag).collect())
            .unwrap_or_default()
    }

    /// Return the manifest tag of this kind.
    pub fn as_tag(&self) -> &str {
        match self {
            Kind::Context => "Context",
            Kind::String => "String",
            Kind::Integer => "Int",
            Kind::StringArray => "StringArray",
            Kind::ByteArray => "ByteArray",
            Kind::Unknown(v) => v.as_str(),
        }
    }

    /// Check whether a declared kind matches a requested one
    ///
    /// Unlike `==`, an unknown kind matches nothing, not even another unknown
    /// kind with the same tag.
    pub fn matches(&self, other: &Kind) -> bool {
        !matches!(self, Kind::Unknown(_)) && self == other
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Unknown(v) => write!(f, "?{}", v),
            v => f.write_str(v.as_tag()),
        }
    }
}

/// Render a parameter list for messages.
pub fn format_params(params: &[Kind]) -> String {
    params
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// Compare a declared parameter list with a requested one.
fn params_match(declared: &[Kind], wanted: &[Kind]) -> bool {
    declared.len() == wanted.len()
        && declared.iter().zip(wanted).all(|(a, b)| a.matches(b))
}

/// Runtime Value
///
/// Values passed to constructors and methods, and returned from methods.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Context(Context),
    String(String),
    Integer(i32),
    StringArray(Vec<String>),
    ByteArray(Vec<u8>),
    Void,
}

impl Value {
    /// Return the kind of this value, or `None` for `Value::Void`.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Value::Context(_) => Some(Kind::Context),
            Value::String(_) => Some(Kind::String),
            Value::Integer(_) => Some(Kind::Integer),
            Value::StringArray(_) => Some(Kind::StringArray),
            Value::ByteArray(_) => Some(Kind::ByteArray),
            Value::Void => None,
        }
    }

    /// Name of the kind of this value, for messages.
    pub fn kind_name(&self) -> String {
        self.kind()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "Void".to_string())
    }
}

/// Shared Capability Contract
///
/// Plugins implementing this contract can be called directly, without going
/// through a manifest.
pub trait DeviceInfo {
    fn get_device_info(&self) -> String;
}

/// Plugin Object
///
/// Implemented by every object a plugin constructor returns. Method
/// dispatch is by name; the invoker has already checked the name and the
/// arguments against the class descriptor before `invoke()` is called.
pub trait Instance {
    /// Invoke the named method with the given arguments.
    fn invoke(&mut self, method: &str, args: &[Value]) -> Result<Value, String>;

    /// Return the shared capability contract, if this object implements it.
    fn device_info(&self) -> Option<&dyn DeviceInfo> {
        None
    }
}

/// Constructor entry point of a class.
pub type ConstructFn = fn(args: &[Value]) -> Result<Box<dyn Instance>, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// Constructor Descriptor
#[derive(Clone)]
pub struct Constructor {
    pub params: Vec<Kind>,
    pub visibility: Visibility,
    pub construct: ConstructFn,
}

impl std::fmt::Debug for Constructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constructor")
            .field("params", &self.params)
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

/// Method Descriptor
///
/// `returns` is `None` for methods without a result.
#[derive(Clone, Debug)]
pub struct Method {
    pub name: String,
    pub params: Vec<Kind>,
    pub returns: Option<Kind>,
    pub visibility: Visibility,
}

/// Class Descriptor
///
/// Built by plugins via the `with_*()` builder methods and registered with
/// a `Registry`.
#[derive(Clone, Debug)]
pub struct Class {
    pub name: String,
    pub constructors: Vec<Constructor>,
    pub methods: Vec<Method>,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructors: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_constructor(mut self, params: Vec<Kind>, construct: ConstructFn) -> Self {
        self.constructors.push(Constructor {
            params,
            visibility: Visibility::Public,
            construct,
        });
        self
    }

    pub fn with_private_constructor(mut self, params: Vec<Kind>, construct: ConstructFn) -> Self {
        self.constructors.push(Constructor {
            params,
            visibility: Visibility::Private,
            construct,
        });
        self
    }

    pub fn with_method(
        mut self,
        name: impl Into<String>,
        params: Vec<Kind>,
        returns: Option<Kind>,
    ) -> Self {
        self.methods.push(Method {
            name: name.into(),
            params,
            returns,
            visibility: Visibility::Public,
        });
        self
    }

    pub fn with_private_method(
        mut self,
        name: impl Into<String>,
        params: Vec<Kind>,
        returns: Option<Kind>,
    ) -> Self {
        self.methods.push(Method {
            name: name.into(),
            params,
            returns,
            visibility: Visibility::Private,
        });
        self
    }

    /// Find the constructor declaring exactly the given parameters.
    pub fn constructor(&self, params: &[Kind]) -> Option<&Constructor> {
        self.constructors
            .iter()
            .find(|v| params_match(&v.params, params))
    }

    /// Find the method with the given name declaring exactly the given
    /// parameters.
    pub fn method(&self, name: &str, params: &[Kind]) -> Option<&Method> {
        self.methods
            .iter()
            .find(|v| v.name == name && params_match(&v.params, params))
    }
}

/// Class Registry
///
/// Map of fully-qualified class names to descriptors. Archives fill a
/// registry from their registration entry point; the host keeps one for its
/// own classes.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    classes: std::collections::BTreeMap<String, Class>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class
    ///
    /// A class previously registered under the same name is replaced and
    /// returned.
    pub fn register(&mut self, class: Class) -> Option<Class> {
        self.classes.insert(class.name.clone(), class)
    }

    pub fn get(&self, name: &str) -> Option<&Class> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(|v| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
