//! Plugin Resolution
//!
//! A plugin archive is a dynamic library that exports two symbols:
//!
//!  * `dexload_abi_version() -> u32` returning `ABI_VERSION` of the
//!    `dexload` release the archive was built against, and
//!  * `dexload_register(&mut Registry)` registering all classes of the
//!    archive.
//!
//! Both are generated by the `declare_archive!()` macro. Archives must be
//! built with the same compiler as the host, since class descriptors and
//! plugin objects cross the library boundary as plain Rust types.
//!
//! A `PluginLoader` is bound to one archive path and resolves class names
//! against the classes of that archive first, and against its parent
//! resolver second. How archives are opened is up to the `ArchiveSource` the
//! loader is created with: `NativeArchives` loads dynamic libraries from
//! disk, `LinkedArchives` serves archives linked into the host.
//!
//! Every class and object handed out keeps its archive alive. A dynamic
//! library is thus never unloaded while code from it can still run.

use crate::error::{Error, Result};
use crate::object::{format_params, Class, Instance, Kind, Registry, Value, Visibility};

/// Plugin ABI version
///
/// Bumped whenever the object model changes incompatibly. Archives exporting
/// a different version are refused.
pub const ABI_VERSION: u32 = 1;

/// Name of the exported ABI version symbol.
pub const SYMBOL_ABI_VERSION: &[u8] = b"dexload_abi_version";

/// Name of the exported registration symbol.
pub const SYMBOL_REGISTER: &[u8] = b"dexload_register";

type AbiVersionFn = unsafe extern "C" fn() -> u32;
type RegisterFn = unsafe extern "C" fn(registry: &mut Registry);

/// Declare the entry points of a plugin archive
///
/// Takes the path of a `fn(&mut Registry)` registering the classes of the
/// archive, and exports the symbols the loader looks for:
///
/// ```ignore
/// fn register(registry: &mut dexload::object::Registry) {
///     registry.register(dexload::object::Class::new("com.example.Impl"));
/// }
///
/// dexload::declare_archive!(register);
/// ```
#[macro_export]
macro_rules! declare_archive {
    ($register:path) => {
        #[no_mangle]
        pub extern "C" fn dexload_abi_version() -> u32 {
            $crate::loader::ABI_VERSION
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn dexload_register(registry: &mut $crate::object::Registry) {
            $register(registry)
        }
    };
}

// Opened archive. The registry is declared first so it is dropped before the
// library it was filled from.
#[derive(Debug)]
struct ArchiveInner {
    registry: Registry,
    library: Option<libloading::Library>,
}

/// Opened Archive
///
/// A shared handle to the classes of one archive. Clones refer to the same
/// archive; the archive is closed when the last clone, and the last class or
/// object obtained from it, is dropped.
#[derive(Clone, Debug)]
pub struct Archive {
    inner: std::sync::Arc<ArchiveInner>,
}

impl Archive {
    /// Create an archive from classes linked into the host.
    pub fn linked(registry: Registry) -> Self {
        Self {
            inner: std::sync::Arc::new(ArchiveInner {
                registry,
                library: None,
            }),
        }
    }

    fn native(registry: Registry, library: libloading::Library) -> Self {
        Self {
            inner: std::sync::Arc::new(ArchiveInner {
                registry,
                library: Some(library),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Whether the archive is backed by a dynamic library.
    pub fn is_native(&self) -> bool {
        self.inner.library.is_some()
    }
}

/// Module Resolver
///
/// Capability to materialize classes by fully-qualified name.
pub trait ModuleResolver {
    fn resolve(&self, name: &str) -> Result<ClassRef>;
}

impl ModuleResolver for Archive {
    fn resolve(&self, name: &str) -> Result<ClassRef> {
        self.inner
            .registry
            .get(name)
            .map(|_| ClassRef {
                archive: self.clone(),
                name: name.to_string(),
            })
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))
    }
}

// Render a caught panic payload.
pub(crate) fn panic_reason(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(v) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", v)
    } else if let Some(v) = payload.downcast_ref::<String>() {
        format!("panicked: {}", v)
    } else {
        "panicked".to_string()
    }
}

// Verify that the actual values fit the declared parameters.
fn check_args(what: String, params: &[Kind], args: &[Value]) -> Result<()> {
    let fits = params.len() == args.len()
        && params
            .iter()
            .zip(args)
            .all(|(p, a)| a.kind().map_or(false, |v| p.matches(&v)));

    if fits {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            what,
            expected: format!("({})", format_params(params)),
            found: format!(
                "({})",
                args.iter()
                    .map(|v| v.kind_name())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        })
    }
}

/// Resolved Class
///
/// A class of an opened archive. Keeps the archive alive.
#[derive(Clone, Debug)]
pub struct ClassRef {
    archive: Archive,
    name: String,
}

impl ClassRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the class descriptor.
    pub fn class(&self) -> &Class {
        // `ClassRef`s are only created for registered classes, and
        // registries of opened archives are immutable.
        match self.archive.registry().get(&self.name) {
            Some(v) => v,
            None => unreachable!("class vanished from an opened archive"),
        }
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Construct an instance
    ///
    /// Select the constructor declaring exactly `params`, check that `args`
    /// fit it, and run it. Panics of the constructor are caught and reported
    /// as construction failures.
    pub fn construct(&self, params: &[Kind], args: &[Value]) -> Result<Object> {
        let class = self.class();
        let ctor = class.constructor(params).ok_or_else(|| Error::NoSuchConstructor {
            class: self.name.clone(),
            params: format_params(params),
        })?;

        if ctor.visibility != Visibility::Public {
            return Err(Error::AccessDenied {
                class: self.name.clone(),
                member: format!("<init>({})", format_params(params)),
            });
        }

        check_args(format!("constructor of {}", self.name), &ctor.params, args)?;

        log::debug!("Constructing {}({})", self.name, format_params(params));

        let construct = ctor.construct;
        let instance = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| construct(args)))
            .map_err(panic_reason)
            .and_then(|v| v)
            .map_err(
                |reason| Error::Construction { class: self.name.clone(), reason },
            )?;

        Ok(Object {
            instance,
            class: self.clone(),
        })
    }
}

/// Plugin Object
///
/// An instance constructed from a resolved class. The instance is dropped
/// before the class, and thus before its archive may close.
pub struct Object {
    instance: Box<dyn Instance>,
    class: ClassRef,
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class.name)
            .finish_non_exhaustive()
    }
}

impl Object {
    /// Return the runtime class of the object.
    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn instance(&self) -> &dyn Instance {
        self.instance.as_ref()
    }

    /// Call a method
    ///
    /// Select the method `name` declaring exactly `params` on the runtime
    /// class, check that `args` fit it, and invoke it. The returned value is
    /// checked against the declared result kind. Panics of the method are
    /// caught and reported as invocation failures.
    pub fn call(&mut self, name: &str, params: &[Kind], args: &[Value]) -> Result<Value> {
        let class_name = self.class.name.clone();
        let method = self
            .class
            .class()
            .method(name, params)
            .ok_or_else(|| Error::NoSuchMethod {
                class: class_name.clone(),
                method: name.to_string(),
                params: format_params(params),
            })?
            .clone();

        if method.visibility != Visibility::Public {
            return Err(Error::AccessDenied {
                class: class_name,
                member: format!("{}({})", name, format_params(params)),
            });
        }

        check_args(format!("{}.{}", class_name, name), &method.params, args)?;

        log::debug!("Invoking {}.{}({})", class_name, name, format_params(params));

        let instance = &mut self.instance;
        let value = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| instance.invoke(name, args)))
            .map_err(panic_reason)
            .and_then(|v| v)
            .map_err(
                |reason| Error::Invocation {
                    class: class_name.clone(),
                    method: name.to_string(),
                    reason,
                },
            )?;

        if value.kind() != method.returns {
            return Err(Error::TypeMismatch {
                what: format!("result of {}.{}", class_name, name),
                expected: method
                    .returns
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "Void".to_string()),
                found: value.kind_name(),
            });
        }

        Ok(value)
    }
}

/// Archive Source
///
/// Opens the archive at a path. `optimized_dir` is a directory the source
/// may use to stage artifacts derived from the archive.
pub trait ArchiveSource {
    fn open(&self, path: &std::path::Path, optimized_dir: &std::path::Path) -> Result<Archive>;
}

// Stage an archive into the optimized directory
//
// Copy the archive to `<optimized_dir>/<file-name>`, but only if the staged
// copy does not already match. The copy is written to a temporary file and
// renamed into place, so a staged copy that is currently mapped by the
// process is never modified in place.
fn stage_archive(
    path: &std::path::Path,
    optimized_dir: &std::path::Path,
) -> Result<std::path::PathBuf> {
    let content = match std::fs::read(path) {
        Ok(v) => v,
        Err(v) if v.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ArchiveMissing(path.to_path_buf()));
        },
        Err(v) => {
            return Err(Error::ArchiveOpen {
                path: path.to_path_buf(),
                reason: v.to_string(),
            });
        },
    };

    let file_name = path.file_name().ok_or_else(|| Error::ArchiveMissing(path.to_path_buf()))?;
    let staged = optimized_dir.join(file_name);

    if std::fs::read(&staged).map_or(false, |old| old == content) {
        return Ok(staged);
    }

    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = optimized_dir.join(tmp_name);

    std::fs::write(&tmp, &content)
        .and_then(|_| std::fs::rename(&tmp, &staged))
        .map_err(
            |v| Error::ArchiveOpen { path: staged.clone(), reason: v.to_string() },
        )?;

    log::debug!("Staged {:?} as {:?}", path, staged);

    Ok(staged)
}

/// Dynamic Library Archives
///
/// Opens archives as dynamic libraries via `libloading`. The archive is
/// staged into the optimized directory first and the staged copy is loaded,
/// so the original may be replaced while it is in use.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeArchives;

impl ArchiveSource for NativeArchives {
    fn open(&self, path: &std::path::Path, optimized_dir: &std::path::Path) -> Result<Archive> {
        let staged = stage_archive(path, optimized_dir)?;
        let open_error = |reason: String| Error::ArchiveOpen {
            path: path.to_path_buf(),
            reason,
        };

        // Loading runs the initializers of the library. Archives are trusted
        // code placed by the deployer.
        let library = unsafe { libloading::Library::new(&staged) }
            .map_err(|v| open_error(v.to_string()))?;

        let mut registry = Registry::new();
        {
            let version = unsafe { library.get::<AbiVersionFn>(SYMBOL_ABI_VERSION) }
                .map_err(|v| open_error(v.to_string()))?;
            let version = unsafe { version() };
            if version != ABI_VERSION {
                return Err(open_error(format!(
                    "ABI version {} is not supported (expected {})",
                    version, ABI_VERSION,
                )));
            }

            let register = unsafe { library.get::<RegisterFn>(SYMBOL_REGISTER) }
                .map_err(|v| open_error(v.to_string()))?;
            unsafe { register(&mut registry) };
        }

        log::debug!("Opened archive {:?} with {} classes", path, registry.len());

        Ok(Archive::native(registry, library))
    }
}

/// Linked Archives
///
/// Serves archives whose classes are linked into the host. Archives are
/// registered by file name; the directory part of the requested path is
/// ignored. Nothing is staged.
#[derive(Clone, Default)]
pub struct LinkedArchives {
    archives: std::collections::BTreeMap<std::ffi::OsString, fn(&mut Registry)>,
}

impl LinkedArchives {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the archive `file_name` with the classes `register` registers.
    pub fn with_archive(mut self, file_name: &str, register: fn(&mut Registry)) -> Self {
        self.archives.insert(file_name.into(), register);
        self
    }
}

impl ArchiveSource for LinkedArchives {
    fn open(&self, path: &std::path::Path, _optimized_dir: &std::path::Path) -> Result<Archive> {
        let register = path
            .file_name()
            .and_then(|v| self.archives.get(v))
            .ok_or_else(|| Error::ArchiveMissing(path.to_path_buf()))?;

        let mut registry = Registry::new();
        register(&mut registry);
        Ok(Archive::linked(registry))
    }
}

/// Plugin Loader
///
/// Resolves classes of one archive, falling back to a parent resolver. The
/// archive is opened on first resolution, not on construction, so a loader
/// can be created for an archive that does not exist (yet). Once opened, the
/// archive stays open for the lifetime of the loader.
pub struct PluginLoader {
    archive_path: std::path::PathBuf,
    optimized_dir: std::path::PathBuf,
    native_library_dir: std::path::PathBuf,
    parent: Option<std::sync::Arc<dyn ModuleResolver>>,
    source: std::sync::Arc<dyn ArchiveSource>,
    archive: std::cell::OnceCell<Archive>,
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("archive_path", &self.archive_path)
            .field("optimized_dir", &self.optimized_dir)
            .field("native_library_dir", &self.native_library_dir)
            .field("archive", &self.archive)
            .finish_non_exhaustive()
    }
}

impl PluginLoader {
    pub fn new(
        archive_path: std::path::PathBuf,
        optimized_dir: std::path::PathBuf,
        native_library_dir: std::path::PathBuf,
        parent: Option<std::sync::Arc<dyn ModuleResolver>>,
        source: std::sync::Arc<dyn ArchiveSource>,
    ) -> Self {
        Self {
            archive_path,
            optimized_dir,
            native_library_dir,
            parent,
            source,
            archive: std::cell::OnceCell::new(),
        }
    }

    pub fn archive_path(&self) -> &std::path::Path {
        &self.archive_path
    }

    pub fn optimized_dir(&self) -> &std::path::Path {
        &self.optimized_dir
    }

    /// Directory for native libraries the archive depends on
    ///
    /// The loader does not search it. It reaches plugins through
    /// `Context::native_library_dir`, and plugins open their dependencies
    /// from there themselves.
    pub fn native_library_dir(&self) -> &std::path::Path {
        &self.native_library_dir
    }

    /// Return the archive, opening it if necessary.
    pub fn archive(&self) -> Result<&Archive> {
        if let Some(v) = self.archive.get() {
            return Ok(v);
        }

        let archive = self.source.open(&self.archive_path, &self.optimized_dir)?;
        Ok(self.archive.get_or_init(|| archive))
    }
}

impl ModuleResolver for PluginLoader {
    fn resolve(&self, name: &str) -> Result<ClassRef> {
        // Errors of the archive take precedence over the parent not knowing
        // the class, so a missing archive is reported as such.
        let error = match self.archive().and_then(|v| v.resolve(name)) {
            Ok(v) => return Ok(v),
            Err(v) => v,
        };

        if let Some(parent) = &self.parent {
            if let Ok(v) = parent.resolve(name) {
                log::debug!("Resolved {} via parent of {:?}", name, self.archive_path);
                return Ok(v);
            }
        }

        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Probe {
        greeting: String,
    }

    impl Instance for Probe {
        fn invoke(&mut self, method: &str, _args: &[Value]) -> std::result::Result<Value, String> {
            match method {
                "greet" => Ok(Value::String(self.greeting.clone())),
                "count" => Ok(Value::Integer(7)),
                "lie" => Ok(Value::Integer(0)),
                "fail" => Err("refused".to_string()),
                "explode" => panic!("boom"),
                _ => Ok(Value::Void),
            }
        }
    }

    fn probe_new(args: &[Value]) -> std::result::Result<Box<dyn Instance>, String> {
        let greeting = match args.first() {
            Some(Value::String(v)) => v.clone(),
            _ => "hello".to_string(),
        };
        Ok(Box::new(Probe { greeting }))
    }

    fn probe_fail(_args: &[Value]) -> std::result::Result<Box<dyn Instance>, String> {
        Err("no resources".to_string())
    }

    fn register_probe(registry: &mut Registry) {
        registry.register(
            Class::new("test.Probe")
                .with_constructor(vec![], probe_new)
                .with_constructor(vec![Kind::String], probe_new)
                .with_private_constructor(vec![Kind::Integer], probe_new)
                .with_constructor(vec![Kind::ByteArray], probe_fail)
                .with_method("greet", vec![], Some(Kind::String))
                .with_method("count", vec![], Some(Kind::Integer))
                .with_method("lie", vec![], Some(Kind::String))
                .with_method("fail", vec![], None)
                .with_method("explode", vec![], None)
                .with_private_method("secret", vec![], None),
        );
    }

    fn register_host(registry: &mut Registry) {
        registry.register(Class::new("host.Util").with_constructor(vec![], probe_new));
    }

    fn loader(file_name: &str, parent: Option<Archive>) -> PluginLoader {
        let source = LinkedArchives::new().with_archive("probe.so", register_probe);
        PluginLoader::new(
            std::path::Path::new("/nonexistent/jar").join(file_name),
            "/nonexistent/dex".into(),
            "/nonexistent/lib".into(),
            parent.map(|v| std::sync::Arc::new(v) as std::sync::Arc<dyn ModuleResolver>),
            std::sync::Arc::new(source),
        )
    }

    fn host() -> Archive {
        let mut registry = Registry::new();
        register_host(&mut registry);
        Archive::linked(registry)
    }

    // Verify resolution through the archive
    //
    // Classes of the archive resolve; unknown classes are lookup failures.
    #[test]
    fn loader_resolve() {
        let l = loader("probe.so", None);

        assert_eq!(l.resolve("test.Probe").unwrap().name(), "test.Probe");
        assert_eq!(
            l.resolve("test.Missing").unwrap_err().kind(),
            ErrorKind::LookupFailure,
        );
        assert!(!l.archive().unwrap().is_native());
    }

    // Verify parent fallback
    //
    // Classes not found in the archive are resolved via the parent.
    #[test]
    fn loader_parent_fallback() {
        let l = loader("probe.so", Some(host()));

        assert_eq!(l.resolve("host.Util").unwrap().name(), "host.Util");
        assert_eq!(l.resolve("test.Probe").unwrap().name(), "test.Probe");
    }

    // Verify missing archives
    //
    // A loader for a missing archive can be created. Resolution reports the
    // missing archive, even if the parent is consulted first.
    #[test]
    fn loader_missing_archive() {
        let l = loader("absent.so", Some(host()));

        assert_eq!(
            l.resolve("test.Probe").unwrap_err().kind(),
            ErrorKind::ResourceMissing,
        );
        assert_eq!(l.resolve("host.Util").unwrap().name(), "host.Util");
    }

    // Verify construction
    //
    // Constructors are selected by their declared parameters and run with
    // the actual arguments.
    #[test]
    fn class_construct() {
        let l = loader("probe.so", None);
        let c = l.resolve("test.Probe").unwrap();

        let mut o = c
            .construct(&[Kind::String], &[Value::String("hi".to_string())])
            .unwrap();
        assert_eq!(o.call("greet", &[], &[]).unwrap(), Value::String("hi".to_string()));
        assert_eq!(o.class().name(), "test.Probe");
    }

    // Verify construction faults
    //
    // Unknown signatures, private constructors, unfitting arguments and
    // failing constructors each map to their own error kind.
    #[test]
    fn class_construct_faults() {
        let l = loader("probe.so", None);
        let c = l.resolve("test.Probe").unwrap();

        let kind = |params: &[Kind], args: &[Value]| c.construct(params, args).unwrap_err().kind();

        assert_eq!(kind(&[Kind::Context], &[]), ErrorKind::LookupFailure);
        assert_eq!(kind(&[Kind::Integer], &[Value::Integer(1)]), ErrorKind::AccessDenied);
        assert_eq!(kind(&[Kind::String], &[]), ErrorKind::TypeMismatch);
        assert_eq!(kind(&[Kind::String], &[Value::Integer(1)]), ErrorKind::TypeMismatch);
        assert_eq!(
            kind(&[Kind::ByteArray], &[Value::ByteArray(vec![])]),
            ErrorKind::ConstructionFailure,
        );
    }

    // Verify invocation faults
    //
    // Faults raised by, or detected around, plugin methods are reported and
    // never unwind into the caller.
    #[test]
    fn object_call_faults() {
        let l = loader("probe.so", None);
        let mut o = l.resolve("test.Probe").unwrap().construct(&[], &[]).unwrap();

        let mut kind = |name: &str, params: &[Kind], args: &[Value]| {
            o.call(name, params, args).unwrap_err().kind()
        };

        assert_eq!(kind("nope", &[], &[]), ErrorKind::LookupFailure);
        assert_eq!(kind("secret", &[], &[]), ErrorKind::AccessDenied);
        assert_eq!(kind("fail", &[], &[]), ErrorKind::InvocationFailure);
        assert_eq!(kind("explode", &[], &[]), ErrorKind::InvocationFailure);
        assert_eq!(kind("lie", &[], &[]), ErrorKind::TypeMismatch);
        assert_eq!(o.call("count", &[], &[]).unwrap(), Value::Integer(7));
    }

    // Verify staging
    //
    // Archives are copied into the optimized directory, and rewritten only
    // when their content changes. Missing archives are reported as such.
    #[test]
    fn stage_archive_copies() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("jar");
        let dex = tmp.path().join("dex");
        std::fs::create_dir_all(&jar).unwrap();
        std::fs::create_dir_all(&dex).unwrap();

        let e = stage_archive(&jar.join("a.so"), &dex).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::ResourceMissing);

        std::fs::write(jar.join("a.so"), b"one").unwrap();
        let staged = stage_archive(&jar.join("a.so"), &dex).unwrap();
        assert_eq!(staged, dex.join("a.so"));
        assert_eq!(std::fs::read(&staged).unwrap(), b"one");

        std::fs::write(jar.join("a.so"), b"two").unwrap();
        stage_archive(&jar.join("a.so"), &dex).unwrap();
        assert_eq!(std::fs::read(&staged).unwrap(), b"two");
        assert!(!dex.join("a.so.tmp").exists());
    }

    // Verify native archive failures
    //
    // A file that is not a loadable library is reported as an unusable
    // resource, not a crash.
    #[test]
    fn native_archive_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let dex = tmp.path().join("dex");
        let path = tmp.path().join("bogus.so");
        std::fs::create_dir_all(&dex).unwrap();
        std::fs::write(&path, b"not a library").unwrap();

        let e = NativeArchives.open(&path, &dex);
        assert_eq!(e.unwrap_err().kind(), ErrorKind::ResourceMissing);
    }
}
