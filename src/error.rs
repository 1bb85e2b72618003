//! Loader Errors
//!
//! This is the exhaustive list of errors raised while resolving archives,
//! parsing manifests, and materializing or invoking plugin objects. Every
//! error maps onto one coarse `ErrorKind`, which is what callers are expected
//! to branch on. The fine-grained variants carry the names involved, so the
//! rendered message is useful in logs.

/// Error Classification
///
/// Coarse classification of `Error`. This is a closed set; each error
/// variant maps to exactly one kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// An archive, directory or file is absent or cannot be opened.
    ResourceMissing,
    /// A manifest entry, class, constructor or method is not found.
    LookupFailure,
    /// A class member exists but is not accessible.
    AccessDenied,
    /// Instantiating a class failed.
    ConstructionFailure,
    /// The invoked plugin code reported a fault.
    InvocationFailure,
    /// Actual values do not fit the declared signature or contract.
    TypeMismatch,
    /// The manifest is malformed.
    ManifestParseFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Creation of the directory at the specified path failed.
    #[error("cannot create directory {0:?}")]
    DirectoryCreation(std::path::PathBuf),
    /// Reading the file at the specified path failed.
    #[error("cannot read {path:?}: {source}")]
    FileRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    /// The archive does not exist.
    #[error("archive {0:?} not found")]
    ArchiveMissing(std::path::PathBuf),
    /// The archive exists but cannot be staged or opened.
    #[error("cannot open archive {path:?}: {reason}")]
    ArchiveOpen {
        path: std::path::PathBuf,
        reason: String,
    },
    /// The manifest has no entry under the given key.
    #[error("manifest has no entry {0:?}")]
    EntryMissing(String),
    /// No resolver in the chain knows the class.
    #[error("class {0:?} not found")]
    ClassNotFound(String),
    /// The class has no constructor with the given parameters.
    #[error("no constructor {class}({params})")]
    NoSuchConstructor {
        class: String,
        params: String,
    },
    /// The class has no method with the given name and parameters.
    #[error("no method {class}.{method}({params})")]
    NoSuchMethod {
        class: String,
        method: String,
        params: String,
    },
    /// The class member is not public.
    #[error("{class}.{member} is not accessible")]
    AccessDenied {
        class: String,
        member: String,
    },
    /// The constructor failed.
    #[error("cannot instantiate {class}: {reason}")]
    Construction {
        class: String,
        reason: String,
    },
    /// The method failed.
    #[error("{class}.{method} failed: {reason}")]
    Invocation {
        class: String,
        method: String,
        reason: String,
    },
    /// The actual values do not match what was declared.
    #[error("{what}: expected {expected}, found {found}")]
    TypeMismatch {
        what: String,
        expected: String,
        found: String,
    },
    /// The manifest document is malformed.
    #[error("malformed manifest: {0}")]
    ManifestParse(String),
    /// Two manifest elements produce the same key.
    #[error("duplicate manifest key {0:?}")]
    DuplicateKey(String),
}

impl Error {
    /// Return the coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DirectoryCreation(_)
            | Error::FileRead { .. }
            | Error::ArchiveMissing(_)
            | Error::ArchiveOpen { .. } => ErrorKind::ResourceMissing,
            Error::EntryMissing(_)
            | Error::ClassNotFound(_)
            | Error::NoSuchConstructor { .. }
            | Error::NoSuchMethod { .. } => ErrorKind::LookupFailure,
            Error::AccessDenied { .. } => ErrorKind::AccessDenied,
            Error::Construction { .. } => ErrorKind::ConstructionFailure,
            Error::Invocation { .. } => ErrorKind::InvocationFailure,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::ManifestParse(_) | Error::DuplicateKey(_) => ErrorKind::ManifestParseFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    // Verify error classification
    //
    // Spot-check that the fine-grained variants map onto the coarse kinds
    // callers branch on.
    #[test]
    fn error_kind_mapping() {
        assert_eq!(
            Error::ArchiveMissing("x".into()).kind(),
            ErrorKind::ResourceMissing,
        );
        assert_eq!(
            Error::ClassNotFound("a.B".to_string()).kind(),
            ErrorKind::LookupFailure,
        );
        assert_eq!(
            Error::DuplicateKey("COMMON".to_string()).kind(),
            ErrorKind::ManifestParseFailure,
        );
    }

    // Verify rendered messages
    //
    // Messages carry the names involved so logs are useful on their own.
    #[test]
    fn error_display() {
        let e = Error::NoSuchMethod {
            class: "a.B".to_string(),
            method: "run".to_string(),
            params: "Context".to_string(),
        };

        assert_eq!(e.to_string(), "no method a.B.run(Context)");
    }
}
