use thiserror::Error;

/// Error raised by a host collaborator (class loader, name oracle).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used across the toolkit surface.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the toolkit.
///
/// A search that finds nothing is not an error; those operations return
/// `Ok(None)`. Every variant here means the question could not be answered.
#[derive(Debug, Error)]
pub enum Error {
    /// The byte stream is not a class file this toolkit can read.
    #[error("malformed class data{}: {reason}", origin(.class))]
    MalformedInput {
        class: Option<String>,
        reason: String,
    },
    /// A field or method descriptor could not be decoded.
    #[error("malformed descriptor `{descriptor}`: {reason}")]
    MalformedDescriptor { descriptor: String, reason: String },
    /// The host could not supply data for a class.
    #[error("class not found: {class}")]
    ClassNotFound {
        class: String,
        #[source]
        source: BoxError,
    },
    /// The name oracle failed to translate a symbol.
    #[error("no mapping for {symbol}")]
    UnknownMapping {
        symbol: String,
        #[source]
        source: BoxError,
    },
    /// A class appeared twice while walking a superclass chain.
    #[error("superclass cycle detected at {class}")]
    CycleDetected { class: String },
    /// The superclass chain is longer than the walk allows.
    #[error("superclass chain of {class} exceeds {limit} levels")]
    HierarchyTooDeep { class: String, limit: usize },
    /// A required helper method is absent or has the wrong shape.
    #[error("{message}")]
    MissingHelper { class: String, message: String },
    /// The record cannot be written within class file limits.
    #[error("cannot encode class: {reason}")]
    Unencodable { reason: String },
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedInput {
            class: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn unencodable(reason: impl Into<String>) -> Self {
        Error::Unencodable {
            reason: reason.into(),
        }
    }

    /// Attach the class being processed to an error that lacks one.
    pub(crate) fn in_class(self, name: &str) -> Self {
        match self {
            Error::MalformedInput { class: None, reason } => Error::MalformedInput {
                class: Some(name.to_string()),
                reason,
            },
            other => other,
        }
    }
}

fn origin(class: &Option<String>) -> String {
    class
        .as_deref()
        .map(|name| format!(" for {name}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_names_the_class_when_known() {
        let err = Error::malformed("bad magic").in_class("a/b/C");

        assert_eq!(err.to_string(), "malformed class data for a/b/C: bad magic");
    }

    #[test]
    fn class_not_found_keeps_host_error_as_source() {
        let err = Error::ClassNotFound {
            class: "a/b/C".to_string(),
            source: "jar entry missing".into(),
        };

        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "jar entry missing");
    }
}
