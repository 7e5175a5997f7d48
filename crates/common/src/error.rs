use thiserror::Error;

/// Workspace-wide error type, mirroring the taxonomy the gateway reports:
/// validation, conflict, transient-remote, and everything else.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    /// Payload rejected at the edge. Reported as `<field>: <reason>`.
    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },

    /// Structured "success:false" outcome (duplicate request, self-target, …).
    /// Never thrown across the wire as a 5xx.
    #[error("{0}")]
    Conflict(String),

    /// A remote collaborator (KV, system of record, identity provider) is
    /// unreachable. Callers degrade rather than fail.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("internal error")]
    Other {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    #[must_use]
    pub fn other(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other {
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl FromDetail for Error {
    fn from_detail(detail: String) -> Self {
        Self::Message(detail)
    }
}

pub type TinchatError = Error;
pub type Result<T> = std::result::Result<T, Error>;

// ── Failure labelling ────────────────────────────────────────────────────────

/// Absorb a one-line failure description into a crate's error type.
///
/// Pairs with [`impl_describe!`]: crates whose errors implement this get a
/// `.describe("what was being attempted")` adapter on foreign `Result`s, so a
/// third-party failure crosses the crate boundary already labelled.
pub trait FromDetail: Sized {
    fn from_detail(detail: String) -> Self;
}

/// Expand a crate-local `Describe` extension inside an error module that
/// defines `Error: FromDetail` and `Result<T>`.
///
/// Deliberately narrower than a general context chain: one method, `Result`
/// receivers only, and the label leads so log greps stay stable no matter
/// what the source error prints.
#[macro_export]
macro_rules! impl_describe {
    () => {
        pub trait Describe<T> {
            /// Label a fallible call, folding its error into [`Error`] as
            /// `label (source)`.
            fn describe(self, label: impl std::fmt::Display) -> Result<T>;
        }

        impl<T, E: std::fmt::Display> Describe<T> for std::result::Result<T, E> {
            fn describe(self, label: impl std::fmt::Display) -> Result<T> {
                self.map_err(|source| {
                    <Error as $crate::FromDetail>::from_detail(format!("{label} ({source})"))
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::impl_describe!();

    #[test]
    fn validation_renders_field_and_reason() {
        let e = Error::validation("interests", "at most 10 entries");
        assert_eq!(e.to_string(), "interests: at most 10 entries");
    }

    #[test]
    fn conflict_is_not_unavailable() {
        let e = Error::conflict("Friend request already sent");
        assert!(e.is_conflict());
        assert!(!e.is_unavailable());
    }

    #[test]
    fn describe_puts_the_label_first() {
        let failed: std::result::Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let e = failed.describe("flush queue").unwrap_err();
        assert_eq!(e.to_string(), "flush queue (boom)");
    }
}
