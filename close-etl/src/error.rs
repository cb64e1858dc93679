//! Error types and result definitions for the extraction pipeline.
//!
//! Provides a single error type with classification and captured diagnostic
//! metadata. [`EtlError`] represents either one failure with rich context or
//! several aggregated failures, which is how concurrent page fetches report
//! that more than one sibling request failed.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for pipeline operations using [`EtlError`].
pub type EtlResult<T> = Result<T, EtlError>;

/// Detailed payload stored for single [`EtlError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for pipeline operations.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors, mainly from failed fan-out siblings.
    Many {
        errors: Vec<EtlError>,
        location: &'static Location<'static>,
    },
}

/// Categories of failures that can occur during a run.
///
/// The first group maps one-to-one onto the run-aborting conditions of the
/// pipeline; the rest classify ambient failures (configuration, codecs, I/O).
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Explicit window bounds are unparsable or inverted.
    InvalidWindow,
    /// Incremental entity with an empty canonical table and no explicit window.
    NoWatermark,
    /// Transport, probe, or page failure while fetching from the API.
    FetchFailed,
    /// A required field is missing or null in a raw row.
    SchemaViolation,
    /// Staging append failure.
    LoadFailed,
    /// Canonical-table replace failure during compaction.
    CompactFailed,
    /// Table-store query failure outside of load and compaction.
    StoreQueryFailed,

    ConfigError,
    SerializationError,
    DeserializationError,
    IoError,

    Unknown,
}

impl EtlError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Returns the backtrace captured when this error was created.
    ///
    /// Aggregated errors have no backtrace of their own; each contained error
    /// carries its own capture.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Attaches an originating [`error::Error`] and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward the first contained
    /// error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Creates an [`EtlError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail: {detail}")?;
                }

                write_backtrace(payload.backtrace.as_ref(), f, 1)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    for (nth, line) in rendered.lines().enumerate() {
                        if nth == 0 {
                            write!(f, "\n  {}. {}", index + 1, line)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // For aggregated errors, the first contained error is the source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes the captured backtrace with indentation.
///
/// Nothing is written when backtrace capture is disabled in the environment.
fn write_backtrace(backtrace: &Backtrace, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if backtrace.status() != BacktraceStatus::Captured {
        return Ok(());
    }

    let indent_str = "  ".repeat(indent);

    let rendered = format!("{backtrace}");
    if rendered.trim().is_empty() {
        return Ok(());
    }

    write!(f, "\n{indent_str}Backtrace:")?;
    for line in rendered.lines() {
        if line.trim().is_empty() {
            write!(f, "\n{indent_str}  ")?;
        } else {
            write!(f, "\n{indent_str}  {line}")?;
        }
    }

    Ok(())
}

/// Creates an [`EtlError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`EtlError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates an [`EtlError`] from a vector of errors for aggregation.
///
/// A vector with exactly one error unwraps to that error directly.
impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EtlError {
        let location = Location::caller();

        let mut errors: Vec<EtlError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        EtlError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`EtlError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`serde_json::Error`] to [`EtlError`] with the appropriate kind.
impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            _ => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`chrono::ParseError`] to [`EtlError`] with [`ErrorKind::InvalidWindow`].
///
/// Datetime parsing only happens on user-supplied window bounds and on
/// increment-key values read back from the table store.
impl From<chrono::ParseError> for EtlError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::InvalidWindow,
            Cow::Borrowed("Datetime parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`reqwest::Error`] to [`EtlError`] with [`ErrorKind::FetchFailed`].
///
/// Every reqwest failure surfaces while talking to the source API, so the
/// fetch classification applies across the board; decode failures keep the
/// same kind because a page that cannot be decoded cannot be ingested either.
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let detail = err.to_string();
        EtlError::from_components(
            ErrorKind::FetchFailed,
            Cow::Borrowed("API request failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl_error;

    #[test]
    fn single_error_exposes_kind_and_detail() {
        let err = etl_error!(
            ErrorKind::SchemaViolation,
            "Missing required field",
            "field `id` in table `Lead`"
        );

        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert_eq!(err.detail(), Some("field `id` in table `Lead`"));
    }

    #[test]
    fn aggregating_one_error_unwraps_it() {
        let err: EtlError = vec![etl_error!(ErrorKind::FetchFailed, "Page fetch failed")].into();

        assert_eq!(err.kind(), ErrorKind::FetchFailed);
        assert_eq!(err.kinds(), vec![ErrorKind::FetchFailed]);
    }

    #[test]
    fn single_errors_capture_a_backtrace() {
        let single = etl_error!(ErrorKind::LoadFailed, "Staging append failed");
        let aggregated: EtlError = vec![
            etl_error!(ErrorKind::FetchFailed, "Page fetch failed"),
            etl_error!(ErrorKind::FetchFailed, "Page fetch failed"),
        ]
        .into();

        assert!(single.backtrace().is_some());
        assert!(aggregated.backtrace().is_none());
    }

    #[test]
    fn display_renders_backtrace_when_captured() {
        let err = etl_error!(ErrorKind::LoadFailed, "Staging append failed");

        let backtrace = err.backtrace().unwrap();
        if backtrace.status() == BacktraceStatus::Captured {
            assert!(err.to_string().contains("Backtrace:"));
        } else {
            assert!(!err.to_string().contains("Backtrace:"));
        }
    }

    #[test]
    fn aggregated_errors_flatten_kinds() {
        let err: EtlError = vec![
            etl_error!(ErrorKind::FetchFailed, "Page fetch failed"),
            etl_error!(ErrorKind::DeserializationError, "Bad page payload"),
        ]
        .into();

        assert_eq!(err.kind(), ErrorKind::FetchFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::FetchFailed, ErrorKind::DeserializationError]
        );
    }
}
