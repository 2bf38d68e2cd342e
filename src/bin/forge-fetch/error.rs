use std::process::ExitCode;

/// Categories of application errors that can be matched on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorKind {
    /// Argument validation errors, including unusable locators and configuration
    ArgValidation,
    /// General IO errors
    IO,
    /// Failures setting up the HTTP client, store or cache
    Setup,
    /// Resolution, download or clone errors
    /// Errors from `fetch` are reported as they happen, so for that command this variant only
    /// exists to produce the correct `ExitCode`.
    Fetch,
    /// Cache saving errors
    CacheSave,
    /// Output serialisation errors
    Output,
}

/// Internal error type that contains all application error variants.
#[derive(Debug, thiserror::Error)]
pub enum AppErrorInner {
    #[error("Argument error: {0}")]
    ArgValidation(String),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("failed to set up {what}")]
    Setup {
        what: &'static str,
        #[source]
        err: forge_fetch::Error,
    },
    #[error("Failed to fetch one or more source(s)")]
    FetchSummary,
    #[error("failed to {action} '{input}'")]
    Remote {
        action: &'static str,
        input: String,
        #[source]
        err: forge_fetch::Error,
    },
    #[error("failed to save cache to {}", path.display())]
    CacheSaveFailed {
        path: std::path::PathBuf,
        #[source]
        err: forge_fetch::Error,
    },
    #[error("failed to format output")]
    Output(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The application-level error type. We keep the concrete kind (for the exit code) alongside
/// context about what the application was doing when the error happened.
///
/// This type uses the newtype pattern to wrap a boxed inner error, reducing stack size.
#[derive(Debug)]
pub struct AppError(Box<AppErrorInner>, AppErrorKind);

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl AppError {
    pub fn new(inner: AppErrorInner, kind: AppErrorKind) -> Self {
        Self(Box::new(inner), kind)
    }

    pub fn error_kind(&self) -> &AppErrorKind {
        &self.1
    }

    pub fn arg_validation(msg: String) -> Self {
        Self::new(AppErrorInner::ArgValidation(msg), AppErrorKind::ArgValidation)
    }

    pub fn setup(what: &'static str, err: forge_fetch::Error) -> Self {
        Self::new(AppErrorInner::Setup { what, err }, AppErrorKind::Setup)
    }

    /// Errors occurred while fetching; each was already reported.
    pub fn fetch() -> Self {
        Self::new(AppErrorInner::FetchSummary, AppErrorKind::Fetch)
    }

    pub fn remote(action: &'static str, input: &forge_fetch::Input, err: forge_fetch::Error) -> Self {
        Self::new(
            AppErrorInner::Remote {
                action,
                input: input.to_string(),
                err,
            },
            AppErrorKind::Fetch,
        )
    }

    pub fn cache_save_failed(path: std::path::PathBuf, err: forge_fetch::Error) -> Self {
        Self::new(AppErrorInner::CacheSaveFailed { path, err }, AppErrorKind::CacheSave)
    }

    pub fn output<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Self::new(AppErrorInner::Output(Box::new(err)), AppErrorKind::Output)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::new(AppErrorInner::IO(err), AppErrorKind::IO)
    }
}

impl From<AppError> for ExitCode {
    fn from(error: AppError) -> Self {
        ExitCode::from(match error.error_kind() {
            AppErrorKind::Fetch => 1,
            AppErrorKind::ArgValidation => 2,
            _ => 3,
        })
    }
}
