//! Application-level error carried up to `main`.
//!
//! Recoverable per-item failures (one log file, one group's fit, one artifact)
//! have their own types and never become an `AppError`; only conditions that
//! stop the whole run do.

/// Bad configuration, unreadable metadata, missing paths.
pub const EXIT_CONFIG: u8 = 2;
/// Nothing to fit: no matching rows, files or samples.
pub const EXIT_NO_DATA: u8 = 3;
/// Worker failures and other internal errors.
pub const EXIT_INTERNAL: u8 = 4;
/// Run stopped through the cancel token.
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(EXIT_NO_DATA, message)
    }

    pub fn cancelled() -> Self {
        Self::new(EXIT_CANCELLED, "Run cancelled.")
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn is_no_data(&self) -> bool {
        self.exit_code == EXIT_NO_DATA
    }

    pub fn is_cancelled(&self) -> bool {
        self.exit_code == EXIT_CANCELLED
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
