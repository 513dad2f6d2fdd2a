//! Error handling for the show notification dispatcher
//!
//! This module defines all error types that can occur while scanning,
//! locking, rendering and delivering show notifications, plus conversions
//! from the underlying database, SMTP and HTTP client errors.

use thiserror::Error;

/// Result type alias for dispatcher operations
pub type Result<T> = std::result::Result<T, NotifierError>;

/// Main error type for the show notification dispatcher
#[derive(Error, Debug)]
pub enum NotifierError {
    /// Database-related errors
    #[error("Database error: {message}")]
    Database { message: String },

    /// Configuration errors (missing delivery settings fields, unknown method)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Precondition errors (no recipients, show has no items)
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// Not found errors
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Template rendering errors
    #[error("Template error: {message}")]
    Template { message: String },

    /// SMTP / relay transport errors
    #[error("Email error: {message}")]
    Email { message: String },

    /// Transactional email API errors
    #[error("Mail API error: {message}")]
    Api { message: String },

    /// Channel contract exists but the implementation does not
    #[error("Delivery channel '{channel}' is not implemented")]
    NotImplemented { channel: String },

    /// Distributed lock coordination errors
    #[error("Lock error: {message}")]
    Lock { message: String },

    /// Internal service errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl NotifierError {
    /// Create a database error
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a template error
    pub fn template<S: Into<String>>(message: S) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create an email transport error
    pub fn email<S: Into<String>>(message: S) -> Self {
        Self::Email {
            message: message.into(),
        }
    }

    /// Create a transactional API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a not-implemented channel error
    pub fn not_implemented<S: Into<String>>(channel: S) -> Self {
        Self::NotImplemented {
            channel: channel.into(),
        }
    }

    /// Create a lock coordination error
    pub fn lock<S: Into<String>>(message: S) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// Conversion implementations for external error types

impl From<sqlx::Error> for NotifierError {
    fn from(err: sqlx::Error) -> Self {
        NotifierError::Database {
            message: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for NotifierError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        NotifierError::Database {
            message: err.to_string(),
        }
    }
}

impl From<lettre::error::Error> for NotifierError {
    fn from(err: lettre::error::Error) -> Self {
        NotifierError::Email {
            message: err.to_string(),
        }
    }
}

impl From<lettre::address::AddressError> for NotifierError {
    fn from(err: lettre::address::AddressError) -> Self {
        NotifierError::Email {
            message: format!("invalid address: {}", err),
        }
    }
}

impl From<lettre::transport::smtp::Error> for NotifierError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        NotifierError::Email {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for NotifierError {
    fn from(err: reqwest::Error) -> Self {
        NotifierError::Api {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for NotifierError {
    fn from(err: config::ConfigError) -> Self {
        NotifierError::Config {
            message: err.to_string(),
        }
    }
}
