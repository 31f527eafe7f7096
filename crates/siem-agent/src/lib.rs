pub mod agent;
pub mod auth;
pub mod config;
pub mod defender;
pub mod executor;
pub mod http;
pub mod incidents;
pub mod kql;
pub mod tools;
pub mod workspace;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// Carries the provider's response body verbatim.
    #[error("{0}")]
    QueryExecution(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Agent error: {0}")]
    Agent(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
