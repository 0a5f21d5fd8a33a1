use shared::{
    error::{ErrorCode, ErrorReport},
    protocol::DependencyStatus,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not resolve identity provider dependencies: {0:?}")]
    DependencyUnavailable(DependencyStatus),
    #[error("{operation} was canceled")]
    AuthCanceled { operation: &'static str },
    #[error("{operation} encountered an error: {message}")]
    AuthFaulted {
        operation: &'static str,
        message: String,
    },
    #[error("catalog request failed: {0}")]
    CatalogFetch(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no signed-in session")]
    NotSignedIn,
    #[error("failed to open checkout: {0}")]
    CheckoutLaunch(String),
    #[error("invalid store settings: {0}")]
    Config(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DependencyUnavailable(_) => ErrorCode::DependencyUnavailable,
            Self::AuthCanceled { .. } => ErrorCode::AuthCanceled,
            Self::AuthFaulted { .. } => ErrorCode::AuthFaulted,
            Self::CatalogFetch(_) => ErrorCode::CatalogFetch,
            Self::Transport(_) => ErrorCode::Transport,
            Self::NotSignedIn => ErrorCode::NotSignedIn,
            Self::CheckoutLaunch(_) => ErrorCode::CheckoutLaunch,
            Self::Config(_) => ErrorCode::Config,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::new(self.code(), self.to_string())
    }
}
