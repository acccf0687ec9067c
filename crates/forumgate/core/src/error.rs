// Forumgate
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Error handling for the forum access and notification gateway

use thiserror::Error;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Delivery failed: {message}")]
    Delivery { message: String },

    #[error("Concurrent modification: {message}")]
    ConcurrentModification { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GatewayError {
    pub fn not_found(message: impl Into<String>) -> Self {
        GatewayError::NotFound { message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation { message: message.into() }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        GatewayError::Delivery { message: message.into() }
    }

    pub fn concurrent_modification(message: impl Into<String>) -> Self {
        GatewayError::ConcurrentModification { message: message.into() }
    }

    /// Get the error class printed by the administrative CLI
    pub fn error_class(&self) -> &'static str {
        match self {
            GatewayError::NotFound { .. } => "NotFoundError",
            GatewayError::Validation { .. } => "ValidationError",
            GatewayError::Delivery { .. } => "DeliveryError",
            GatewayError::ConcurrentModification { .. } => "ConcurrentModificationError",
            GatewayError::Io(_) => "IoError",
            GatewayError::Json(_) | GatewayError::Toml(_) => "SerializationError",
        }
    }

    /// Process exit code for this error class
    pub fn exit_code(&self) -> i32 {
        match self {
            GatewayError::NotFound { .. } => 2,
            GatewayError::Validation { .. } => 3,
            GatewayError::Delivery { .. } => 4,
            GatewayError::ConcurrentModification { .. } => 5,
            GatewayError::Io(_) => 6,
            GatewayError::Json(_) | GatewayError::Toml(_) => 7,
        }
    }

    /// Only delivery failures are retried; everything else surfaces immediately
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Delivery { .. })
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
