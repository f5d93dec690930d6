use thiserror::Error;

/// Errors raised by a key-value storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached (no window, storage disabled, unreadable file)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Reading or writing the backing file failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A blob could not be encoded or decoded
    #[error("Failed to (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The browser refused the write (quota exceeded, private mode)
    #[error("Storage write rejected for key {0}")]
    WriteRejected(String),
}

impl StoreError {
    /// Get detailed diagnostic information about the error
    pub fn diagnostics(&self) -> String {
        match self {
            StoreError::Unavailable(reason) => {
                format!("Storage Unavailable\nReason: {}\nSuggestion: Check that local storage is enabled for this profile", reason)
            }
            StoreError::Io(source) => {
                format!("Storage I/O Error\nError: {}\nSuggestion: Check permissions on the data directory", source)
            }
            StoreError::Serialization(source) => {
                format!("Serialization Error\nError: {}\nSuggestion: The stored value will be replaced by defaults on next save", source)
            }
            StoreError::WriteRejected(key) => {
                format!("Write Rejected\nKey: {}\nSuggestion: Free some storage space or leave private browsing mode", key)
            }
        }
    }
}

/// Errors raised while talking to a remote document store or sync URL
#[derive(Debug, Error)]
pub enum SyncError {
    /// The connection descriptor could not be parsed or lacks required fields
    #[error("Invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    /// Server returned an error status
    #[error("Server returned {0}: {1}")]
    ServerError(u16, String),

    /// Request never produced a response
    #[error("Request failed: {0}")]
    Transport(String),

    /// Response body did not have the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The local side of a sync failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Get detailed diagnostic information about the error
    pub fn diagnostics(&self) -> String {
        match self {
            SyncError::InvalidDescriptor(reason) => {
                format!("Invalid Descriptor\nReason: {}\nSuggestion: The descriptor must be JSON with apiKey and projectId", reason)
            }
            SyncError::ServerError(status, message) => {
                format!("Server Error\nStatus: {}\nMessage: {}\nSuggestion: Check the project rules and try again later", status, message)
            }
            SyncError::Transport(source) => {
                format!("Network Error\nError: {}\nSuggestion: Check the URL, your connection and CORS settings", source)
            }
            SyncError::Decode(source) => {
                format!("Decode Error\nError: {}\nSuggestion: The remote document does not match the backup format", source)
            }
            SyncError::Store(source) => source.diagnostics(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            SyncError::ServerError(status.as_u16(), e.to_string())
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Decode(e.to_string())
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

/// Failures reported by the media surface
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    /// The stream failed fatally and the session was torn down
    #[error("Cannot play stream: {0}")]
    Unrecoverable(String),
}
