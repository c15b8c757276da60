//! Shared blocking HTTP plumbing.

use std::io::Read;
use std::time::Duration;

use unbadge_restore::{CatalogError, MetadataError};

/// Largest image body accepted from a server.
pub const MAX_IMAGE_BYTES: u64 = 64 * 1024 * 1024;

/// Default timeout applied to every request (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// A `ureq` agent with one timeout applied to connect, read and write.
#[must_use]
pub fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

/// How a failed catalog request should be treated.
#[must_use]
pub fn classify_catalog_failure(error: &ureq::Error) -> CatalogError {
    match error {
        ureq::Error::Status(code @ (401 | 403), _) => CatalogError::Unauthorized(*code),
        ureq::Error::Status(code, response) => {
            CatalogError::Rejected(format!("{code} {}", response.status_text()))
        }
        ureq::Error::Transport(transport) => CatalogError::Transport(transport.to_string()),
    }
}

/// How a failed metadata request should be treated.
#[must_use]
pub fn classify_metadata_failure(error: &ureq::Error, what: &str) -> MetadataError {
    match error {
        ureq::Error::Status(404, _) => MetadataError::NotFound(what.to_string()),
        ureq::Error::Status(code, response) => {
            MetadataError::Request(format!("{what}: {code} {}", response.status_text()))
        }
        ureq::Error::Transport(transport) => MetadataError::Request(format!("{what}: {transport}")),
    }
}

/// Read a response body as bytes, refusing anything over [`MAX_IMAGE_BYTES`].
///
/// # Errors
///
/// Returns [`CatalogError::Transport`] if the body cannot be read and
/// [`CatalogError::Rejected`] if it is too large.
pub fn read_body(response: ureq::Response) -> Result<Vec<u8>, CatalogError> {
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_IMAGE_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| CatalogError::Transport(format!("failed to read response: {e}")))?;
    if bytes.len() as u64 > MAX_IMAGE_BYTES {
        return Err(CatalogError::Rejected(format!(
            "image larger than {MAX_IMAGE_BYTES} bytes"
        )));
    }
    Ok(bytes)
}

/// Join a base URL and an absolute path without doubling the slash.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn status(code: u16, text: &str) -> ureq::Error {
        let response = ureq::Response::new(code, text, "").unwrap();
        ureq::Error::Status(code, response)
    }

    #[test]
    fn auth_failures_are_unauthorized() {
        assert!(matches!(
            classify_catalog_failure(&status(401, "Unauthorized")),
            CatalogError::Unauthorized(401)
        ));
        assert!(matches!(
            classify_catalog_failure(&status(403, "Forbidden")),
            CatalogError::Unauthorized(403)
        ));
    }

    #[test]
    fn request_failures_are_recoverable_rejections() {
        let err = classify_catalog_failure(&status(400, "Bad Request"));
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "catalog rejected the request: 400 Bad Request");
        assert!(classify_catalog_failure(&status(404, "Not Found")).is_recoverable());
    }

    #[test]
    fn missing_metadata_is_not_found() {
        assert!(matches!(
            classify_metadata_failure(&status(404, "Not Found"), "movie 1"),
            MetadataError::NotFound(_)
        ));
        assert!(matches!(
            classify_metadata_failure(&status(401, "Unauthorized"), "movie 1"),
            MetadataError::Request(_)
        ));
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(
            join_url("http://plex:32400/", "/library/sections"),
            "http://plex:32400/library/sections"
        );
        assert_eq!(
            join_url("http://plex:32400", "library/sections"),
            "http://plex:32400/library/sections"
        );
    }
}
