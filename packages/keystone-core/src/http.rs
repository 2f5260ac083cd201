//! Shared plumbing for the reqwest-backed service clients.

use reqwest::{Response, StatusCode};

use crate::error::{Error, Result};

/// Build the HTTP client shared by one service client.
pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("keystone-core/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a non-success response into a typed error.
///
/// Callers handle the statuses that carry protocol meaning (409 for Keyknox,
/// 404 for cards) before delegating here.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    tracing::debug!("Service responded {}: {}", status, message);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized(message)),
        _ => Err(Error::ServiceError {
            status: status.as_u16(),
            message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("http://a/", "/keyknox/v1"), "http://a/keyknox/v1");
        assert_eq!(join("http://a", "card/v5"), "http://a/card/v5");
    }
}
