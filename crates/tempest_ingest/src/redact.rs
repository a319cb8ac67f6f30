//! Token redaction for error text.
//!
//! Transport errors from the WebSocket and HTTP clients routinely embed the
//! request URL, and both URLs carry the API token as a query parameter.

/// Placeholder substituted for the token.
pub const REDACTED: &str = "[REDACTED]";

/// Replace every occurrence of `token` in `text` with [`REDACTED`].
///
/// An empty token leaves the text unchanged.
pub fn redact_token(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, REDACTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_every_occurrence() {
        let text = "GET wss://ws.example/data?token=abc123 failed; retry ?token=abc123";
        let out = redact_token(text, "abc123");
        assert!(!out.contains("abc123"));
        assert_eq!(out.matches(REDACTED).count(), 2);
    }

    #[test]
    fn test_empty_token_is_noop() {
        assert_eq!(redact_token("connection refused", ""), "connection refused");
    }

    #[test]
    fn test_text_without_token_unchanged() {
        assert_eq!(
            redact_token("connection refused", "secret"),
            "connection refused"
        );
    }
}
