use std::collections::HashSet;
use std::sync::OnceLock;

use ammonia::Builder;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use spin_sdk::http::{Request, Response};

use crate::core::errors::ApiError;

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn json_response<T: Serialize>(status: u16, value: &T) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(value).map_err(|e| ApiError::InternalError(e.to_string()))?;
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(body)
        .build())
}

pub fn no_content() -> Response {
    Response::builder().status(204).body(Vec::new()).build()
}

pub fn read_json<T: DeserializeOwned>(req: &Request) -> Result<T, ApiError> {
    Ok(serde_json::from_slice(req.body())?)
}

pub fn parse_id(raw: &str, what: &str) -> Result<u64, ApiError> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {} id", what)))
}

/// Strips all markup, leaving plain unescaped text. Length limits are
/// checked against this form.
pub fn sanitize_text(text: &str) -> String {
    let cleaned = Builder::default()
        .tags(HashSet::new())
        .clean(text)
        .to_string();

    // Undo the entity escaping ammonia applies to text nodes; `&amp;` last.
    cleaned
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("Regex should compile")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("42", "user").unwrap(), 42);
        assert!(parse_id("0", "user").is_err());
        assert!(parse_id("-1", "user").is_err());
        assert!(parse_id("abc", "user").is_err());
        assert!(parse_id("", "user").is_err());
    }

    #[test]
    fn sanitize_removes_markup() {
        assert_eq!(sanitize_text("<b>ana</b>"), "ana");
        assert_eq!(sanitize_text("<script>alert(1)</script>bob"), "bob");
        assert_eq!(sanitize_text("plain"), "plain");
    }

    #[test]
    fn sanitize_keeps_literal_characters() {
        assert_eq!(sanitize_text("Tom & Jerry"), "Tom & Jerry");
        assert_eq!(sanitize_text("1 < 2 > 0"), "1 < 2 > 0");
        assert_eq!(sanitize_text("<i>R&amp;D</i>"), "R&D");
        assert_eq!(sanitize_text(&"&".repeat(50)).chars().count(), 50);
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("ana@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("ana"));
        assert!(!is_valid_email("ana@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("ana @example.com"));
    }
}
