#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Input sanitization for fwforge
//!
//! Pure validators for untrusted strings before they reach a process
//! argument list or a filesystem path. The policy everywhere is
//! reject-on-mutation: if stripping a forbidden character would change
//! the input, the input is rejected outright (`None`) instead of being
//! silently cleaned. Process spawning already avoids the shell; these
//! checks are the second layer.

use std::sync::OnceLock;

use regex::Regex;

fn udid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-fA-F0-9-]{36,}$").expect("valid udid pattern"))
}

fn document_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]{64,}$").expect("valid document id pattern"))
}

fn strip(input: &str, forbidden: &[char]) -> String {
    input.chars().filter(|c| !forbidden.contains(c)).collect()
}

/// Validate a git branch name. Absent input defaults to `main`; a
/// leading `origin/` prefix is dropped after validation.
#[must_use]
pub fn branch(input: Option<&str>) -> Option<String> {
    let Some(input) = input else {
        return Some("main".to_string());
    };
    let stripped = strip(input, &['\\', '{', '}', '!', '\'', '&']);
    if stripped != input {
        tracing::warn!(input, "rejecting branch with forbidden characters");
        return None;
    }
    Some(
        stripped
            .strip_prefix("origin/")
            .unwrap_or(&stripped)
            .to_string(),
    )
}

/// Validate a repository URL.
#[must_use]
pub fn url(input: &str) -> Option<String> {
    let stripped = strip(input, &['\'', '{', '}', '\\', '"', ';', '&']);
    if stripped != input {
        tracing::warn!("rejecting url with forbidden characters");
        return None;
    }
    Some(stripped)
}

/// Validate a 36-character device identifier (hex and dashes only).
#[must_use]
pub fn udid(input: &str) -> Option<String> {
    if input.len() != 36 {
        return None;
    }
    let stripped = strip(
        input,
        &['.', '{', '/', '}', '\\', '"', '\'', ';', '&', '@'],
    );
    if stripped == input && udid_re().is_match(input) {
        return Some(stripped);
    }
    tracing::warn!(input, "udid failed validation");
    None
}

/// Validate a 64-hex document identifier (owner or source id).
#[must_use]
pub fn document_id(input: &str) -> Option<String> {
    let stripped = strip(input, &['{', '}', '\\', '"', '\'', ';', '&', '@']);
    if stripped == input && document_id_re().is_match(input) {
        return Some(stripped);
    }
    tracing::warn!("document identifier invalid");
    None
}

/// Validate an owner identifier.
#[must_use]
pub fn owner(input: &str) -> Option<String> {
    document_id(input)
}

/// Validate a source identifier.
#[must_use]
pub fn source_id(input: &str) -> Option<String> {
    document_id(input)
}

/// Validate an API key (64 lowercase hex characters, no quoting or
/// whitespace).
#[must_use]
pub fn api_key(input: &str) -> Option<String> {
    let stripped: String = input
        .chars()
        .filter(|c| *c != '"' && !c.is_whitespace())
        .collect();
    if stripped == input && document_id_re().is_match(&stripped) {
        return Some(stripped);
    }
    None
}

/// Path-component check for internally generated ids (build ids): no
/// separators, no traversal, shell-inert characters only.
#[must_use]
pub fn path_component(input: &str) -> Option<String> {
    if input.is_empty() || input.len() > 64 {
        return None;
    }
    if input
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !input.starts_with('.')
    {
        return Some(input.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{api_key, branch, document_id, path_component, udid, url};

    #[test]
    fn branch_rejects_shell_metacharacters() {
        assert_eq!(branch(Some("main&rm -rf")), None);
        assert_eq!(branch(Some("rel{ease}")), None);
        assert_eq!(branch(Some("fix\\it")), None);
        assert_eq!(branch(Some("oops!")), None);
    }

    #[test]
    fn branch_defaults_and_strips_origin() {
        assert_eq!(branch(None).as_deref(), Some("main"));
        assert_eq!(branch(Some("origin/main")).as_deref(), Some("main"));
        assert_eq!(branch(Some("feature/x")).as_deref(), Some("feature/x"));
    }

    #[test]
    fn url_reject_on_mutation() {
        assert_eq!(url("https://github.com/x/y.git").as_deref(), Some("https://github.com/x/y.git"));
        assert_eq!(url("https://github.com/x/y.git;rm"), None);
        assert_eq!(url("git@host:'x'"), None);
    }

    #[test]
    fn udid_accepts_canonical_form() {
        let id = "d6ff2bb0-df34-11e7-b351-eb37822aa172";
        assert_eq!(udid(id).as_deref(), Some(id));
    }

    #[test]
    fn udid_rejects_bad_shapes() {
        assert_eq!(udid("abc"), None);
        assert_eq!(udid("d6ff2bb0-df34-11e7-b351-eb37822aa17z"), None);
        assert_eq!(udid("d6ff2bb0;df34-11e7-b351-eb37822aa172"), None);
        // right length, forbidden character
        assert_eq!(udid("d6ff2bb0-df34-11e7-b351-eb37822aa17@"), None);
    }

    #[test]
    fn document_id_requires_64_lower_hex() {
        let good = "cedc16bb6bb06daaa3ff6d30666d91aacd6e3efbf9abbc151b4dcade59af7c12";
        assert_eq!(document_id(good).as_deref(), Some(good));
        assert_eq!(document_id(&good[..63]), None);
        assert_eq!(document_id(&good.to_uppercase()), None);
    }

    #[test]
    fn api_key_rejects_quotes_and_whitespace() {
        let good = "88eb20839c1d8bf43819818b75a25cef3244c28e77817386b7b73b043193cef4";
        assert_eq!(api_key(good).as_deref(), Some(good));
        assert_eq!(api_key(&format!("\"{good}\"")), None);
        assert_eq!(api_key(&format!(" {good}")), None);
    }

    #[test]
    fn path_component_limits() {
        assert!(path_component("f168def0-597f-11e7-a932-014d5b00c004").is_some());
        assert_eq!(path_component("../escape"), None);
        assert_eq!(path_component("a/b"), None);
        assert_eq!(path_component(&"x".repeat(65)), None);
    }
}
