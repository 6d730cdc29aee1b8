//! Key identifier resolution for secret requests.
//!
//! The agent names the locking key via `SETKEYINFO` (typically `n/<keygrip>`);
//! when that is missing the description text is scanned for something that
//! looks like a stable identifier, and `"default"` is the last resort.

pub const DEFAULT_KEY_ID: &str = "default";

pub fn extract(key_info: Option<&str>, description: Option<&str>) -> String {
    if let Some(info) = key_info {
        let info = info.trim();
        let mut parts = info.split('/');
        let first = parts.next().unwrap_or(info);
        let candidate = parts.next().unwrap_or(first);
        // A blank identifier cannot name a vault record; fall through to
        // the description scan instead.
        if !candidate.is_empty() {
            return candidate.to_string();
        }
    }

    if let Some(description) = description {
        for word in description.split_whitespace() {
            if word.chars().count() >= 8 && word.chars().all(char::is_alphanumeric) {
                return word.to_string();
            }
        }
    }

    DEFAULT_KEY_ID.to_string()
}
