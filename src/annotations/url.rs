//! Conversation URL normalization and composite keys

use url::Url;

/// Strip protocol, query, and fragment: `https://chatgpt.com/c/1?x#y` →
/// `chatgpt.com/c/1`.
///
/// Unparseable input falls back to plain string stripping so legacy records
/// with odd URLs still normalize deterministically.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if let Ok(parsed) = Url::parse(url) {
        if let Some(host) = parsed.host_str() {
            let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
            return format!("{}{}{}", host, port, parsed.path());
        }
    }
    let without_protocol = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    let end = without_protocol
        .find(|c| c == '?' || c == '#')
        .unwrap_or(without_protocol.len());
    without_protocol[..end].to_string()
}

/// `normalizedUrl:turnKey`, the key every annotation record is stored under.
pub fn composite_id(normalized_url: &str, turn_key: &str) -> String {
    format!("{}:{}", normalized_url, turn_key)
}

/// Split a composite id at its last `:` into `(normalized_url, turn_key)`.
pub fn split_composite_id(id: &str) -> Option<(&str, &str)> {
    let (url, key) = id.rsplit_once(':')?;
    if url.is_empty() || key.is_empty() {
        return None;
    }
    Some((url, key))
}
