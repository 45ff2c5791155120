//! Built-in platform adapters
//!
//! Each platform is a flat `SiteAdapter` implementation. Shared URL helpers
//! live here; everything else stays in the platform's own file.

mod chatgpt;
mod claude;
mod deepseek;
mod gemini;
mod grok;

pub use chatgpt::ChatGptAdapter;
pub use claude::ClaudeAdapter;
pub use deepseek::DeepSeekAdapter;
pub use gemini::GeminiAdapter;
pub use grok::GrokAdapter;

use crate::dom::Selector;
use url::Url;

/// Lowercased host and path of `url`, or `None` if it does not parse.
pub(crate) fn host_and_path(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some((host, parsed.path().to_string()))
}

/// True if `url`'s host is one of `hosts` or a subdomain of one.
pub(crate) fn host_is(url: &str, hosts: &[&str]) -> bool {
    let Some((host, _)) = host_and_path(url) else {
        return false;
    };
    hosts
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
}

/// Path of `url`, or an empty string.
pub(crate) fn path_of(url: &str) -> String {
    host_and_path(url).map(|(_, path)| path).unwrap_or_default()
}

/// Parse a built-in selector. The constants are known-good; a failure only
/// disables the feature that needed it.
pub(crate) fn builtin(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!(selector, error = %e, "built-in selector failed to parse");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_accepts_subdomains() {
        assert!(host_is("https://chat.openai.com/c/1", &["openai.com"]));
        assert!(host_is("https://chatgpt.com/", &["chatgpt.com"]));
        assert!(!host_is("https://notchatgpt.com/", &["chatgpt.com"]));
        assert!(!host_is("not a url", &["chatgpt.com"]));
    }

    #[test]
    fn path_of_drops_query_and_fragment() {
        assert_eq!(path_of("https://claude.ai/chat/xyz?x=1#top"), "/chat/xyz");
    }
}
