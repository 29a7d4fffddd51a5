// src/api/mod.rs
// HTTP surface: /ask, /sites, /who, /mcp, health, conversations, static

pub mod ask;
pub mod conversation;
pub mod error;
pub mod mcp;
pub mod router;
pub mod sites;

pub use error::ApiError;
pub use router::build_router;

use std::collections::HashMap;

/// Parse a raw query string into a multi-value map. Repeated keys (e.g.
/// `prev=a&prev=b`) accumulate.
pub fn parse_query_string(raw: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key).map(|s| s.into_owned()).unwrap_or_default();
        let value = urlencoding::decode(&value.replace('+', " "))
            .map(|s| s.into_owned())
            .unwrap_or_default();
        if key.is_empty() {
            continue;
        }
        params.entry(key).or_default().push(value);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_keys_accumulate() {
        let params = parse_query_string("query=pasta%20recipes&prev=a&prev=b&site=all");
        assert_eq!(params["query"], vec!["pasta recipes"]);
        assert_eq!(params["prev"], vec!["a", "b"]);
    }

    #[test]
    fn plus_decodes_to_space() {
        let params = parse_query_string("q=chicken+dinner");
        assert_eq!(params["q"], vec!["chicken dinner"]);
    }
}
