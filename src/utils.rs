// src/utils.rs
// Small helpers shared across the query pipeline

use serde_json::Value;

/// Map a site to its default schema.org item type, in namespaced form.
///
/// Single-site deployments can keep this in code; multi-tenant setups
/// should move the mapping into configuration.
pub const BASE_NS: &str = "http://nlweb.ai/base";

pub fn namespaced_type(local: &str) -> String {
    format!("{{{BASE_NS}}}{local}")
}

/// Strip the `{namespace}` prefix from an item type, if present.
pub fn local_type(item_type: &str) -> &str {
    match item_type.rfind('}') {
        Some(idx) => &item_type[idx + 1..],
        None => item_type,
    }
}

const RECIPE_SITES: &[&str] = &[
    "seriouseats",
    "hebbarskitchen",
    "latam_recipes",
    "woksoflife",
    "cheftariq",
    "spruce",
    "nytimes",
];

pub fn site_to_item_type(site: &str) -> String {
    let local = if RECIPE_SITES.contains(&site) {
        "Recipe"
    } else {
        match site {
            "imdb" => "Movie",
            "npr podcasts" => "Thing",
            "neurips" => "Paper",
            "backcountry" => "Outdoor Gear",
            "zillow" => "RealEstate",
            "datacommons" => "Statistics",
            _ => "Item",
        }
    };
    namespaced_type(local)
}

/// "woks_of_life" -> "Woks Of Life"
pub fn pretty_site(site: &str) -> String {
    site.replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reduce a schema.org object to a prompt-sized description string.
///
/// Long string fields are truncated and bulky presentation-only fields
/// (images, nested review bodies) are dropped so that per-item prompts
/// stay within the low-tier token budget.
pub fn trim_schema_json(schema: &Value) -> String {
    const MAX_FIELD_CHARS: usize = 600;
    const DROP_KEYS: &[&str] = &["image", "images", "thumbnailUrl", "review", "reviews", "video"];

    fn trim_value(value: &Value) -> Value {
        match value {
            Value::String(s) if s.len() > MAX_FIELD_CHARS => {
                let mut end = MAX_FIELD_CHARS;
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                Value::String(format!("{}...", &s[..end]))
            }
            Value::Array(items) => Value::Array(items.iter().take(20).map(trim_value).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(k, _)| !DROP_KEYS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), trim_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    trim_value(schema).to_string()
}

/// The host portion of a URL, without a leading "www.".
pub fn visible_url(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let host = stripped.split('/').next().unwrap_or(stripped);
    host.strip_prefix("www.").unwrap_or(host).to_string()
}
