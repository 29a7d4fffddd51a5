// src/prompts/registry.rs
// Prompt lookup by (site, item-type, prompt-name) with Item fallback

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::utils::local_type;
use crate::xml::{XmlNode, parse_file};

/// A prompt template plus the JSON schema its completion must match.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub text: String,
    pub return_structure: Option<Value>,
}

/// Prompts for one item type.
#[derive(Debug, Default)]
struct TypePrompts {
    prompts: HashMap<String, Arc<PromptTemplate>>,
}

#[derive(Debug, Default)]
struct PromptBlock {
    by_type: HashMap<String, TypePrompts>,
}

impl PromptBlock {
    fn lookup(&self, item_type: &str, name: &str) -> Option<Arc<PromptTemplate>> {
        // Exact type first; every type inherits from Item.
        for type_name in [item_type, "Item"] {
            if let Some(prompts) = self.by_type.get(type_name) {
                if let Some(template) = prompts.prompts.get(name) {
                    return Some(template.clone());
                }
            }
        }
        None
    }
}

type CacheKey = (String, String, String);

/// Immutable prompt store loaded once at startup, with a lookup cache
/// populated under a lock on first use and read cheaply thereafter.
pub struct PromptRegistry {
    sites: HashMap<String, PromptBlock>,
    global: PromptBlock,
    cache: RwLock<HashMap<CacheKey, Option<Arc<PromptTemplate>>>>,
}

impl PromptRegistry {
    pub fn empty() -> Self {
        Self {
            sites: HashMap::new(),
            global: PromptBlock::default(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load prompts.xml. A missing file yields an empty registry so
    /// built-in default prompts still apply.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("prompt file {} not found, using built-in defaults only", path.display());
            return Ok(Self::empty());
        }
        let root = parse_file(path)?;
        let mut registry = Self::empty();
        for child in &root.children {
            if child.tag == "Site" {
                let site = child.attr("ref").unwrap_or_default().to_string();
                let block = registry.sites.entry(site).or_default();
                for type_node in &child.children {
                    Self::collect_type(block, type_node);
                }
            } else {
                Self::collect_type(&mut registry.global, child);
            }
        }
        let total: usize = registry
            .sites
            .values()
            .chain(std::iter::once(&registry.global))
            .flat_map(|b| b.by_type.values())
            .map(|t| t.prompts.len())
            .sum();
        info!("loaded {total} prompts from {}", path.display());
        Ok(registry)
    }

    fn collect_type(block: &mut PromptBlock, type_node: &XmlNode) {
        let entry = block.by_type.entry(type_node.tag.clone()).or_default();
        for prompt_node in type_node.find_all("Prompt") {
            let Some(name) = prompt_node.attr("ref") else {
                continue;
            };
            let Some(text) = prompt_node.find_text("promptString") else {
                warn!("prompt '{name}' has no promptString, skipping");
                continue;
            };
            let return_structure = prompt_node
                .find_text("returnStruc")
                .filter(|s| !s.is_empty())
                .and_then(|s| match serde_json::from_str(&s) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!("bad returnStruc for prompt '{name}': {e}");
                        None
                    }
                });
            entry.prompts.insert(
                name.to_string(),
                Arc::new(PromptTemplate {
                    text,
                    return_structure,
                }),
            );
        }
    }

    /// Find the prompt for (site, item_type, name). Site-specific prompts
    /// shadow global ones; the exact item type shadows `Item`. Both hits
    /// and misses are cached.
    pub fn find(&self, site: &str, item_type: &str, name: &str) -> Option<Arc<PromptTemplate>> {
        let local = local_type(item_type).to_string();
        let key = (site.to_string(), local.clone(), name.to_string());
        if let Some(cached) = self.cache.read().unwrap().get(&key) {
            debug!("prompt cache hit: {key:?}");
            return cached.clone();
        }

        let found = self
            .sites
            .get(site)
            .and_then(|block| block.lookup(&local, name))
            .or_else(|| self.global.lookup(&local, name));
        if found.is_none() {
            warn!("prompt '{name}' not found for site='{site}', item_type='{local}'");
        }
        self.cache.write().unwrap().insert(key, found.clone());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;

    fn registry_from(xml_str: &str) -> PromptRegistry {
        let root = xml::parse(xml_str).unwrap();
        let mut registry = PromptRegistry::empty();
        for child in &root.children {
            if child.tag == "Site" {
                let site = child.attr("ref").unwrap_or_default().to_string();
                let block = registry.sites.entry(site).or_default();
                for type_node in &child.children {
                    PromptRegistry::collect_type(block, type_node);
                }
            } else {
                PromptRegistry::collect_type(&mut registry.global, child);
            }
        }
        registry
    }

    const DOC: &str = r#"
      <root>
        <Item>
          <Prompt ref="RankingPrompt">
            <promptString>global item ranking {request.query}</promptString>
            <returnStruc>{"score": "integer", "description": "string"}</returnStruc>
          </Prompt>
        </Item>
        <Recipe>
          <Prompt ref="RankingPrompt">
            <promptString>global recipe ranking</promptString>
          </Prompt>
        </Recipe>
        <Site ref="imdb">
          <Movie>
            <Prompt ref="RankingPrompt">
              <promptString>imdb movie ranking</promptString>
            </Prompt>
          </Movie>
        </Site>
      </root>"#;

    #[test]
    fn specific_type_shadows_item() {
        let registry = registry_from(DOC);
        let recipe = registry
            .find("seriouseats", "{http://nlweb.ai/base}Recipe", "RankingPrompt")
            .unwrap();
        assert_eq!(recipe.text, "global recipe ranking");

        let movie = registry.find("imdb", "Movie", "RankingPrompt").unwrap();
        assert_eq!(movie.text, "imdb movie ranking");
    }

    #[test]
    fn falls_back_to_item_then_global() {
        let registry = registry_from(DOC);
        let unknown_type = registry.find("other", "Podcast", "RankingPrompt").unwrap();
        assert_eq!(unknown_type.text, "global item ranking {request.query}");
        assert!(unknown_type.return_structure.is_some());
    }

    #[test]
    fn missing_prompt_is_none_and_cached() {
        let registry = registry_from(DOC);
        assert!(registry.find("other", "Item", "NoSuchPrompt").is_none());
        assert!(registry.find("other", "Item", "NoSuchPrompt").is_none());
    }
}
