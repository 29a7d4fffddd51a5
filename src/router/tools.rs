// src/router/tools.rs
// tools.xml registry with type-hierarchy resolution

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::xml::parse_file;

/// One tool definition from tools.xml.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: String,
    /// The schema.org type the tool is declared under.
    pub schema_type: String,
    pub path: String,
    pub method: String,
    pub arguments: HashMap<String, String>,
    pub examples: Vec<String>,
    pub prompt: String,
    pub return_structure: Option<Value>,
    pub handler: Option<String>,
}

/// Schema.org parent types. Placeholder until the full hierarchy is
/// loaded from schema.org itself; everything inherits from Item.
fn parent_types(schema_type: &str) -> Vec<&'static str> {
    match schema_type {
        "Item" => vec![],
        _ => vec!["Item"],
    }
}

/// All tools, loaded once at startup, plus a per-type resolution cache.
pub struct ToolRegistry {
    tools: Vec<Arc<ToolDef>>,
    by_type_cache: RwLock<HashMap<String, Vec<Arc<ToolDef>>>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self {
            tools: Vec::new(),
            by_type_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("tool file {} not found, tool routing will default to search", path.display());
            return Ok(Self::empty());
        }
        let root = parse_file(path)?;
        let mut tools = Vec::new();
        for schema_node in &root.children {
            let schema_type = schema_node.tag.clone();
            for tool_node in schema_node.find_all("Tool") {
                let enabled = tool_node
                    .attr("enabled")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(true);
                let name = tool_node.attr("name").unwrap_or_default().to_string();
                if !enabled {
                    info!("skipping disabled tool: {name}");
                    continue;
                }
                let mut arguments = HashMap::new();
                for arg in tool_node.find_all("argument") {
                    arguments.insert(
                        arg.attr("name").unwrap_or_default().to_string(),
                        arg.text.trim().to_string(),
                    );
                }
                let return_structure = tool_node
                    .find_text("returnStruc")
                    .filter(|s| !s.is_empty())
                    .and_then(|s| match serde_json::from_str(&s) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            warn!("bad returnStruc for tool {name}: {e}");
                            None
                        }
                    });
                tools.push(Arc::new(ToolDef {
                    name,
                    schema_type: schema_type.clone(),
                    path: tool_node.find_text("path").unwrap_or_default(),
                    method: tool_node.find_text("method").unwrap_or_default(),
                    arguments,
                    examples: tool_node
                        .find_all("example")
                        .map(|e| e.text.trim().to_string())
                        .collect(),
                    prompt: tool_node.find_text("prompt").unwrap_or_default(),
                    return_structure,
                    handler: tool_node.find_text("handler").filter(|s| !s.is_empty()),
                }));
            }
        }
        info!("loaded {} tools from {}", tools.len(), path.display());
        Ok(Self {
            tools,
            by_type_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Tools applicable to a schema type, with inherited `Item` tools
    /// shadowed by same-name tools on the specific type.
    pub fn tools_for_type(&self, schema_type: &str) -> Vec<Arc<ToolDef>> {
        if let Some(cached) = self.by_type_cache.read().unwrap().get(schema_type) {
            return cached.clone();
        }

        let mut types_to_check: Vec<&str> = parent_types(schema_type);
        types_to_check.push(schema_type);

        // General to specific, so specific-type tools override.
        let mut by_name: HashMap<String, Arc<ToolDef>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for type_name in types_to_check {
            for tool in self.tools.iter().filter(|t| t.schema_type == type_name) {
                if !by_name.contains_key(&tool.name) {
                    order.push(tool.name.clone());
                }
                by_name.insert(tool.name.clone(), tool.clone());
            }
        }
        let resolved: Vec<Arc<ToolDef>> = order
            .into_iter()
            .filter_map(|name| by_name.get(&name).cloned())
            .collect();

        self.by_type_cache
            .write()
            .unwrap()
            .insert(schema_type.to_string(), resolved.clone());
        resolved
    }

    pub fn find(&self, name: &str) -> Option<Arc<ToolDef>> {
        self.tools.iter().find(|t| t.name == name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_from(xml_str: &str) -> ToolRegistry {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.xml");
        std::fs::write(&path, xml_str).unwrap();
        ToolRegistry::load(&path).unwrap()
    }

    const DOC: &str = r#"
      <Tools>
        <Item>
          <Tool name="search" enabled="true">
            <prompt>score search fit for {request.query}</prompt>
            <returnStruc>{"score": "integer", "justification": "string"}</returnStruc>
          </Tool>
          <Tool name="item_details" enabled="true">
            <argument name="item_name">name of the item</argument>
            <prompt>score details fit</prompt>
            <handler>ItemDetailsHandler</handler>
          </Tool>
          <Tool name="disabled_tool" enabled="false">
            <prompt>never</prompt>
          </Tool>
        </Item>
        <Recipe>
          <Tool name="item_details" enabled="true">
            <prompt>recipe-specific details</prompt>
          </Tool>
          <Tool name="recipe_substitution" enabled="true">
            <prompt>score substitution fit</prompt>
          </Tool>
        </Recipe>
      </Tools>"#;

    #[test]
    fn disabled_tools_are_skipped() {
        let registry = registry_from(DOC);
        assert!(registry.find("disabled_tool").is_none());
        assert!(registry.find("search").is_some());
    }

    #[test]
    fn specific_type_overrides_item_tool() {
        let registry = registry_from(DOC);
        let tools = registry.tools_for_type("Recipe");
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"search"));
        assert!(names.contains(&"recipe_substitution"));
        let details = tools.iter().find(|t| t.name == "item_details").unwrap();
        assert_eq!(details.prompt, "recipe-specific details");
    }

    #[test]
    fn item_type_sees_only_item_tools() {
        let registry = registry_from(DOC);
        let tools = registry.tools_for_type("Item");
        assert!(tools.iter().all(|t| t.schema_type == "Item"));
    }
}
