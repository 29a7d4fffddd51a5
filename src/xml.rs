// src/xml.rs
// Minimal XML tree reader for prompts.xml / tools.xml

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;

/// An element tree with namespace prefixes stripped from tag names.
/// Prompt and tool files are small and loaded once at startup, so a full
/// in-memory tree keeps the lookup code simple.
#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub tag: String,
    pub attrs: HashMap<String, String>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn find(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn find_all<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    pub fn find_text(&self, tag: &str) -> Option<String> {
        self.find(tag).map(|c| c.text.trim().to_string())
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn read_attrs(start: &quick_xml::events::BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.context("malformed XML attribute")?;
        let key = local_name(attr.key.as_ref());
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        attrs.insert(key, attr.unescape_value()?.into_owned());
    }
    Ok(attrs)
}

/// Parse an XML document into a tree rooted at the document element.
pub fn parse(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event().context("XML parse error")? {
            Event::Start(start) => {
                stack.push(XmlNode {
                    tag: local_name(start.name().as_ref()),
                    attrs: read_attrs(&start)?,
                    ..Default::default()
                });
            }
            Event::Empty(start) => {
                let node = XmlNode {
                    tag: local_name(start.name().as_ref()),
                    attrs: read_attrs(&start)?,
                    ..Default::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::Text(text) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text.decode()?);
                }
            }
            Event::CData(cdata) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                }
            }
            Event::End(_) => {
                let node = stack.pop().context("unbalanced XML end tag")?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.context("empty XML document")
}

pub fn parse_file(path: &std::path::Path) -> Result<XmlNode> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_with_namespaces() {
        let doc = parse(
            r#"<root xmlns="http://nlweb.ai/base">
                 <ns:Site xmlns:ns="http://nlweb.ai/base" ref="imdb">
                   <Prompt ref="RankingPrompt"><promptString>score {request.query}</promptString></Prompt>
                 </ns:Site>
               </root>"#,
        )
        .unwrap();
        assert_eq!(doc.tag, "root");
        let site = doc.find("Site").unwrap();
        assert_eq!(site.attr("ref"), Some("imdb"));
        let prompt = site.find("Prompt").unwrap();
        assert_eq!(
            prompt.find_text("promptString").unwrap(),
            "score {request.query}"
        );
    }

    #[test]
    fn self_closing_elements() {
        let doc = parse(r#"<Tool name="search" enabled="true"><path/></Tool>"#).unwrap();
        assert!(doc.find("path").is_some());
    }
}
