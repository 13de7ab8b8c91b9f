//! XML Parser Module
//!
//! This module parses the report XML into a read-only element tree for the
//! JSON transform to walk. It enforces a recursion depth limit to protect
//! against attacks such as the Billion Laughs attack, and rejects any DOCTYPE
//! declaration that defines entities, so external/internal entity expansion
//! never happens.

use crate::error::{PipelineError, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

const MAX_DEPTH: usize = 20;

/// A node in the parsed document: an element or the text between elements.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with its tag name and children in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    pub fn has_element_children(&self) -> bool {
        self.child_elements().next().is_some()
    }

    /// Concatenated text content of the element's direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }
}

fn transform_err(msg: impl Into<String>) -> PipelineError {
    PipelineError::TransformError(msg.into())
}

fn element_name(name: &[u8]) -> Result<String> {
    std::str::from_utf8(name)
        .map(str::to_string)
        .map_err(|_| transform_err("element name is not valid UTF-8"))
}

fn attach(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, el: XmlElement) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(el));
    } else if root.is_some() {
        return Err(transform_err("multiple root elements"));
    } else {
        *root = Some(el);
    }
    Ok(())
}

/// Parses an XML document into its root element.
pub fn parse_report_xml(xml: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = true;

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(transform_err("XML recursion depth limit exceeded"));
                }
                if stack.is_empty() && root.is_some() {
                    return Err(transform_err("multiple root elements"));
                }
                stack.push(XmlElement {
                    name: element_name(e.name().as_ref())?,
                    children: Vec::new(),
                });
            }
            Ok(Event::Empty(e)) => {
                let el = XmlElement {
                    name: element_name(e.name().as_ref())?,
                    children: Vec::new(),
                };
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| transform_err("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| transform_err(e.to_string()))?;
                if !text.is_empty() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(text.into_owned()));
                    }
                }
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8(t.into_inner().into_owned())
                    .map_err(|_| transform_err("CDATA is not valid UTF-8"))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Text(text));
                }
            }
            Ok(Event::DocType(t)) => {
                let doctype = String::from_utf8_lossy(&t).to_string();
                if doctype.contains("<!ENTITY") {
                    return Err(transform_err("DOCTYPE entity definitions are not allowed"));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declaration, comments, processing instructions
            Err(e) => return Err(transform_err(e.to_string())),
        }
    }

    root.ok_or_else(|| transform_err("document has no root element"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_nested_structure() {
        let root = parse_report_xml("<a><b>1</b><c><d>2</d></c></a>").unwrap();
        assert_eq!(root.name, "a");
        let children: Vec<_> = root.child_elements().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name, "b");
        assert_eq!(children[0].text(), "1");
        assert!(!children[0].has_element_children());
        assert!(children[1].has_element_children());
        assert_eq!(children[1].child_elements().next().unwrap().text(), "2");
    }

    #[test]
    fn test_whitespace_between_elements_is_dropped() {
        let root = parse_report_xml("<a>\n  <b>1</b>\n  <c/>\n</a>").unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.text(), "");
    }

    #[test]
    fn test_preserves_duplicate_siblings_in_order() {
        let root = parse_report_xml("<r><x>1</x><x>2</x></r>").unwrap();
        let texts: Vec<_> = root.child_elements().map(|el| el.text()).collect();
        assert_eq!(texts, vec!["1", "2"]);
    }

    #[test]
    fn test_rejects_malformed_xml() {
        assert!(parse_report_xml("<a><b></a>").is_err());
        assert!(parse_report_xml("no markup at all").is_err());
    }

    #[test]
    fn test_rejects_entity_definitions() {
        let xml = r#"<?xml version="1.0"?>
        <!DOCTYPE lolz [
            <!ENTITY lol "lol">
            <!ENTITY lol2 "&lol;&lol;">
        ]>
        <feedback><record><count>1</count></record></feedback>"#;
        let err = parse_report_xml(xml).unwrap_err();
        assert!(matches!(err, PipelineError::TransformError(_)));
    }

    #[test]
    fn test_rejects_excessive_depth() {
        let mut xml = String::new();
        for i in 0..25 {
            xml.push_str(&format!("<n{}>", i));
        }
        for i in (0..25).rev() {
            xml.push_str(&format!("</n{}>", i));
        }
        let err = parse_report_xml(&xml).unwrap_err();
        assert!(matches!(err, PipelineError::TransformError(_)));
    }
}
