//! Report Transform Module
//!
//! This module converts a parsed report tree into the normalized JSON document
//! the collector consumes. The document has three top-level members: `metadata`
//! (from `report_metadata`), `policy` (from `policy_published`), and `records`
//! (every `record` child, in document order). Serialization is done into an
//! append-only text buffer: the report schema allows repeated tags at one
//! level, which must all appear in document order, so a map-based serializer
//! is not an option here.

use crate::xml_parser::XmlElement;
use std::fmt;

/// Append-only buffer holding the serialized report. Valid JSON once
/// `report_to_json` returns it.
#[derive(Debug, Default)]
pub struct JsonDocument {
    buf: String,
}

impl JsonDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

impl fmt::Display for JsonDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buf)
    }
}

/// Escapes text for embedding in a JSON string literal.
pub fn escape_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Emits `"tag": <value>` for one element: an object when it has element
/// children, otherwise its (possibly empty) text content as a string.
fn append_member(doc: &mut JsonDocument, el: &XmlElement) {
    doc.push("\"");
    doc.push(&escape_json(&el.name));
    doc.push("\": ");
    if el.has_element_children() {
        append_object(doc, el);
    } else {
        doc.push("\"");
        doc.push(&escape_json(&el.text()));
        doc.push("\"");
    }
}

/// Emits the element's children as a JSON object, in document order.
/// Duplicate tag names at the same level all appear.
fn append_object(doc: &mut JsonDocument, el: &XmlElement) {
    doc.push("{");
    let mut first = true;
    for child in el.child_elements() {
        if !first {
            doc.push(",");
        }
        first = false;
        append_member(doc, child);
    }
    doc.push("}");
}

/// Transforms the report root into the collector's JSON document.
pub fn report_to_json(root: &XmlElement) -> JsonDocument {
    let mut doc = JsonDocument::new();
    doc.push("{");

    let mut first = true;
    let mut records = Vec::new();
    for child in root.child_elements() {
        match child.name.as_str() {
            "report_metadata" => {
                if !first {
                    doc.push(",");
                }
                first = false;
                doc.push("\"metadata\": ");
                append_object(&mut doc, child);
            }
            "policy_published" => {
                if !first {
                    doc.push(",");
                }
                first = false;
                doc.push("\"policy\": ");
                append_object(&mut doc, child);
            }
            "record" => records.push(child),
            _ => {}
        }
    }

    if !first {
        doc.push(",");
    }
    doc.push("\"records\": [");
    let mut first_record = true;
    for record in records {
        if !first_record {
            doc.push(",");
        }
        first_record = false;
        append_object(&mut doc, record);
    }
    doc.push("]");

    doc.push("}");
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml_parser::parse_report_xml;
    use serde_json::{json, Value};

    fn as_value(doc: &JsonDocument) -> Value {
        serde_json::from_str(doc.as_str()).expect("document must be valid JSON")
    }

    #[test]
    fn test_element_transform_is_deterministic() {
        let root = parse_report_xml("<a><b>1</b><c><d>2</d></c></a>").unwrap();
        let mut doc = JsonDocument::new();
        doc.push("{");
        append_member(&mut doc, &root);
        doc.push("}");
        assert_eq!(as_value(&doc), json!({"a": {"b": "1", "c": {"d": "2"}}}));
        // child order is preserved in the raw text
        assert!(doc.as_str().find("\"b\"").unwrap() < doc.as_str().find("\"c\"").unwrap());
    }

    #[test]
    fn test_empty_element_becomes_empty_string() {
        let root = parse_report_xml("<a><b/></a>").unwrap();
        let mut doc = JsonDocument::new();
        append_object(&mut doc, &root);
        assert_eq!(doc.as_str(), r#"{"b": ""}"#);
    }

    #[test]
    fn test_duplicate_tags_both_appear() {
        let root = parse_report_xml("<r><x>1</x><x>2</x></r>").unwrap();
        let mut doc = JsonDocument::new();
        append_object(&mut doc, &root);
        assert_eq!(doc.as_str(), r#"{"x": "1","x": "2"}"#);
    }

    #[test]
    fn test_escaping_round_trips() {
        let root =
            parse_report_xml("<r><v>quote \" tab\tback\\slash</v></r>").unwrap();
        let mut doc = JsonDocument::new();
        append_object(&mut doc, &root);
        let value = as_value(&doc);
        assert_eq!(value["v"], "quote \" tab\tback\\slash");
    }

    #[test]
    fn test_escape_is_applied_exactly_once() {
        // a literal backslash-t (two characters) must survive as two characters,
        // distinguishable from a raw TAB
        assert_eq!(escape_json("a\\tb"), "a\\\\tb");
        assert_eq!(escape_json("a\tb"), "a\\tb");
        let root = parse_report_xml("<r><v>a\\tb</v></r>").unwrap();
        let mut doc = JsonDocument::new();
        append_object(&mut doc, &root);
        assert_eq!(as_value(&doc)["v"], "a\\tb");
    }

    #[test]
    fn test_full_report_assembly() {
        let xml = "<feedback>\
            <report_metadata><org_name>acme</org_name></report_metadata>\
            <policy_published><domain>example.org</domain><p>none</p></policy_published>\
            <record><row><count>2</count></row></record>\
            <record><row><count>3</count></row></record>\
        </feedback>";
        let doc = report_to_json(&parse_report_xml(xml).unwrap());
        let value = as_value(&doc);
        assert_eq!(
            value,
            json!({
                "metadata": {"org_name": "acme"},
                "policy": {"domain": "example.org", "p": "none"},
                "records": [{"row": {"count": "2"}}, {"row": {"count": "3"}}]
            })
        );
        let text = doc.as_str();
        assert!(text.find("\"metadata\"").unwrap() < text.find("\"policy\"").unwrap());
        assert!(text.find("\"policy\"").unwrap() < text.find("\"records\"").unwrap());
    }

    #[test]
    fn test_records_only_assembly_has_no_stray_commas() {
        let xml = "<feedback><record><count>1</count></record></feedback>";
        let doc = report_to_json(&parse_report_xml(xml).unwrap());
        assert_eq!(doc.as_str(), r#"{"records": [{"count": "1"}]}"#);
    }

    #[test]
    fn test_empty_report_still_has_records_array() {
        let doc = report_to_json(&parse_report_xml("<feedback></feedback>").unwrap());
        assert_eq!(doc.as_str(), r#"{"records": []}"#);
    }

    #[test]
    fn test_unknown_top_level_sections_are_ignored() {
        let xml = "<feedback><version>1.0</version>\
            <record><count>1</count></record></feedback>";
        let doc = report_to_json(&parse_report_xml(xml).unwrap());
        assert_eq!(as_value(&doc), json!({"records": [{"count": "1"}]}));
    }
}
