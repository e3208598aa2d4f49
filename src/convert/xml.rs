//! JSON-value-to-XML rendering, shared by the tabular XML fan-out and the
//! GeoXML output: object keys become elements, arrays repeat their
//! element, scalars become text nodes.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;

use crate::error::{EtlError, Result};

/// Derive a legal XML element name from an arbitrary key. Characters
/// outside the name alphabet become underscores; a leading digit or
/// punctuation gets an underscore prefix. Keys that reduce to nothing are
/// an error, which callers treat as "this row cannot be rendered".
pub fn element_name(raw: &str) -> Result<String> {
    let mut name: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        return Err(EtlError::Convert(format!(
            "cannot derive an XML element name from {raw:?}"
        )));
    }
    let first = name.chars().next().unwrap();
    if first.is_ascii_digit() || first == '-' || first == '.' {
        name.insert(0, '_');
    }
    Ok(name)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_value<W: Write>(writer: &mut Writer<W>, tag: &str, value: &Value) -> Result<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                write_value(writer, tag, item)?;
            }
        }
        Value::Object(map) => {
            writer.write_event(Event::Start(BytesStart::new(tag)))?;
            for (key, child) in map {
                let child_tag = element_name(key)?;
                write_value(writer, &child_tag, child)?;
            }
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
        Value::Null => {
            writer.write_event(Event::Empty(BytesStart::new(tag)))?;
        }
        scalar => {
            writer.write_event(Event::Start(BytesStart::new(tag)))?;
            writer.write_event(Event::Text(BytesText::new(&scalar_text(scalar))))?;
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
    }
    Ok(())
}

/// Render a value as a standalone element (no XML declaration), e.g. one
/// `<item>` row of a tabular export.
pub fn fragment(value: &Value, wrapper: &str) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    let tag = element_name(wrapper)?;
    write_value(&mut writer, &tag, value)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| EtlError::Convert(format!("XML fragment is not UTF-8: {e}")))
}

/// Render a full document with declaration under the given wrapper.
pub fn write_document<W: Write>(out: W, value: &Value, wrapper: &str) -> Result<()> {
    let mut writer = Writer::new(out);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let tag = element_name(wrapper)?;
    write_value(&mut writer, &tag, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_element_name_sanitization() {
        assert_eq!(element_name("Station Name").unwrap(), "Station_Name");
        assert_eq!(element_name("2024").unwrap(), "_2024");
        assert_eq!(element_name("lat").unwrap(), "lat");
        assert!(element_name("   ").is_err());
    }

    #[test]
    fn test_fragment_renders_row() {
        let row = json!({"name": "Tel Aviv", "count": 3, "note": null});
        let xml = fragment(&row, "item").unwrap();
        assert_eq!(
            xml,
            "<item><name>Tel Aviv</name><count>3</count><note/></item>"
        );
    }

    #[test]
    fn test_fragment_escapes_markup() {
        let row = json!({"name": "a < b & c"});
        let xml = fragment(&row, "item").unwrap();
        assert!(xml.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn test_arrays_repeat_their_element() {
        let value = json!({"features": [{"t": 1}, {"t": 2}]});
        let xml = fragment(&value, "root").unwrap();
        assert_eq!(
            xml,
            "<root><features><t>1</t></features><features><t>2</t></features></root>"
        );
    }
}
