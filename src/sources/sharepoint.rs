//! SharePoint list feed: the endpoint serves JSON with literal tabs,
//! newlines and HTML-entity quotes embedded in it, so the body is
//! sanitized as text before parsing, then the nested
//! `Root/Items/Item[].Fields.Field[]` structure is flattened to rows.

use serde_json::{Map, Value};

use crate::error::{EtlError, Result};

pub fn sanitize(raw: &str) -> String {
    raw.replace('\t', "")
        .replace('\n', " ")
        .replace("&quot;", "\\\"")
}

/// Flatten the feed into one object per list item: each field's `Caption`
/// becomes a column holding its `Value`, plus the item's `URL`.
pub fn parse_rows(feed: &str) -> Result<Vec<Map<String, Value>>> {
    let data: Value = serde_json::from_str(&sanitize(feed))?;
    let items = data
        .pointer("/Root/Items/Item")
        .and_then(Value::as_array)
        .ok_or_else(|| EtlError::Source("feed has no Root/Items/Item array".to_string()))?;

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let fields = item
            .pointer("/Fields/Field")
            .and_then(Value::as_array)
            .ok_or_else(|| EtlError::Source("list item has no Fields/Field array".to_string()))?;
        let mut row = Map::new();
        for field in fields {
            let Some(caption) = field.get("Caption").and_then(Value::as_str) else {
                continue;
            };
            row.insert(
                caption.to_string(),
                field.get("Value").cloned().unwrap_or(Value::Null),
            );
        }
        row.insert(
            "URL".to_string(),
            item.get("URL").cloned().unwrap_or(Value::Null),
        );
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The Value of the first field carries a literal tab byte, which is
    // invalid JSON until sanitize() strips it.
    const FEED: &str = "{\"Root\": {\"Items\": {\"Item\": [\n\
        {\"Fields\": {\"Field\": [\n\
            {\"Caption\": \"Name\", \"Value\": \"Health\tClinic\"},\n\
            {\"Caption\": \"City\", \"Value\": \"Haifa\"}\n\
        ]}, \"URL\": \"https://example.org/1\"},\n\
        {\"Fields\": {\"Field\": [\n\
            {\"Caption\": \"Name\", \"Value\": \"Library\"},\n\
            {\"Caption\": \"City\", \"Value\": \"Eilat\"}\n\
        ]}}\n\
    ]}}}";

    #[test]
    fn test_parse_rows() {
        let rows = parse_rows(FEED).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Name"], "HealthClinic");
        assert_eq!(rows[0]["URL"], "https://example.org/1");
        assert_eq!(rows[1]["City"], "Eilat");
        assert_eq!(rows[1]["URL"], Value::Null);
    }

    #[test]
    fn test_sanitize_unescapes_quotes() {
        let sanitized = sanitize("{\"a\": \"say &quot;hi&quot;\"}");
        let value: Value = serde_json::from_str(&sanitized).unwrap();
        assert_eq!(value["a"], "say \"hi\"");
    }

    #[test]
    fn test_missing_items_is_an_error() {
        assert!(parse_rows("{\"Root\": {}}").is_err());
    }
}
