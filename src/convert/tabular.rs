//! Tabular format fan-out: a CSV source converted to XLSX, JSON and XML,
//! plus the row-table loading used to normalize foreign spreadsheets to
//! CSV. Cells are kept as strings throughout; per-row conversion failures
//! are logged and skipped, failures to open or write a file are fatal.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::warn;

use crate::convert::xml;
use crate::error::{EtlError, Result};

/// An in-memory row table: one header row plus string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RowTable {
    /// Rows as ordered JSON objects keyed by header.
    pub fn keyed_rows(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| {
                        let cell = row.get(i).cloned().unwrap_or_default();
                        (h.clone(), Value::String(cell))
                    })
                    .collect()
            })
            .collect()
    }

    /// Drop the named columns (unknown names are ignored).
    pub fn delete_fields(&mut self, fields: &[String]) {
        if fields.is_empty() {
            return;
        }
        let keep: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !fields.contains(h))
            .map(|(i, _)| i)
            .collect();
        self.headers = keep.iter().map(|&i| self.headers[i].clone()).collect();
        for row in &mut self.rows {
            *row = keep
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or_default())
                .collect();
        }
    }
}

/// Read a CSV file whose first row is the header.
pub fn read_csv(path: &Path) -> Result<RowTable> {
    read_table(path, 1, &[])
}

/// Read a CSV or spreadsheet file into a row table. `headers_row` is
/// 1-based: rows above it are discarded, it becomes the header, the rest
/// become data. Spreadsheets are recognized by extension.
pub fn read_table(path: &Path, headers_row: usize, delete_fields: &[String]) -> Result<RowTable> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let raw = match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "ods" => read_sheet_rows(path)?,
        _ => read_csv_rows(path)?,
    };

    let skip = headers_row.saturating_sub(1);
    let mut rows = raw.into_iter().skip(skip);
    let headers = rows
        .next()
        .ok_or_else(|| EtlError::Convert(format!("{} has no header row", path.display())))?;
    let mut table = RowTable {
        headers,
        rows: rows.collect(),
    };
    table.delete_fields(delete_fields);
    Ok(table)
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn read_sheet_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    use calamine::{open_workbook_auto, Data, Reader};

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| EtlError::Convert(format!("cannot open {}: {e}", path.display())))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EtlError::Convert(format!("{} has no sheets", path.display())))?
        .map_err(|e| EtlError::Convert(format!("cannot read {}: {e}", path.display())))?;

    let cell_text = |cell: &Data| -> String {
        match cell {
            Data::Empty => String::new(),
            Data::String(s) => s.clone(),
            Data::Int(i) => i.to_string(),
            Data::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
            Data::Bool(b) => b.to_string(),
            Data::DateTime(dt) => dt.as_f64().to_string(),
            Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
            Data::Error(e) => {
                warn!("spreadsheet cell error in {}: {e:?}", path.display());
                String::new()
            }
        }
    };

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

pub fn write_csv(table: &RowTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        // Ragged source rows are squared off against the header.
        let squared: Vec<&str> = (0..table.headers.len())
            .map(|i| row.get(i).map(String::as_str).unwrap_or(""))
            .collect();
        writer.write_record(&squared)?;
    }
    writer.flush()?;
    Ok(())
}

/// Rebuild a row table from an array-of-objects JSON document, the inverse
/// of the JSON fan-out (all cells back to strings).
pub fn rows_from_json(value: &Value) -> Result<RowTable> {
    let items = value
        .as_array()
        .ok_or_else(|| EtlError::Convert("expected a JSON array of objects".to_string()))?;
    let Some(first) = items.first().and_then(Value::as_object) else {
        return Ok(RowTable::default());
    };
    let headers: Vec<String> = first.keys().cloned().collect();
    let rows = items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            headers
                .iter()
                .map(|h| match obj.get(h) {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                })
                .collect()
        })
        .collect();
    Ok(RowTable { headers, rows })
}

/// CSV to XLSX: one sheet named after the dataset, one-to-one rows and
/// columns. Sheet names are capped at the spreadsheet limit of 31 chars.
pub fn csv_to_xlsx(source: &Path, out: &Path, sheet_name: &str) -> Result<()> {
    let table = read_csv(source)?;
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    let capped: String = sheet_name.chars().take(31).collect();
    worksheet.set_name(&capped)?;

    for (col, header) in table.headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, header)?;
    }
    for (row_index, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            worksheet.write_string(row_index as u32 + 1, col as u16, cell)?;
        }
    }
    workbook.save(out)?;
    Ok(())
}

/// CSV to JSON: an array with one object per row, column order and unicode
/// preserved.
pub fn csv_to_json(source: &Path, out: &Path) -> Result<()> {
    let table = read_csv(source)?;
    let mut writer = BufWriter::new(File::create(out)?);
    writer.write_all(b"[\n")?;
    let mut first = true;
    for row in table.keyed_rows() {
        if !first {
            writer.write_all(b",\n")?;
        }
        first = false;
        let encoded = serde_json::to_string(&Value::Object(row))?;
        writer.write_all(encoded.as_bytes())?;
    }
    writer.write_all(b"\n]\n")?;
    writer.flush()?;
    Ok(())
}

/// CSV to XML: one `<item>` per row under `<root>`. Rows whose element
/// construction fails are logged and skipped.
pub fn csv_to_xml(source: &Path, out: &Path) -> Result<()> {
    let table = read_csv(source)?;
    let mut writer = BufWriter::new(File::create(out)?);
    writer.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<root>\n")?;
    for row in table.keyed_rows() {
        match xml::fragment(&Value::Object(row.clone()), "item") {
            Ok(rendered) => {
                writer.write_all(rendered.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            Err(e) => warn!("bad row when converting to XML ({e}): {row:?}"),
        }
    }
    writer.write_all(b"</root>\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_csv(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("sample.csv");
        fs::write(&path, "city,count\nTel Aviv,5\nHaifa,3\n").unwrap();
        path
    }

    #[test]
    fn test_read_csv_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table = read_csv(&sample_csv(dir.path())).unwrap();
        assert_eq!(table.headers, vec!["city", "count"]);
        assert_eq!(table.rows, vec![vec!["Tel Aviv", "5"], vec!["Haifa", "3"]]);
    }

    #[test]
    fn test_headers_row_offset_and_delete_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offset.csv");
        fs::write(&path, "junk,junk\ncity,count\nTel Aviv,5\n").unwrap();
        let table = read_table(&path, 2, &["count".to_string()]).unwrap();
        assert_eq!(table.headers, vec!["city"]);
        assert_eq!(table.rows, vec![vec!["Tel Aviv"]]);
    }

    #[test]
    fn test_csv_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = sample_csv(dir.path());
        let out = dir.path().join("sample.json");
        csv_to_json(&source, &out).unwrap();

        let value: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        let round_tripped = rows_from_json(&value).unwrap();
        assert_eq!(round_tripped, read_csv(&source).unwrap());
    }

    #[test]
    fn test_csv_json_preserves_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unicode.csv");
        fs::write(&path, "city\nירושלים\n").unwrap();
        let out = dir.path().join("unicode.json");
        csv_to_json(&path, &out).unwrap();
        let rendered = fs::read_to_string(&out).unwrap();
        assert!(rendered.contains("ירושלים"));
        assert!(!rendered.contains("\\u"));
    }

    #[test]
    fn test_csv_to_xml_wraps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let source = sample_csv(dir.path());
        let out = dir.path().join("sample.xml");
        csv_to_xml(&source, &out).unwrap();
        let rendered = fs::read_to_string(&out).unwrap();
        assert!(rendered.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<root>\n"));
        assert!(rendered.contains("<item><city>Tel Aviv</city><count>5</count></item>"));
        assert!(rendered.ends_with("</root>\n"));
    }

    #[test]
    fn test_csv_to_xlsx_writes_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let source = sample_csv(dir.path());
        let out = dir.path().join("sample.xlsx");
        csv_to_xlsx(&source, &out, "cities").unwrap();
        assert!(out.metadata().unwrap().len() > 0);
    }
}
