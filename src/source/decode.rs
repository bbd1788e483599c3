//! Turning response bodies into payloads.

use serde_json::{Map, Number, Value};
use url::Url;

use crate::cache::Payload;
use crate::config::DataFormat;
use crate::error::{Result, SyncError};

use super::sdmx;

/// Pick a concrete format for `Auto`: Content-Type first, then the URL path
/// suffix, then whether the body parses as JSON.
pub fn resolve_format(
  format: DataFormat,
  content_type: Option<&str>,
  url: &str,
  body: &[u8],
) -> DataFormat {
  if format != DataFormat::Auto {
    return format;
  }

  if let Some(ct) = content_type.map(str::to_ascii_lowercase) {
    if ct.contains("sdmx") {
      return DataFormat::Sdmx;
    }
    if ct.contains("json") {
      return DataFormat::Json;
    }
    if ct.contains("csv") {
      return DataFormat::Csv;
    }
  }

  if let Ok(parsed) = Url::parse(url) {
    let path = parsed.path().to_ascii_lowercase();
    if path.ends_with(".json") {
      return DataFormat::Json;
    }
    if path.ends_with(".csv") {
      return DataFormat::Csv;
    }
  }

  if serde_json::from_slice::<Value>(body).is_ok() {
    DataFormat::Json
  } else {
    DataFormat::Csv
  }
}

/// Decode a response body. Tabular formats get an optional constant "Group" column.
pub fn decode_body(
  format: DataFormat,
  body: &[u8],
  content_type: Option<&str>,
  url: &str,
  group: Option<&str>,
) -> Result<Payload> {
  match resolve_format(format, content_type, url, body) {
    DataFormat::Json | DataFormat::Auto => decode_json(body),
    DataFormat::Csv => {
      let text = std::str::from_utf8(body)
        .map_err(|e| SyncError::Serialization(format!("CSV body is not UTF-8: {}", e)))?;
      let (columns, rows) = decode_csv(text)?;
      Ok(tabular(columns, rows, group))
    }
    DataFormat::Sdmx => {
      let root: Value = serde_json::from_slice(body)?;
      let (columns, rows) = sdmx::flatten(&root)?;
      Ok(tabular(columns, rows, group))
    }
  }
}

/// JSON objects are kept as-is; a top-level array is stored under "rows".
pub fn decode_json(body: &[u8]) -> Result<Payload> {
  match serde_json::from_slice::<Value>(body)? {
    Value::Array(rows) => {
      let mut map = Map::new();
      map.insert("rows".to_string(), Value::Array(rows));
      Ok(Payload::new(map))
    }
    other => Payload::from_value(other),
  }
}

fn tabular(
  mut columns: Vec<String>,
  mut rows: Vec<Map<String, Value>>,
  group: Option<&str>,
) -> Payload {
  if let Some(group) = group {
    let column = unique_column("Group", &columns);
    for row in &mut rows {
      row.insert(column.clone(), Value::String(group.to_string()));
    }
    columns.push(column);
  }
  Payload::from_rows(columns, rows)
}

/// `name`, or `name.1`, `name.2`, ... when `name` is already taken.
fn unique_column(name: &str, taken: &[String]) -> String {
  if !taken.iter().any(|c| c == name) {
    return name.to_string();
  }
  (1..)
    .map(|n| format!("{}.{}", name, n))
    .find(|candidate| !taken.contains(candidate))
    .unwrap_or_else(|| name.to_string())
}

/// Parse CSV text with a header line into `(columns, rows)`.
///
/// Supports quoted fields with `""` escapes and embedded newlines. Numeric
/// cells become JSON numbers and empty cells become null. Repeated header
/// names get a `.1`, `.2`, ... suffix so every column keeps its values.
pub fn decode_csv(text: &str) -> Result<(Vec<String>, Vec<Map<String, Value>>)> {
  let mut records = split_records(text)?.into_iter();

  let header = match records.next() {
    Some(header) => header,
    None => return Ok((Vec::new(), Vec::new())),
  };
  let mut columns: Vec<String> = Vec::with_capacity(header.len());
  for name in header {
    let column = unique_column(&name, &columns);
    columns.push(column);
  }

  let mut rows = Vec::new();
  for (line, record) in records.enumerate() {
    if record.len() > columns.len() {
      return Err(SyncError::Serialization(format!(
        "CSV row {} has {} fields, header has {}",
        line + 2,
        record.len(),
        columns.len()
      )));
    }

    let mut row = Map::new();
    for (i, column) in columns.iter().enumerate() {
      let cell = record.get(i).map(String::as_str).unwrap_or("");
      row.insert(column.clone(), cell_value(cell));
    }
    rows.push(row);
  }

  Ok((columns, rows))
}

fn cell_value(cell: &str) -> Value {
  let trimmed = cell.trim();
  if trimmed.is_empty() {
    return Value::Null;
  }
  if let Ok(i) = trimmed.parse::<i64>() {
    return Value::Number(i.into());
  }
  if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
    return Value::Number(n);
  }
  Value::String(cell.to_string())
}

fn split_records(text: &str) -> Result<Vec<Vec<String>>> {
  let mut records = Vec::new();
  let mut record = Vec::new();
  let mut field = String::new();
  let mut in_quotes = false;
  let mut chars = text.trim_start_matches('\u{feff}').chars().peekable();

  while let Some(c) = chars.next() {
    if in_quotes {
      match c {
        '"' if chars.peek() == Some(&'"') => {
          field.push('"');
          chars.next();
        }
        '"' => in_quotes = false,
        _ => field.push(c),
      }
      continue;
    }

    match c {
      '"' => in_quotes = true,
      ',' => record.push(std::mem::take(&mut field)),
      '\r' => {}
      '\n' => {
        record.push(std::mem::take(&mut field));
        push_record(&mut records, std::mem::take(&mut record));
      }
      _ => field.push(c),
    }
  }

  if in_quotes {
    return Err(SyncError::Serialization("CSV body ends inside a quoted field".to_string()));
  }
  if !field.is_empty() || !record.is_empty() {
    record.push(field);
    push_record(&mut records, record);
  }

  Ok(records)
}

/// Blank lines are skipped.
fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
  if record.len() == 1 && record[0].is_empty() {
    return;
  }
  records.push(record);
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_decode_json_object() {
    let payload = decode_json(br#"{"data": {"USA": {"1901": 8.2}}}"#).unwrap();
    assert_eq!(payload.as_map()["data"]["USA"]["1901"], json!(8.2));
  }

  #[test]
  fn test_decode_json_array_wrapped() {
    let payload = decode_json(br#"[{"a": 1}, {"a": 2}]"#).unwrap();
    assert_eq!(payload.as_map()["rows"][1]["a"], json!(2));
  }

  #[test]
  fn test_decode_json_invalid() {
    let err = decode_json(b"<html>").unwrap_err();
    assert!(matches!(err, SyncError::Serialization(_)));
  }

  #[test]
  fn test_decode_csv() {
    let text = concat!(
      "Year,Month,GMSL_Variation_mm,Note\r\n",
      "2019,1,0.32,\"rebased, 2019 = 0\"\r\n",
      "\r\n",
      "2019,2,,\"said \"\"hi\"\"\"\r\n",
    );
    let (columns, rows) = decode_csv(text).unwrap();

    assert_eq!(columns, vec!["Year", "Month", "GMSL_Variation_mm", "Note"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["Year"], json!(2019));
    assert_eq!(rows[0]["GMSL_Variation_mm"], json!(0.32));
    assert_eq!(rows[0]["Note"], json!("rebased, 2019 = 0"));
    assert_eq!(rows[1]["GMSL_Variation_mm"], Value::Null);
    assert_eq!(rows[1]["Note"], json!("said \"hi\""));
  }

  #[test]
  fn test_decode_csv_repeated_headers_keep_every_column() {
    let (columns, rows) = decode_csv("Country,Value,Value,Value.1\nNOR,1.5,2.5,3.5\n").unwrap();

    assert_eq!(columns, vec!["Country", "Value", "Value.1", "Value.1.1"]);
    assert_eq!(rows[0].len(), 4);
    assert_eq!(rows[0]["Value"], json!(1.5));
    assert_eq!(rows[0]["Value.1"], json!(2.5));
    assert_eq!(rows[0]["Value.1.1"], json!(3.5));
  }

  #[test]
  fn test_decode_csv_short_row_padded() {
    let (_, rows) = decode_csv("a,b,c\n1,2\n").unwrap();
    assert_eq!(rows[0]["c"], Value::Null);
  }

  #[test]
  fn test_decode_csv_too_many_fields() {
    assert!(decode_csv("a,b\n1,2,3\n").is_err());
  }

  #[test]
  fn test_decode_csv_unterminated_quote() {
    assert!(decode_csv("a\n\"open\n").is_err());
  }

  #[test]
  fn test_resolve_format() {
    assert_eq!(
      resolve_format(DataFormat::Auto, Some("application/vnd.sdmx.data+json"), "https://x/y", b""),
      DataFormat::Sdmx
    );
    assert_eq!(
      resolve_format(DataFormat::Auto, Some("text/csv; charset=utf-8"), "https://x/y", b""),
      DataFormat::Csv
    );
    assert_eq!(
      resolve_format(DataFormat::Auto, None, "https://x/data.csv?v=1", b"{}"),
      DataFormat::Csv
    );
    assert_eq!(resolve_format(DataFormat::Auto, None, "https://x/y", b"{}"), DataFormat::Json);
    assert_eq!(
      resolve_format(DataFormat::Auto, None, "https://x/y", b"a,b\n1,2"),
      DataFormat::Csv
    );
    assert_eq!(
      resolve_format(DataFormat::Json, Some("text/csv"), "https://x/y", b""),
      DataFormat::Json
    );
  }

  #[test]
  fn test_decode_body_csv_with_group() {
    let payload = decode_body(
      DataFormat::Csv,
      b"Country,Value\nNOR,1.5\n",
      None,
      "https://example.org/data",
      Some("OECD Country"),
    )
    .unwrap();

    assert_eq!(payload.as_map()["columns"], json!(["Country", "Value", "Group"]));
    assert_eq!(payload.as_map()["rows"][0]["Group"], json!("OECD Country"));
  }

  #[test]
  fn test_decode_body_group_does_not_overwrite_csv_column() {
    let payload = decode_body(
      DataFormat::Csv,
      b"Country,Group\nNOR,Europe\n",
      None,
      "https://example.org/data",
      Some("OECD Country"),
    )
    .unwrap();

    assert_eq!(payload.as_map()["columns"], json!(["Country", "Group", "Group.1"]));
    assert_eq!(payload.as_map()["rows"][0]["Group"], json!("Europe"));
    assert_eq!(payload.as_map()["rows"][0]["Group.1"], json!("OECD Country"));
  }
}
