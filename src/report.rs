//! Plain-text freshness reports and payload previews.

use std::path::Path;

use serde_json::Value;

use crate::cache::{CacheRecord, CacheResult, CacheSource, UpdateVerdict, Verdict};

fn plural(n: u32) -> &'static str {
  if n == 1 {
    ""
  } else {
    "s"
  }
}

/// Summary line plus details for one ensure-fresh run.
pub fn freshness(name: &str, result: &CacheResult, path: &Path) -> String {
  let mut out = String::new();
  let first_save = matches!(&result.verdict, Some(v) if v.verdict == Verdict::NoLocalData);
  let headline = match (result.source, result.was_updated, result.forced) {
    (CacheSource::Offline, _, _) => "offline, using cached data",
    (_, true, true) => "updated (forced)",
    (_, true, false) if first_save => "downloaded",
    (_, true, false) => "updated",
    (_, false, _) => "already up to date",
  };
  out.push_str(&format!("{}: {}\n", name, headline));

  let attempts = format!("{} attempt{}", result.attempts, plural(result.attempts));
  let network = match result.source {
    CacheSource::Network => format!("fetched ({})", attempts),
    CacheSource::NotModified => "conditional request, server reported not modified".to_string(),
    CacheSource::Offline => format!("failed after {}", attempts),
  };
  out.push_str(&format!("  network:  {}\n", network));

  match &result.verdict {
    Some(verdict) => out.push_str(&verdict_lines(verdict)),
    None => out.push_str("  verdict:  unknown, remote not reachable\n"),
  }
  if let Some(error) = &result.network_error {
    out.push_str(&format!("  error:    {}\n", error));
  }

  out.push_str(&record_details(&result.record, path));
  out
}

fn verdict_lines(verdict: &UpdateVerdict) -> String {
  let mut out = format!("  verdict:  {} ({})\n", verdict.verdict, verdict.reason);
  if let Some(fresh) = &verdict.fresh {
    out.push_str(&format!("  hash:     {}\n", fresh.short()));
  }
  out
}

fn record_details(record: &CacheRecord, path: &Path) -> String {
  let meta = &record.metadata;

  let mut fetched = format!(
    "{} (HTTP {})",
    meta.fetch_timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    meta.status_code
  );
  if let Some(etag) = &meta.etag {
    fetched.push_str(&format!(", etag {}", etag));
  }
  if let Some(last_modified) = &meta.last_modified {
    fetched.push_str(&format!(", last modified {}", last_modified));
  }

  format!(
    "  fetched:  {}\n  saved:    {}\n  payload:  {}\n  cache:    {}\n",
    fetched,
    record.local_save_timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    describe_payload(record),
    path.display()
  )
}

fn describe_payload(record: &CacheRecord) -> String {
  if record.data.is_empty() {
    return "empty".to_string();
  }
  match record.data.as_map().get("rows").and_then(Value::as_array) {
    Some(rows) => format!("{} rows", rows.len()),
    None => format!("{} top-level keys", record.data.len()),
  }
}

/// Preview of the first `limit` entries of a cached payload.
///
/// Tabular payloads list rows; anything else is flattened into
/// `path = value` lines in key order.
pub fn preview(name: &str, record: &CacheRecord, path: &Path, limit: usize) -> String {
  let mut out = format!("{}\n", name);
  out.push_str(&record_details(record, path));
  out.push('\n');

  let map = record.data.as_map();
  if let Some(rows) = map.get("rows").and_then(Value::as_array) {
    for row in rows.iter().take(limit) {
      out.push_str(&row_line(row));
      out.push('\n');
    }
    out.push_str(&format!("\nshowing {} of {} rows\n", rows.len().min(limit), rows.len()));
    return out;
  }

  let mut leaves = Vec::new();
  let mut total = 0;
  let mut keys: Vec<&String> = map.keys().collect();
  keys.sort();
  for key in keys {
    collect_leaves(key.clone(), &map[key], limit, &mut leaves, &mut total);
  }
  for (path, value) in &leaves {
    out.push_str(&format!("{} = {}\n", path, value));
  }
  out.push_str(&format!("\nshowing {} of {} values\n", leaves.len(), total));
  out
}

fn row_line(row: &Value) -> String {
  match row.as_object() {
    Some(fields) => fields
      .iter()
      .map(|(k, v)| format!("{}={}", k, scalar(v)))
      .collect::<Vec<_>>()
      .join("  "),
    None => scalar(row),
  }
}

fn scalar(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn collect_leaves(
  path: String,
  value: &Value,
  limit: usize,
  leaves: &mut Vec<(String, String)>,
  total: &mut usize,
) {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      for key in keys {
        collect_leaves(format!("{}.{}", path, key), &map[key], limit, leaves, total);
      }
    }
    other => {
      *total += 1;
      if leaves.len() < limit {
        leaves.push((path, scalar(other)));
      }
    }
  }
}
