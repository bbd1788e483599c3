//! Flattening of SDMX-JSON responses into tabular rows.
//!
//! An SDMX-JSON observation is keyed by colon-separated dimension indices
//! (`"0:3:1:..."`). Each index resolves against
//! `data.structure.dimensions.observation[n].values`, giving one named column
//! per dimension plus the observed value.

use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

/// Column holding the observed value.
pub const OBSERVATION_COLUMN: &str = "CO2_Emissions";

struct Dimension<'a> {
  id: &'a str,
  values: &'a [Value],
}

fn missing(path: &str) -> SyncError {
  SyncError::Serialization(format!("SDMX response is missing {}", path))
}

fn dimensions(root: &Value) -> Result<Vec<Dimension<'_>>> {
  let dims = root
    .pointer("/data/structure/dimensions/observation")
    .and_then(Value::as_array)
    .ok_or_else(|| missing("data.structure.dimensions.observation"))?;

  let mut out = Vec::with_capacity(dims.len());
  for (i, dim) in dims.iter().enumerate() {
    let id = dim
      .get("id")
      .and_then(Value::as_str)
      .ok_or_else(|| missing(&format!("an id for dimension {}", i)))?;
    let values = dim
      .get("values")
      .and_then(Value::as_array)
      .ok_or_else(|| missing(&format!("values for dimension {}", id)))?;
    out.push(Dimension { id, values });
  }
  Ok(out)
}

fn parse_key(key: &str, dim_count: usize) -> Result<Vec<usize>> {
  let indices = key
    .split(':')
    .map(|part| part.parse::<usize>())
    .collect::<std::result::Result<Vec<_>, _>>()
    .map_err(|_| SyncError::Serialization(format!("invalid SDMX observation key '{}'", key)))?;

  if indices.len() != dim_count {
    return Err(SyncError::Serialization(format!(
      "SDMX observation key '{}' has {} indices, expected {}",
      key,
      indices.len(),
      dim_count
    )));
  }
  Ok(indices)
}

/// Flatten an SDMX-JSON document into `(columns, rows)`.
///
/// Rows are ordered by their dimension indices so the output is stable
/// regardless of the order observations arrive in.
pub fn flatten(root: &Value) -> Result<(Vec<String>, Vec<Map<String, Value>>)> {
  let observations = root
    .pointer("/data/dataSets/0/observations")
    .and_then(Value::as_object)
    .ok_or_else(|| missing("data.dataSets[0].observations"))?;
  let dims = dimensions(root)?;

  let mut keyed = Vec::with_capacity(observations.len());
  for (key, obs) in observations {
    keyed.push((parse_key(key, dims.len())?, obs));
  }
  keyed.sort_by(|a, b| a.0.cmp(&b.0));

  let mut rows = Vec::with_capacity(keyed.len());
  for (indices, obs) in keyed {
    let mut row = Map::new();
    for (dim, idx) in dims.iter().zip(indices) {
      let entry = dim.values.get(idx).ok_or_else(|| {
        SyncError::Serialization(format!(
          "SDMX index {} out of range for dimension {}",
          idx, dim.id
        ))
      })?;
      let name = entry
        .get("name")
        .or_else(|| entry.get("id"))
        .cloned()
        .unwrap_or(Value::Null);
      row.insert(dim.id.to_string(), name);
    }

    let value = match obs {
      Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
      other => other.clone(),
    };
    row.insert(OBSERVATION_COLUMN.to_string(), value);
    rows.push(row);
  }

  let mut columns: Vec<String> = dims.iter().map(|d| d.id.to_string()).collect();
  columns.push(OBSERVATION_COLUMN.to_string());

  Ok((columns, rows))
}
