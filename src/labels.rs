use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::models::MetricValue;

/// Externally supplied per-sample labels (e.g. NASA-TLX workload scores).
#[derive(Debug, Clone, PartialEq)]
pub struct Labels {
    column: String,
    values: BTreeMap<String, MetricValue>,
}

impl Labels {
    /// Read a delimited file whose first column holds sample ids.
    ///
    /// `column` picks the label column by header name; by default the second
    /// column is used. Rows with an empty label cell are skipped.
    pub fn load(path: &Path, column: Option<&str>, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("opening label file {}", path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .clone();
        if headers.len() < 2 {
            bail!(
                "label file {} needs a sample id column and a label column",
                path.display()
            );
        }

        let index = match column {
            Some(name) => headers
                .iter()
                .position(|h| h == name)
                .with_context(|| format!("label column '{name}' not found in {}", path.display()))?,
            None => 1,
        };
        if index == 0 {
            bail!("the label column cannot be the sample id column");
        }

        let mut values = BTreeMap::new();
        for (line, record) in reader.records().enumerate() {
            let record =
                record.with_context(|| format!("reading row {} of {}", line + 2, path.display()))?;
            let (Some(id), Some(cell)) = (record.get(0), record.get(index)) else {
                continue;
            };
            if id.is_empty() || cell.is_empty() {
                continue;
            }
            if values
                .insert(id.to_string(), MetricValue::from_cell(cell))
                .is_some()
            {
                tracing::warn!(sample = id, "duplicate label entry, keeping the last one");
            }
        }

        tracing::info!(count = values.len(), column = &headers[index], "loaded labels");
        Ok(Self {
            column: headers[index].to_string(),
            values,
        })
    }

    #[cfg(test)]
    pub fn from_pairs<'a>(
        column: &str,
        pairs: impl IntoIterator<Item = (&'a str, MetricValue)>,
    ) -> Self {
        Self {
            column: column.to_string(),
            values: pairs
                .into_iter()
                .map(|(id, v)| (id.to_string(), v))
                .collect(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn get(&self, sample_id: &str) -> Option<&MetricValue> {
        self.values.get(sample_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}
