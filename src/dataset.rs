use std::path::Path;

use crate::aggregate::Dataset;
use crate::error::HarvestError;

/// Write `dataset` as one delimited file.
///
/// Header: `sample_id`, `language`, every metric column, then the label
/// column when labels were joined. Missing values are empty fields.
pub fn write_dataset(dataset: &Dataset, path: &Path, delimiter: u8) -> Result<(), HarvestError> {
    write_inner(dataset, path, delimiter).map_err(|source| HarvestError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn write_inner(dataset: &Dataset, path: &Path, delimiter: u8) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;

    let mut header = vec!["sample_id".to_string(), "language".to_string()];
    header.extend(dataset.columns.iter().map(ToString::to_string));
    if let Some(label) = &dataset.label_column {
        header.push(label.clone());
    }
    writer.write_record(&header)?;

    for row in &dataset.rows {
        let mut fields = Vec::with_capacity(header.len());
        fields.push(row.sample_id.clone());
        fields.push(
            row.languages
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("+"),
        );
        fields.extend(
            row.values
                .iter()
                .map(|v| v.as_ref().map(ToString::to_string).unwrap_or_default()),
        );
        if dataset.label_column.is_some() {
            fields.push(row.label.as_ref().map(ToString::to_string).unwrap_or_default());
        }
        writer.write_record(&fields)?;
    }

    writer.flush()?;
    tracing::info!(path = %path.display(), rows = dataset.rows.len(), "dataset written");
    Ok(())
}
