use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use walkdir::WalkDir;

use crate::models::{Language, Sample};

/// What a single sample covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleUnit {
    /// Every source file is its own sample.
    File,
    /// Every immediate subdirectory of the input is one sample per language.
    Directory,
}

/// Walk `root` and collect the samples of the requested languages.
///
/// Hidden files are skipped, as are paths (relative to `root`) matching any
/// of the `exclude` patterns. Samples are returned sorted by identifier.
pub fn discover_samples(
    root: &Path,
    languages: &[Language],
    unit: SampleUnit,
    exclude: &[String],
) -> Result<Vec<Sample>> {
    let exclude = exclude
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("invalid exclude pattern '{p}'")))
        .collect::<Result<Vec<_>>>()?;

    let files = source_files(root, languages, &exclude);

    let mut samples = match unit {
        SampleUnit::File => files
            .into_iter()
            .map(|(rel, language)| Sample {
                id: sample_id(&rel),
                language,
                path: root.join(&rel),
                files: vec![root.join(&rel)],
            })
            .collect::<Vec<_>>(),
        SampleUnit::Directory => group_by_directory(root, files),
    };

    samples.sort_by(|a, b| a.id.cmp(&b.id).then(a.language.cmp(&b.language)));
    tracing::info!(count = samples.len(), root = %root.display(), "discovered samples");
    Ok(samples)
}

/// Relative paths of all matching source files under `root`.
fn source_files(root: &Path, languages: &[Language], exclude: &[Regex]) -> Vec<(PathBuf, Language)> {
    let mut files = Vec::new();
    let mut skipped = 0usize;

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                skipped += 1;
                tracing::warn!(error = %err, "skipping directory entry");
                None
            }
        })
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(language) = language_of(entry.path(), languages) else {
            continue;
        };
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let id = sample_id(rel);
        if exclude.iter().any(|re| re.is_match(&id)) {
            tracing::debug!(path = %id, "excluded by pattern");
            continue;
        }
        files.push((rel.to_path_buf(), language));
    }

    if skipped > 0 {
        tracing::warn!(skipped, "some directory entries could not be read");
    }

    files
}

fn group_by_directory(root: &Path, files: Vec<(PathBuf, Language)>) -> Vec<Sample> {
    let mut groups: BTreeMap<(String, Language), Vec<PathBuf>> = BTreeMap::new();

    for (rel, language) in files {
        let mut components = rel.components();
        // files directly under the root belong to no project
        let (Some(first), Some(_)) = (components.next(), components.next()) else {
            tracing::debug!(path = %rel.display(), "ignoring top-level file in directory mode");
            continue;
        };
        let dir = first.as_os_str().to_string_lossy().into_owned();
        groups
            .entry((dir, language))
            .or_default()
            .push(root.join(&rel));
    }

    groups
        .into_iter()
        .map(|((dir, language), mut files)| {
            files.sort();
            Sample {
                path: root.join(&dir),
                id: dir,
                language,
                files,
            }
        })
        .collect()
}

fn language_of(path: &Path, languages: &[Language]) -> Option<Language> {
    let ext = path.extension()?.to_str()?;
    languages.iter().copied().find(|l| l.extension() == ext)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

fn sample_id(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
