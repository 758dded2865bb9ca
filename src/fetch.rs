//! Stimulus fetching
//!
//! For every selected sample and every system presented in a test, the
//! system's source utterance is resolved from its directory and name pattern
//! and placed at `{output_dir}/{system}/{speaker}/{tag}-{sentence_id}.wav`.
//! File conversions are independent and run on the rayon pool.

use crate::corpus::SampleRecord;
use crate::study::{StudyConfig, TestKind};
use crate::utils::{resample_and_copy, CopyOutcome};
use crate::Result;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One evaluation unit of a BeaqleJS test set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "TestID")]
    pub test_id: String,
    #[serde(rename = "Text")]
    pub text: String,
    /// System key → stimulus path. Serialized in sorted key order, not registry order.
    #[serde(rename = "Files")]
    pub files: BTreeMap<String, String>,
    #[serde(rename = "LowText", default, skip_serializing_if = "Option::is_none")]
    pub low_text: Option<String>,
    #[serde(rename = "HighText", default, skip_serializing_if = "Option::is_none")]
    pub high_text: Option<String>,
    /// Number of systems ranked, reference excluded.
    #[serde(rename = "Length", default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

impl TestItem {
    pub fn new(kind: TestKind, record: &SampleRecord) -> Self {
        Self {
            name: record.sentence_id.clone(),
            test_id: format!("{}---{}---{}", kind.tag(), record.sentence_id, record.speaker),
            text: record.text.clone(),
            files: BTreeMap::new(),
            low_text: None,
            high_text: None,
            length: None,
        }
    }
}

/// A single source → target conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Where a system's stimulus for one sample lands in the output tree.
pub fn target_path(
    output_dir: &Path,
    system: &str,
    kind: TestKind,
    record: &SampleRecord,
) -> PathBuf {
    output_dir
        .join(system)
        .join(&record.speaker)
        .join(format!("{}-{}.wav", kind.tag(), record.sentence_id))
}

/// Resolve the items of a test and the file conversions they need, without touching disk.
pub fn plan_fetch(
    records: &[SampleRecord],
    kind: TestKind,
    study: &StudyConfig,
    output_dir: &Path,
) -> Result<(Vec<TestItem>, Vec<FetchJob>)> {
    let systems = study.systems_for(kind)?;
    let mut items = Vec::with_capacity(records.len());
    let mut jobs = Vec::with_capacity(records.len() * systems.len());

    for record in records {
        let mut item = TestItem::new(kind, record);
        for info in &systems {
            let source = study
                .system_dir(info)
                .join(info.source_name(&record.speaker, &record.sentence_id));
            let target = target_path(output_dir, &info.system, kind, record);
            item.files
                .insert(info.system.clone(), target.to_string_lossy().into_owned());
            jobs.push(FetchJob { source, target });
        }
        items.push(item);
    }

    Ok((items, jobs))
}

/// Fetch, convert and rename every stimulus of a test.
///
/// Returns the test items in the order of `records`, each mapping system
/// names to the written stimulus paths.
///
/// # Errors
///
/// Returns an error if a system is not registered, a source file is missing,
/// or any conversion fails. Already converted files are left in place; a rerun
/// overwrites them with identical content.
pub fn fetch_samples(
    records: &[SampleRecord],
    kind: TestKind,
    study: &StudyConfig,
    output_dir: &Path,
) -> Result<Vec<TestItem>> {
    let (items, jobs) = plan_fetch(records, kind, study, output_dir)?;
    info!(
        "Fetching {} stimuli for {} ({} items)",
        jobs.len(),
        kind,
        items.len()
    );

    let outcomes = jobs
        .par_iter()
        .map(|job| resample_and_copy(&job.source, &job.target, study.target_sample_rate))
        .collect::<Result<Vec<CopyOutcome>>>()?;

    let copied = outcomes
        .iter()
        .filter(|outcome| **outcome == CopyOutcome::Copied)
        .count();
    debug!(
        "{}: {} copied, {} resampled",
        kind,
        copied,
        outcomes.len() - copied
    );

    Ok(items)
}
