//! BeaqleJS test configurations
//!
//! Builds the MUSHRA (rating) and BWS (best-worst ranking) configurations
//! consumed by the BeaqleJS front end and writes them as a JavaScript
//! assignment, `var TestConfig = {...};`.

use crate::fetch::TestItem;
use crate::study::{StudyConfig, TestKind};
use crate::{Error, Result};
use log::{debug, info};
use rand::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Key of the reference stimulus in BWS tests. It is shown to raters but not ranked.
pub const REFERENCE_SYSTEM: &str = "Reference";

/// Suffix of the synthetic key that duplicates one system as hidden reference.
pub const HIDDEN_SUFFIX: &str = "---2";

/// Rating test configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MushraConfig {
    #[serde(rename = "TestName")]
    pub test_name: String,
    #[serde(rename = "RateScalePng")]
    pub rate_scale_png: String,
    #[serde(rename = "RateScaleBgPng")]
    pub rate_scale_bg_png: String,
    #[serde(rename = "RateMinValue")]
    pub rate_min_value: i32,
    #[serde(rename = "RateMaxValue")]
    pub rate_max_value: i32,
    #[serde(rename = "RateDefaultValue")]
    pub rate_default_value: i32,
    #[serde(rename = "ShowFileIDs")]
    pub show_file_ids: bool,
    #[serde(rename = "ShowResults")]
    pub show_results: bool,
    #[serde(rename = "LoopByDefault")]
    pub loop_by_default: bool,
    #[serde(rename = "EnableABLoop")]
    pub enable_ab_loop: bool,
    #[serde(rename = "EnableOnlineSubmission")]
    pub enable_online_submission: bool,
    #[serde(rename = "BeaqleServiceURL")]
    pub beaqle_service_url: String,
    #[serde(rename = "SupervisorContact")]
    pub supervisor_contact: String,
    #[serde(rename = "RandomizeTestOrder")]
    pub randomize_test_order: bool,
    #[serde(rename = "MaxTestsPerRun")]
    pub max_tests_per_run: usize,
    #[serde(rename = "RequireMaxRating")]
    pub require_max_rating: bool,
    #[serde(rename = "AudioRoot")]
    pub audio_root: String,
    #[serde(rename = "Testsets")]
    pub testsets: Vec<TestItem>,
}

/// Ranking test configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BwsConfig {
    #[serde(rename = "TestName")]
    pub test_name: String,
    #[serde(rename = "LoopByDefault")]
    pub loop_by_default: bool,
    #[serde(rename = "ShowFileIDs")]
    pub show_file_ids: bool,
    #[serde(rename = "ShowResults")]
    pub show_results: bool,
    #[serde(rename = "EnableABLoop")]
    pub enable_ab_loop: bool,
    #[serde(rename = "EnableOnlineSubmission")]
    pub enable_online_submission: bool,
    #[serde(rename = "BeaqleServiceURL")]
    pub beaqle_service_url: String,
    #[serde(rename = "MaxTestsPerRun")]
    pub max_tests_per_run: usize,
    #[serde(rename = "RandomizeTestOrder")]
    pub randomize_test_order: bool,
    #[serde(rename = "SupervisorContact")]
    pub supervisor_contact: String,
    #[serde(rename = "AudioRoot")]
    pub audio_root: String,
    #[serde(rename = "Testsets")]
    pub testsets: Vec<TestItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TestConfig {
    Mushra(MushraConfig),
    Bws(BwsConfig),
}

impl TestConfig {
    pub fn testsets(&self) -> &[TestItem] {
        match self {
            TestConfig::Mushra(config) => &config.testsets,
            TestConfig::Bws(config) => &config.testsets,
        }
    }
}

/// Add a hidden duplicate of one uniformly chosen system to an item.
///
/// Returns the duplicated system.
pub fn inject_hidden_reference<R: Rng + ?Sized>(item: &mut TestItem, rng: &mut R) -> Result<String> {
    let systems: Vec<&String> = item.files.keys().collect();
    let system = systems
        .choose(rng)
        .map(|s| s.to_string())
        .ok_or_else(|| Error::InvalidInput(format!("test item {} has no files", item.test_id)))?;
    let path = item.files[&system].clone();
    item.files.insert(format!("{system}{HIDDEN_SUFFIX}"), path);
    Ok(system)
}

/// Assemble a MUSHRA configuration.
///
/// Every item gets its own hidden reference, drawn independently, so the same
/// system may be duplicated in many items.
///
/// # Errors
///
/// Returns an error if `kind` is not a MUSHRA test, has no plan in `study`,
/// or an item has no files.
pub fn create_mushra_config<R: Rng + ?Sized>(
    kind: TestKind,
    mut items: Vec<TestItem>,
    study: &StudyConfig,
    rng: &mut R,
) -> Result<MushraConfig> {
    let (test_name, scale_png) = match kind {
        TestKind::MushraNat => (
            "Speech Naturalness Evaluation (MUSHRA)",
            "img/scale_natural.png",
        ),
        TestKind::MushraAct => (
            "Speech Accentedness Evaluation (MUSHRA)",
            "img/scale_accent.png",
        ),
        other => {
            return Err(Error::InvalidInput(format!("{other} is not a MUSHRA test")));
        }
    };
    let plan = study.plan(kind)?;

    for item in &mut items {
        let hidden = inject_hidden_reference(item, rng)?;
        debug!("{}: hidden reference {}", item.test_id, hidden);
    }

    Ok(MushraConfig {
        test_name: test_name.to_string(),
        rate_scale_png: scale_png.to_string(),
        rate_scale_bg_png: study.ui.rate_scale_background.clone(),
        rate_min_value: 0,
        rate_max_value: 100,
        rate_default_value: 0,
        show_file_ids: false,
        show_results: false,
        loop_by_default: false,
        enable_ab_loop: true,
        enable_online_submission: false,
        beaqle_service_url: study.ui.service_url.clone(),
        supervisor_contact: study.ui.supervisor_contact.clone(),
        randomize_test_order: true,
        max_tests_per_run: plan.max_tests_per_run,
        require_max_rating: false,
        audio_root: study.ui.audio_root.clone(),
        testsets: items,
    })
}

/// Replace system keys with their BWS labels.
pub fn relabel_files(
    files: &BTreeMap<String, String>,
    study: &StudyConfig,
) -> Result<BTreeMap<String, String>> {
    let mut relabeled = BTreeMap::new();
    let mut seen = HashSet::new();
    for (system, path) in files {
        let label = study
            .system(system)?
            .bws_label
            .clone()
            .ok_or_else(|| Error::MissingBwsLabel(system.clone()))?;
        if !seen.insert(label.clone()) {
            return Err(Error::DuplicateBwsLabel(label));
        }
        relabeled.insert(label, path.clone());
    }
    Ok(relabeled)
}

/// Assemble a BWS configuration.
///
/// `Length` counts the systems of an item other than the reference and is
/// computed before system keys are replaced by their labels.
///
/// # Errors
///
/// Returns an error if `kind` is not a BWS test, has no plan in `study`, or a
/// system has no label.
pub fn create_bws_config(
    kind: TestKind,
    mut items: Vec<TestItem>,
    study: &StudyConfig,
) -> Result<BwsConfig> {
    let (test_name, low_text, high_text) = match kind {
        TestKind::BwsSim => (
            "Speaker Similarity Evaluation (BWS)",
            "the 'LEAST' similar'",
            "the 'MOST' similar'",
        ),
        other => return Err(Error::InvalidInput(format!("{other} is not a BWS test"))),
    };
    let plan = study.plan(kind)?;

    for item in &mut items {
        item.low_text = Some(low_text.to_string());
        item.high_text = Some(high_text.to_string());
        item.length = Some(
            item.files
                .keys()
                .filter(|system| system.as_str() != REFERENCE_SYSTEM)
                .count(),
        );
        item.files = relabel_files(&item.files, study)?;
    }

    Ok(BwsConfig {
        test_name: test_name.to_string(),
        loop_by_default: false,
        show_file_ids: false,
        show_results: false,
        enable_ab_loop: true,
        enable_online_submission: false,
        beaqle_service_url: study.ui.service_url.clone(),
        max_tests_per_run: plan.max_tests_per_run,
        randomize_test_order: true,
        supervisor_contact: study.ui.supervisor_contact.clone(),
        audio_root: study.ui.audio_root.clone(),
        testsets: items,
    })
}

/// Build the configuration matching a test kind.
pub fn build_config<R: Rng + ?Sized>(
    kind: TestKind,
    items: Vec<TestItem>,
    study: &StudyConfig,
    rng: &mut R,
) -> Result<TestConfig> {
    if kind.is_mushra() {
        create_mushra_config(kind, items, study, rng).map(TestConfig::Mushra)
    } else {
        create_bws_config(kind, items, study).map(TestConfig::Bws)
    }
}

/// Render a configuration as `var TestConfig = {...};`.
pub fn to_js<T: Serialize>(config: &T) -> Result<String> {
    Ok(format!(
        "var TestConfig = {};",
        serde_json::to_string_pretty(config)?
    ))
}

/// Write config as a JavaScript variable to file
pub fn write_js_config<T: Serialize, P: AsRef<Path>>(config: &T, path: P) -> Result<()> {
    let js = to_js(config)?;
    fs::write(path.as_ref(), js)?;
    info!("Wrote test configuration {:?}", path.as_ref());
    Ok(())
}
