//! Study configuration
//!
//! Everything that identifies one listening study lives here: the accent/speaker
//! partition used to stratify sampling, the registry of systems whose audio is
//! compared, and the per-test plans (sample counts, system subsets, excluded
//! speakers). A [`StudyConfig`] is built once, optionally from a JSON file, and
//! passed by reference to the sampler, the fetcher and the config builders.

use crate::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The three sub-tests of the study, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestKind {
    /// Naturalness rating (MUSHRA)
    #[serde(rename = "MUSHRANAT")]
    MushraNat,
    /// Accentedness rating (MUSHRA)
    #[serde(rename = "MUSHRAACT")]
    MushraAct,
    /// Speaker similarity ranking (best-worst scaling)
    #[serde(rename = "BWSSIM")]
    BwsSim,
}

impl TestKind {
    pub const ALL: [TestKind; 3] = [TestKind::MushraNat, TestKind::MushraAct, TestKind::BwsSim];

    /// Tag used for output file names, test IDs and the JS config name.
    pub fn tag(&self) -> &'static str {
        match self {
            TestKind::MushraNat => "MUSHRANAT",
            TestKind::MushraAct => "MUSHRAACT",
            TestKind::BwsSim => "BWSSIM",
        }
    }

    /// File name of the selector's metadata output for this test.
    pub fn metadata_file(&self) -> &'static str {
        match self {
            TestKind::MushraNat => "naturalness.json",
            TestKind::MushraAct => "accentedness.json",
            TestKind::BwsSim => "spksim.json",
        }
    }

    pub fn is_mushra(&self) -> bool {
        matches!(self, TestKind::MushraNat | TestKind::MushraAct)
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for TestKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TestKind::ALL
            .into_iter()
            .find(|kind| kind.tag().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownTestKind(s.to_string()))
    }
}

/// One accent group and the speakers that belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accent {
    pub name: String,
    pub speakers: Vec<String>,
}

impl Accent {
    pub fn new<I, S>(name: impl Into<String>, speakers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            speakers: speakers.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered partition of speakers into accent groups.
///
/// Iteration order is the declaration order, which fixes the order in which
/// speakers are visited during sampling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccentTable {
    accents: Vec<Accent>,
}

impl AccentTable {
    pub fn new(accents: Vec<Accent>) -> Self {
        Self { accents }
    }

    pub fn accents(&self) -> &[Accent] {
        &self.accents
    }

    /// All speakers, accent by accent.
    pub fn speakers(&self) -> impl Iterator<Item = &str> + '_ {
        self.accents
            .iter()
            .flat_map(|accent| accent.speakers.iter().map(String::as_str))
    }

    pub fn num_speakers(&self) -> usize {
        self.accents.iter().map(|accent| accent.speakers.len()).sum()
    }

    pub fn accent_of(&self, speaker: &str) -> Option<&str> {
        self.accents
            .iter()
            .find(|accent| accent.speakers.iter().any(|s| s == speaker))
            .map(|accent| accent.name.as_str())
    }

    pub fn contains(&self, speaker: &str) -> bool {
        self.accent_of(speaker).is_some()
    }
}

impl Default for AccentTable {
    fn default() -> Self {
        Self::new(vec![
            Accent::new("<ar>", ["ABA", "YBAA", "ZHAA", "SKA"]),
            Accent::new("<zh>", ["BWC", "LXC", "NCC", "TXHC"]),
            Accent::new("<hi>", ["ASI", "RRBI", "SVBI", "TNI"]),
            Accent::new("<ko>", ["HJK", "YDCK", "YKWK", "HKK"]),
            Accent::new("<es>", ["EBVS", "ERMS", "NJS", "MBMPS"]),
            Accent::new("<vi>", ["HQTV", "PNV", "THV", "TLV"]),
            Accent::new("<us>", ["BDL", "RMS", "SLT", "CLB"]),
        ])
    }
}

/// A named audio source compared in the study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub system: String,
    /// Directory holding this system's audio, relative to the study audio root.
    pub audio_dir: PathBuf,
    /// File name pattern with `{spk}` and `{sid}` placeholders.
    pub name_pattern: String,
    /// Short anonymous label shown in best-worst scaling tests.
    #[serde(default)]
    pub bws_label: Option<String>,
}

impl SystemInfo {
    pub fn new(
        system: impl Into<String>,
        audio_dir: impl Into<PathBuf>,
        bws_label: Option<&str>,
    ) -> Self {
        Self {
            system: system.into(),
            audio_dir: audio_dir.into(),
            name_pattern: "{spk}_{sid}.wav".to_string(),
            bws_label: bws_label.map(str::to_string),
        }
    }

    /// Source file name for one utterance.
    pub fn source_name(&self, speaker: &str, sentence_id: &str) -> String {
        self.name_pattern
            .replace("{spk}", speaker)
            .replace("{sid}", sentence_id)
    }
}

/// Per-test selection and presentation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    pub kind: TestKind,
    /// Number of samples the selector draws for this test.
    pub num_samples: usize,
    pub max_tests_per_run: usize,
    /// Systems presented in this test, by registry name.
    pub systems: Vec<String>,
    /// Speakers whose sampling weight is forced to zero.
    #[serde(default)]
    pub excluded_speakers: Vec<String>,
}

/// Constants consumed by the BeaqleJS front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub service_url: String,
    pub supervisor_contact: String,
    pub audio_root: String,
    pub rate_scale_background: String,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            service_url: "/web_service/beaqleJS_Service.php".to_string(),
            supervisor_contact: String::new(),
            audio_root: String::new(),
            rate_scale_background: "img/scale_abs_background.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub accents: AccentTable,
    pub systems: Vec<SystemInfo>,
    /// Test plans in processing order.
    pub tests: Vec<TestPlan>,
    pub audio_root: PathBuf,
    pub target_sample_rate: u32,
    pub ui: UiSettings,
}

fn to_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for StudyConfig {
    fn default() -> Self {
        let mushra_systems = ["source", "baseline", "ours", "ours_scaling", "ours_control"];
        let bws_systems = ["Reference", "baseline", "ours", "ours_scaling", "ours_control"];

        Self {
            accents: AccentTable::default(),
            systems: vec![
                SystemInfo::new("Reference", "source", Some("Reference")),
                SystemInfo::new("source", "source", None),
                SystemInfo::new("baseline", "baseline", Some("W")),
                SystemInfo::new("ours", "ours", Some("Z")),
                SystemInfo::new("ours_scaling", "ours_scaling", Some("Y")),
                SystemInfo::new("ours_control", "ours_control", Some("X")),
            ],
            tests: vec![
                TestPlan {
                    kind: TestKind::MushraNat,
                    num_samples: 650,
                    max_tests_per_run: 20,
                    systems: to_names(&mushra_systems),
                    excluded_speakers: Vec::new(),
                },
                TestPlan {
                    kind: TestKind::MushraAct,
                    num_samples: 600,
                    max_tests_per_run: 20,
                    systems: to_names(&mushra_systems),
                    excluded_speakers: to_names(&["BDL", "RMS", "SLT", "CLB"]),
                },
                TestPlan {
                    kind: TestKind::BwsSim,
                    num_samples: 650,
                    max_tests_per_run: 20,
                    systems: to_names(&bws_systems),
                    excluded_speakers: Vec::new(),
                },
            ],
            audio_root: PathBuf::from("./listening_test_interspeech2025/samples"),
            target_sample_rate: 22050,
            ui: UiSettings::default(),
        }
    }
}

impl StudyConfig {
    /// Load a study description from a JSON file; missing fields take the default study's values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`StudyConfig::validate`].
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading study configuration from {:?}", path);
        let raw = fs::read_to_string(path)?;
        let config: StudyConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross references between accents, systems and test plans.
    pub fn validate(&self) -> Result<()> {
        if let Some(accent) = self.accents.accents().iter().find(|a| a.speakers.is_empty()) {
            return Err(Error::InvalidConfig(format!("accent {} has no speakers", accent.name)));
        }

        let mut seen = HashSet::new();
        for speaker in self.accents.speakers() {
            if !seen.insert(speaker) {
                return Err(Error::InvalidConfig(format!(
                    "speaker {speaker} appears in more than one accent"
                )));
            }
        }

        let mut kinds = HashSet::new();
        for plan in &self.tests {
            if !kinds.insert(plan.kind) {
                return Err(Error::InvalidConfig(format!("test {} is planned twice", plan.kind)));
            }
            for system in &plan.systems {
                self.system(system)?;
            }
            for speaker in &plan.excluded_speakers {
                if !self.accents.contains(speaker) {
                    return Err(Error::InvalidConfig(format!(
                        "excluded speaker {speaker} of test {} is not in the accent table",
                        plan.kind
                    )));
                }
            }
        }

        if self.target_sample_rate == 0 {
            return Err(Error::InvalidConfig("target sample rate must be positive".into()));
        }
        Ok(())
    }

    pub fn system(&self, name: &str) -> Result<&SystemInfo> {
        self.systems
            .iter()
            .find(|info| info.system == name)
            .ok_or_else(|| Error::UnknownSystem(name.to_string()))
    }

    pub fn plan(&self, kind: TestKind) -> Result<&TestPlan> {
        self.tests
            .iter()
            .find(|plan| plan.kind == kind)
            .ok_or_else(|| Error::InvalidConfig(format!("no plan configured for test {kind}")))
    }

    /// Systems presented in a test, in registry order.
    pub fn systems_for(&self, kind: TestKind) -> Result<Vec<&SystemInfo>> {
        let plan = self.plan(kind)?;
        for name in &plan.systems {
            self.system(name)?;
        }
        Ok(self
            .systems
            .iter()
            .filter(|info| plan.systems.contains(&info.system))
            .collect())
    }

    /// Directory holding a system's source audio.
    pub fn system_dir(&self, info: &SystemInfo) -> PathBuf {
        self.audio_root.join(&info.audio_dir)
    }
}
