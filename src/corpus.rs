//! Corpus index and sample metadata
//!
//! The corpus is a tab-separated text file with one utterance per line,
//! `{speaker}_{sentence_id}<TAB>{text}`. It is indexed as speaker → sentence
//! IDs plus a global sentence ID → text map. Selected samples are exchanged
//! between the selector and the fetcher as JSON arrays of [`SampleRecord`].

use crate::{Error, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

/// One selected (speaker, sentence) pair together with its prompt text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleRecord {
    pub speaker: String,
    pub sentence_id: String,
    pub text: String,
}

/// Speaker → sentence index of a test corpus.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    sentences: BTreeMap<String, BTreeSet<String>>,
    texts: HashMap<String, String>,
}

impl Corpus {
    /// Read and index a corpus file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any line is malformed.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let corpus = Self::parse(&raw)?;
        info!(
            "Loaded corpus {:?}: {} speakers, {} utterances",
            path.as_ref(),
            corpus.sentences.len(),
            corpus.num_utterances()
        );
        Ok(corpus)
    }

    /// Index corpus text.
    ///
    /// Blank lines are skipped. A sentence ID uttered by several speakers keeps
    /// the text of its first occurrence.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut corpus = Self::default();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let malformed = |message: &str| Error::Corpus {
                line: idx + 1,
                message: message.to_string(),
            };

            let mut fields = line.split('\t');
            let (uid, text) = match (fields.next(), fields.next(), fields.next()) {
                (Some(uid), Some(text), None) => (uid, text),
                _ => return Err(malformed("expected exactly two tab-separated fields")),
            };
            let (speaker, sentence_id) = uid
                .split_once('_')
                .ok_or_else(|| malformed("utterance ID has no speaker prefix"))?;
            if speaker.is_empty() || sentence_id.is_empty() {
                return Err(malformed("empty speaker or sentence ID"));
            }

            corpus.insert(speaker, sentence_id, text);
        }
        Ok(corpus)
    }

    pub fn insert(&mut self, speaker: &str, sentence_id: &str, text: &str) {
        self.sentences
            .entry(speaker.to_string())
            .or_default()
            .insert(sentence_id.to_string());
        self.texts
            .entry(sentence_id.to_string())
            .or_insert_with(|| text.to_string());
    }

    pub fn speakers(&self) -> impl Iterator<Item = &str> + '_ {
        self.sentences.keys().map(String::as_str)
    }

    /// Sentence IDs uttered by a speaker.
    pub fn sentences(&self, speaker: &str) -> Option<&BTreeSet<String>> {
        self.sentences.get(speaker)
    }

    pub fn text(&self, sentence_id: &str) -> Option<&str> {
        self.texts.get(sentence_id).map(String::as_str)
    }

    pub fn contains(&self, speaker: &str, sentence_id: &str) -> bool {
        self.sentences
            .get(speaker)
            .map_or(false, |ids| ids.contains(sentence_id))
    }

    pub fn num_utterances(&self) -> usize {
        self.sentences.values().map(BTreeSet::len).sum()
    }

    /// Attach prompt text to a selected pair.
    pub fn record(&self, speaker: &str, sentence_id: &str) -> Result<SampleRecord> {
        let text = self.text(sentence_id).ok_or_else(|| {
            Error::InvalidInput(format!("sentence {sentence_id} is not in the corpus"))
        })?;
        Ok(SampleRecord {
            speaker: speaker.to_string(),
            sentence_id: sentence_id.to_string(),
            text: text.to_string(),
        })
    }
}

/// Write a metadata list as a pretty-printed JSON array (4-space indent).
///
/// The document is rendered in memory first so a serialization failure never
/// leaves a truncated file behind.
pub fn write_metadata<P: AsRef<Path>>(path: P, records: &[SampleRecord]) -> Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records.serialize(&mut serializer)?;
    fs::write(path.as_ref(), buf)?;
    info!("Wrote {} samples to {:?}", records.len(), path.as_ref());
    Ok(())
}

pub fn read_metadata<P: AsRef<Path>>(path: P) -> Result<Vec<SampleRecord>> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
