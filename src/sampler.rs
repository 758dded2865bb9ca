//! Speaker-stratified sampling without replacement
//!
//! Each test draws a fixed number of (speaker, sentence) pairs. The count is
//! split into per-speaker quotas from speaker weights; the rounding shortfall
//! is handed out by random draws weighted by the quotas themselves. Sentences
//! drawn for one test are removed from the shared pool before the next test's
//! quotas are filled, so the tests never share a pair.

use crate::corpus::{Corpus, SampleRecord};
use crate::study::{StudyConfig, TestKind};
use crate::{Error, Result};
use log::{debug, info, warn};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Ordered per-speaker sampling weights.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerWeights {
    weights: Vec<(String, f64)>,
}

impl SpeakerWeights {
    /// Equal weight `1 / n` for every speaker.
    pub fn uniform<'a, I>(speakers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let speakers: Vec<&str> = speakers.into_iter().collect();
        let weight = if speakers.is_empty() {
            0.0
        } else {
            1.0 / speakers.len() as f64
        };
        Self {
            weights: speakers.into_iter().map(|s| (s.to_string(), weight)).collect(),
        }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            weights: pairs.into_iter().map(|(s, w)| (s.into(), w)).collect(),
        }
    }

    /// Copy with the given speakers' weights forced to zero.
    ///
    /// Remaining weights are left as they are; they are not renormalised.
    pub fn excluding<S: AsRef<str>>(&self, excluded: &[S]) -> Self {
        let weights = self
            .weights
            .iter()
            .map(|(speaker, weight)| {
                if excluded.iter().any(|e| e.as_ref() == speaker) {
                    (speaker.clone(), 0.0)
                } else {
                    (speaker.clone(), *weight)
                }
            })
            .collect();
        Self { weights }
    }

    pub fn get(&self, speaker: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|(s, _)| s == speaker)
            .map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.weights.iter().map(|(s, w)| (s.as_str(), *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Ordered per-speaker sample counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerQuotas {
    quotas: Vec<(String, usize)>,
}

impl SpeakerQuotas {
    pub fn get(&self, speaker: &str) -> usize {
        self.quotas
            .iter()
            .find(|(s, _)| s == speaker)
            .map_or(0, |(_, n)| *n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.quotas.iter().map(|(s, n)| (s.as_str(), *n))
    }

    pub fn total(&self) -> usize {
        self.quotas.iter().map(|(_, n)| n).sum()
    }
}

/// Split `num_samples` into per-speaker quotas.
///
/// Each speaker first gets `floor(weight * num_samples)`. The residual is then
/// drawn with replacement using those floored quotas as weights, so a speaker
/// with a zero quota never receives a residual sample.
///
/// # Errors
///
/// Returns [`Error::Sampling`] if there are no speakers to sample from, if the
/// floored quotas already exceed `num_samples`, or if a residual is left but
/// every quota is zero.
pub fn allocate_quotas<R: Rng + ?Sized>(
    num_samples: usize,
    weights: &SpeakerWeights,
    rng: &mut R,
) -> Result<SpeakerQuotas> {
    if weights.is_empty() && num_samples > 0 {
        return Err(Error::Sampling(format!(
            "cannot allocate {num_samples} samples without speakers"
        )));
    }
    let mut quotas: Vec<(String, usize)> = weights
        .iter()
        .map(|(speaker, weight)| {
            let weight = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
            (speaker.to_string(), (weight * num_samples as f64).floor() as usize)
        })
        .collect();

    let allocated: usize = quotas.iter().map(|(_, n)| n).sum();
    if allocated > num_samples {
        return Err(Error::Sampling(format!(
            "weights allocate {allocated} samples but only {num_samples} were requested"
        )));
    }

    let residual = num_samples - allocated;
    debug!(
        "Allocated {} of {} samples by weight, drawing {} residual",
        allocated, num_samples, residual
    );
    if residual > 0 {
        let dist = WeightedIndex::new(quotas.iter().map(|(_, n)| *n)).map_err(|e| {
            Error::Sampling(format!("cannot distribute {residual} residual samples: {e}"))
        })?;
        let picks: Vec<usize> = (0..residual).map(|_| dist.sample(rng)).collect();
        for idx in picks {
            quotas[idx].1 += 1;
        }
    }

    Ok(SpeakerQuotas { quotas })
}

/// Sentences not yet assigned to any test, per speaker.
#[derive(Debug, Clone, Default)]
pub struct SentencePool {
    remaining: BTreeMap<String, BTreeSet<String>>,
}

impl SentencePool {
    pub fn from_corpus(corpus: &Corpus) -> Self {
        let remaining = corpus
            .speakers()
            .filter_map(|speaker| {
                corpus
                    .sentences(speaker)
                    .map(|ids| (speaker.to_string(), ids.clone()))
            })
            .collect();
        Self { remaining }
    }

    pub fn remaining(&self, speaker: &str) -> usize {
        self.remaining.get(speaker).map_or(0, BTreeSet::len)
    }

    pub fn contains(&self, speaker: &str, sentence_id: &str) -> bool {
        self.remaining
            .get(speaker)
            .map_or(false, |ids| ids.contains(sentence_id))
    }

    /// Draw each speaker's quota of distinct sentences and remove them from the pool.
    ///
    /// Returns `(speaker, sentence_id)` pairs, speaker by speaker in quota order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientSentences`] if a quota exceeds the
    /// speaker's remaining sentences. Nothing is removed in that case.
    pub fn draw<R: Rng + ?Sized>(
        &mut self,
        quotas: &SpeakerQuotas,
        rng: &mut R,
    ) -> Result<Vec<(String, String)>> {
        for (speaker, quota) in quotas.iter() {
            let available = self.remaining(speaker);
            if quota > available {
                return Err(Error::InsufficientSentences {
                    speaker: speaker.to_string(),
                    requested: quota,
                    available,
                });
            }
        }

        let mut drawn = Vec::with_capacity(quotas.total());
        for (speaker, quota) in quotas.iter() {
            if quota == 0 {
                continue;
            }
            let Some(ids) = self.remaining.get_mut(speaker) else {
                continue;
            };
            let candidates: Vec<String> = ids.iter().cloned().collect();
            for sentence_id in candidates.choose_multiple(rng, quota) {
                ids.remove(sentence_id);
                drawn.push((speaker.to_string(), sentence_id.clone()));
            }
        }
        Ok(drawn)
    }
}

/// Draw every planned test's sample set from one shared pool.
///
/// Tests are processed in the order they are planned in `study`; that order is
/// part of what a seed reproduces.
///
/// # Errors
///
/// Returns an error if a quota cannot be allocated or filled.
pub fn select_disjoint_sets<R: Rng + ?Sized>(
    corpus: &Corpus,
    study: &StudyConfig,
    rng: &mut R,
) -> Result<Vec<(TestKind, Vec<SampleRecord>)>> {
    for speaker in corpus.speakers() {
        if !study.accents.contains(speaker) {
            warn!("Speaker {} is not in the accent table and will not be sampled", speaker);
        }
    }

    let weights = SpeakerWeights::uniform(study.accents.speakers());
    let mut pool = SentencePool::from_corpus(corpus);
    let mut sets = Vec::with_capacity(study.tests.len());

    for plan in &study.tests {
        let test_weights = weights.excluding(&plan.excluded_speakers);
        let quotas = allocate_quotas(plan.num_samples, &test_weights, rng)?;
        let pairs = pool.draw(&quotas, rng)?;
        let records = pairs
            .iter()
            .map(|(speaker, sentence_id)| corpus.record(speaker, sentence_id))
            .collect::<Result<Vec<_>>>()?;
        info!("Selected {} samples for {}", records.len(), plan.kind);
        sets.push((plan.kind, records));
    }

    Ok(sets)
}
