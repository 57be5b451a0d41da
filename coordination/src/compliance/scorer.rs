//! Similarity scoring capability
//!
//! The compliance gate only needs "how close is this message to each corpus
//! entry". A scorer builds an immutable index over the corpus; the gate
//! rebuilds the index from scratch whenever the corpus changes.

use std::collections::HashMap;

/// Builds similarity indexes over a reference corpus
pub trait SimilarityScorer: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Index the full corpus. Called again from scratch on every corpus change.
    fn build_index(&self, corpus: &[String]) -> Box<dyn CorpusIndex>;
}

/// Immutable similarity index over one corpus snapshot
pub trait CorpusIndex: Send + Sync + std::fmt::Debug {
    /// Similarity in [0, 1] between `message` and each corpus entry, in corpus order
    fn similarities(&self, message: &str) -> Vec<f64>;
}

/// Character n-gram TF-IDF vectors compared by cosine similarity.
///
/// Words are lowercased and padded with a space on each side before n-grams
/// are taken, so grams never straddle word boundaries.
#[derive(Debug, Clone, Copy)]
pub struct NgramCosineScorer {
    pub min_n: usize,
    pub max_n: usize,
}

impl Default for NgramCosineScorer {
    fn default() -> Self {
        Self { min_n: 2, max_n: 4 }
    }
}

impl NgramCosineScorer {
    pub fn new(min_n: usize, max_n: usize) -> Self {
        let min_n = min_n.max(1);
        Self {
            min_n,
            max_n: max_n.max(min_n),
        }
    }

    fn term_counts(&self, text: &str) -> HashMap<String, f64> {
        let mut counts: HashMap<String, f64> = HashMap::new();
        for word in text.to_lowercase().split_whitespace() {
            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for n in self.min_n..=self.max_n {
                if padded.len() < n {
                    if n == self.min_n {
                        *counts.entry(padded.iter().collect()).or_insert(0.0) += 1.0;
                    }
                    continue;
                }
                for gram in padded.windows(n) {
                    *counts.entry(gram.iter().collect()).or_insert(0.0) += 1.0;
                }
            }
        }
        counts
    }
}

impl SimilarityScorer for NgramCosineScorer {
    fn name(&self) -> &'static str {
        "ngram-tfidf-cosine"
    }

    fn build_index(&self, corpus: &[String]) -> Box<dyn CorpusIndex> {
        let counts: Vec<HashMap<String, f64>> =
            corpus.iter().map(|doc| self.term_counts(doc)).collect();

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for doc in &counts {
            for term in doc.keys() {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
        }

        // Smoothed IDF: ln((1 + N) / (1 + df)) + 1
        let n = corpus.len() as f64;
        let idf: HashMap<String, f64> = document_frequency
            .into_iter()
            .map(|(term, df)| (term, ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0))
            .collect();
        let unseen_idf = (1.0 + n).ln() + 1.0;

        let vectors = counts
            .into_iter()
            .map(|doc| normalize(weigh(doc, &idf, unseen_idf)))
            .collect();

        Box::new(NgramIndex {
            scorer: *self,
            idf,
            unseen_idf,
            vectors,
        })
    }
}

#[derive(Debug)]
struct NgramIndex {
    scorer: NgramCosineScorer,
    idf: HashMap<String, f64>,
    unseen_idf: f64,
    vectors: Vec<HashMap<String, f64>>,
}

impl CorpusIndex for NgramIndex {
    fn similarities(&self, message: &str) -> Vec<f64> {
        let query = normalize(weigh(
            self.scorer.term_counts(message),
            &self.idf,
            self.unseen_idf,
        ));
        self.vectors
            .iter()
            .map(|doc| {
                let dot: f64 = query
                    .iter()
                    .filter_map(|(term, w)| doc.get(term).map(|d| w * d))
                    .sum();
                dot.clamp(0.0, 1.0)
            })
            .collect()
    }
}

fn weigh(counts: HashMap<String, f64>, idf: &HashMap<String, f64>, unseen: f64) -> HashMap<String, f64> {
    counts
        .into_iter()
        .map(|(term, tf)| {
            let weight = idf.get(&term).copied().unwrap_or(unseen);
            (term, tf * weight)
        })
        .collect()
}

fn normalize(mut vector: HashMap<String, f64>) -> HashMap<String, f64> {
    let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in vector.values_mut() {
            *w /= norm;
        }
    }
    vector
}

/// Deterministic stub: 1.0 for an exact (trimmed) match, 0.0 otherwise
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatchScorer;

impl SimilarityScorer for ExactMatchScorer {
    fn name(&self) -> &'static str {
        "exact-match"
    }

    fn build_index(&self, corpus: &[String]) -> Box<dyn CorpusIndex> {
        Box::new(ExactIndex {
            entries: corpus.iter().map(|s| s.trim().to_string()).collect(),
        })
    }
}

#[derive(Debug)]
struct ExactIndex {
    entries: Vec<String>,
}

impl CorpusIndex for ExactIndex {
    fn similarities(&self, message: &str) -> Vec<f64> {
        let message = message.trim();
        self.entries
            .iter()
            .map(|e| if e == message { 1.0 } else { 0.0 })
            .collect()
    }
}
