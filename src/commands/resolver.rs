//! Fuzzy resolution of recognized text to a command identifier.

use crate::commands::phrase_table::PhraseTable;
use crate::commands::similarity::{Scorer, token_sort_ratio};
use crate::defaults;

/// A successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub command: String,
    /// The phrase that matched best.
    pub phrase: String,
    /// Similarity, 0-100.
    pub score: f64,
}

impl Resolution {
    /// Score rounded for display.
    pub fn rounded_score(&self) -> u8 {
        self.score.round().clamp(0.0, 100.0) as u8
    }
}

/// Maps free text to the command of its best-matching phrase.
///
/// Built once from an immutable [`PhraseTable`]; phrases are scanned in table
/// order, so ties resolve the same way every time.
#[derive(Debug, Clone)]
pub struct CommandResolver {
    /// `(phrase, command)` in table order.
    phrases: Vec<(String, String)>,
    threshold: u8,
    scorer: Scorer,
}

impl CommandResolver {
    pub fn new(table: &PhraseTable, threshold: u8, scorer: Scorer) -> Self {
        let phrases = table
            .entries()
            .iter()
            .flat_map(|entry| {
                entry
                    .phrases
                    .iter()
                    .map(|phrase| (phrase.clone(), entry.command.clone()))
            })
            .collect();
        Self {
            phrases,
            threshold,
            scorer,
        }
    }

    /// Resolver with the default threshold and scorer.
    pub fn with_defaults(table: &PhraseTable) -> Self {
        Self::new(table, defaults::RESOLVE_THRESHOLD, Scorer::default())
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn scorer(&self) -> Scorer {
        self.scorer
    }

    /// Best-scoring phrase regardless of the threshold.
    ///
    /// Ties on the primary score are broken by token-sort similarity, then
    /// by table order.
    pub fn best_match(&self, text: &str) -> Option<Resolution> {
        let mut best: Option<(f64, f64, usize)> = None;
        for (index, (phrase, _)) in self.phrases.iter().enumerate() {
            let score = self.scorer.score(text, phrase);
            let secondary = token_sort_ratio(text, phrase);
            let better = match best {
                None => true,
                Some((top, top_secondary, _)) => {
                    score > top || (score == top && secondary > top_secondary)
                }
            };
            if better {
                best = Some((score, secondary, index));
            }
        }

        best.map(|(score, _, index)| {
            let (phrase, command) = &self.phrases[index];
            Resolution {
                command: command.clone(),
                phrase: phrase.clone(),
                score,
            }
        })
    }

    /// Resolve `text`, or `None` if no phrase reaches the threshold.
    pub fn resolve(&self, text: &str) -> Option<Resolution> {
        let best = self.best_match(text)?;
        if best.score >= f64::from(self.threshold) {
            tracing::debug!(
                text,
                command = %best.command,
                phrase = %best.phrase,
                score = best.score,
                "resolved"
            );
            Some(best)
        } else {
            tracing::debug!(text, best = best.score, "no phrase above threshold");
            None
        }
    }
}
