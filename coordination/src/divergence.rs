//! Divergence annotation for a dispatch batch
//!
//! Replies in one batch are compared pairwise with a lexical Jaccard score.
//! A reply whose overlap with another falls below the threshold is marked as
//! contested, naming the first reply it diverged from. This is a crude word
//! overlap heuristic: paraphrases with little shared vocabulary are flagged
//! too.

use std::collections::HashSet;

use tracing::debug;

use crate::history::Message;

/// Similarity below which two replies count as diverging
pub const DIVERGENCE_THRESHOLD: f64 = 0.8;

/// Normalize `text` into its set of unique tokens.
///
/// Lowercases, drops everything except ASCII letters, digits and whitespace,
/// then splits on whitespace.
pub fn tokenize(text: &str) -> HashSet<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    normalized.split_whitespace().map(str::to_string).collect()
}

/// Jaccard index of the token sets of `a` and `b`, in `[0, 1]`.
///
/// Zero when either text has no tokens.
pub fn similarity(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

/// Note attached to a reply that diverged from `other`
pub fn divergence_note(other: &str) -> String {
    format!("{other} gave a different answer. Review this reply against {other}'s answer.")
}

/// Marks contested replies within one dispatch batch
#[derive(Debug, Clone)]
pub struct DivergenceAnnotator {
    threshold: f64,
}

impl Default for DivergenceAnnotator {
    fn default() -> Self {
        Self::new(DIVERGENCE_THRESHOLD)
    }
}

impl DivergenceAnnotator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Annotate diverging messages in place and return how many were newly
    /// annotated.
    ///
    /// Each message is scanned independently against every other message in
    /// batch order and takes the first one it diverges from. With two
    /// diverging replies both get annotated, each naming the other. Messages
    /// that already carry an annotation are left alone.
    pub fn annotate(&self, batch: &mut [Message]) -> usize {
        if batch.len() < 2 {
            return 0;
        }

        let token_sets: Vec<HashSet<String>> = batch.iter().map(|m| tokenize(&m.text)).collect();

        let mut notes: Vec<Option<String>> = vec![None; batch.len()];
        for (i, note) in notes.iter_mut().enumerate() {
            if batch[i].annotation.is_some() {
                continue;
            }

            let diverged_from = (0..batch.len())
                .filter(|&j| j != i)
                .find(|&j| jaccard(&token_sets[i], &token_sets[j]) < self.threshold);

            if let Some(j) = diverged_from {
                *note = Some(divergence_note(&batch[j].sender));
            }
        }

        let mut annotated = 0;
        for (message, note) in batch.iter_mut().zip(notes) {
            if let Some(note) = note {
                if message.annotate(note) {
                    annotated += 1;
                }
            }
        }

        debug!(batch = batch.len(), annotated, "Divergence scan complete");
        annotated
    }
}

fn jaccard(left: &HashSet<String>, right: &HashSet<String>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    left.intersection(right).count() as f64 / left.union(right).count() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(texts: &[&str]) -> Vec<Message> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let id = format!("r{i}");
                Message::from_responder(&id, &format!("R{i}"), *text, 100, i)
            })
            .collect()
    }

    #[test]
    fn test_tokenize_strips_punctuation_and_collapses() {
        let tokens = tokenize("Hello, HELLO world! 42\tnew\nline é");
        let expected: HashSet<String> = ["hello", "world", "42", "new", "line"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_similarity_properties() {
        let pairs = [
            ("the cat sat", "the dog sat"),
            ("Rust is fast", "rust, is FAST!"),
            ("", "anything"),
            ("a b c d", "c d e"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }

        assert_eq!(similarity("the cat sat", "the cat sat"), 1.0);
        assert_eq!(similarity("Rust is fast", "rust, is FAST!"), 1.0);
        assert_eq!(similarity("alpha beta", "gamma delta"), 0.0);
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("!!!", "!!!"), 0.0);
        assert_eq!(similarity("the cat sat", "the dog sat"), 0.5);
    }

    #[test]
    fn test_odd_one_out_annotates_everyone_once() {
        let mut messages = batch(&["the cat sat", "the cat sat", "completely unrelated text here"]);
        let annotator = DivergenceAnnotator::default();

        let count = annotator.annotate(&mut messages);

        assert_eq!(count, 3);
        assert_eq!(messages[0].annotation.as_deref(), Some(divergence_note("R2").as_str()));
        assert_eq!(messages[1].annotation.as_deref(), Some(divergence_note("R2").as_str()));
        assert_eq!(messages[2].annotation.as_deref(), Some(divergence_note("R0").as_str()));
    }

    #[test]
    fn test_two_diverging_replies_blame_each_other() {
        let mut messages = batch(&["yes absolutely", "no never"]);
        DivergenceAnnotator::default().annotate(&mut messages);

        assert_eq!(messages[0].annotation, Some(divergence_note("R1")));
        assert_eq!(messages[1].annotation, Some(divergence_note("R0")));
    }

    #[test]
    fn test_agreeing_batch_is_untouched() {
        let mut messages = batch(&["water boils at 100 c", "Water boils at 100 C.", "water boils at 100 c"]);
        assert_eq!(DivergenceAnnotator::default().annotate(&mut messages), 0);
        assert!(messages.iter().all(|m| m.annotation.is_none()));
    }

    #[test]
    fn test_small_batches_are_noop() {
        let annotator = DivergenceAnnotator::default();

        let mut empty: Vec<Message> = Vec::new();
        assert_eq!(annotator.annotate(&mut empty), 0);

        let mut single = batch(&["only one"]);
        let before = single.clone();
        assert_eq!(annotator.annotate(&mut single), 0);
        assert_eq!(single, before);
    }

    #[test]
    fn test_existing_annotation_is_kept() {
        let mut messages = batch(&["yes", "no"]);
        messages[0].annotate("earlier note");

        assert_eq!(DivergenceAnnotator::default().annotate(&mut messages), 1);
        assert_eq!(messages[0].annotation.as_deref(), Some("earlier note"));
        assert!(messages[1].annotation.is_some());
    }

    #[test]
    fn test_custom_threshold() {
        let mut messages = batch(&["the cat sat", "the dog sat"]);
        assert_eq!(DivergenceAnnotator::new(0.5).annotate(&mut messages), 0);
        assert_eq!(DivergenceAnnotator::new(0.6).annotate(&mut messages), 2);
    }
}
