//! Fragment buffering between the transport and the transcript

use serde::{Deserialize, Serialize};

/// When buffered fragment text is released to the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Release every fragment as soon as it arrives
    EveryFragment,
    /// Hold text until it contains whitespace or ends a sentence
    #[default]
    WordBoundary,
}

/// Accumulates fragments and releases them according to a [`FlushPolicy`]
///
/// Released pieces concatenate to exactly the pushed input once
/// [`FragmentBuffer::finish`] has been called.
#[derive(Debug, Clone, Default)]
pub struct FragmentBuffer {
    policy: FlushPolicy,
    pending: String,
}

impl FragmentBuffer {
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            pending: String::new(),
        }
    }

    /// Add a fragment, returning text that is ready to apply
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.pending.push_str(fragment);
        let ready = match self.policy {
            FlushPolicy::EveryFragment => true,
            FlushPolicy::WordBoundary => {
                self.pending.contains(char::is_whitespace) || self.pending.ends_with('.')
            }
        };
        if ready {
            self.take()
        } else {
            None
        }
    }

    /// Release whatever is still held
    pub fn finish(&mut self) -> Option<String> {
        self.take()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(policy: FlushPolicy, fragments: &[&str]) -> Vec<String> {
        let mut buffer = FragmentBuffer::new(policy);
        let mut out: Vec<String> = fragments.iter().filter_map(|f| buffer.push(f)).collect();
        out.extend(buffer.finish());
        out
    }

    #[test]
    fn test_every_fragment_passes_through() {
        let out = run(FlushPolicy::EveryFragment, &["4", " is", " the answer."]);
        assert_eq!(out, vec!["4", " is", " the answer."]);
    }

    #[test]
    fn test_word_boundary_holds_partial_words() {
        let out = run(FlushPolicy::WordBoundary, &["Hel", "lo", " wor", "ld"]);
        assert_eq!(out, vec!["Hello wor", "ld"]);
    }

    #[test]
    fn test_word_boundary_flushes_on_sentence_end() {
        let mut buffer = FragmentBuffer::new(FlushPolicy::WordBoundary);
        assert_eq!(buffer.push("Done."), Some("Done.".to_string()));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_concatenation_is_preserved() {
        let fragments = ["Th", "e qu", "ick\nbr", "own", " fox", ".", "", "ju", "mps"];
        for policy in [FlushPolicy::EveryFragment, FlushPolicy::WordBoundary] {
            let joined: String = run(policy, &fragments).concat();
            assert_eq!(joined, fragments.concat());
        }
    }

    #[test]
    fn test_empty_fragments_produce_nothing() {
        assert!(run(FlushPolicy::EveryFragment, &["", ""]).is_empty());
    }
}
