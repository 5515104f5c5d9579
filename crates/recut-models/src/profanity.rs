//! Profanity matches, merging, and dub-phrase clustering.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::finding::Confidence;

/// A detected profanity instance. `word` may be a multi-word phrase once
/// adjacent matches have been merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfanityMatch {
    pub word: String,
    pub start_time: f64,
    pub end_time: f64,
    pub replacement: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
}

impl ProfanityMatch {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// A run of same-speaker matches merged for continuous-sounding replacement
/// speech. `phrase` is the space-joined replacement text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DubPhrase {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    pub phrase: String,
}

impl DubPhrase {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Merge adjacent matches separated by at most `gap` seconds into single
/// phrase matches. The envelope `[min start, max end]` of a merged run is
/// preserved; word and replacement texts are space-joined in time order.
///
/// Input must be sorted by start time (the analyzer contract); output is too.
pub fn merge_adjacent(matches: Vec<ProfanityMatch>, gap: f64) -> Vec<ProfanityMatch> {
    let mut merged: Vec<ProfanityMatch> = Vec::with_capacity(matches.len());

    for m in matches {
        match merged.last_mut() {
            Some(prev) if m.start_time - prev.end_time <= gap => {
                prev.word = format!("{} {}", prev.word, m.word);
                prev.replacement = format!("{} {}", prev.replacement, m.replacement);
                prev.end_time = prev.end_time.max(m.end_time);
                if !m.context.is_empty() {
                    prev.context = m.context;
                }
            }
            _ => merged.push(m),
        }
    }

    merged
}

/// Cluster matches into dub phrases: consecutive matches with the same
/// speaker and a gap below `gap` seconds become one phrase whose text is the
/// space-joined replacements and whose window is the outer envelope.
pub fn cluster_phrases(matches: &[ProfanityMatch], gap: f64) -> Vec<DubPhrase> {
    let mut phrases: Vec<DubPhrase> = Vec::new();

    for m in matches {
        match phrases.last_mut() {
            Some(prev)
                if prev.speaker_id == m.speaker_id && m.start_time - prev.end_time < gap =>
            {
                prev.phrase = format!("{} {}", prev.phrase, m.replacement);
                prev.end_time = prev.end_time.max(m.end_time);
            }
            _ => phrases.push(DubPhrase {
                speaker_id: m.speaker_id.clone(),
                start_time: m.start_time,
                end_time: m.end_time,
                phrase: m.replacement.clone(),
            }),
        }
    }

    phrases
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(word: &str, start: f64, end: f64, speaker: Option<&str>) -> ProfanityMatch {
        ProfanityMatch {
            word: word.to_string(),
            start_time: start,
            end_time: end,
            replacement: format!("clean-{}", word),
            confidence: Confidence::High,
            context: String::new(),
            speaker_id: speaker.map(String::from),
        }
    }

    #[test]
    fn test_merge_within_gap() {
        let matches = vec![
            m("w1", 1.2, 1.5, None),
            m("w2", 4.0, 4.3, None),
            m("w3", 4.5, 4.8, None),
        ];
        let merged = merge_adjacent(matches, 0.5);
        assert_eq!(merged.len(), 2);
        // Envelope preserved on the merged pair.
        assert_eq!(merged[1].start_time, 4.0);
        assert_eq!(merged[1].end_time, 4.8);
        assert_eq!(merged[1].word, "w2 w3");
        assert_eq!(merged[1].replacement, "clean-w2 clean-w3");
    }

    #[test]
    fn test_merge_no_op_beyond_gap() {
        let matches = vec![m("a", 1.0, 1.4, None), m("b", 2.5, 2.9, None)];
        let merged = merge_adjacent(matches.clone(), 0.5);
        assert_eq!(merged, matches);
    }

    #[test]
    fn test_merge_chain_of_three() {
        let matches = vec![
            m("a", 1.0, 1.3, None),
            m("b", 1.5, 1.8, None),
            m("c", 2.0, 2.4, None),
        ];
        let merged = merge_adjacent(matches, 0.5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start_time, 1.0);
        assert_eq!(merged[0].end_time, 2.4);
    }

    #[test]
    fn test_cluster_by_speaker() {
        let matches = vec![
            m("a", 1.0, 1.4, Some("s1")),
            m("b", 1.8, 2.2, Some("s1")),
            m("c", 2.5, 2.9, Some("s2")),
        ];
        let phrases = cluster_phrases(&matches, 1.0);
        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[0].phrase, "clean-a clean-b");
        assert_eq!(phrases[0].start_time, 1.0);
        assert_eq!(phrases[0].end_time, 2.2);
        assert_eq!(phrases[1].speaker_id.as_deref(), Some("s2"));
    }

    #[test]
    fn test_cluster_gap_boundary() {
        // Gap of exactly 1.0 s does not cluster (strictly-less comparison).
        let matches = vec![m("a", 1.0, 1.4, Some("s1")), m("b", 2.4, 2.8, Some("s1"))];
        let phrases = cluster_phrases(&matches, 1.0);
        assert_eq!(phrases.len(), 2);
    }
}
