//! Chunk planning for the generative backend.

/// One chunk of a longer clip, in source-clip time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk {
    pub start: f64,
    pub duration: f64,
}

impl Chunk {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Split a clip into consecutive chunks no longer than `limit` seconds.
///
/// Chunks cover the clip exactly: starts are contiguous and durations sum to
/// the total. A sub-frame remainder is folded into the last chunk instead of
/// producing a degenerate extra call.
pub fn plan_chunks(total_duration: f64, limit: f64) -> Vec<Chunk> {
    const MIN_CHUNK: f64 = 0.05;

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current = 0.0;

    while current < total_duration {
        let remaining = total_duration - current;
        let len = remaining.min(limit);
        if len < MIN_CHUNK {
            if let Some(last) = chunks.last_mut() {
                last.duration += len;
            }
            break;
        }
        chunks.push(Chunk {
            start: current,
            duration: len,
        });
        current += len;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(chunks: &[Chunk]) -> f64 {
        chunks.iter().map(|c| c.duration).sum()
    }

    #[test]
    fn test_exact_multiple() {
        let chunks = plan_chunks(10.0, 5.0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Chunk { start: 0.0, duration: 5.0 });
        assert_eq!(chunks[1], Chunk { start: 5.0, duration: 5.0 });
    }

    #[test]
    fn test_fourteen_seconds_at_five() {
        let chunks = plan_chunks(14.0, 5.0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].start, 10.0);
        assert!((chunks[2].duration - 4.0).abs() < 1e-9);
        assert!((total(&chunks) - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_clip_single_chunk() {
        let chunks = plan_chunks(4.0, 5.0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].duration, 4.0);
    }

    #[test]
    fn test_tiny_remainder_folds_into_last() {
        let chunks = plan_chunks(10.01, 5.0);
        assert_eq!(chunks.len(), 2);
        assert!((total(&chunks) - 10.01).abs() < 1e-9);
        assert!(chunks[1].duration > 5.0);
    }

    #[test]
    fn test_chunks_are_contiguous() {
        let chunks = plan_chunks(23.7, 5.0);
        for pair in chunks.windows(2) {
            assert!((pair[0].end() - pair[1].start).abs() < 1e-9);
        }
        assert!((total(&chunks) - 23.7).abs() < 1e-9);
    }
}
