//! Drops chunks too short to be useful for retrieval.

use crate::types::Chunk;
use ragline_core::{AppError, AppResult};

pub const DEFAULT_MIN_CHARS: usize = 10;

/// Chunks that survived filtering, plus how many were removed.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub kept: Vec<Chunk>,
    pub dropped: usize,
}

/// Keep chunks whose trimmed text has at least `min_chars` characters.
///
/// Fails with `NoValidChunks` when nothing is left.
pub fn filter_chunks(chunks: Vec<Chunk>, min_chars: usize) -> AppResult<FilterOutcome> {
    let total = chunks.len();
    let kept: Vec<Chunk> = chunks
        .into_iter()
        .filter(|chunk| chunk.text.trim().chars().count() >= min_chars)
        .collect();
    let dropped = total - kept.len();

    tracing::info!(
        "Filtered chunks: kept {}, dropped {} (min {} chars)",
        kept.len(),
        dropped,
        min_chars
    );

    if kept.is_empty() {
        return Err(AppError::NoValidChunks);
    }

    Ok(FilterOutcome { kept, dropped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageMetadata;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            start_offset: 0,
            metadata: PageMetadata::default(),
        }
    }

    #[test]
    fn test_boundary_and_whitespace() {
        let outcome = filter_chunks(
            vec![
                chunk("0123456789"),
                chunk("012345678"),
                chunk("          \n\t"),
                chunk(""),
                chunk("   padded text   "),
            ],
            DEFAULT_MIN_CHARS,
        )
        .unwrap();

        let texts: Vec<_> = outcome.kept.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["0123456789", "   padded text   "]);
        assert_eq!(outcome.dropped, 3);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let outcome = filter_chunks(vec![chunk("éééééééééé")], 10).unwrap();
        assert_eq!(outcome.kept.len(), 1);
    }

    #[test]
    fn test_nothing_left_is_error() {
        let result = filter_chunks(vec![chunk("tiny"), chunk("   ")], DEFAULT_MIN_CHARS);
        assert!(matches!(result, Err(AppError::NoValidChunks)));
    }
}
