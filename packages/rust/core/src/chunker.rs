//! Overlapping fixed-size windows over document text.
//!
//! Windows are measured in characters, never bytes, so a chunk boundary
//! cannot fall inside a multi-byte code point. Adjacent chunks share
//! `overlap` characters; the last chunk may be shorter than `chunk_size`.

use std::iter::FusedIterator;

use synthkit_shared::{Chunk, GenerationSettings, Result, validate_chunking};

/// Splits text into overlapping chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails with a config error unless `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        validate_chunking(chunk_size, overlap)?;
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_settings(settings: &GenerationSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of consecutive chunks.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Lazily iterate the chunks of `text`. Each call starts from the beginning.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            chunk_size: self.chunk_size,
            stride: self.stride(),
            index: 0,
            start_char: 0,
            start_byte: 0,
            remaining: self.count(text),
        }
    }

    /// Number of chunks `chunks(text)` yields, without building them.
    pub fn count(&self, text: &str) -> usize {
        let len = text.chars().count();
        if len <= self.chunk_size {
            1
        } else {
            1 + (len - self.chunk_size).div_ceil(self.stride())
        }
    }
}

/// Iterator returned by [`Chunker::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    chunk_size: usize,
    stride: usize,
    index: usize,
    start_char: usize,
    start_byte: usize,
    remaining: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 {
            return None;
        }

        let rest = &self.text[self.start_byte..];
        let mut taken = 0;
        let mut end_byte = rest.len();
        let mut next_start_byte = rest.len();

        for (offset, _) in rest.char_indices() {
            if taken == self.stride {
                next_start_byte = offset;
            }
            if taken == self.chunk_size {
                end_byte = offset;
                break;
            }
            taken += 1;
        }

        let chunk = Chunk {
            index: self.index,
            start: self.start_char,
            end: self.start_char + taken,
            text: rest[..end_byte].to_string(),
        };

        self.remaining -= 1;
        self.index += 1;
        self.start_char += self.stride;
        self.start_byte += next_start_byte;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

impl FusedIterator for Chunks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(chunker: &Chunker, text: &str) -> Vec<(usize, usize)> {
        chunker.chunks(text).map(|c| (c.start, c.end)).collect()
    }

    #[test]
    fn rejects_invalid_sizes() {
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(100, 100).is_err());
        assert!(Chunker::new(100, 150).is_err());
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn ten_thousand_chars_make_three_chunks() {
        let text = "a".repeat(10_000);
        let chunker = Chunker::new(4000, 200).unwrap();

        assert_eq!(
            spans(&chunker, &text),
            vec![(0, 4000), (3800, 7800), (7600, 10_000)]
        );
        assert_eq!(chunker.count(&text), 3);
    }

    #[test]
    fn short_document_is_one_chunk() {
        let chunker = Chunker::new(4000, 200).unwrap();
        let chunks: Vec<_> = chunker.chunks("short text").collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short text");

        let exact = "b".repeat(4000);
        assert_eq!(spans(&chunker, &exact), vec![(0, 4000)]);
    }

    #[test]
    fn empty_document_is_one_empty_chunk() {
        let chunker = Chunker::new(10, 2).unwrap();
        let chunks: Vec<_> = chunker.chunks("").collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 0));
    }

    #[test]
    fn chunks_are_restartable_and_exact_size() {
        let chunker = Chunker::new(7, 3).unwrap();
        let text = "The quick brown fox jumps over the lazy dog";

        let first: Vec<_> = chunker.chunks(text).collect();
        let second: Vec<_> = chunker.chunks(text).collect();
        assert_eq!(first, second);

        let iter = chunker.chunks(text);
        assert_eq!(iter.len(), first.len());
        assert_eq!(chunker.count(text), first.len());
        assert!(first.iter().enumerate().all(|(i, c)| c.index == i));
    }

    #[test]
    fn multibyte_text_never_splits_code_points() {
        let text = "héllo wörld ñandú 日本語のテキスト 🚀🚀🚀 done";
        let chunker = Chunker::new(5, 2).unwrap();

        for chunk in chunker.chunks(text) {
            assert_eq!(chunk.text.chars().count(), chunk.end - chunk.start);
            let expected: String = text.chars().skip(chunk.start).take(chunk.end - chunk.start).collect();
            assert_eq!(chunk.text, expected);
        }
    }

    #[test]
    fn spans_minus_overlap_reconstruct_the_document() {
        let text: String = (0..2_345)
            .map(|i| char::from_u32(0x61 + (i % 26)).unwrap())
            .chain("ünïcödé tail".chars())
            .collect();

        for (size, overlap) in [(100, 0), (100, 10), (333, 332), (1, 0), (5_000, 100)] {
            let chunker = Chunker::new(size, overlap).unwrap();
            let mut rebuilt = String::new();
            for chunk in chunker.chunks(&text) {
                let skip = if chunk.index == 0 { 0 } else { overlap };
                rebuilt.extend(chunk.text.chars().skip(skip));
            }
            assert_eq!(rebuilt, text, "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn adjacent_chunks_share_overlap() {
        let text = "0123456789abcdefghij";
        let chunker = Chunker::new(8, 3).unwrap();
        let chunks: Vec<_> = chunker.chunks(text).collect();

        for pair in chunks.windows(2) {
            let tail: String = pair[0].text.chars().skip(pair[0].text.chars().count() - 3).collect();
            let head: String = pair[1].text.chars().take(3).collect();
            assert_eq!(tail, head);
        }
        assert_eq!(chunks.last().unwrap().end, 20);
    }
}
