//! Recursive separator-priority splitting with token overlap
//!
//! Text is split on the coarsest separator first (paragraphs, then lines,
//! sentence ends, whitespace and finally raw characters). Pieces that fit the
//! target are merged greedily into chunks; pieces that do not are split again
//! with the next separator. Consecutive chunks share a tail of pieces worth at
//! most `overlap` tokens.

use super::tokens::TokenCounter;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Paragraph,
    Line,
    Sentence,
    Whitespace,
    Character,
}

const SEPARATORS: [Separator; 5] = [
    Separator::Paragraph,
    Separator::Line,
    Separator::Sentence,
    Separator::Whitespace,
    Separator::Character,
];

type CharCursor<'t> = std::iter::Peekable<std::str::CharIndices<'t>>;

/// Consume a whitespace run, returning the byte offset just past it
fn skip_whitespace(chars: &mut CharCursor<'_>) -> Option<usize> {
    let mut end = None;
    while let Some(&(i, c)) = chars.peek() {
        if !c.is_whitespace() {
            break;
        }
        end = Some(i + c.len_utf8());
        chars.next();
    }
    end
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Pieces end after terminal punctuation followed by whitespace
fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !is_sentence_end(c) {
            continue;
        }
        while chars.peek().is_some_and(|&(_, c)| is_sentence_end(c)) {
            chars.next();
        }
        if let Some(end) = skip_whitespace(&mut chars) {
            pieces.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Pieces end after each whitespace run
fn split_words(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some(&(_, c)) = chars.peek() {
        if !c.is_whitespace() {
            chars.next();
            continue;
        }
        if let Some(end) = skip_whitespace(&mut chars) {
            if end > start {
                pieces.push(&text[start..end]);
            }
            start = end;
        }
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

impl Separator {
    fn split(self, text: &str) -> Vec<&str> {
        match self {
            Self::Paragraph => text.split_inclusive("\n\n").collect(),
            Self::Line => text.split_inclusive('\n').collect(),
            Self::Sentence => split_sentences(text),
            Self::Whitespace => split_words(text),
            // Handled by `RecursiveSplitter::hard_cut`
            Self::Character => vec![text],
        }
    }
}

pub(crate) struct RecursiveSplitter<'a> {
    counter: &'a dyn TokenCounter,
    target: usize,
    overlap: usize,
    max: usize,
}

impl<'a> RecursiveSplitter<'a> {
    pub(crate) fn new(
        counter: &'a dyn TokenCounter,
        target: usize,
        overlap: usize,
        max: usize,
    ) -> Self {
        Self {
            counter,
            target: target.max(1),
            overlap: overlap.min(target.saturating_sub(1)),
            max: max.max(target.max(1)),
        }
    }

    /// Split `text` into trimmed, non-empty chunks of at most `max` tokens
    pub(crate) fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        if self.counter.count(text) <= self.target {
            return vec![text.trim().to_string()];
        }

        let mut merged = Vec::new();
        self.split_level(text, 0, &mut merged);

        let mut chunks = Vec::with_capacity(merged.len());
        for chunk in merged {
            if self.counter.count(&chunk) <= self.max {
                chunks.push(chunk);
                continue;
            }
            for piece in self.hard_cut(&chunk, self.max) {
                let piece = piece.trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
            }
        }
        chunks
    }

    fn split_level(&self, text: &str, level: usize, out: &mut Vec<String>) {
        let separator = SEPARATORS[level];
        let pieces = if separator == Separator::Character {
            self.hard_cut(text, self.character_budget())
        } else {
            separator.split(text)
        };

        let mut fitting: Vec<(&str, usize)> = Vec::new();
        for piece in pieces {
            let tokens = self.counter.count(piece);
            if tokens <= self.target || level + 1 == SEPARATORS.len() {
                fitting.push((piece, tokens));
                continue;
            }

            if !fitting.is_empty() {
                self.merge(&fitting, out);
                fitting.clear();
            }
            self.split_level(piece, level + 1, out);
        }

        if !fitting.is_empty() {
            self.merge(&fitting, out);
        }
    }

    /// Greedy merge of fitting pieces, carrying an overlap tail forward
    fn merge(&self, pieces: &[(&str, usize)], out: &mut Vec<String>) {
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &(piece, tokens) in pieces {
            if total + tokens > self.target && !window.is_empty() {
                push_joined(&window, out);

                while total > self.overlap || (total > 0 && total + tokens > self.target) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, tokens));
            total += tokens;
        }

        if !window.is_empty() {
            push_joined(&window, out);
        }
    }

    /// Piece size used when splitting on characters: small enough that the
    /// overlap window can hold at least one whole piece.
    fn character_budget(&self) -> usize {
        if self.overlap == 0 {
            self.target
        } else {
            self.overlap.min(self.target - self.overlap).max(1)
        }
    }

    /// Cut text into consecutive pieces of at most `budget` tokens on char
    /// boundaries. Every piece holds at least one character.
    fn hard_cut<'t>(&self, text: &'t str, budget: usize) -> Vec<&'t str> {
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        let mut pieces = Vec::new();
        let mut start = 0;
        while start + 1 < bounds.len() {
            // Largest end whose prefix fits, by binary search over boundaries
            let (mut lo, mut hi) = (start + 1, bounds.len() - 1);
            while lo < hi {
                let mid = lo + (hi - lo).div_ceil(2);
                if self.counter.count(&text[bounds[start]..bounds[mid]]) <= budget {
                    lo = mid;
                } else {
                    hi = mid - 1;
                }
            }
            pieces.push(&text[bounds[start]..bounds[lo]]);
            start = lo;
        }
        pieces
    }
}

fn push_joined(window: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}
