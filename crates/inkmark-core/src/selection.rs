//! Hit-testing and selection over reconstructed lines
//!
//! Both entry points are pure functions of the line list, cheap enough to run
//! on every pointer move for live selection previews.

use crate::geometry::NormRect;
use crate::text_layout::TextLine;
use serde::{Deserialize, Serialize};

/// Position of a word within a line list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WordLocation {
    pub line: usize,
    pub word: usize,
}

/// A selection between two words, in either direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
    pub start_line: usize,
    pub start_word: usize,
    pub end_line: usize,
    pub end_word: usize,
}

impl Selection {
    pub fn new(start: WordLocation, end: WordLocation) -> Self {
        Self {
            start_line: start.line,
            start_word: start.word,
            end_line: end.line,
            end_word: end.word,
        }
    }

    pub fn start(&self) -> WordLocation {
        WordLocation {
            line: self.start_line,
            word: self.start_word,
        }
    }

    pub fn end(&self) -> WordLocation {
        WordLocation {
            line: self.end_line,
            word: self.end_word,
        }
    }

    /// Same selection with start preceding end in reading order
    pub fn normalized(&self) -> Self {
        if self.end() < self.start() {
            Self::new(self.end(), self.start())
        } else {
            *self
        }
    }
}

/// The selected part of one line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectedRegion {
    pub line: usize,
    pub first_word: usize,
    pub last_word: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
}

impl SelectedRegion {
    /// Convert to a page-relative rectangle given the viewport size
    pub fn normalized(&self, viewport_width: f64, viewport_height: f64) -> NormRect {
        NormRect::new(
            self.x / viewport_width,
            self.y / viewport_height,
            self.width / viewport_width,
            self.height / viewport_height,
        )
    }
}

/// Find the word under a point: first line containing `y`, then first word containing `x`
pub fn find_word_at_point(lines: &[TextLine], x: f64, y: f64) -> Option<WordLocation> {
    let (line_idx, line) = lines
        .iter()
        .enumerate()
        .find(|(_, line)| y >= line.y && y <= line.bottom())?;
    let word_idx = line
        .words
        .iter()
        .position(|word| x >= word.x && x <= word.right())?;
    Some(WordLocation {
        line: line_idx,
        word: word_idx,
    })
}

/// Compute one bounding region per line touched by the selection.
///
/// Lines within the selected range that do not overlap the horizontal span of
/// the start and end words (e.g. a neighbouring column) are skipped.
pub fn get_selected_words(lines: &[TextLine], selection: &Selection) -> Vec<SelectedRegion> {
    let sel = selection.normalized();
    let (Some(start_word), Some(end_word)) = (
        lines.get(sel.start_line).and_then(|l| l.words.get(sel.start_word)),
        lines.get(sel.end_line).and_then(|l| l.words.get(sel.end_word)),
    ) else {
        return Vec::new();
    };

    let envelope_left = start_word.x.min(end_word.x);
    let envelope_right = start_word.right().max(end_word.right());

    let mut regions = Vec::new();
    for (line_idx, line) in lines
        .iter()
        .enumerate()
        .take(sel.end_line + 1)
        .skip(sel.start_line)
    {
        if line.words.is_empty() || line.max_x < envelope_left || line.min_x > envelope_right {
            continue;
        }

        let first = if line_idx == sel.start_line {
            sel.start_word
        } else {
            0
        };
        let last = if line_idx == sel.end_line {
            sel.end_word
        } else {
            line.words.len() - 1
        };
        if first > last {
            continue;
        }

        let words = &line.words[first..=last];
        let left = words.iter().map(|w| w.x).fold(f64::INFINITY, f64::min);
        let right = words.iter().map(|w| w.right()).fold(f64::NEG_INFINITY, f64::max);
        let top = words.iter().map(|w| w.y).fold(f64::INFINITY, f64::min);
        let bottom = words.iter().map(|w| w.bottom()).fold(f64::NEG_INFINITY, f64::max);

        regions.push(SelectedRegion {
            line: line_idx,
            first_word: first,
            last_word: last,
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
            text: words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        });
    }
    regions
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::text_layout::reconstruct_lines_with;
    use crate::text_layout::test_support::{run, Mono};
    use proptest::prelude::*;

    proptest! {
        /// Property: swapping start and end yields identical regions
        #[test]
        fn selection_is_order_independent(
            a_line in 0usize..4, a_word in 0usize..3,
            b_line in 0usize..4, b_word in 0usize..3,
        ) {
            let lines = reconstruct_lines_with(
                &[
                    run(0.0, 0.0, "aa bb cc"),
                    run(0.0, 20.0, "dd ee ff"),
                    run(0.0, 40.0, "gg hh ii"),
                    run(0.0, 60.0, "jj kk ll"),
                ],
                &LayoutConfig::default(),
                &Mono,
            );
            let a = WordLocation { line: a_line, word: a_word };
            let b = WordLocation { line: b_line, word: b_word };
            prop_assert_eq!(
                get_selected_words(&lines, &Selection::new(a, b)),
                get_selected_words(&lines, &Selection::new(b, a))
            );
        }
    }
}
