//! Reading-order reconstruction from positioned text runs
//!
//! Text extraction yields runs in arbitrary order. Runs are split into
//! words, words are banded by vertical position, bands are cut into lines at
//! column gaps, and the lines are sorted top-to-bottom, left-to-right.
//!
//! All coordinates are in viewport space at the current scale with a
//! top-left origin: `y` is the top edge of a run.

use crate::config::LayoutConfig;
use crate::fonts::{StandardFont, TextMeasurer};
use serde::{Deserialize, Serialize};

/// A positioned piece of text as reported by the extraction layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextRun {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
    /// Font identifier from the source document, e.g. `g_d0_f1` or `Times-Roman`
    #[serde(default)]
    pub font_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
}

impl WordBox {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Words on one visual line, left to right
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextLine {
    pub words: Vec<WordBox>,
    pub min_x: f64,
    pub max_x: f64,
    pub y: f64,
    pub height: f64,
}

impl TextLine {
    fn from_words(words: Vec<WordBox>) -> Self {
        let min_x = words.iter().map(|w| w.x).fold(f64::INFINITY, f64::min);
        let max_x = words.iter().map(|w| w.right()).fold(f64::NEG_INFINITY, f64::max);
        let y = words.iter().map(|w| w.y).fold(f64::INFINITY, f64::min);
        let bottom = words.iter().map(|w| w.bottom()).fold(f64::NEG_INFINITY, f64::max);
        Self {
            words,
            min_x,
            max_x,
            y,
            height: bottom - y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Words joined by single spaces
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Reconstruct lines, measuring each run with the standard font its font id maps to
pub fn reconstruct_lines(runs: &[TextRun], config: &LayoutConfig) -> Vec<TextLine> {
    let words = runs
        .iter()
        .flat_map(|run| {
            let font = StandardFont::for_family(&run.font_id, false, false);
            split_run(run, &font)
        })
        .collect();
    group_words(words, runs.len(), config)
}

/// Reconstruct lines using one measurer for every run
pub fn reconstruct_lines_with(
    runs: &[TextRun],
    config: &LayoutConfig,
    measurer: &dyn TextMeasurer,
) -> Vec<TextLine> {
    let words = runs.iter().flat_map(|run| split_run(run, measurer)).collect();
    group_words(words, runs.len(), config)
}

/// Split a run into words on whitespace.
///
/// Word offsets come from the measured width of the whole prefix up to each
/// word boundary, scaled so the full string spans the run's reported width.
pub fn split_run(run: &TextRun, measurer: &dyn TextMeasurer) -> Vec<WordBox> {
    let finite = run.x.is_finite()
        && run.y.is_finite()
        && run.width.is_finite()
        && run.height.is_finite();
    if !finite || run.width < 0.0 || run.height <= 0.0 {
        return Vec::new();
    }

    let ranges = word_ranges(&run.text);
    if ranges.is_empty() {
        return Vec::new();
    }

    let full = measurer.text_width(&run.text, 1.0);
    let total_chars = run.text.chars().count().max(1) as f64;
    let prefix_width = |end: usize| -> f64 {
        let prefix = &run.text[..end];
        if full > 0.0 {
            measurer.text_width(prefix, 1.0) * run.width / full
        } else {
            prefix.chars().count() as f64 * run.width / total_chars
        }
    };

    ranges
        .into_iter()
        .map(|(start, end)| {
            let left = prefix_width(start);
            let right = prefix_width(end);
            WordBox {
                x: run.x + left,
                y: run.y,
                width: right - left,
                height: run.height,
                text: run.text[start..end].to_string(),
            }
        })
        .collect()
}

/// Byte ranges of maximal non-whitespace sequences
fn word_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                ranges.push((s, idx));
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        ranges.push((s, text.len()));
    }
    ranges
}

struct Band {
    y: f64,
    words: Vec<WordBox>,
}

fn group_words(words: Vec<WordBox>, run_count: usize, config: &LayoutConfig) -> Vec<TextLine> {
    if words.is_empty() {
        return Vec::new();
    }

    let avg_height = words.iter().map(|w| w.height).sum::<f64>() / words.len() as f64;
    let tolerance = avg_height * config.band_tolerance_ratio;
    let word_count = words.len();

    // Greedy banding: the first word of a band is its representative
    let mut bands: Vec<Band> = Vec::new();
    for word in words {
        match bands.iter_mut().find(|b| (word.y - b.y).abs() <= tolerance) {
            Some(band) => band.words.push(word),
            None => bands.push(Band {
                y: word.y,
                words: vec![word],
            }),
        }
    }
    let band_count = bands.len();

    let mut lines: Vec<TextLine> = bands
        .into_iter()
        .flat_map(|band| split_band(band.words, config))
        .collect();

    order_lines(&mut lines, avg_height * 0.5);

    tracing::debug!(
        runs = run_count,
        words = word_count,
        bands = band_count,
        lines = lines.len(),
        "Reconstructed text layout"
    );
    lines
}

/// Sort a band by x and cut it wherever a gap exceeds the column threshold
fn split_band(mut words: Vec<WordBox>, config: &LayoutConfig) -> Vec<TextLine> {
    words.sort_by(|a, b| a.x.total_cmp(&b.x));

    let gaps: Vec<f64> = words
        .windows(2)
        .map(|pair| pair[1].x - pair[0].right())
        .collect();
    let mut positive: Vec<f64> = gaps.iter().copied().filter(|g| *g > 0.0).collect();

    let threshold = if positive.len() >= config.min_gaps_for_median {
        median(&mut positive) * config.column_gap_multiplier
    } else {
        words.iter().map(|w| w.width).sum::<f64>() / words.len() as f64
    };

    let mut lines = Vec::new();
    let mut current: Vec<WordBox> = Vec::new();
    for (idx, word) in words.into_iter().enumerate() {
        if idx > 0 && gaps[idx - 1] > threshold {
            lines.push(TextLine::from_words(std::mem::take(&mut current)));
        }
        current.push(word);
    }
    if !current.is_empty() {
        lines.push(TextLine::from_words(current));
    }
    lines
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Order by y; lines whose tops lie within `row_tolerance` of a row's first
/// line form one row and are ordered by min_x.
fn order_lines(lines: &mut Vec<TextLine>, row_tolerance: f64) {
    lines.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.min_x.total_cmp(&b.min_x)));

    let mut ordered = Vec::with_capacity(lines.len());
    let mut row: Vec<TextLine> = Vec::new();
    let mut row_y = f64::NEG_INFINITY;
    for line in lines.drain(..) {
        if !row.is_empty() && line.y - row_y > row_tolerance {
            row.sort_by(|a, b| a.min_x.total_cmp(&b.min_x));
            ordered.append(&mut row);
        }
        if row.is_empty() {
            row_y = line.y;
        }
        row.push(line);
    }
    row.sort_by(|a, b| a.min_x.total_cmp(&b.min_x));
    ordered.append(&mut row);
    *lines = ordered;
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use pretty_assertions::assert_eq;

    fn layout(runs: &[TextRun]) -> Vec<TextLine> {
        reconstruct_lines_with(runs, &LayoutConfig::default(), &Mono)
    }

    #[test]
    fn test_empty_input() {
        assert!(layout(&[]).is_empty());
        assert!(layout(&[run(0.0, 0.0, "   ")]).is_empty());
    }

    #[test]
    fn test_split_run_uses_prefix_widths() {
        let words = split_run(&run(100.0, 20.0, "ab  cde f"), &Mono);
        let summary: Vec<(String, f64, f64)> = words
            .iter()
            .map(|w| (w.text.clone(), w.x, w.width))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("ab".to_string(), 100.0, 10.0),
                ("cde".to_string(), 120.0, 15.0),
                ("f".to_string(), 140.0, 5.0),
            ]
        );
    }

    #[test]
    fn test_split_run_scales_to_reported_width() {
        let mut r = run(0.0, 0.0, "aa bb");
        r.width = 50.0; // measured 25, so everything doubles
        let words = split_run(&r, &Mono);
        assert_eq!(words[1].x, 30.0);
        assert_eq!(words[1].width, 20.0);
    }

    #[test]
    fn test_split_run_rejects_malformed_runs() {
        let mut r = run(0.0, 0.0, "text");
        r.x = f64::NAN;
        assert!(split_run(&r, &Mono).is_empty());
        let mut r = run(0.0, 0.0, "text");
        r.height = 0.0;
        assert!(split_run(&r, &Mono).is_empty());
    }

    #[test]
    fn test_unordered_runs_sorted_into_reading_order() {
        let runs = vec![
            run(0.0, 30.0, "third line"),
            run(30.0, 0.0, "world"),
            run(0.0, 15.0, "second"),
            run(0.0, 1.0, "hello"),
        ];
        assert_eq!(
            line_texts(&layout(&runs)),
            vec!["hello world", "second", "third line"]
        );
    }

    #[test]
    fn test_two_columns_split_and_ordered_left_to_right() {
        // Intra-column gaps of 5, column gap of 100
        let runs = vec![
            run(300.0, 0.0, "right col text"),
            run(0.0, 0.0, "left col text"),
        ];
        let lines = layout(&runs);
        assert_eq!(line_texts(&lines), vec!["left col text", "right col text"]);
        assert!(lines[0].max_x < lines[1].min_x);
    }

    #[test]
    fn test_no_false_split_with_few_gaps() {
        // Two gaps only: threshold falls back to average word width
        let runs = vec![run(0.0, 0.0, "aaaa bbbb"), run(55.0, 0.0, "cccc")];
        assert_eq!(line_texts(&layout(&runs)), vec!["aaaa bbbb cccc"]);
    }

    #[test]
    fn test_justified_spacing_is_not_a_column_break() {
        let runs = vec![
            run(0.0, 0.0, "one"),
            run(20.0, 0.0, "two"),
            run(45.0, 0.0, "three"),
            run(80.0, 0.0, "four"),
            run(110.0, 0.0, "five"),
        ];
        assert_eq!(layout(&runs).len(), 1);
    }

    #[test]
    fn test_slightly_offset_baselines_share_a_line() {
        let runs = vec![run(0.0, 100.0, "sub"), run(20.0, 103.0, "script")];
        assert_eq!(line_texts(&layout(&runs)), vec!["sub script"]);
    }

    #[test]
    fn test_line_bounds() {
        let lines = layout(&[run(10.0, 5.0, "ab cd")]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].min_x, 10.0);
        assert_eq!(lines[0].max_x, 35.0);
        assert_eq!(lines[0].y, 5.0);
        assert_eq!(lines[0].height, 10.0);
    }

    #[test]
    fn test_default_measurer_uses_font_id() {
        let runs = vec![TextRun {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 12.0,
            text: "Wi Wi".to_string(),
            font_id: "Helvetica".to_string(),
        }];
        let lines = reconstruct_lines(&runs, &LayoutConfig::default());
        let words = &lines[0].words;
        // Proportional font: "Wi" is wider than the space between words
        assert!(words[0].width > words[1].x - words[0].right());
        assert!((words[1].right() - 100.0).abs() < 1e-9);
    }
}
