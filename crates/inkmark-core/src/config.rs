//! Engine configuration
//!
//! All heuristic thresholds used by layout reconstruction, the merge/erase
//! engine and the baker live here so hosts can tune them per product.

use serde::{Deserialize, Serialize};

/// Thresholds for grouping text runs into lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Fraction of the average word height within which words share a band.
    pub band_tolerance_ratio: f64,
    /// Multiple of the median inter-word gap that marks a column break.
    pub column_gap_multiplier: f64,
    /// Minimum number of gaps in a band before the median rule applies.
    pub min_gaps_for_median: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            band_tolerance_ratio: 0.5,
            column_gap_multiplier: 3.0,
            min_gaps_for_median: 3,
        }
    }
}

/// Tolerances for merging and erasing markup, in normalized page units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarkupConfig {
    /// Largest horizontal gap at which two regions still merge.
    pub adjacency_tolerance: f64,
    /// Slack allowed when testing whether a region is covered.
    pub coverage_tolerance: f64,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            adjacency_tolerance: 0.01,
            coverage_tolerance: 0.001,
        }
    }
}

/// Rendering constants for baking annotations into page content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BakeConfig {
    pub highlight_opacity: f64,
    /// Underline/strikethrough thickness as a fraction of the box height.
    pub decoration_thickness_ratio: f64,
    /// Lower bound for decoration thickness, in points.
    pub min_decoration_thickness: f64,
    /// Strikethrough position measured from the top of the box.
    pub strike_position_ratio: f64,
    /// Baseline-to-baseline distance as a multiple of the font size.
    pub line_height_factor: f64,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            highlight_opacity: 0.4,
            decoration_thickness_ratio: 0.08,
            min_decoration_thickness: 1.0,
            strike_position_ratio: 0.55,
            line_height_factor: 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of undo snapshots kept.
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub layout: LayoutConfig,
    pub markup: MarkupConfig,
    pub bake: BakeConfig,
    pub history: HistoryConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
