//! Cutting a scenario into panels.

use crate::constants::{MAX_PANELS, PANEL_MARKER};

/// One panel of the comic: its position and the text it illustrates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Panel {
    /// 0-based position in the strip
    pub index: usize,
    /// Caption burned onto the panel, also the basis of its image prompt
    pub caption: String,
}

/// Splits on the panel marker and keeps the first few non-empty segments.
///
/// Whatever precedes the first marker counts as a segment too, and a scenario
/// without any marker is a single panel.
pub fn split_into_panels(scenario: &str) -> Vec<Panel> {
    scenario
        .split(PANEL_MARKER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .take(MAX_PANELS)
        .enumerate()
        .map(|(index, caption)| Panel {
            index,
            caption: caption.to_string(),
        })
        .collect()
}
