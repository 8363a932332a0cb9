//! Per-frame warning aggregation
//!
//! Warnings are counted per class; only the first occurrence of each class
//! is kept for the summary line. Recording never allocates.

use crate::error::FrameWarning;

/// Recoverable problems met while building one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDiagnostics {
    light_overflows: usize,
    first_light_overflow: Option<FrameWarning>,
    atlas_index_errors: usize,
    first_atlas_index_error: Option<FrameWarning>,
}

impl FrameDiagnostics {
    /// Empty diagnostics
    pub const fn new() -> Self {
        Self {
            light_overflows: 0,
            first_light_overflow: None,
            atlas_index_errors: 0,
            first_atlas_index_error: None,
        }
    }

    /// Count a warning, keeping it if it is the first of its class
    pub fn record(&mut self, warning: FrameWarning) {
        let (count, first) = match warning {
            FrameWarning::LightOverflow { .. } => (&mut self.light_overflows, &mut self.first_light_overflow),
            FrameWarning::AtlasIndexOutOfRange { .. } => {
                (&mut self.atlas_index_errors, &mut self.first_atlas_index_error)
            }
        };
        *count += 1;
        if first.is_none() {
            *first = Some(warning);
        }
    }

    /// Forget every warning
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Whether nothing was recorded
    pub const fn is_empty(&self) -> bool {
        self.light_overflows == 0 && self.atlas_index_errors == 0
    }

    /// Number of `LightOverflow` warnings
    pub const fn light_overflows(&self) -> usize {
        self.light_overflows
    }

    /// Number of dropped out-of-range atlas indices
    pub const fn atlas_index_errors(&self) -> usize {
        self.atlas_index_errors
    }

    /// First `LightOverflow` of the frame
    pub const fn first_light_overflow(&self) -> Option<FrameWarning> {
        self.first_light_overflow
    }

    /// First `AtlasIndexOutOfRange` of the frame
    pub const fn first_atlas_index_error(&self) -> Option<FrameWarning> {
        self.first_atlas_index_error
    }

    /// First warning of each class that occurred
    pub fn first_of_each(&self) -> impl Iterator<Item = FrameWarning> {
        self.first_light_overflow.into_iter().chain(self.first_atlas_index_error)
    }

    /// Log at most one warning per class
    ///
    /// Returns the number of lines logged.
    pub fn log_summary(&self, frame_number: u64) -> usize {
        let mut logged = 0;

        if let Some(FrameWarning::LightOverflow { supplied, capacity }) = self.first_light_overflow {
            log::warn!(
                "Frame {}: {} point lights supplied, only the first {} were packed",
                frame_number,
                supplied,
                capacity
            );
            logged += 1;
        }

        if let Some(FrameWarning::AtlasIndexOutOfRange { atlas_index, position }) = self.first_atlas_index_error {
            log::warn!(
                "Frame {}: dropped {} instances with out-of-range atlas index (first: index {} at position {})",
                frame_number,
                self.atlas_index_errors,
                atlas_index,
                position
            );
            logged += 1;
        }

        logged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_line_per_class() {
        let mut diagnostics = FrameDiagnostics::new();
        diagnostics.record(FrameWarning::LightOverflow { supplied: 7, capacity: 5 });
        for position in 0..4 {
            diagnostics.record(FrameWarning::AtlasIndexOutOfRange { atlas_index: 12, position });
        }

        assert_eq!(diagnostics.light_overflows(), 1);
        assert_eq!(diagnostics.atlas_index_errors(), 4);
        assert_eq!(diagnostics.log_summary(0), 2);
    }

    #[test]
    fn test_many_warnings_keep_only_the_first() {
        let mut diagnostics = FrameDiagnostics::new();
        for position in 0..100_000 {
            diagnostics.record(FrameWarning::AtlasIndexOutOfRange { atlas_index: 42, position });
        }

        assert_eq!(diagnostics.atlas_index_errors(), 100_000);
        assert_eq!(
            diagnostics.first_atlas_index_error(),
            Some(FrameWarning::AtlasIndexOutOfRange { atlas_index: 42, position: 0 })
        );
        assert_eq!(diagnostics.first_of_each().count(), 1);
        assert_eq!(diagnostics.log_summary(0), 1);
    }

    #[test]
    fn test_clear_resets_counts() {
        let mut diagnostics = FrameDiagnostics::new();
        diagnostics.record(FrameWarning::LightOverflow { supplied: 9, capacity: 5 });
        diagnostics.clear();
        assert!(diagnostics.is_empty());
        assert_eq!(diagnostics.first_light_overflow(), None);
    }

    #[test]
    fn test_clean_frame_logs_nothing() {
        let diagnostics = FrameDiagnostics::new();
        assert!(diagnostics.is_empty());
        assert_eq!(diagnostics.log_summary(3), 0);
    }
}
