//! Row state filters used by views, `select` and change extraction.

use bitflags::bitflags;
use tabula_core::{RowState, RowVersion};

bitflags! {
    /// Which rows, and which version of them, a projection shows.
    ///
    /// `MODIFIED_CURRENT` and `MODIFIED_ORIGINAL` select the same rows and
    /// differ only in the version displayed.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RowStateFilter: u8 {
        const UNCHANGED = 0b0_0001;
        const ADDED = 0b0_0010;
        const DELETED = 0b0_0100;
        const MODIFIED_CURRENT = 0b0_1000;
        const MODIFIED_ORIGINAL = 0b1_0000;

        const CURRENT_ROWS = Self::UNCHANGED.bits() | Self::ADDED.bits() | Self::MODIFIED_CURRENT.bits();
        const ORIGINAL_ROWS = Self::UNCHANGED.bits() | Self::DELETED.bits() | Self::MODIFIED_ORIGINAL.bits();
        const CHANGES = Self::ADDED.bits() | Self::DELETED.bits() | Self::MODIFIED_CURRENT.bits();
    }
}

impl Default for RowStateFilter {
    fn default() -> Self {
        RowStateFilter::CURRENT_ROWS
    }
}

impl RowStateFilter {
    /// Returns the version to show for a row in `state`, or `None` if the
    /// filter excludes the row.
    pub fn version_for(self, state: RowState) -> Option<RowVersion> {
        match state {
            RowState::Unchanged if self.contains(Self::UNCHANGED) => Some(RowVersion::Current),
            RowState::Added if self.contains(Self::ADDED) => Some(RowVersion::Current),
            RowState::Modified if self.contains(Self::MODIFIED_CURRENT) => Some(RowVersion::Current),
            RowState::Modified if self.contains(Self::MODIFIED_ORIGINAL) => Some(RowVersion::Original),
            RowState::Deleted if self.contains(Self::DELETED) => Some(RowVersion::Original),
            _ => None,
        }
    }

    /// Returns true if a row in `state` passes, ignoring versions.
    pub fn admits(self, state: RowState) -> bool {
        match state {
            RowState::Modified => self.intersects(Self::MODIFIED_CURRENT | Self::MODIFIED_ORIGINAL),
            other => self.version_for(other).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_rows_default() {
        let f = RowStateFilter::default();
        assert_eq!(f.version_for(RowState::Added), Some(RowVersion::Current));
        assert_eq!(f.version_for(RowState::Modified), Some(RowVersion::Current));
        assert_eq!(f.version_for(RowState::Deleted), None);
        assert_eq!(f.version_for(RowState::Detached), None);
    }

    #[test]
    fn test_modified_original_shows_original() {
        let f = RowStateFilter::MODIFIED_ORIGINAL;
        assert_eq!(f.version_for(RowState::Modified), Some(RowVersion::Original));
        assert!(f.admits(RowState::Modified));
        assert!(!f.admits(RowState::Unchanged));
    }

    #[test]
    fn test_deleted_rows_show_original() {
        let f = RowStateFilter::ORIGINAL_ROWS;
        assert_eq!(f.version_for(RowState::Deleted), Some(RowVersion::Original));
        assert_eq!(f.version_for(RowState::Unchanged), Some(RowVersion::Current));
    }
}
