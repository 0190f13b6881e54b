//! Remote status classification.

/// Classification of a raw remote status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    StableSuccess,
    StableFailure,
    Transient,
}

/// Per resource type mapping of raw statuses.
///
/// Statuses not listed are treated as transient: an unknown intermediate
/// state is still bounded by the retry budget.
#[derive(Debug, Clone, Copy)]
pub struct StatusTable {
    pub stable_success: &'static [&'static str],
    pub stable_failure: &'static [&'static str],
    /// Tombstone statuses reported for deleted resources that are still
    /// visible to reads.
    pub absent: &'static [&'static str],
}

impl StatusTable {
    pub fn classify(&self, raw: &str) -> RemoteStatus {
        if self.stable_success.contains(&raw) {
            RemoteStatus::StableSuccess
        } else if self.stable_failure.contains(&raw) {
            RemoteStatus::StableFailure
        } else {
            RemoteStatus::Transient
        }
    }

    pub fn is_absent(&self, raw: &str) -> bool {
        self.absent.contains(&raw)
    }
}
