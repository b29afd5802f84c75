//! Directory-scoped merge conflict policy.

/// Which side of a merge wins a conflicted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSide {
    /// Keep the local version.
    Ours,
    /// Take the remote version.
    Theirs,
}

impl ConflictSide {
    /// `git checkout` flag selecting this side.
    #[must_use]
    pub fn checkout_flag(self) -> &'static str {
        match self {
            Self::Ours => "--ours",
            Self::Theirs => "--theirs",
        }
    }
}

/// Top-level directory to winning side. Paths outside these take the
/// remote version.
pub const POLICY: &[(&str, ConflictSide)] = &[
    ("Needs_Action", ConflictSide::Theirs),
    ("Signals", ConflictSide::Theirs),
    ("Pending_Approval", ConflictSide::Ours),
    ("Done", ConflictSide::Ours),
];

/// Winning side for a repository-relative `path`.
#[must_use]
pub fn side_for(path: &str) -> ConflictSide {
    let top = path.trim_start_matches("./").split('/').next().unwrap_or_default();
    POLICY
        .iter()
        .find(|(dir, _)| *dir == top)
        .map_or(ConflictSide::Theirs, |(_, side)| *side)
}
