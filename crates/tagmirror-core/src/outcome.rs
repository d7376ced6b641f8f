//! Per-tag mirroring outcomes.

use std::fmt;

use serde::Serialize;

/// What happened to one (image, tag) pair during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorOutcome {
    /// Tag was missing from the destination and has been copied.
    Copied,
    /// Tag exists in the destination and replacing is disabled.
    SkippedExists,
    /// Tag existed with different content and has been overwritten.
    Replaced,
    /// Tag exists in the destination with identical content.
    SkippedIdentical,
    /// `higher` mode found no baseline version in the destination.
    NoBaseline,
    /// A registry operation failed.
    Error,
}

impl MirrorOutcome {
    /// All outcomes, in reporting order.
    pub const ALL: [Self; 6] = [
        Self::Copied,
        Self::Replaced,
        Self::SkippedExists,
        Self::SkippedIdentical,
        Self::NoBaseline,
        Self::Error,
    ];

    /// Returns the log spelling of the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Copied => "copied",
            Self::SkippedExists => "skipped-exists",
            Self::Replaced => "replaced",
            Self::SkippedIdentical => "skipped-identical",
            Self::NoBaseline => "no-baseline",
            Self::Error => "error",
        }
    }

    /// Returns true if the destination was written.
    #[must_use]
    pub const fn pushed(self) -> bool {
        matches!(self, Self::Copied | Self::Replaced)
    }
}

impl fmt::Display for MirrorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
