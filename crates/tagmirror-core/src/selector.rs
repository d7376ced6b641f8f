//! Tag selection per mirroring mode.
//!
//! [`select`] is a pure function of the image policy and the registry
//! listings; it never talks to a registry itself. Only [`MirrorMode::Higher`]
//! looks at the destination listing, see [`needs_destination_tags`].

use tracing::debug;

use crate::config::{ImageMirrorPolicy, MirrorMode};

/// Tags chosen for mirroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Tags to mirror, in the order they must be processed. May be empty.
    Tags(Vec<String>),
    /// `higher` mode found no qualifying version in the destination, so
    /// there is nothing to compare against and nothing is selected.
    NoBaseline,
}

impl Selection {
    /// Returns the selected tags (empty for [`Selection::NoBaseline`]).
    #[must_use]
    pub fn tags(&self) -> &[String] {
        match self {
            Self::Tags(tags) => tags,
            Self::NoBaseline => &[],
        }
    }
}

/// Returns true if selecting for `mode` requires the destination listing.
#[must_use]
pub const fn needs_destination_tags(mode: MirrorMode) -> bool {
    matches!(mode, MirrorMode::Higher)
}

/// Decides which source tags to mirror.
///
/// - `all`: every source tag, in listing order, without any filtering.
/// - `semver`: every filtered source version, ascending.
/// - `highest`: the greatest filtered source version, if any.
/// - `higher`: every filtered source version strictly greater than the
///   greatest filtered destination version, ascending; [`Selection::NoBaseline`]
///   when the destination has no qualifying version.
///
/// `destination_tags` is ignored unless [`needs_destination_tags`] is true
/// for the policy's mode.
///
/// # Examples
///
/// ```
/// use tagmirror_core::{select, Config, Selection};
///
/// let config = Config::from_yaml_str(
///     "images:\n  app:\n    source: app\n    destination: localhost/app\n    mode: higher\n",
/// )
/// .unwrap();
/// let policy = &config.images()[0];
///
/// let selection = select(policy, &["1.0.0", "1.1.0", "2.0.0"], &["1.0.0"]);
/// assert_eq!(selection.tags(), ["1.1.0", "2.0.0"]);
///
/// let selection = select(policy, &["1.0.0"], &["latest"]);
/// assert_eq!(selection, Selection::NoBaseline);
/// ```
#[must_use]
pub fn select(
    policy: &ImageMirrorPolicy,
    source_tags: &[impl AsRef<str>],
    destination_tags: &[impl AsRef<str>],
) -> Selection {
    let filter = policy.version_filter();

    match policy.mode {
        MirrorMode::All => Selection::Tags(
            source_tags
                .iter()
                .map(|t| t.as_ref().to_string())
                .collect(),
        ),
        MirrorMode::Semver => Selection::Tags(
            filter
                .filter_and_sort(source_tags)
                .into_iter()
                .map(|v| v.tag)
                .collect(),
        ),
        MirrorMode::Highest => {
            let highest = filter.highest(source_tags);
            if highest.is_none() {
                debug!(image = %policy.name, "No source tag qualifies");
            }
            Selection::Tags(highest.into_iter().map(|v| v.tag).collect())
        }
        MirrorMode::Higher => {
            let Some(baseline) = filter.highest(destination_tags) else {
                return Selection::NoBaseline;
            };
            debug!(image = %policy.name, baseline = %baseline.tag, "Destination baseline");

            Selection::Tags(
                filter
                    .filter_and_sort(source_tags)
                    .into_iter()
                    .filter(|v| v.version > baseline.version)
                    .map(|v| v.tag)
                    .collect(),
            )
        }
    }
}
