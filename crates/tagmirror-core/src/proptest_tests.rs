//! Property-based tests for version filtering and tag selection.
//!
//! These tests use proptest to verify invariants across many randomly generated tag listings.

use proptest::prelude::*;

use crate::{select, ImageMirrorPolicy, MirrorMode, Repository, Selection, Version, VersionFilter, MAX_MAJOR_VERSION};

/// Strategy for generating prerelease labels.
fn prerelease_strategy() -> impl Strategy<Value = String> {
    "(alpha|beta|rc|alpine|slim)(\\.[1-9][0-9]?)?"
}

/// Strategy for generating version-like tags, including numeric build tags above the ceiling.
fn semver_tag_strategy() -> impl Strategy<Value = String> {
    (
        prop_oneof![0u64..20, 1000u64..1100, 20_000_000u64..20_300_000],
        0u64..30,
        0u64..30,
        prop::option::of(prerelease_strategy()),
        any::<bool>(),
    )
        .prop_map(|(major, minor, patch, pre, prefix)| {
            let marker = if prefix { "v" } else { "" };
            match pre {
                Some(pre) => format!("{marker}{major}.{minor}.{patch}-{pre}"),
                None => format!("{marker}{major}.{minor}.{patch}"),
            }
        })
}

/// Strategy for generating registry tags: mostly versions, some noise.
fn tag_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => semver_tag_strategy(),
        1 => "(latest|stable|edge|sha-[a-f0-9]{7}|[0-9]{8})",
    ]
}

/// Strategy for generating tag listings.
fn listing_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(tag_strategy(), 0..40)
}

/// Strategy for generating version filters.
fn filter_strategy() -> impl Strategy<Value = VersionFilter> {
    (
        any::<bool>(),
        prop::option::of(0u64..5),
        prop::option::of("(alpha|beta|alpine)"),
    )
        .prop_map(|(allow_prerelease, pinned_major, compatibility)| VersionFilter {
            allow_prerelease,
            pinned_major,
            compatibility,
        })
}

fn policy(mode: MirrorMode, filter: &VersionFilter) -> ImageMirrorPolicy {
    ImageMirrorPolicy {
        name: "prop".to_string(),
        source: Repository::parse("prop/source").unwrap(),
        destination: Repository::parse("localhost:5000/prop/destination").unwrap(),
        mode,
        allow_prerelease: filter.allow_prerelease,
        replace_tag: false,
        pinned_major: filter.pinned_major,
        compatibility: filter.compatibility.clone(),
    }
}

proptest! {
    /// No version above the major ceiling ever survives filtering.
    #[test]
    fn ceiling_is_never_exceeded(tags in listing_strategy(), filter in filter_strategy()) {
        for survivor in filter.filter_and_sort(&tags) {
            prop_assert!(survivor.version.major <= MAX_MAJOR_VERSION);
        }
    }

    /// Filtered output is in ascending precedence order.
    #[test]
    fn output_is_ascending(tags in listing_strategy(), filter in filter_strategy()) {
        let sorted = filter.filter_and_sort(&tags);
        for pair in sorted.windows(2) {
            prop_assert!(pair[0].version <= pair[1].version);
        }
    }

    /// Every survivor retains a tag from the input listing that parses to its version.
    #[test]
    fn survivors_retain_original_tag(tags in listing_strategy(), filter in filter_strategy()) {
        for survivor in filter.filter_and_sort(&tags) {
            prop_assert!(tags.contains(&survivor.tag));
            prop_assert_eq!(Version::parse(&survivor.tag).unwrap(), survivor.version);
        }
    }

    /// Prerelease versions survive only when allowed or matching the compatibility label.
    #[test]
    fn prerelease_gating(tags in listing_strategy(), filter in filter_strategy()) {
        for survivor in filter.filter_and_sort(&tags) {
            let label = survivor.version.prerelease();
            match &filter.compatibility {
                Some(compatibility) => prop_assert_eq!(&label, compatibility),
                None => prop_assert!(label.is_empty() || filter.allow_prerelease),
            }
        }
    }

    /// Pinned major is honoured by every survivor.
    #[test]
    fn pinned_major_gating(tags in listing_strategy(), filter in filter_strategy()) {
        if let Some(major) = filter.pinned_major {
            for survivor in filter.filter_and_sort(&tags) {
                prop_assert_eq!(survivor.version.major, major);
            }
        }
    }

    /// `highest` selects the last element of the ascending filtered output.
    #[test]
    fn highest_is_last_of_sorted(tags in listing_strategy(), filter in filter_strategy()) {
        let expected: Vec<String> = filter
            .filter_and_sort(&tags)
            .pop()
            .map(|v| v.tag)
            .into_iter()
            .collect();
        let none: [&str; 0] = [];
        let selection = select(&policy(MirrorMode::Highest, &filter), &tags, &none);
        prop_assert_eq!(selection, Selection::Tags(expected));
    }

    /// `higher` selects exactly the source versions above the destination baseline.
    #[test]
    fn higher_is_strictly_greater_than_baseline(
        source in listing_strategy(),
        destination in listing_strategy(),
        filter in filter_strategy(),
    ) {
        let selection = select(&policy(MirrorMode::Higher, &filter), &source, &destination);
        match filter.highest(&destination) {
            None => prop_assert_eq!(selection, Selection::NoBaseline),
            Some(baseline) => {
                let expected: Vec<String> = filter
                    .filter_and_sort(&source)
                    .into_iter()
                    .filter(|v| v.version > baseline.version)
                    .map(|v| v.tag)
                    .collect();
                prop_assert_eq!(selection, Selection::Tags(expected));
            }
        }
    }

    /// `all` passes the source listing through untouched.
    #[test]
    fn all_is_identity(tags in listing_strategy(), filter in filter_strategy()) {
        let none: [&str; 0] = [];
        let selection = select(&policy(MirrorMode::All, &filter), &tags, &none);
        prop_assert_eq!(selection, Selection::Tags(tags));
    }
}
