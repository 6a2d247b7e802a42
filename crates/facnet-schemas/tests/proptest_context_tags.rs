//! Property coverage for universal invariant 5 (spec.md §8): context-tag
//! matching is exact, never substring ("EPICENE" must never match "ICEP").

use facnet_schemas::{context_tags, elements_contains};
use proptest::prelude::*;

fn tag() -> impl Strategy<Value = String> {
    "[A-Z]{1,12}"
}

proptest! {
    #[test]
    fn every_parsed_tag_is_trimmed_and_non_empty(tags in proptest::collection::vec(tag(), 0..8)) {
        let joined = tags.join(", ");
        for parsed in context_tags(&joined) {
            prop_assert_eq!(parsed, parsed.trim());
            prop_assert!(!parsed.is_empty());
        }
    }

    #[test]
    fn elements_contains_never_matches_a_strict_substring(
        tags in proptest::collection::vec(tag(), 1..8),
        extra in "[A-Z]{1,4}",
    ) {
        let joined = tags.join(",");
        let needle = format!("{}{}", tags[0], extra);
        prop_assume!(!tags.contains(&needle));
        prop_assert!(!elements_contains(&joined, &needle));
    }

    #[test]
    fn elements_contains_matches_any_tag_present_verbatim(
        tags in proptest::collection::vec(tag(), 1..8),
    ) {
        let joined = tags.join(", ");
        for t in &tags {
            prop_assert!(elements_contains(&joined, t));
        }
    }
}
