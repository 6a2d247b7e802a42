//! Property coverage for universal invariant 3 (spec.md §8): redaction is
//! deterministic under a fixed salt, and never leaks the raw patient value.

use facnet_redaction::PhiRedactor;
use proptest::prelude::*;

proptest! {
    #[test]
    fn tokenize_patient_is_deterministic_under_a_fixed_salt(
        salt in "[a-zA-Z0-9]{1,32}",
        patient in "[ -~]{0,64}",
    ) {
        let redactor = PhiRedactor::new(salt);
        let first = redactor.tokenize_patient(&patient);
        let second = redactor.tokenize_patient(&patient);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn tokenize_patient_always_has_the_expected_shape(
        salt in "[a-zA-Z0-9]{1,32}",
        patient in "[ -~]{0,64}",
    ) {
        let token = PhiRedactor::new(salt).tokenize_patient(&patient);
        prop_assert!(token.starts_with("[PATIENT-"));
        prop_assert!(token.ends_with(']'));
        let hex_part = &token["[PATIENT-".len()..token.len() - 1];
        prop_assert_eq!(hex_part.len(), 8);
        prop_assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
        if !patient.is_empty() {
            prop_assert!(!token.contains(&patient));
        }
    }

    #[test]
    fn a_different_salt_almost_always_changes_the_token(
        patient in "[ -~]{1,64}",
        salt_a in "[a-zA-Z0-9]{1,32}",
        salt_b in "[a-zA-Z0-9]{1,32}",
    ) {
        prop_assume!(salt_a != salt_b);
        let token_a = PhiRedactor::new(salt_a).tokenize_patient(&patient);
        let token_b = PhiRedactor::new(salt_b).tokenize_patient(&patient);
        prop_assert_ne!(token_a, token_b);
    }
}
