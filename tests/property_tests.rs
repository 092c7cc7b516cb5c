/// Property-based tests using proptest
/// Tests invariants of the field validators for arbitrary inputs
use proptest::prelude::*;
use scoring_api::fields::{FieldKind, FieldSpec};
use serde_json::{json, Value};

// Property: validators never panic
proptest! {
    #[test]
    fn string_validators_never_panic(raw in "\\PC*") {
        let value = json!(raw);
        for kind in [
            FieldKind::Char,
            FieldKind::Email,
            FieldKind::Phone,
            FieldKind::Name,
            FieldKind::Date,
            FieldKind::BirthDay,
            FieldKind::Gender,
            FieldKind::ClientId,
            FieldKind::Arguments,
        ] {
            let _ = kind.check("field", &value);
        }
    }
}

// Property: phone format
proptest! {
    #[test]
    fn valid_phones_accepted(rest in "[0-9]{10}") {
        let phone = format!("7{}", rest);
        prop_assert!(FieldKind::Phone.check("phone", &json!(phone)).is_ok());
    }

    #[test]
    fn phones_not_starting_with_seven_rejected(first in "[0-689]", rest in "[0-9]{10}") {
        let phone = format!("{}{}", first, rest);
        prop_assert!(FieldKind::Phone.check("phone", &json!(phone)).is_err());
    }

    #[test]
    fn phones_with_wrong_length_rejected(rest in "[0-9]{0,20}") {
        prop_assume!(rest.len() != 10);
        let phone = format!("7{}", rest);
        prop_assert!(FieldKind::Phone.check("phone", &json!(phone)).is_err());
    }
}

// Property: email and ids
proptest! {
    #[test]
    fn strings_without_at_are_not_emails(raw in "[^@]*") {
        prop_assert!(FieldKind::Email.check("email", &json!(raw)).is_err());
    }

    #[test]
    fn integer_id_lists_accepted(ids in proptest::collection::vec(any::<i64>(), 1..20)) {
        let spec = FieldSpec::new("client_ids", FieldKind::ClientId).sequence();
        prop_assert!(spec.validate(Some(&json!(ids))).is_ok());
    }

    #[test]
    fn one_string_id_poisons_the_list(
        ids in proptest::collection::vec(any::<i64>(), 0..10),
        position in 0usize..10,
        bad in "[a-z]{1,5}"
    ) {
        let mut values: Vec<Value> = ids.into_iter().map(Value::from).collect();
        let index = position.min(values.len());
        values.insert(index, Value::String(bad));
        let spec = FieldSpec::new("client_ids", FieldKind::ClientId).sequence();
        prop_assert!(spec.validate(Some(&Value::Array(values))).is_err());
    }
}

// Property: date format round trip
proptest! {
    #[test]
    fn formatted_dates_accepted(day in 1u32..=28, month in 1u32..=12, year in 1900i32..=2100) {
        let raw = format!("{:02}.{:02}.{}", day, month, year);
        prop_assert!(FieldKind::Date.check("date", &json!(raw)).is_ok());
    }
}
