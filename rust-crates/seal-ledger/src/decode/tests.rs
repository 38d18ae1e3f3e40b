#![allow(non_snake_case)]

use super::*;
use proptest::prelude::*;
use serde_json::json;

const CREATOR: &str = "0x9a3f00000000000000000000000000000000000000000000000000000000b17e";

#[test]
fn decode_seal__positional_record__maps_fields_by_index() {
    // given
    let raw = RawRecord::from(json!([7, CREATOR, 1_760_000_000u64, 0, true, 1_759_000_000u64]));

    // when
    let seal = decode_seal(&raw);

    // then
    assert_eq!(
        seal,
        SealRecord {
            id: 7,
            creator: CREATOR.to_string(),
            target_time: 1_760_000_000,
            actual_price: 0,
            revealed: true,
            created_at: 1_759_000_000,
        }
    );
}

#[test]
fn decode_seal__named_record__maps_fields_by_abi_name() {
    // given
    let raw = RawRecord::from(json!({
        "id": "3",
        "creator": CREATOR,
        "targetTime": "0x68d5f600",
        "actualPrice": 250_012_000_000u64,
        "revealed": false,
        "createdAt": 1_758_000_000u64,
    }));

    // when
    let seal = decode_seal(&raw);

    // then
    assert_eq!(seal.id, 3);
    assert_eq!(seal.target_time, 0x68d5_f600);
    assert_eq!(seal.actual_price, 250_012_000_000);
    assert!(!seal.revealed);
    assert_eq!(seal.created_at, 1_758_000_000);
}

#[test]
fn decode_seal__absent_or_mistyped_fields__fall_back_to_defaults() {
    let inputs = [
        json!(null),
        json!(42),
        json!("seal"),
        json!([]),
        json!({}),
        json!([null, 12, -5, "NaN", "yes", 1.5]),
        json!({"id": -1, "creator": "", "targetTime": {}, "revealed": 1}),
    ];

    for input in inputs {
        let seal = decode_seal(&RawRecord::from(input.clone()));
        assert_eq!(seal, SealRecord::default(), "input: {input}");
    }
}

#[test]
fn decode_prediction__positional_and_named__agree() {
    // given
    let positional = RawRecord::from(json!(["AlphaBot", 123_456_000_000u64, 15, 2]));
    let named = RawRecord::from(json!({
        "name": "AlphaBot",
        "price": "123456000000",
        "deviation": 15,
        "rank": 2,
    }));

    // when
    let a = decode_prediction(&positional);
    let b = decode_prediction(&named);

    // then
    assert_eq!(a, b);
    assert_eq!(a.price, 123_456_000_000);
}

#[test]
fn decode_prediction__malformed__is_empty_placeholder() {
    let raw = RawRecord::from(json!([7, null, "x", false]));
    assert_eq!(decode_prediction(&raw), PredictionRecord::default());
}

#[test]
fn decode_count__accepts_integers_and_rejects_everything_else() {
    assert_eq!(decode_count(&json!(4)), 4);
    assert_eq!(decode_count(&json!(4.0)), 4);
    assert_eq!(decode_count(&json!("12")), 12);
    assert_eq!(decode_count(&json!("0x10")), 16);
    assert_eq!(decode_count(&json!(-3)), 0);
    assert_eq!(decode_count(&json!(2.5)), 0);
    assert_eq!(decode_count(&json!("many")), 0);
    assert_eq!(decode_count(&json!(null)), 0);
}

#[test]
fn raw_record__deserializes_from_any_json_shape() {
    let positional: RawRecord = serde_json::from_str("[1, 2]").unwrap();
    let named: RawRecord = serde_json::from_str(r#"{"id": 1}"#).unwrap();
    let malformed: RawRecord = serde_json::from_str("true").unwrap();

    assert!(matches!(positional, RawRecord::Positional(items) if items.len() == 2));
    assert!(matches!(named, RawRecord::Named(fields) if fields.contains_key("id")));
    assert_eq!(malformed, RawRecord::Malformed(json!(true)));
}

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        any::<f64>().prop_map(|f| json!(f)),
        ".*".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::hash_map("[a-zA-Z]{1,12}", inner, 0..8)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn decoders__arbitrary_json__never_panic_and_keep_sentinels(value in arb_json()) {
        let raw = RawRecord::from(value);

        let seal = decode_seal(&raw);
        let _ = decode_prediction(&raw);

        prop_assert!(!seal.creator.is_empty());
    }
}
