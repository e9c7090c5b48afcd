//! Special (free cart) orders.
//!
//! The customer picked arbitrary dishes and portion sizes. Items are keyed
//! `"<name> (<portion>)"` so the same dish in two sizes is prepared as two
//! separate lines. An item without a portion is keyed by its name alone.

use serde_json::Value;

use crate::details::{ordered_values, Details};

/// One `(key, quantity)` contribution from a cart item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub key: String,
    pub quantity: i64,
}

/// Cart items: either the payload itself or its `cart` array.
pub fn cart_items(details: &Details) -> &[Value] {
    match details {
        Details::List(items) => items.as_slice(),
        Details::Object(map) => map
            .get("cart")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        Details::Unusable => &[],
    }
}

pub fn aggregate(details: &Details) -> Vec<CartLine> {
    cart_items(details)
        .iter()
        .map(|item| {
            let name = display_name(item.get("name"));
            let key = match portion_label(item.get("portion")) {
                Some(portion) => format!("{name} ({portion})"),
                None => name,
            };
            CartLine {
                key,
                quantity: item.get("quantity").map_or(0, lenient_int),
            }
        })
        .collect()
}

/// Resolve a possibly localized name: `fr`, then `en`, then the first
/// non-empty value. A JSON string holding a language map is decoded first.
pub fn display_name(name: Option<&Value>) -> String {
    match name {
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => localized(&map),
            _ => raw.clone(),
        },
        Some(Value::Object(map)) => localized(map),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn localized(map: &serde_json::Map<String, Value>) -> String {
    let non_empty = |v: &Value| v.as_str().filter(|s| !s.is_empty()).map(str::to_string);
    map.get("fr")
        .and_then(non_empty)
        .or_else(|| map.get("en").and_then(non_empty))
        .or_else(|| ordered_values(map).find_map(non_empty))
        .unwrap_or_default()
}

fn portion_label(portion: Option<&Value>) -> Option<String> {
    match portion? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer coercion for quantities: numbers truncate, strings read their
/// leading sign and digits, everything else is zero.
pub fn lenient_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => leading_int(s),
        _ => 0,
    }
}

fn leading_int(s: &str) -> i64 {
    let trimmed = s.trim_start();
    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<i64>().map(|n| sign * n).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list(value: Value) -> Details {
        match value {
            Value::Array(items) => Details::List(items),
            Value::Object(map) => Details::Object(map),
            _ => Details::Unusable,
        }
    }

    #[test]
    fn keys_combine_name_and_portion() {
        let d = list(json!([{"name": {"fr": "Nems"}, "portion": "6pcs", "quantity": 3}]));
        assert_eq!(
            aggregate(&d),
            vec![CartLine {
                key: "Nems (6pcs)".into(),
                quantity: 3
            }]
        );
    }

    #[test]
    fn cart_key_inside_object() {
        let cart = json!([{"name": "Bo bun", "portion": "L", "quantity": "2"}]);
        let d = list(json!({"cart": cart, "note": "x"}));
        assert_eq!(aggregate(&d)[0].key, "Bo bun (L)");
        assert_eq!(aggregate(&d)[0].quantity, 2);
    }

    #[test]
    fn object_without_cart_and_unusable_are_empty() {
        assert!(aggregate(&list(json!({"formulaName": "Standard"}))).is_empty());
        assert!(aggregate(&Details::Unusable).is_empty());
    }

    #[test]
    fn language_preference() {
        assert_eq!(display_name(Some(&json!({"en": "Spring rolls", "fr": "Nems"}))), "Nems");
        assert_eq!(
            display_name(Some(&json!({"zh": "春卷", "en": "Spring rolls"}))),
            "Spring rolls"
        );
        assert_eq!(display_name(Some(&json!({"vi": "", "zh": "春卷"}))), "春卷");
        assert_eq!(display_name(Some(&json!({"fr": "", "en": ""}))), "");
        assert_eq!(display_name(Some(&json!("{\"fr\":\"Pho\"}"))), "Pho");
        assert_eq!(display_name(Some(&json!("Pho"))), "Pho");
        assert_eq!(display_name(None), "");
    }

    #[test]
    fn quantity_coercion() {
        assert_eq!(lenient_int(&json!(4)), 4);
        assert_eq!(lenient_int(&json!(2.9)), 2);
        assert_eq!(lenient_int(&json!("3 pcs")), 3);
        assert_eq!(lenient_int(&json!(" -2")), -2);
        assert_eq!(lenient_int(&json!("abc")), 0);
        assert_eq!(lenient_int(&json!(null)), 0);
        assert_eq!(lenient_int(&json!(true)), 0);
    }

    #[test]
    fn missing_quantity_counts_zero() {
        let d = list(json!([{"name": "Nems", "portion": "6pcs"}]));
        assert_eq!(aggregate(&d)[0].quantity, 0);
    }

    #[test]
    fn missing_portion_keys_by_name() {
        let d = list(json!([
            {"name": "Nems", "quantity": 1},
            {"name": "Pho", "portion": null, "quantity": 1},
        ]));
        let lines = aggregate(&d);
        assert_eq!(lines[0].key, "Nems");
        assert_eq!(lines[1].key, "Pho");
    }
}
