//! Canonical string rendering (cadena original).
//!
//! The cadena original is the signing pre-image of a comprobante: every
//! present scalar of the document tree, depth-first in schema order, joined
//! with `|` and wrapped in `||…||`. Two trees with equal present values
//! produce byte-identical cadenas, which is the whole point — the seal is
//! computed over these bytes.

use rust_decimal::Decimal;

use super::node::{DocumentNode, Value};

/// Render the canonical pipe-delimited string for `node`.
pub fn cadena_original(node: &DocumentNode) -> String {
    let mut parts: Vec<String> = Vec::new();
    collect(node, &mut parts);
    format!("||{}||", parts.join("|"))
}

fn collect(node: &DocumentNode, parts: &mut Vec<String>) {
    for (_, value) in node.fields() {
        collect_value(value, parts);
    }
}

fn collect_value(value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::Text(s) => parts.push(s.clone()),
        Value::Integer(i) => parts.push(i.to_string()),
        // Decimal Display keeps the carried scale, so trailing zeros survive.
        Value::Amount(d) => parts.push(render_amount(*d)),
        Value::DateTime(t) => parts.push(t.format("%Y-%m-%dT%H:%M:%S").to_string()),
        Value::Node(n) => collect(n, parts),
        Value::Sequence(items) => {
            for item in items {
                collect_value(item, parts);
            }
        }
    }
}

fn render_amount(d: Decimal) -> String {
    d.to_string()
}
