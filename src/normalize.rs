//! Embedding-response normalization.
//!
//! Embedding providers have shipped several response shapes across SDK
//! versions: a `values` wrapper, a nested `embedding` (or `embeddings` list)
//! attribute, an OpenAI-style `data[0].embedding` mapping, a plain numeric
//! array, or a bare scalar. [`normalize`] probes a closed set of tagged
//! variants in priority order and coerces the first match into a flat vector
//! of finite floats. It is total: malformed input yields `None`, never a
//! panic or an error.

use serde_json::Value;

/// The recognized provider response shapes, in probe priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Object carrying a `values` numeric array.
    ValuesWrapper,
    /// Object carrying a nested `embedding` (or `embeddings` list) value.
    EmbeddingWrapper,
    /// Object carrying a `data` array whose first element holds `embedding`.
    MappingShape,
    /// Plain array of numeric values.
    PlainSequence,
    /// Bare finite number, wrapped as a single-element vector.
    Scalar,
}

const PROBE_ORDER: [Shape; 5] = [
    Shape::ValuesWrapper,
    Shape::EmbeddingWrapper,
    Shape::MappingShape,
    Shape::PlainSequence,
    Shape::Scalar,
];

/// Extracts an ordered vector of finite floats from a raw provider response.
///
/// Returns `None` when no recognized shape yields a non-empty vector. An
/// empty sequence counts as extraction failure, not as a valid zero-length
/// vector.
pub fn normalize(raw: &Value) -> Option<Vec<f32>> {
    for shape in PROBE_ORDER {
        if let Some(vector) = extract(shape, raw) {
            if !vector.is_empty() {
                return Some(vector);
            }
        }
    }
    None
}

fn extract(shape: Shape, raw: &Value) -> Option<Vec<f32>> {
    match shape {
        Shape::ValuesWrapper => coerce_sequence(raw.get("values")?),
        Shape::EmbeddingWrapper => {
            let nested = raw
                .get("embedding")
                .or_else(|| raw.get("embeddings").and_then(|list| list.get(0)))?;
            normalize(nested)
        }
        Shape::MappingShape => {
            let entry = raw.get("data")?.get(0)?;
            normalize(entry.get("embedding")?)
        }
        Shape::PlainSequence => coerce_sequence(raw),
        Shape::Scalar => coerce_number(raw).map(|value| vec![value]),
    }
}

fn coerce_sequence(value: &Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(coerce_number(item)?);
    }
    Some(out)
}

fn coerce_number(value: &Value) -> Option<f32> {
    let number = value.as_f64()?;
    let narrowed = number as f32;
    narrowed.is_finite().then_some(narrowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_wrapper() {
        let raw = json!({ "values": [0.1, 0.2, 0.3] });
        assert_eq!(normalize(&raw), Some(vec![0.1, 0.2, 0.3]));
    }

    #[test]
    fn nested_embedding_wrapper() {
        let raw = json!({ "embedding": { "values": [1.0, 2.0] } });
        assert_eq!(normalize(&raw), Some(vec![1.0, 2.0]));

        let raw = json!({ "embedding": [4.0, 5.0] });
        assert_eq!(normalize(&raw), Some(vec![4.0, 5.0]));
    }

    #[test]
    fn embeddings_list_takes_first() {
        let raw = json!({ "embeddings": [{ "values": [7.0] }, { "values": [8.0] }] });
        assert_eq!(normalize(&raw), Some(vec![7.0]));
    }

    #[test]
    fn data_mapping_shape() {
        let raw = json!({ "data": [{ "embedding": [0.5, 0.6] }] });
        assert_eq!(normalize(&raw), Some(vec![0.5, 0.6]));
    }

    #[test]
    fn plain_sequence() {
        let raw = json!([9.0, 8.0, 7.0]);
        assert_eq!(normalize(&raw), Some(vec![9.0, 8.0, 7.0]));
    }

    #[test]
    fn bare_scalar_becomes_single_element() {
        let raw = json!(0.25);
        assert_eq!(normalize(&raw), Some(vec![0.25]));
    }

    #[test]
    fn empty_sequence_is_extraction_failure() {
        assert_eq!(normalize(&json!([])), None);
        assert_eq!(normalize(&json!({ "values": [] })), None);
        assert_eq!(normalize(&json!({ "embedding": [] })), None);
    }

    #[test]
    fn malformed_shapes_return_none() {
        assert_eq!(normalize(&json!(null)), None);
        assert_eq!(normalize(&json!("not a vector")), None);
        assert_eq!(normalize(&json!({ "unrelated": true })), None);
        assert_eq!(normalize(&json!({ "values": ["a", "b"] })), None);
        assert_eq!(normalize(&json!({ "data": [] })), None);
        assert_eq!(normalize(&json!({ "data": [{ "no_embedding": 1 }] })), None);
    }

    #[test]
    fn mixed_bad_values_fall_through_to_none() {
        // A sequence with one non-numeric entry fails as a whole rather than
        // truncating silently.
        assert_eq!(normalize(&json!([1.0, "x", 3.0])), None);
    }

    #[test]
    fn wrapper_probe_wins_over_other_keys() {
        let raw = json!({
            "values": [1.0],
            "embedding": [2.0],
            "data": [{ "embedding": [3.0] }]
        });
        assert_eq!(normalize(&raw), Some(vec![1.0]));
    }
}
