//! Deterministic output bounding.
//!
//! Two layers: [`truncate_output`] bounds a single text field to a byte cap
//! with a visible marker, and [`truncate_tool_payload`] bounds a serialized
//! tool result while keeping the JSON envelope parseable by shrinking only
//! the known large fields.

use std::borrow::Cow;

use serde_json::Value;

/// Fields of a tool payload that may carry unbounded text.
const SHRINKABLE_FIELDS: [&str; 5] = ["stdout", "stderr", "content", "data", "output"];

/// Bound `text` to `max_bytes` encoded bytes.
///
/// Within the cap the input is returned unchanged, byte for byte. Over the
/// cap the text is sliced at the nearest char boundary at or below the cap
/// (a partial trailing multi-byte sequence is dropped, never split) and a
/// marker naming the number of dropped bytes is appended. Reapplying the
/// function to its own output shrinks it by at most one marker's worth.
pub fn truncate_output(text: &str, max_bytes: usize) -> Cow<'_, str> {
    if text.len() <= max_bytes {
        return Cow::Borrowed(text);
    }

    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    let dropped = text.len() - end;
    let mut bounded = String::with_capacity(end + 64);
    bounded.push_str(&text[..end]);
    bounded.push_str(&format!(
        "\n\n[output truncated - {dropped} bytes dropped]"
    ));
    Cow::Owned(bounded)
}

/// Bound a serialized tool result to `max_bytes`, structure-aware.
///
/// The input is parsed as a JSON object and only the known large fields
/// (`stdout`, `stderr`, `content`, `data`, `output`) are shrunk, largest
/// first, so the envelope stays parseable even when the payload does not
/// fit. Input that is not a JSON object falls back to raw byte truncation.
/// If the oversize lives entirely in fields this function does not know,
/// the object is returned intact (best effort, still parseable).
pub fn truncate_tool_payload(serialized: &str, max_bytes: usize) -> String {
    if serialized.len() <= max_bytes {
        return serialized.to_owned();
    }

    let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(serialized) else {
        return truncate_output(serialized, max_bytes).into_owned();
    };

    loop {
        let current_len = match serde_json::to_string(&map) {
            Ok(s) if s.len() > max_bytes => s.len(),
            Ok(s) => return s,
            Err(_) => return truncate_output(serialized, max_bytes).into_owned(),
        };
        let excess = current_len - max_bytes;

        // Shrink the largest known field; JSON escaping means one pass can
        // land short, so iterate until the budget fits or nothing shrinks.
        let target = SHRINKABLE_FIELDS
            .iter()
            .copied()
            .filter(|key| map.get(*key).and_then(Value::as_str).is_some())
            .max_by_key(|key| {
                map.get(*key)
                    .and_then(Value::as_str)
                    .map_or(0, str::len)
            });
        let Some(key) = target else { break };
        let Some(text) = map.get(key).and_then(Value::as_str) else {
            break;
        };
        let cap = text.len().saturating_sub(excess);
        let shrunk = truncate_output(text, cap).into_owned();
        if shrunk.len() >= text.len() {
            break;
        }
        map.insert(key.to_owned(), Value::String(shrunk));
    }

    serde_json::to_string(&map)
        .unwrap_or_else(|_| truncate_output(serialized, max_bytes).into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_under_cap() {
        let text = "hello world";
        let bounded = truncate_output(text, 50_000);
        assert!(matches!(bounded, Cow::Borrowed(_)));
        assert_eq!(bounded, text);
    }

    #[test]
    fn test_identity_at_exact_cap() {
        let text = "x".repeat(100);
        assert_eq!(truncate_output(&text, 100), text);
    }

    #[test]
    fn test_over_cap_bounded_with_marker() {
        let text = "x".repeat(500);
        let bounded = truncate_output(&text, 100);

        assert!(bounded.len() <= 100 + 50, "got {} bytes", bounded.len());
        assert!(bounded.contains("truncated"));
        assert!(bounded.contains("400 bytes dropped"));
        assert!(bounded.starts_with(&"x".repeat(100)));
    }

    #[test]
    fn test_multibyte_boundary_not_split() {
        // 'é' is two bytes; a 5-byte cap lands mid-character.
        let text = "ééééé";
        let bounded = truncate_output(text, 5);
        assert!(bounded.starts_with("éé"));
        assert!(!bounded.starts_with("ééé"));
        assert!(bounded.contains("truncated"));
    }

    #[test]
    fn test_idempotent_within_marker_tolerance() {
        let text = "y".repeat(10_000);
        let once = truncate_output(&text, 200).into_owned();
        let twice = truncate_output(&once, 200).into_owned();
        let marker_allowance = 50;
        assert!(once.len().abs_diff(twice.len()) <= marker_allowance);
        assert!(twice.contains("truncated"));
    }

    #[test]
    fn test_zero_cap() {
        let bounded = truncate_output("abc", 0);
        assert!(bounded.contains("3 bytes dropped"));
    }

    #[test]
    fn test_payload_within_cap_untouched() {
        let payload = r#"{"stdout":"hi","returncode":"0"}"#;
        assert_eq!(truncate_tool_payload(payload, 1_000), payload);
    }

    #[test]
    fn test_payload_shrinks_only_known_fields() {
        let payload = serde_json::json!({
            "label": "shell",
            "returncode": "0",
            "stdout": "z".repeat(5_000),
            "stderr": "",
        })
        .to_string();

        let bounded = truncate_tool_payload(&payload, 1_000);
        assert!(bounded.len() <= 1_000 + 100, "got {} bytes", bounded.len());

        // Envelope must stay parseable and the small fields untouched.
        let parsed: Value = serde_json::from_str(&bounded).unwrap();
        assert_eq!(parsed["label"], "shell");
        assert_eq!(parsed["returncode"], "0");
        assert!(parsed["stdout"].as_str().unwrap().contains("truncated"));
    }

    #[test]
    fn test_payload_shrinks_largest_field_first() {
        let payload = serde_json::json!({
            "stdout": "a".repeat(100),
            "content": "b".repeat(4_000),
        })
        .to_string();

        let bounded = truncate_tool_payload(&payload, 500);
        let parsed: Value = serde_json::from_str(&bounded).unwrap();
        assert!(parsed["content"].as_str().unwrap().contains("truncated"));
        assert_eq!(parsed["stdout"].as_str().unwrap(), "a".repeat(100));
    }

    #[test]
    fn test_non_object_falls_back_to_raw_truncation() {
        let not_json = "plain text ".repeat(200);
        let bounded = truncate_tool_payload(&not_json, 100);
        assert!(bounded.len() <= 100 + 50);
        assert!(bounded.contains("truncated"));
    }

    #[test]
    fn test_unknown_large_field_left_parseable() {
        let payload = serde_json::json!({"blob": "q".repeat(2_000)}).to_string();
        let bounded = truncate_tool_payload(&payload, 100);
        // Best effort: nothing known to shrink, but the envelope survives.
        let parsed: Value = serde_json::from_str(&bounded).unwrap();
        assert!(parsed["blob"].is_string());
    }
}
