//! JSON extraction from free-form model output
//!
//! A model asked for "JSON only" still wraps the object in prose or a code
//! fence often enough that the fallback path cannot rely on clean output.

/// Find the first balanced `{...}` object in the text
///
/// Scans with brace depth, skipping braces inside string literals and
/// handling escapes, so `{"a": "}"}` resolves to the full object rather
/// than cutting at the quoted brace.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in text.as_bytes()[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    // both endpoints are ASCII braces, so slicing is safe
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
