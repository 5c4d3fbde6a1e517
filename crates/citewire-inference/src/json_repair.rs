//! Best-effort repair of malformed JSON emitted by language models.
//!
//! Pure text transformation, bytes in and bytes out, kept independent of
//! the retry logic in [`crate::structured`] so its edge cases are
//! testable without any network mocking. Handles the failure shapes seen
//! in practice: markdown code fences around the payload, prose before or
//! after it, trailing commas, and truncation mid-string or mid-object.

/// Attempt to turn model output into parseable JSON.
///
/// Returns the repaired text. The result is not guaranteed to parse;
/// callers must still run it through serde and treat failure as a retry
/// signal.
pub fn repair_json(raw: &str) -> String {
    let stripped = strip_code_fences(raw);
    let payload = extract_payload(stripped);
    close_and_clean(payload)
}

/// Drop a surrounding markdown code fence if present.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim().strip_suffix("```").unwrap_or(body).trim()
}

/// Slice from the first JSON opener, dropping any leading prose.
fn extract_payload(text: &str) -> &str {
    match text.find(['{', '[']) {
        Some(idx) => &text[idx..],
        None => text,
    }
}

/// Single scan that removes trailing commas, truncates trailing prose
/// after the payload, and closes unterminated strings and brackets.
fn close_and_clean(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut pending_comma = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                flush_comma(&mut out, &mut pending_comma);
                out.push(ch);
                in_string = true;
            }
            '{' => {
                flush_comma(&mut out, &mut pending_comma);
                out.push(ch);
                stack.push('}');
            }
            '[' => {
                flush_comma(&mut out, &mut pending_comma);
                out.push(ch);
                stack.push(']');
            }
            '}' | ']' => {
                // A comma directly before a closer is dropped.
                pending_comma = false;
                out.push(ch);
                stack.pop();
                if stack.is_empty() {
                    // Payload complete; ignore trailing prose.
                    return out;
                }
            }
            ',' => {
                flush_comma(&mut out, &mut pending_comma);
                pending_comma = true;
            }
            c if c.is_whitespace() => {
                // Deferred until we know the comma survives.
                if !pending_comma {
                    out.push(c);
                }
            }
            _ => {
                flush_comma(&mut out, &mut pending_comma);
                out.push(ch);
            }
        }
    }

    // Truncated output. Finish the string, drop a dangling comma, and
    // close whatever brackets remain open.
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while out.ends_with(char::is_whitespace) || out.ends_with(',') {
        out.pop();
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

fn flush_comma(out: &mut String, pending: &mut bool) {
    if *pending {
        out.push_str(", ");
        *pending = false;
    }
}
