use std::collections::HashMap;

use serde_json::Value;

/// Expand `${name}` placeholders from the variable map. `${env:NAME}` reads
/// the process environment. Unknown variables expand to an empty string.
///
/// Substituted values are never rescanned, so expansion is idempotent for
/// any variable map without self-referential values.
pub fn expand(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if let Some(env_name) = name.strip_prefix("env:") {
                    out.push_str(&std::env::var(env_name).unwrap_or_default());
                } else {
                    out.push_str(vars.get(name).map(String::as_str).unwrap_or(""));
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder, keep literally
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// RFC-6901 lookup. An empty pointer addresses the whole document; missing
/// paths yield `None`.
pub fn pointer<'a>(body: &'a Value, ptr: &str) -> Option<&'a Value> {
    if ptr.is_empty() {
        Some(body)
    } else {
        body.pointer(ptr)
    }
}

/// Render the value at a pointer as an offset/variable string. Scalars render
/// bare (no surrounding quotes); null and missing paths yield `None`.
pub fn pointer_as_string(body: &Value, ptr: &str) -> Option<String> {
    match pointer(body, ptr)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
