//! `{{path}}` template substitution (§4.4 TemplateResolver). A hand-rolled
//! substring scanner, not a general templating crate — the grammar is
//! exactly one construct: a double-brace span containing a dotted path.

use std::collections::HashMap;

use serde_json::Value;

use super::path::resolve_path;

pub struct TemplateResolver;

impl TemplateResolver {
    /// Scan `template` for `{{path}}` spans and substitute each with the
    /// resolved value's string form. A path that does not resolve leaves
    /// its `{{path}}` span untouched in the output.
    pub fn resolve(template: &str, inputs: &HashMap<String, Value>) -> String {
        let bytes = template.as_bytes();
        let mut out = String::with_capacity(template.len());
        let mut i = 0usize;

        while i < bytes.len() {
            if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
                if let Some(end) = find_close(template, i + 2) {
                    let path = template[i + 2..end].trim();
                    match resolve_path(path, inputs) {
                        Some(value) => {
                            out.push_str(&stringify(&value));
                        }
                        None => {
                            out.push_str(&template[i..end + 2]);
                        }
                    }
                    i = end + 2;
                    continue;
                }
            }
            out.push(template[i..].chars().next().unwrap());
            i += template[i..].chars().next().unwrap().len_utf8();
        }

        out
    }
}

fn find_close(template: &str, from: usize) -> Option<usize> {
    template[from..].find("}}").map(|offset| from + offset)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_known_path() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!({"b": "x"}));
        assert_eq!(TemplateResolver::resolve("value: {{a.b}}", &inputs), "value: x");
    }

    #[test]
    fn leaves_missing_path_intact() {
        let inputs = HashMap::new();
        assert_eq!(TemplateResolver::resolve("value: {{missing.path}}", &inputs), "value: {{missing.path}}");
    }

    #[test]
    fn substitutes_multiple_spans() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!(1));
        inputs.insert("b".to_string(), json!(2));
        assert_eq!(TemplateResolver::resolve("{{a}} + {{b}}", &inputs), "1 + 2");
    }

    #[test]
    fn non_string_value_is_json_stringified() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!({"items": [1, 2]}));
        assert_eq!(TemplateResolver::resolve("{{a}}", &inputs), r#"{"items":[1,2]}"#);
    }
}
