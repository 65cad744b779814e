//! Issue-form bodies
//!
//! GitHub renders submitted issue forms as `### Label` headings followed by
//! the answer. Those answers seed the workflow `data` map.

use std::collections::BTreeMap;

use serde_json::Value;

use super::codec;

const NO_RESPONSE: &str = "_No response_";

/// `"Dataset Name (required)"` → `"dataset_name_required"`
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

fn is_checkbox_list(value: &str) -> bool {
    value
        .lines()
        .filter(|line| !line.trim().is_empty())
        .all(|line| {
            let line = line.trim_start();
            line.starts_with("- [x]") || line.starts_with("- [X]") || line.starts_with("- [ ]")
        })
}

fn field_value(raw: &str) -> Option<Value> {
    let value = raw.trim();
    if value.is_empty() || value == NO_RESPONSE {
        return None;
    }
    if is_checkbox_list(value) {
        let checked: Vec<Value> = value
            .lines()
            .map(str::trim_start)
            .filter_map(|line| {
                line.strip_prefix("- [x]")
                    .or_else(|| line.strip_prefix("- [X]"))
            })
            .map(|item| Value::String(item.trim().to_string()))
            .collect();
        return Some(Value::Array(checked));
    }
    Some(Value::String(value.to_string()))
}

/// Parse an issue-form body into slug-keyed fields.
///
/// Unanswered fields are left out; a state block in the body is ignored.
pub fn parse_issue_form(body: &str) -> BTreeMap<String, Value> {
    let body = match body.find(codec::STATE_MARKER) {
        Some(index) => &body[..index],
        None => body,
    };

    let mut fields = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for line in body.lines() {
        if let Some(heading) = line.strip_prefix("### ") {
            if let Some((label, value)) = current.take() {
                if let Some(value) = field_value(&value) {
                    fields.insert(label, value);
                }
            }
            current = Some((slugify(heading), String::new()));
        } else if let Some((_, value)) = current.as_mut() {
            value.push_str(line);
            value.push('\n');
        }
    }
    if let Some((label, value)) = current {
        if let Some(value) = field_value(&value) {
            fields.insert(label, value);
        }
    }
    fields.retain(|key, _| !key.is_empty());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: &str = "### Dataset Name\n\nroads_2019\n\n### Reason\n\nSuperseded by roads_2024.\nSee the migration notes.\n\n### Replacement\n\n_No response_\n\n### Affected Systems\n\n- [x] Catalog\n- [ ] Tile server\n- [X] Data API\n";

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Dataset Name (required)"), "dataset_name_required");
        assert_eq!(slugify("  Owner / Team "), "owner_team");
    }

    #[test]
    fn test_parse_fields() {
        let fields = parse_issue_form(FORM);
        assert_eq!(fields["dataset_name"], "roads_2019");
        assert_eq!(
            fields["reason"],
            "Superseded by roads_2024.\nSee the migration notes."
        );
        assert!(!fields.contains_key("replacement"));
        assert_eq!(
            fields["affected_systems"],
            serde_json::json!(["Catalog", "Data API"])
        );
    }

    #[test]
    fn test_state_block_is_ignored() {
        let body = format!("{FORM}\n<!-- issue-ops-state\n{{}}\n-->");
        let fields = parse_issue_form(&body);
        assert_eq!(
            fields["affected_systems"],
            serde_json::json!(["Catalog", "Data API"])
        );
    }

    #[test]
    fn test_free_text_body_has_no_fields() {
        assert!(parse_issue_form("Please remove the old roads layer.").is_empty());
    }
}
