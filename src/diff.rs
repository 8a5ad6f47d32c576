use serde_json::Value;

/// One changed leaf between two JSON documents. `old` is `Null` for
/// added leaves, `new` is `Null` for removed ones.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Change {
    pub path: String,
    pub old: Value,
    pub new: Value,
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

/// Walks objects by key and arrays by index, collecting leaf changes.
/// Module documents list zones and tiles as arrays, so index-wise
/// comparison keeps per-element changes small.
pub(crate) fn diff_json(previous: &Value, current: &Value, prefix: &str, out: &mut Vec<Change>) {
    match (previous, current) {
        (Value::Object(prev), Value::Object(curr)) => {
            for (key, curr_val) in curr {
                let path = join(prefix, key);
                match prev.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, out),
                    None => diff_json(&Value::Null, curr_val, &path, out),
                }
            }
            for (key, prev_val) in prev {
                if !curr.contains_key(key) {
                    diff_json(prev_val, &Value::Null, &join(prefix, key), out);
                }
            }
        }
        (Value::Array(prev), Value::Array(curr)) => {
            for i in 0..prev.len().max(curr.len()) {
                let path = join(prefix, &i.to_string());
                let p = prev.get(i).unwrap_or(&Value::Null);
                let c = curr.get(i).unwrap_or(&Value::Null);
                diff_json(p, c, &path, out);
            }
        }
        (Value::Null, Value::Object(_) | Value::Array(_)) => {
            let empty = empty_like(current);
            diff_json(&empty, current, prefix, out);
        }
        (Value::Object(_) | Value::Array(_), Value::Null) => {
            let empty = empty_like(previous);
            diff_json(previous, &empty, prefix, out);
        }
        (prev, curr) if prev != curr => out.push(Change {
            path: prefix.to_string(),
            old: prev.clone(),
            new: curr.clone(),
        }),
        _ => {}
    }
}

fn empty_like(value: &Value) -> Value {
    match value {
        Value::Array(_) => Value::Array(Vec::new()),
        _ => Value::Object(serde_json::Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn changes(prev: &Value, curr: &Value) -> Vec<Change> {
        let mut out = Vec::new();
        diff_json(prev, curr, "", &mut out);
        out
    }

    #[test]
    fn detects_leaf_change_inside_array() {
        let prev = json!({"zones": {"elements": [{"zone": {"id": 1, "currentTemperature": 210}}]}});
        let curr = json!({"zones": {"elements": [{"zone": {"id": 1, "currentTemperature": 215}}]}});
        let out = changes(&prev, &curr);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, "zones.elements.0.zone.currentTemperature");
        assert_eq!(out[0].old, json!(210));
        assert_eq!(out[0].new, json!(215));
    }

    #[test]
    fn ignores_unchanged() {
        let doc = json!({"tiles": [{"id": 1, "params": {"value": 5}}]});
        assert!(changes(&doc, &doc).is_empty());
    }

    #[test]
    fn new_object_reports_leaves() {
        let out = changes(&json!({}), &json!({"zone": {"id": 3, "humidity": 40}}));
        let paths: Vec<_> = out.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["zone.humidity", "zone.id"]);
    }

    #[test]
    fn removed_keys_and_elements() {
        let prev = json!({"tiles": [{"id": 1}, {"id": 2}], "gone": true});
        let curr = json!({"tiles": [{"id": 1}]});
        let out = changes(&prev, &curr);
        assert!(out.contains(&Change {
            path: "tiles.1.id".into(),
            old: json!(2),
            new: Value::Null,
        }));
        assert!(out.contains(&Change {
            path: "gone".into(),
            old: json!(true),
            new: Value::Null,
        }));
        assert_eq!(out.len(), 2);
    }
}
