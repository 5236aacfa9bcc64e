//! A small interpreter over dotted-and-bracketed path segments, e.g.
//! `"a.b[0].c"`, used by `ModelList::sort_by_path`. No full JSONPath.

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_segments(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for dotted in path.split('.') {
        let mut rest = dotted;
        loop {
            if let Some(open) = rest.find('[') {
                let (head, tail) = rest.split_at(open);
                if !head.is_empty() {
                    segments.push(Segment::Key(head.to_string()));
                }
                let close = tail.find(']').unwrap_or(tail.len());
                let idx_str = &tail[1..close];
                if let Ok(idx) = idx_str.parse::<usize>() {
                    segments.push(Segment::Index(idx));
                }
                rest = &tail[(close + 1).min(tail.len())..];
            } else {
                if !rest.is_empty() {
                    segments.push(Segment::Key(rest.to_string()));
                }
                break;
            }
        }
    }
    segments
}

/// Navigates `value` along `path`, returning `None` if any segment is
/// missing or type-mismatched.
pub fn get_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let segments = parse_segments(path);
    let mut current = value;
    for segment in segments {
        current = match (&segment, current) {
            (Segment::Key(k), serde_json::Value::Object(map)) => map.get(k)?,
            (Segment::Index(i), serde_json::Value::Array(items)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

fn value_order_key(value: Option<&serde_json::Value>) -> (u8, f64, String) {
    match value {
        None => (0, 0.0, String::new()),
        Some(serde_json::Value::Number(n)) => (1, n.as_f64().unwrap_or(0.0), String::new()),
        Some(serde_json::Value::String(s)) => (2, 0.0, s.clone()),
        Some(serde_json::Value::Bool(b)) => (1, if *b { 1.0 } else { 0.0 }, String::new()),
        Some(other) => (3, 0.0, other.to_string()),
    }
}

/// Sorts `items` (each converted to JSON first) by the value found at
/// `path`, stably, optionally reversed.
pub fn sort_by_path<T: Clone>(
    items: &[T],
    to_json: impl Fn(&T) -> serde_json::Value,
    path: &str,
    reverse: bool,
) -> Vec<T> {
    let mut indexed: Vec<(usize, serde_json::Value)> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (i, to_json(item)))
        .collect();
    indexed.sort_by(|(_, a), (_, b)| {
        let ka = value_order_key(get_path(a, path));
        let kb = value_order_key(get_path(b, path));
        ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
    });
    if reverse {
        indexed.reverse();
    }
    indexed.into_iter().map(|(i, _)| items[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn navigates_dotted_and_bracketed_segments() {
        let value = json!({"a": {"b": [{"c": 1}, {"c": 2}]}});
        assert_eq!(get_path(&value, "a.b[0].c"), Some(&json!(1)));
        assert_eq!(get_path(&value, "a.b[1].c"), Some(&json!(2)));
        assert_eq!(get_path(&value, "a.b[5].c"), None);
    }

    #[test]
    fn sort_by_path_orders_numerically() {
        let items = vec![json!({"v": 3}), json!({"v": 1}), json!({"v": 2})];
        let sorted = sort_by_path(&items, |v| v.clone(), "v", false);
        let values: Vec<i64> = sorted.iter().map(|v| v["v"].as_i64().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
        let rev = sort_by_path(&items, |v| v.clone(), "v", true);
        let values: Vec<i64> = rev.iter().map(|v| v["v"].as_i64().unwrap()).collect();
        assert_eq!(values, vec![3, 2, 1]);
    }
}
