//! Parses the `/flow` endpoint's `params=k1:v1;k2:v2` query value into a
//! base shared-context mapping.

use std::collections::BTreeMap;

use expressops_core::Value;

pub fn parse_params(raw: &str) -> BTreeMap<String, Value> {
    let mut parsed = BTreeMap::new();
    for pair in raw.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((key, value)) = pair.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                parsed.insert(key.to_string(), Value::Str(value.trim().to_string()));
            }
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_pairs() {
        let parsed = parse_params("a:1;b:2");
        assert_eq!(parsed.get("a").unwrap().as_str().unwrap(), "1");
        assert_eq!(parsed.get("b").unwrap().as_str().unwrap(), "2");
    }

    #[test]
    fn ignores_malformed_pairs_and_blank_segments() {
        let parsed = parse_params("a:1;;novalue;  ;c:3");
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains_key("a"));
        assert!(parsed.contains_key("c"));
    }

    #[test]
    fn empty_string_yields_empty_map() {
        assert!(parse_params("").is_empty());
    }
}
