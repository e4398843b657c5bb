//! Lenient JSON extraction from model output
//!
//! Even with `responseMimeType: application/json` the model sometimes wraps
//! its answer in markdown fences or a sentence of prose.

use serde::de::DeserializeOwned;

/// Slice of `text` most likely to be the JSON value the model produced
///
/// Strips code fences. Text starting with `[` is taken as an array up to the
/// last `]`; otherwise everything from the first `{` to the last `}`. Falls
/// back to the trimmed text when there are no delimiters.
pub fn extract_json(text: &str) -> &str {
    let trimmed = strip_fences(text.trim());
    let (open, close) = if trimmed.starts_with('[') { ('[', ']') } else { ('{', '}') };
    match (trimmed.find(open), trimmed.rfind(close)) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Extract and deserialize the JSON object in `text`
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(extract_json(text))
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Score {
        total: u32,
    }

    #[test]
    fn test_plain_json() {
        assert_eq!(extract_json(r#" {"total": 12} "#), r#"{"total": 12}"#);
    }

    #[test]
    fn test_fenced_json() {
        let text = "```json\n{\"total\": 12}\n```";
        assert_eq!(parse_json::<Score>(text).unwrap(), Score { total: 12 });
    }

    #[test]
    fn test_json_inside_prose() {
        let text = "Here is the result:\n{\"total\": 9}\nGood luck!";
        assert_eq!(parse_json::<Score>(text).unwrap(), Score { total: 9 });
    }

    #[test]
    fn test_fenced_array_of_objects() {
        let text = "```json\n[{\"total\": 1}, {\"total\": 2}]\n```";
        assert_eq!(extract_json(text), r#"[{"total": 1}, {"total": 2}]"#);
        assert_eq!(
            parse_json::<Vec<Score>>(text).unwrap(),
            vec![Score { total: 1 }, Score { total: 2 }]
        );
    }

    #[test]
    fn test_no_json() {
        assert_eq!(extract_json("  nothing here "), "nothing here");
        assert!(parse_json::<Score>("nothing here").is_err());
    }
}
