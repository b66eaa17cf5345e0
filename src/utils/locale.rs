//! Language list and locale code helpers.

use serde_json::Value;

/// Normalize a target-language value: a JSON list, or a comma-separated string.
pub fn format_target_langs(langs: &Value) -> Vec<String> {
    match langs {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Format a locale as `xx_YY`, dropping any `.charset` or `@modifier`.
///
/// With `alias_zh`, Chinese territories map to script subtags (`CN` to `Hans`,
/// `TW` to `Hant`). Locales without a territory are returned unchanged.
pub fn format_locale(locale: &str, alias_zh: bool) -> String {
    if !locale.contains('_') {
        return locale.to_string();
    }

    let parts: Vec<&str> = locale.split(['_', '.', '@']).collect();
    if parts.len() < 2 {
        return locale.to_string();
    }

    let lang = parts[0].to_lowercase();
    let mut territory = parts[1].to_uppercase();
    if alias_zh {
        territory = match territory.as_str() {
            "CN" => "Hans".to_string(),
            "TW" => "Hant".to_string(),
            _ => territory,
        };
    }
    format!("{}_{}", lang, territory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_langs_from_list_or_string() {
        assert_eq!(format_target_langs(&json!(["de_DE", "fr_FR"])), vec!["de_DE", "fr_FR"]);
        assert_eq!(format_target_langs(&json!("de_DE, ja_JP")), vec!["de_DE", "ja_JP"]);
        assert_eq!(format_target_langs(&json!("ko_KR")), vec!["ko_KR"]);
        assert!(format_target_langs(&json!(null)).is_empty());
    }

    #[test]
    fn locale_formatting() {
        assert_eq!(format_locale("pt_br", false), "pt_BR");
        assert_eq!(format_locale("sr_RS@latin", false), "sr_RS");
        assert_eq!(format_locale("zh_CN", true), "zh_Hans");
        assert_eq!(format_locale("zh_TW.UTF-8", true), "zh_Hant");
        assert_eq!(format_locale("zh_CN", false), "zh_CN");
        assert_eq!(format_locale("de", true), "de");
    }
}
