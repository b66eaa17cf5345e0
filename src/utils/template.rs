//! String template rendering utilities.

use std::collections::HashMap;

use regex::Regex;

pub struct TemplateVars;

impl TemplateVars {
    pub const PLATFORM_URL: &'static str = "platform_url";
    pub const PROJECT: &'static str = "project";
    pub const VERSION: &'static str = "version";
    pub const DOMAIN: &'static str = "domain";
}

/// Render `{key}` placeholders.
pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

/// Fill `%NAME%` placeholders in a job document.
///
/// Lookups try the name as written, then lower-cased. Unknown placeholders
/// render as an empty string.
pub fn fill_job_variables(source: &str, variables: &HashMap<String, String>) -> String {
    let pattern = match Regex::new(r"%([A-Za-z0-9_]+)%") {
        Ok(pattern) => pattern,
        Err(_) => return source.to_string(),
    };

    pattern
        .replace_all(source, |caps: &regex::Captures| {
            let name = &caps[1];
            variables
                .get(name)
                .or_else(|| variables.get(&name.to_lowercase()))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_all_occurrences() {
        let url = render(
            "{platform_url}/POT/{project}.{version}/{project}.{version}.pot",
            &[
                (TemplateVars::PLATFORM_URL, "https://l10n.example.org"),
                (TemplateVars::PROJECT, "anaconda"),
                (TemplateVars::VERSION, "main"),
            ],
        );
        assert_eq!(
            url,
            "https://l10n.example.org/POT/anaconda.main/anaconda.main.pot"
        );
    }

    #[test]
    fn fill_job_variables_handles_case_and_unknowns() {
        let mut vars = HashMap::new();
        vars.insert("package_name".to_string(), "anaconda".to_string());
        vars.insert("REPO_BRANCH".to_string(), "f39".to_string());

        let filled = fill_job_variables(
            r#"{"package": "%PACKAGE_NAME%", "branch": "%REPO_BRANCH%", "x": "%MISSING%"}"#,
            &vars,
        );
        assert_eq!(
            filled,
            r#"{"package": "anaconda", "branch": "f39", "x": ""}"#
        );
    }
}
