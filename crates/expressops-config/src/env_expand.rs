//! `${VAR}` / `$VAR` environment-variable expansion.
//!
//! Applied to the raw YAML text before parsing, and again to individual
//! plugin-config string values that begin with `$` after parsing — the
//! second pass exists because a value like `$SLACK_WEBHOOK_URL` with no
//! braces would otherwise need to be a whole-file substitution to be
//! unambiguous once embedded inside quoted YAML scalars.

use std::env;

use regex::Regex;

use crate::error::ConfigError;

fn pattern() -> Regex {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
}

/// Expands every `${VAR}`/`$VAR` occurrence in `text` using `env::var`.
/// A reference to an unset variable is an error naming the variable.
pub fn expand_text(text: &str) -> Result<String, ConfigError> {
    let re = pattern();
    let mut first_missing: Option<String> = None;
    let expanded = re.replace_all(text, |caps: &regex::Captures| {
        let name = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
        match env::var(name) {
            Ok(value) => value,
            Err(_) => {
                if first_missing.is_none() {
                    first_missing = Some(name.to_string());
                }
                String::new()
            }
        }
    });
    if let Some(name) = first_missing {
        return Err(ConfigError::MissingEnvVar(name));
    }
    Ok(expanded.into_owned())
}

/// Resolves a single plugin-config string that starts with `$` to its
/// environment value. Strings not starting with `$` pass through
/// unchanged.
pub fn expand_scalar(value: &str) -> Result<String, ConfigError> {
    if let Some(name) = value.strip_prefix('$') {
        env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn braced_and_bare_forms_both_expand() {
        unsafe { std::env::set_var("EXPRESSOPS_TEST_VAR", "hello") };
        let out = expand_text("value: ${EXPRESSOPS_TEST_VAR}-$EXPRESSOPS_TEST_VAR").unwrap();
        assert_eq!(out, "value: hello-hello");
        unsafe { std::env::remove_var("EXPRESSOPS_TEST_VAR") };
    }

    #[test]
    fn missing_variable_is_an_error() {
        unsafe { std::env::remove_var("EXPRESSOPS_DEFINITELY_UNSET") };
        let err = expand_text("${EXPRESSOPS_DEFINITELY_UNSET}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(name) if name == "EXPRESSOPS_DEFINITELY_UNSET"));
    }

    #[test]
    fn text_with_no_references_is_unchanged() {
        let out = expand_text("plain text, no vars here").unwrap();
        assert_eq!(out, "plain text, no vars here");
    }

    #[test]
    fn scalar_without_dollar_passes_through() {
        assert_eq!(expand_scalar("literal").unwrap(), "literal");
    }
}
