//! Variable interpolation for plan strings.
//!
//! Every string in a step may reference a plan variable as `{{ name }}`.
//! Interpolation happens once, at load time, so the rest of the engine only
//! ever sees concrete values. Secret references are deliberately rejected
//! here: secrets may only surface inside template files and secret-sourced
//! file content, never in arbitrary plan fields.

use std::collections::BTreeMap;

use anyhow::{Result, bail};

/// Substitute `{{ name }}` references in every string of a TOML value.
///
/// # Errors
///
/// Returns an error for an unknown variable, an unterminated placeholder, or
/// a `secret.*` reference.
pub fn substitute(value: toml::Value, vars: &BTreeMap<String, String>) -> Result<toml::Value> {
    Ok(match value {
        toml::Value::String(s) => toml::Value::String(render(&s, vars)?),
        toml::Value::Array(items) => toml::Value::Array(
            items
                .into_iter()
                .map(|v| substitute(v, vars))
                .collect::<Result<_>>()?,
        ),
        toml::Value::Table(table) => toml::Value::Table(
            table
                .into_iter()
                .map(|(k, v)| Ok((k, substitute(v, vars)?)))
                .collect::<Result<_>>()?,
        ),
        other => other,
    })
}

/// Render a single string, replacing `{{ name }}` with the variable's value.
///
/// # Errors
///
/// Returns an error for an unknown variable, an unterminated placeholder, or
/// a `secret.*` reference.
pub fn render(input: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        let (before, after_open) = rest.split_at(start);
        out.push_str(before);
        let after_open = after_open.trim_start_matches("{{");
        let Some(end) = after_open.find("}}") else {
            bail!("unterminated '{{{{' placeholder in: {input}");
        };
        let (raw_name, after_close) = after_open.split_at(end);
        let name = raw_name.trim();

        if name.starts_with("secret.") {
            bail!(
                "secret reference '{name}' is not allowed in plan fields; \
                 secrets may only be used in templates or secret-sourced file content"
            );
        }
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => bail!("unknown variable '{name}' in: {input}"),
        }
        rest = after_close.trim_start_matches("}}");
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn render_plain_string_unchanged() {
        let out = render("no placeholders here", &vars(&[])).unwrap();
        assert_eq!(out, "no placeholders here");
    }

    #[test]
    fn render_single_variable() {
        let out = render("/srv/{{ app }}/www", &vars(&[("app", "shop")])).unwrap();
        assert_eq!(out, "/srv/shop/www");
    }

    #[test]
    fn render_multiple_variables() {
        let out = render(
            "{{ scheme }}://{{ host }}/site.tar.gz",
            &vars(&[("scheme", "https"), ("host", "cdn.example.com")]),
        )
        .unwrap();
        assert_eq!(out, "https://cdn.example.com/site.tar.gz");
    }

    #[test]
    fn render_without_inner_spaces() {
        let out = render("{{app}}", &vars(&[("app", "shop")])).unwrap();
        assert_eq!(out, "shop");
    }

    #[test]
    fn render_unknown_variable_errors() {
        let err = render("{{ nope }}", &vars(&[])).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn render_unterminated_placeholder_errors() {
        let err = render("{{ open", &vars(&[])).unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn render_rejects_secret_references() {
        let err = render("{{ secret.token }}", &vars(&[])).unwrap_err();
        assert!(err.to_string().contains("not allowed in plan fields"));
    }

    #[test]
    fn substitute_walks_nested_tables_and_arrays() {
        let value: toml::Value = toml::from_str(
            "kind = \"container\"\ncontainer = \"{{ app }}\"\nports = [\"{{ port }}:80\"]\n\n[env]\nAPP = \"{{ app }}\"\n",
        )
        .unwrap();
        let out = substitute(value, &vars(&[("app", "web"), ("port", "8080")])).unwrap();
        assert_eq!(out.get("container").and_then(|v| v.as_str()), Some("web"));
        let ports = out.get("ports").and_then(|v| v.as_array()).unwrap();
        assert_eq!(ports.first().and_then(|v| v.as_str()), Some("8080:80"));
        let env = out.get("env").and_then(|v| v.as_table()).unwrap();
        assert_eq!(env.get("APP").and_then(|v| v.as_str()), Some("web"));
    }

    #[test]
    fn substitute_leaves_non_strings_alone() {
        let value: toml::Value = toml::from_str("enabled = true\ncount = 3\n").unwrap();
        let out = substitute(value, &vars(&[])).unwrap();
        assert_eq!(out.get("enabled").and_then(toml::Value::as_bool), Some(true));
        assert_eq!(out.get("count").and_then(toml::Value::as_integer), Some(3));
    }
}
