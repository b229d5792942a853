use regex::Regex;
use std::sync::LazyLock;

static ENV_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Variable lookup used during placeholder expansion
pub type Lookup = fn(&str) -> Option<String>;

/// Look variables up in the process environment
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Substitutes `${VAR}` placeholders; unknown variables stay as literal text
pub fn expand_placeholders(content: &str, lookup: Lookup) -> String {
    ENV_PLACEHOLDER_RE
        .replace_all(content, |caps: &regex::Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Expand placeholders in every string of a YAML document, keys included
pub fn expand_yaml(value: serde_yaml::Value, lookup: Lookup) -> serde_yaml::Value {
    use serde_yaml::Value;

    match value {
        Value::String(s) => Value::String(expand_placeholders(&s, lookup)),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| expand_yaml(item, lookup))
                .collect(),
        ),
        Value::Mapping(mapping) => Value::Mapping(
            mapping
                .into_iter()
                .map(|(key, value)| (expand_yaml(key, lookup), expand_yaml(value, lookup)))
                .collect(),
        ),
        Value::Tagged(mut tagged) => {
            tagged.value = expand_yaml(tagged.value, lookup);
            Value::Tagged(tagged)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_env(name: &str) -> Option<String> {
        match name {
            "API_KEY" => Some("secret".to_string()),
            "HOME_DIR" => Some("/home/me".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_placeholders() {
        let content = "key=${API_KEY}, path=${HOME_DIR}/bin, unknown=${MISSING}, bare=$API_KEY";
        let result = expand_placeholders(content, fake_env);

        assert_eq!(
            result,
            "key=secret, path=/home/me/bin, unknown=${MISSING}, bare=$API_KEY"
        );
    }

    #[test]
    fn test_expand_yaml_reaches_nested_strings() {
        let doc: serde_yaml::Value = serde_yaml::from_str(
            r#"
mcp_servers:
  github:
    command: npx
    args: ["--token", "${API_KEY}"]
    env:
      "${API_KEY}_NAME": "${MISSING}"
retries: 3
"#,
        )
        .unwrap();

        let expanded = expand_yaml(doc, fake_env);
        let server = &expanded["mcp_servers"]["github"];

        assert_eq!(server["args"][1].as_str(), Some("secret"));
        assert_eq!(server["env"]["secret_NAME"].as_str(), Some("${MISSING}"));
        assert_eq!(expanded["retries"].as_u64(), Some(3));
    }
}
