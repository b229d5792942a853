//! Tool invocation entries
//!
//! An [`Entry`] is one named MCP server definition; an [`EntryCollection`]
//! is the full set belonging to one application at one point in time.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One tool invocation definition
///
/// Keys an application stores beyond the four invocation fields (`disabled`,
/// `autoApprove`, `url`, ...) are carried in `extra` and written back as-is.
/// They take part in equality only for entries without a command, where
/// they are all there is to compare.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    /// Program to launch
    #[serde(default)]
    pub command: String,

    /// Ordered argument list
    #[serde(default, deserialize_with = "string_list")]
    pub args: Vec<String>,

    /// Environment variables, empty when none are set
    #[serde(default, deserialize_with = "string_map")]
    pub env: BTreeMap<String, String>,

    /// Working directory
    #[serde(default)]
    pub cwd: Option<String>,

    /// Application-specific keys, in document order
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Content equality: command, ordered arguments, environment and working directory
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.command == other.command
            && self.args == other.args
            && self.env == other.env
            && self.cwd == other.cwd
            && (self.is_launchable() || self.extra == other.extra)
    }
}

impl Eq for Entry {}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Entries without a command (URL-based servers) keep their own shape
        let launches = !self.command.is_empty() || self.extra.is_empty();

        let mut map = serializer.serialize_map(None)?;
        if launches {
            map.serialize_entry("command", &self.command)?;
            map.serialize_entry("args", &self.args)?;
        }
        if !self.env.is_empty() {
            map.serialize_entry("env", &self.env)?;
        }
        if let Some(cwd) = &self.cwd {
            map.serialize_entry("cwd", cwd)?;
        }
        for (key, value) in &self.extra {
            if !matches!(key.as_str(), "command" | "args" | "env" | "cwd") {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl Entry {
    /// Create an entry from a command and its arguments
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Whether the entry has a command to launch
    pub fn is_launchable(&self) -> bool {
        !self.command.is_empty()
    }

    /// Whether both entries launch the same thing.
    ///
    /// Compares command, the *set* of arguments and the environment. The
    /// name is not part of this identity, nor is argument order. Entries
    /// without a command never match.
    pub fn same_invocation(&self, other: &Entry) -> bool {
        self.is_launchable()
            && self.command == other.command
            && self.env == other.env
            && self.args.iter().collect::<BTreeSet<_>>() == other.args.iter().collect::<BTreeSet<_>>()
    }

    /// The command line as a single display string
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Accept `null` or an array of scalars
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Scalar>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(Scalar::into_string)
        .collect())
}

/// Accept `null` or a mapping of scalars; numbers and booleans are stringified
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Scalar>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.into_string()))
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    String(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::String(s) => s,
            Scalar::Bool(b) => b.to_string(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
        }
    }
}

/// Mapping of entry name to entry, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryCollection {
    entries: BTreeMap<String, Entry>,
}

impl EntryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Insert or replace an entry, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, entry: Entry) -> Option<Entry> {
        self.entries.insert(name.into(), entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<Entry> {
        self.entries.remove(name)
    }

    /// Entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Builder-style insert, handy for literals
    pub fn with(mut self, name: impl Into<String>, entry: Entry) -> Self {
        self.insert(name, entry);
        self
    }
}

impl FromIterator<(String, Entry)> for EntryCollection {
    fn from_iter<T: IntoIterator<Item = (String, Entry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for EntryCollection {
    type Item = (String, Entry);
    type IntoIter = std::collections::btree_map::IntoIter<String, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a EntryCollection {
    type Item = (&'a String, &'a Entry);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_equality_is_order_sensitive() {
        let a = Entry::new("npx", ["-y", "server"]);
        let b = Entry::new("npx", ["server", "-y"]);

        assert_ne!(a, b);
        assert!(a.same_invocation(&b));
    }

    #[test]
    fn test_same_invocation_ignores_cwd_but_not_env() {
        let base = Entry::new("uvx", ["mcp-server-git"]);

        assert!(base.same_invocation(&base.clone().with_cwd("/tmp")));
        assert!(!base.same_invocation(&base.clone().with_env("TOKEN", "x")));
        assert!(!base.same_invocation(&Entry::new("uv", ["mcp-server-git"])));
    }

    #[test]
    fn test_deserialize_lenient_fields() {
        let value = json!({
            "command": "node",
            "args": ["server.js", 8080],
            "env": {"PORT": 8080, "DEBUG": true, "NAME": "x"},
            "disabled": false
        });

        let entry: Entry = serde_json::from_value(value).unwrap();
        assert_eq!(entry.command, "node");
        assert_eq!(entry.args, vec!["server.js", "8080"]);
        assert_eq!(entry.env["PORT"], "8080");
        assert_eq!(entry.env["DEBUG"], "true");
        assert_eq!(entry.cwd, None);
        assert_eq!(entry.extra["disabled"], json!(false));
    }

    #[test]
    fn test_extra_keys_are_written_back_but_ignored_for_equality() {
        let value = json!({
            "command": "npx",
            "args": ["srv"],
            "disabled": true,
            "autoApprove": ["read"]
        });
        let entry: Entry = serde_json::from_value(value.clone()).unwrap();

        assert_eq!(serde_json::to_value(&entry).unwrap(), value);
        assert_eq!(entry, Entry::new("npx", ["srv"]));
        assert!(entry.same_invocation(&Entry::new("npx", ["srv"])));
    }

    #[test]
    fn test_url_server_keeps_its_shape() {
        let value = json!({"url": "https://mcp.example.com/sse", "headers": {"X-Key": "k"}});
        let entry: Entry = serde_json::from_value(value.clone()).unwrap();

        assert!(!entry.is_launchable());
        assert_eq!(serde_json::to_value(&entry).unwrap(), value);

        let moved: Entry =
            serde_json::from_value(json!({"url": "https://other.example.com/sse"})).unwrap();
        assert_ne!(entry, moved);
        assert_eq!(entry, entry.clone());
        assert!(!entry.same_invocation(&entry.clone()));
    }

    #[test]
    fn test_deserialize_missing_fields_default() {
        let entry: Entry = serde_json::from_value(json!({"url": "https://x"})).unwrap();
        assert!(entry.command.is_empty());
        assert!(entry.args.is_empty() && entry.env.is_empty());
        assert_eq!(entry.cwd, None);

        let entry: Entry = serde_json::from_value(json!({"command": "x", "env": null})).unwrap();
        assert!(entry.env.is_empty());
    }

    #[test]
    fn test_serialize_omits_empty_optionals() {
        let value = serde_json::to_value(Entry::new("x", ["1"])).unwrap();
        assert_eq!(value, json!({"command": "x", "args": ["1"]}));
    }

    #[test]
    fn test_collection_is_name_ordered() {
        let collection = EntryCollection::new()
            .with("zeta", Entry::new("z", Vec::<String>::new()))
            .with("alpha", Entry::new("a", Vec::<String>::new()));

        let names: Vec<&String> = collection.names().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(
            Entry::new("npx", ["-y", "srv"]).command_line(),
            "npx -y srv"
        );
    }
}
