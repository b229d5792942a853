//! YAML master document
//!
//! The master document holds the superset of all entries plus any other
//! settings the user keeps alongside them. `${VAR}` placeholders anywhere in
//! the document are expanded from the environment when it is loaded. On
//! save, entries that still equal their loaded form are written back with
//! their placeholders, so secrets never land in the file.

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};

use super::EntryCodec;
use crate::entry::{Entry, EntryCollection};
use crate::templating::{self, Lookup};

#[derive(Debug, Clone)]
pub struct YamlCodec {
    servers_key: &'static str,
    lookup: Lookup,
}

impl YamlCodec {
    /// Codec expanding placeholders from the process environment
    pub fn new(servers_key: &'static str) -> Self {
        Self::with_lookup(servers_key, templating::process_env)
    }

    pub fn with_lookup(servers_key: &'static str, lookup: Lookup) -> Self {
        Self { servers_key, lookup }
    }
}

impl YamlCodec {
    fn entries_in(&self, document: Value) -> Result<EntryCollection> {
        let doc = match document {
            Value::Null => return Ok(EntryCollection::new()),
            Value::Mapping(doc) => doc,
            _ => anyhow::bail!("Master document is not a YAML mapping"),
        };

        let servers = match doc.get(self.servers_key) {
            None | Some(Value::Null) => return Ok(EntryCollection::new()),
            Some(Value::Mapping(servers)) => servers,
            Some(_) => anyhow::bail!("`{}` is not a YAML mapping", self.servers_key),
        };

        servers
            .iter()
            .map(|(name, value)| {
                let name = name
                    .as_str()
                    .context("Entry names must be strings")?
                    .to_string();
                let entry: Entry = serde_yaml::from_value(value.clone())
                    .with_context(|| format!("Invalid entry `{name}`"))?;
                Ok((name, entry))
            })
            .collect()
    }

    /// Swap entries unchanged since `existing` was loaded for their unexpanded form
    fn restore_placeholders(
        &self,
        existing: &Mapping,
        entries: &EntryCollection,
    ) -> EntryCollection {
        let raw_doc = Value::Mapping(existing.clone());
        let expanded = self.entries_in(templating::expand_yaml(raw_doc.clone(), self.lookup));
        let (Ok(raw), Ok(expanded)) = (self.entries_in(raw_doc), expanded) else {
            return entries.clone();
        };

        entries
            .iter()
            .map(|(name, entry)| {
                let unchanged = expanded
                    .get(name)
                    .is_some_and(|loaded| loaded == entry && loaded.extra == entry.extra);
                let entry = match raw.get(name) {
                    Some(original) if unchanged => original.clone(),
                    _ => entry.clone(),
                };
                (name.clone(), entry)
            })
            .collect()
    }
}

impl EntryCodec for YamlCodec {
    fn decode(&self, content: &str) -> Result<EntryCollection> {
        let parsed: Value =
            serde_yaml::from_str(content).context("Failed to parse entry file as YAML")?;
        self.entries_in(templating::expand_yaml(parsed, self.lookup))
    }

    fn encode(&self, existing: Option<&str>, entries: &EntryCollection) -> Result<String> {
        let mut doc = match existing.map(serde_yaml::from_str::<Value>) {
            Some(Ok(Value::Mapping(doc))) => doc,
            Some(Ok(Value::Null)) | None => Mapping::new(),
            Some(_) => {
                tracing::warn!("Existing master document is not a YAML mapping, starting a fresh document");
                Mapping::new()
            }
        };

        let entries = self.restore_placeholders(&doc, entries);
        let servers = serde_yaml::to_value(&entries).context("Failed to serialize entries")?;
        doc.insert(Value::String(self.servers_key.to_string()), servers);

        serde_yaml::to_string(&Value::Mapping(doc)).context("Failed to serialize master document")
    }
}
