//! Generic JSON entry files: `{ "mcpServers": { "<name>": { ... } } }`

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use super::EntryCodec;
use crate::entry::{Entry, EntryCollection};

/// JSON document with entries under one top-level key.
///
/// Every other top-level key is preserved verbatim, in its original
/// position; entries are written in name order.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    servers_key: &'static str,
}

impl JsonCodec {
    pub fn new(servers_key: &'static str) -> Self {
        Self { servers_key }
    }
}

impl EntryCodec for JsonCodec {
    fn decode(&self, content: &str) -> Result<EntryCollection> {
        let parsed: Value =
            serde_json::from_str(content).context("Failed to parse entry file as JSON")?;
        let doc = parsed
            .as_object()
            .context("Entry file is not a JSON object")?;

        let servers = match doc.get(self.servers_key) {
            None | Some(Value::Null) => return Ok(EntryCollection::new()),
            Some(Value::Object(servers)) => servers,
            Some(_) => anyhow::bail!("`{}` is not a JSON object", self.servers_key),
        };

        servers
            .iter()
            .map(|(name, value)| {
                let entry: Entry = serde_json::from_value(value.clone())
                    .with_context(|| format!("Invalid entry `{name}`"))?;
                Ok((name.clone(), entry))
            })
            .collect()
    }

    fn encode(&self, existing: Option<&str>, entries: &EntryCollection) -> Result<String> {
        let mut doc = match existing.map(serde_json::from_str::<Value>) {
            Some(Ok(Value::Object(doc))) => doc,
            Some(_) => {
                tracing::warn!("Existing entry file is not a JSON object, starting a fresh document");
                Map::new()
            }
            None => Map::new(),
        };

        // EntryCollection iterates in name order, so the map is sorted
        let servers: Map<String, Value> = entries
            .iter()
            .map(|(name, entry)| Ok((name.clone(), serde_json::to_value(entry)?)))
            .collect::<Result<_, serde_json::Error>>()
            .context("Failed to serialize entries")?;

        doc.insert(self.servers_key.to_string(), Value::Object(servers));

        serde_json::to_string_pretty(&Value::Object(doc)).context("Failed to serialize entry file")
    }
}
