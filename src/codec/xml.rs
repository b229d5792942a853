//! JetBrains XML entry files
//!
//! ```xml
//! <application>
//!   <component name="LLMMcpServers">
//!     <servers>
//!       <server name="git" command="uvx" args="mcp-server-git">
//!         <env key="GIT_DIR" value="/repo"/>
//!       </server>
//!     </servers>
//!   </component>
//! </application>
//! ```

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::collections::BTreeMap;

use super::EntryCodec;
use crate::entry::{Entry, EntryCollection};

const COMPONENT_NAME: &str = "LLMMcpServers";

/// One `server` element per entry; arguments are space-joined, so an
/// argument containing whitespace does not survive a round trip.
#[derive(Debug, Clone, Copy)]
pub struct XmlCodec;

impl EntryCodec for XmlCodec {
    fn decode(&self, content: &str) -> Result<EntryCollection> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut entries: BTreeMap<String, Entry> = BTreeMap::new();
        let mut current: Option<String> = None;
        let mut saw_element = false;

        loop {
            let event = reader
                .read_event()
                .context("Failed to parse entry file as XML")?;
            // An empty element has no children to attach
            let has_children = matches!(event, Event::Start(_));

            match event {
                Event::Start(element) | Event::Empty(element)
                    if element.name().as_ref() == b"server" =>
                {
                    saw_element = true;
                    let mut attrs = attributes(&element)?;
                    let Some(name) = attrs.remove("name") else {
                        tracing::warn!("Skipping XML server element without a name");
                        continue;
                    };

                    let entry = Entry {
                        command: attrs.remove("command").unwrap_or_default(),
                        args: attrs
                            .remove("args")
                            .map(|args| args.split_whitespace().map(str::to_string).collect())
                            .unwrap_or_default(),
                        cwd: attrs.remove("cwd").filter(|cwd| !cwd.is_empty()),
                        ..Default::default()
                    };
                    entries.insert(name.clone(), entry);

                    if has_children {
                        current = Some(name);
                    }
                }
                Event::Start(element) | Event::Empty(element)
                    if element.name().as_ref() == b"env" =>
                {
                    saw_element = true;
                    let Some(entry) = current.as_ref().and_then(|name| entries.get_mut(name))
                    else {
                        continue;
                    };
                    let mut attrs = attributes(&element)?;
                    if let Some(key) = attrs.remove("key") {
                        entry
                            .env
                            .insert(key, attrs.remove("value").unwrap_or_default());
                    }
                }
                Event::Start(_) | Event::Empty(_) => saw_element = true,
                Event::End(element) if element.name().as_ref() == b"server" => current = None,
                Event::Eof => break,
                _ => {}
            }
        }

        anyhow::ensure!(saw_element, "XML entry file has no root element");
        Ok(entries.into_iter().collect())
    }

    fn encode(&self, _existing: Option<&str>, entries: &EntryCollection) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("application")))?;

        let mut component = BytesStart::new("component");
        component.push_attribute(("name", COMPONENT_NAME));
        writer.write_event(Event::Start(component))?;
        writer.write_event(Event::Start(BytesStart::new("servers")))?;

        for (name, entry) in entries {
            let args = entry.args.join(" ");
            let mut server = BytesStart::new("server");
            server.push_attribute(("name", name.as_str()));
            server.push_attribute(("command", entry.command.as_str()));
            server.push_attribute(("args", args.as_str()));
            if let Some(cwd) = &entry.cwd {
                server.push_attribute(("cwd", cwd.as_str()));
            }

            if entry.env.is_empty() {
                writer.write_event(Event::Empty(server))?;
                continue;
            }

            writer.write_event(Event::Start(server))?;
            for (key, value) in &entry.env {
                let mut env = BytesStart::new("env");
                env.push_attribute(("key", key.as_str()));
                env.push_attribute(("value", value.as_str()));
                writer.write_event(Event::Empty(env))?;
            }
            writer.write_event(Event::End(BytesEnd::new("server")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("servers")))?;
        writer.write_event(Event::End(BytesEnd::new("component")))?;
        writer.write_event(Event::End(BytesEnd::new("application")))?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).context("XML writer produced invalid UTF-8")
    }
}

/// Unescaped attributes of an element
fn attributes(element: &BytesStart<'_>) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for attr in element.attributes() {
        let attr = attr.context("Malformed XML attribute")?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .context("Malformed XML attribute value")?
            .into_owned();
        out.insert(key, value);
    }
    Ok(out)
}
