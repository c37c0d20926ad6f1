// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming CityGML reader.
//!
//! The document is pulled one `bldg:Building` subtree at a time; ownership
//! of each subtree passes to the caller and is dropped right after
//! processing, which bounds memory on large city models.
//!
//! Paths into a subtree use local names with optional prefixes (prefixes
//! are ignored when matching), `/` for child steps, `//` for
//! descendant-at-any-depth steps and `[@name='value']` attribute
//! predicates, e.g. `gen:stringAttribute[@name='EGID']/gen:value`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::GenerationError;

/// One decoded XML element subtree.
#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    /// Local element name, without namespace prefix.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First node matched by `path`.
    pub fn find(&self, path: &str) -> Option<&XmlNode> {
        self.find_all(path).into_iter().next()
    }

    /// Trimmed text of the first node matched by `path`.
    pub fn find_text(&self, path: &str) -> Option<String> {
        self.find(path).map(|node| node.text.trim().to_string())
    }

    /// All nodes matched by `path`, in document order.
    pub fn find_all(&self, path: &str) -> Vec<&XmlNode> {
        let steps = parse_path(path);
        let mut out = Vec::new();
        if !steps.is_empty() {
            collect(self, &steps, &mut out);
        }
        out
    }

    fn matches(&self, step: &Step) -> bool {
        if local_name(&self.name) != step.name {
            return false;
        }
        match &step.predicate {
            Some((attr, value)) => self.attribute(attr) == Some(value.as_str()),
            None => true,
        }
    }
}

#[derive(Debug)]
struct Step {
    name: String,
    predicate: Option<(String, String)>,
    /// Matched at any depth instead of as a direct child.
    descendant: bool,
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn parse_path(path: &str) -> Vec<Step> {
    let mut steps = Vec::new();
    let mut descendant = false;
    for segment in path.split('/') {
        if segment.is_empty() {
            // the empty segment of "a//b" marks b as a descendant step
            descendant = true;
            continue;
        }
        let (name, predicate) = match segment.split_once("[@") {
            Some((name, rest)) => {
                let predicate = rest
                    .strip_suffix(']')
                    .and_then(|p| p.split_once('='))
                    .map(|(attr, value)| {
                        (
                            attr.to_string(),
                            value.trim_matches('\'').trim_matches('"').to_string(),
                        )
                    });
                (name, predicate)
            }
            None => (segment, None),
        };
        steps.push(Step {
            name: local_name(name).to_string(),
            predicate,
            descendant,
        });
        descendant = false;
    }
    steps
}

fn collect<'a>(node: &'a XmlNode, steps: &[Step], out: &mut Vec<&'a XmlNode>) {
    let Some(step) = steps.first() else {
        return;
    };
    for child in &node.children {
        if child.matches(step) {
            if steps.len() == 1 {
                out.push(child);
            } else {
                collect(child, &steps[1..], out);
            }
        }
        if step.descendant {
            collect_descendant(child, steps, out);
        }
    }
}

fn collect_descendant<'a>(node: &'a XmlNode, steps: &[Step], out: &mut Vec<&'a XmlNode>) {
    let step = &steps[0];
    for child in &node.children {
        if child.matches(step) {
            if steps.len() == 1 {
                out.push(child);
            } else {
                collect(child, &steps[1..], out);
            }
        }
        collect_descendant(child, steps, out);
    }
}

/// Pull-parser over the `bldg:Building` elements of a CityGML document.
pub struct CityGmlStream {
    reader: Reader<BufReader<File>>,
    buf: Vec<u8>,
}

impl CityGmlStream {
    pub fn open(path: &Path) -> Result<Self, GenerationError> {
        let file = File::open(path)?;
        let reader = Reader::from_reader(BufReader::new(file));
        Ok(Self {
            reader,
            buf: Vec::with_capacity(8 * 1024),
        })
    }

    /// The next building subtree, or `None` at the end of the document.
    pub fn next_building(&mut self) -> Result<Option<XmlNode>, GenerationError> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(start)) => {
                    if local_name(&qname_to_string(&start)) == "Building" {
                        let root = start.into_owned();
                        let node = self.read_subtree(root)?;
                        return Ok(Some(node));
                    }
                }
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => {}
                Err(e) => {
                    return Err(GenerationError::Data(format!("CityGML parse error: {e}")))
                }
            }
        }
    }

    /// Read everything up to the matching end tag into one owned subtree.
    fn read_subtree(&mut self, root: BytesStart<'static>) -> Result<XmlNode, GenerationError> {
        let mut stack = vec![node_from_start(&root)];
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(start)) => {
                    stack.push(node_from_start(&start));
                }
                Ok(Event::Empty(start)) => {
                    let node = node_from_start(&start);
                    stack
                        .last_mut()
                        .expect("subtree stack is never empty")
                        .children
                        .push(node);
                }
                Ok(Event::Text(text)) => {
                    if let Ok(value) = text.unescape() {
                        let top = stack.last_mut().expect("subtree stack is never empty");
                        if !top.text.is_empty() {
                            top.text.push(' ');
                        }
                        top.text.push_str(value.trim());
                    }
                }
                Ok(Event::End(_)) => {
                    let node = stack.pop().expect("subtree stack is never empty");
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Ok(node),
                    }
                }
                Ok(Event::Eof) => {
                    return Err(GenerationError::Data(
                        "CityGML document ended inside a building element".into(),
                    ))
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(GenerationError::Data(format!("CityGML parse error: {e}")))
                }
            }
        }
    }
}

fn qname_to_string(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn node_from_start(start: &BytesStart<'_>) -> XmlNode {
    let attributes = start
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_default();
            (local_name(&key).to_string(), value)
        })
        .collect();
    XmlNode {
        name: local_name(&qname_to_string(start)).to_string(),
        attributes,
        text: String::new(),
        children: Vec::new(),
    }
}
