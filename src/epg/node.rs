//! Owned XML element tree
//!
//! Parsed guides are turned into these nodes so the merged output owns its
//! data outright and never borrows from a source document's buffer.

/// One piece of an element's content
#[derive(Debug, Clone, PartialEq)]
pub enum XmlContent {
    Element(XmlNode),
    /// Character data exactly as it appeared, entities resolved
    Text(String),
}

/// A single element with its attributes and content, both in document order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub content: Vec<XmlContent>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.push_text(text);
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.content.push(XmlContent::Element(child));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace an existing attribute in place, or append it
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Child elements, skipping character data
    pub fn elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.content.iter().filter_map(|item| match item {
            XmlContent::Element(node) => Some(node),
            XmlContent::Text(_) => None,
        })
    }

    pub fn into_elements(self) -> impl Iterator<Item = XmlNode> {
        self.content.into_iter().filter_map(|item| match item {
            XmlContent::Element(node) => Some(node),
            XmlContent::Text(_) => None,
        })
    }

    /// First child element with the given name
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.elements().find(|node| node.name == name)
    }

    /// Direct character data, concatenated and untrimmed
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                XmlContent::Text(text) => Some(text.as_str()),
                XmlContent::Element(_) => None,
            })
            .collect()
    }

    pub fn has_text(&self) -> bool {
        self.content.iter().any(|item| matches!(item, XmlContent::Text(_)))
    }

    /// Append character data, joining it onto a directly preceding text run
    pub(crate) fn push_text(&mut self, text: &str) {
        match self.content.last_mut() {
            Some(XmlContent::Text(existing)) => existing.push_str(text),
            _ => self.content.push(XmlContent::Text(text.to_string())),
        }
    }

    /// Drop whitespace-only text from element-only content
    pub(crate) fn strip_layout_whitespace(&mut self) {
        let element_only = self.elements().next().is_some()
            && self.content.iter().all(|item| match item {
                XmlContent::Text(text) => text.trim().is_empty(),
                XmlContent::Element(_) => true,
            });
        if element_only {
            self.content.retain(|item| matches!(item, XmlContent::Element(_)));
        }
    }
}
