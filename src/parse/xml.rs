// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! A small owned element tree for the CLI's `--xml` output.
//!
//! The CLI wraps every response in `<cliOutput>` with `opRet`, `opErrno` and `opErrstr`
//! children. [`cli_output`] checks those and hands back the element tree for the surface-specific
//! converters.

use std::collections::BTreeMap;
use std::fmt::Write;

use super::ParseError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Text directly inside this element, trimmed. Empty for elements with no text.
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn parse(document: &str) -> Result<Self, ParseError> {
        let doc = roxmltree::Document::parse(document)
            .map_err(|e| ParseError::new(format!("invalid XML: {e}")))?;
        Ok(Self::from_node(doc.root_element()))
    }

    fn from_node(node: roxmltree::Node) -> Self {
        let mut text = String::new();
        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() {
                children.push(Self::from_node(child));
            } else if child.is_text() {
                text.push_str(child.text().unwrap_or(""));
            }
        }
        XmlElement {
            name: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            text: text.trim().to_string(),
            children,
        }
    }

    /// The first child element named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Every child element named `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a `/`-separated path of child names.
    pub fn path(&self, path: &str) -> Option<&XmlElement> {
        path.split('/')
            .try_fold(self, |element, name| element.child(name))
    }

    /// The text of child `name`, if the child exists.
    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// The text of child `name`, or an error naming the element it was expected in.
    pub fn require_text(&self, name: &str) -> Result<&str, ParseError> {
        self.text_of(name)
            .ok_or_else(|| ParseError::new(format!("<{}> has no <{name}>", self.name)))
    }

    /// The text of child `name` parsed as an integer. The CLI reports unavailable numbers as
    /// `N/A`; those come back as `None`.
    pub fn int_of(&self, name: &str) -> Result<Option<i64>, ParseError> {
        match self.text_of(name) {
            None | Some("") | Some("N/A") => Ok(None),
            Some(text) => text.parse::<i64>().map(Some).map_err(|e| {
                ParseError::new(format!("<{name}> in <{}> is not a number: {e}", self.name))
            }),
        }
    }

    /// The text of every leaf child, keyed by element name. When a name repeats, the last one wins.
    pub fn leaf_map(&self) -> BTreeMap<String, String> {
        self.children
            .iter()
            .filter(|c| c.children.is_empty())
            .map(|c| (c.name.clone(), c.text.clone()))
            .collect()
    }

    /// Emit the element in canonical form: attributes sorted, no insignificant whitespace, text
    /// escaped. Parsing the canonical form yields an equal tree.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        let _ = write!(out, "<{}", self.name);
        for (k, v) in &self.attributes {
            let _ = write!(out, " {k}=\"{}\"", escape(v));
        }
        if self.text.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape(&self.text));
        for child in &self.children {
            child.write_canonical(out);
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Parse a `<cliOutput>` document and check that the operation succeeded.
pub fn cli_output(document: &str) -> Result<XmlElement, ParseError> {
    let root = XmlElement::parse(document)?;
    if root.name != "cliOutput" {
        return Err(ParseError::new(format!(
            "expected <cliOutput>, found <{}>",
            root.name
        )));
    }
    match root.int_of("opRet")? {
        Some(0) | None => Ok(root),
        Some(ret) => Err(ParseError::new(format!(
            "operation failed: opRet={ret} opErrno={} {}",
            root.text_of("opErrno").unwrap_or("?"),
            root.text_of("opErrstr").unwrap_or("")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cliOutput>
  <opRet>0</opRet>
  <opErrno>0</opErrno>
  <opErrstr/>
  <volInfo>
    <volumes>
      <volume>
        <name>testvol</name>
        <bricks>
          <brick uuid="b1">server1:/bricks/b0<name>server1:/bricks/b0</name></brick>
        </bricks>
      </volume>
      <count>1</count>
    </volumes>
  </volInfo>
</cliOutput>"#;

    #[test]
    fn navigate_tree() {
        let root = cli_output(DOC).unwrap();
        let volume = root.path("volInfo/volumes/volume").unwrap();
        assert_eq!(volume.text_of("name"), Some("testvol"));
        let brick = volume.path("bricks/brick").unwrap();
        assert_eq!(brick.attributes["uuid"], "b1");
        assert_eq!(brick.text, "server1:/bricks/b0");
        assert_eq!(root.path("volInfo/volumes").unwrap().int_of("count").unwrap(), Some(1));
    }

    #[test]
    fn canonical_form_round_trips() {
        let tree = XmlElement::parse(DOC).unwrap();
        let canonical = tree.to_canonical_string();
        let reparsed = XmlElement::parse(&canonical).unwrap();
        assert_eq!(tree, reparsed);
        assert_eq!(canonical, reparsed.to_canonical_string());
    }

    #[test]
    fn escapes_text() {
        let tree = XmlElement::parse("<a x=\"1&amp;2\">$p3C!@l &lt;C#&gt;</a>").unwrap();
        let again = XmlElement::parse(&tree.to_canonical_string()).unwrap();
        assert_eq!(again.text, "$p3C!@l <C#>");
        assert_eq!(again.attributes["x"], "1&2");
    }

    #[test]
    fn failed_operations_are_errors() {
        let doc = "<cliOutput><opRet>-1</opRet><opErrno>2</opErrno><opErrstr>Volume nope does not exist</opErrstr></cliOutput>";
        let err = cli_output(doc).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(cli_output("<other/>").is_err());
        assert!(cli_output("not xml").is_err());
    }
}
