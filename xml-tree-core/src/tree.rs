use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// A mutable XML element.
///
/// Configuration documents are kept as plain element trees so that sections the
/// caller does not understand survive a load/modify/save cycle untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    /// Element tag name.
    pub tag: String,
    /// XML attributes keyed by name.
    pub attributes: BTreeMap<String, String>,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
    /// Optional text content.
    pub text: Option<String>,
}

impl XmlNode {
    /// Create an element with no attributes, children, or text.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Create a leaf element carrying `text`.
    pub fn with_text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        let mut node = Self::new(tag);
        node.text = Some(text.into());
        node
    }

    /// Return the first child with the provided tag.
    pub fn get_child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// Mutable variant of [`XmlNode::get_child`].
    pub fn get_child_mut(&mut self, tag: &str) -> Option<&mut XmlNode> {
        self.children.iter_mut().find(|child| child.tag == tag)
    }

    /// Return all children with the provided tag.
    pub fn get_children(&self, tag: &str) -> Vec<&XmlNode> {
        self.children
            .iter()
            .filter(|child| child.tag == tag)
            .collect()
    }

    /// Return the first child with `tag`, appending an empty one when absent.
    pub fn get_or_create_child(&mut self, tag: &str) -> &mut XmlNode {
        let idx = match self.children.iter().position(|c| c.tag == tag) {
            Some(idx) => idx,
            None => {
                self.children.push(XmlNode::new(tag));
                self.children.len() - 1
            }
        };
        &mut self.children[idx]
    }

    /// Walk a nested child path and return terminal node text if found.
    pub fn get_text<'a>(&'a self, path: &[&str]) -> Option<&'a str> {
        if path.is_empty() {
            return self.text.as_deref();
        }

        let mut current = self;
        for segment in path {
            current = current.get_child(segment)?;
        }
        current.text.as_deref()
    }

    /// Trimmed, non-empty text of a direct child.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.get_child(tag)
            .and_then(|c| c.text.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Set the text of the first `tag` child, appending the child when absent.
    ///
    /// Existing attributes and children of the target element are kept.
    pub fn set_child_text(&mut self, tag: &str, value: impl Into<String>) {
        self.get_or_create_child(tag).text = Some(value.into());
    }

    /// Detach every direct child with `tag`. Returns how many were removed.
    pub fn remove_children(&mut self, tag: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|c| c.tag != tag);
        before - self.children.len()
    }

    /// Detach and return the child at `idx`.
    pub fn remove_child_at(&mut self, idx: usize) -> Option<XmlNode> {
        (idx < self.children.len()).then(|| self.children.remove(idx))
    }

    /// Index of the first child matching `pred`.
    pub fn position<F>(&self, pred: F) -> Option<usize>
    where
        F: Fn(&XmlNode) -> bool,
    {
        self.children.iter().position(pred)
    }

    /// True when the element has neither children nor non-blank text.
    pub fn is_blank(&self) -> bool {
        self.children.is_empty() && self.text.as_deref().map_or(true, |t| t.trim().is_empty())
    }
}

impl Display for XmlNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (key, value) in &self.attributes {
            write!(f, " {}=\"{}\"", key, value)?;
        }

        if self.children.is_empty() && self.text.is_none() {
            return write!(f, "/>");
        }

        write!(f, ">")?;
        if let Some(text) = &self.text {
            write!(f, "{}", text)?;
        }
        for child in &self.children {
            write!(f, "{}", child)?;
        }
        write!(f, "</{}>", self.tag)
    }
}
