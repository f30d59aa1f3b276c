use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use log::debug;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::fs;
use std::path::{Path, PathBuf};

use crate::class_list::ClassList;

/// Identifier of an element inside a [`Document`]. Ids are assigned in
/// document order, so comparing two ids compares their position in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
enum Content {
    Text(String),
    Element(NodeId),
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    content: Vec<Content>,
    id: Option<String>,
    classes: ClassList,
}

/// A part of the document a reader can be pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub node: NodeId,
    pub title: String,
}

const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "template", "noscript"];

const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "dd",
    "details",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "table",
    "tr",
    "ul",
];

/// Element tree lowered from an html5ever DOM.
///
/// Only elements get ids; text lives inside its parent's content list. The
/// class list of each element is mutable so narration can mark the element
/// being read.
#[derive(Debug, Clone, Default)]
pub struct Document {
    elements: Vec<Element>,
    root: Option<NodeId>,
    lang: Option<String>,
    scroll_target: Option<NodeId>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), Default::default()).one(html);

        let mut document = Document::default();
        document.lower(&dom.document, None);
        document.lang = document.lang.take().filter(|lang| !lang.is_empty());
        debug!(
            "Parsed document with {} elements (lang: {:?})",
            document.elements.len(),
            document.lang
        );
        document
    }

    pub fn from_file(path: &Path) -> Result<Self, DocumentError> {
        let html = fs::read_to_string(path).map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&html))
    }

    fn lower(&mut self, handle: &Handle, parent: Option<NodeId>) {
        match &handle.data {
            NodeData::Element { name, attrs, .. } => {
                let id = NodeId(self.elements.len());
                let mut element = Element {
                    tag: name.local.as_ref().to_ascii_lowercase(),
                    parent,
                    children: Vec::new(),
                    content: Vec::new(),
                    id: None,
                    classes: ClassList::new(),
                };
                for attr in attrs.borrow().iter() {
                    match attr.name.local.as_ref() {
                        "class" => element.classes = ClassList::parse(&attr.value),
                        "id" => element.id = Some(attr.value.to_string()),
                        _ => {}
                    }
                }
                self.elements.push(element);

                match parent {
                    Some(parent) => {
                        let parent = &mut self.elements[parent.0];
                        parent.children.push(id);
                        parent.content.push(Content::Element(id));
                    }
                    None => {
                        if self.root.is_none() {
                            self.root = Some(id);
                        }
                    }
                }

                if self.elements[id.0].tag == "html" {
                    self.store_lang(attrs);
                }

                for child in handle.children.borrow().iter() {
                    self.lower(child, Some(id));
                }
            }
            NodeData::Text { contents } => {
                if let Some(parent) = parent {
                    let text = contents.borrow().to_string();
                    self.elements[parent.0].content.push(Content::Text(text));
                }
            }
            NodeData::Document => {
                for child in handle.children.borrow().iter() {
                    self.lower(child, parent);
                }
            }
            _ => {}
        }
    }

    fn store_lang(&mut self, attrs: &std::cell::RefCell<Vec<html5ever::Attribute>>) {
        if let Some(attr) = attrs
            .borrow()
            .iter()
            .find(|attr| attr.name.local.as_ref() == "lang")
        {
            self.lang = Some(attr.value.to_string());
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Value of `<html lang>`, if present and non-empty.
    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn tag(&self, node: NodeId) -> &str {
        &self.elements[node.0].tag
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.elements[node.0].parent
    }

    /// Direct child elements in document order.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.elements[node.0].children
    }

    /// Every element below `container`, in document order, excluding the
    /// container itself.
    pub fn descendants(&self, container: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(container).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements
            .iter()
            .position(|element| element.id.as_deref() == Some(id))
            .map(NodeId)
    }

    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, element)| element.tag == tag)
            .map(|(index, _)| NodeId(index))
            .collect()
    }

    pub fn class_list(&self, node: NodeId) -> &ClassList {
        &self.elements[node.0].classes
    }

    pub fn class_list_mut(&mut self, node: NodeId) -> &mut ClassList {
        &mut self.elements[node.0].classes
    }

    /// Every element in the document carrying `token` in its class list.
    pub fn elements_with_class(&self, token: &str) -> Vec<NodeId> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, element)| element.classes.contains(token))
            .map(|(index, _)| NodeId(index))
            .collect()
    }

    pub fn scroll_into_view(&mut self, node: NodeId) {
        self.scroll_target = Some(node);
    }

    /// Element most recently scrolled into view.
    pub fn scroll_target(&self) -> Option<NodeId> {
        self.scroll_target
    }

    /// Text of the element as a reader would see it: whitespace collapsed,
    /// block boundaries as line breaks, hidden content dropped.
    pub fn rendered_text(&self, node: NodeId) -> String {
        let mut builder = TextBuilder::default();
        self.collect_text(node, &mut builder);
        builder.finish()
    }

    fn collect_text(&self, node: NodeId, builder: &mut TextBuilder) {
        let element = &self.elements[node.0];
        if SKIPPED_TAGS.contains(&element.tag.as_str()) {
            return;
        }
        if element.tag == "br" {
            builder.line_break();
            return;
        }

        let block = BLOCK_TAGS.contains(&element.tag.as_str());
        if block {
            builder.line_break();
        }
        for content in &element.content {
            match content {
                Content::Text(text) => builder.push_text(text),
                Content::Element(child) => self.collect_text(*child, builder),
            }
        }
        if block {
            builder.line_break();
        }
    }

    /// Sections a reader can narrate, each titled by its first heading.
    ///
    /// Prefers `section` children of `main`, then top-level `section`
    /// elements anywhere, then the whole `body`.
    pub fn sections(&self) -> Vec<Section> {
        let mut nodes: Vec<NodeId> = self
            .elements_by_tag("main")
            .into_iter()
            .flat_map(|main| {
                self.children(main)
                    .iter()
                    .copied()
                    .filter(|child| self.tag(*child) == "section")
                    .collect::<Vec<_>>()
            })
            .collect();

        if nodes.is_empty() {
            nodes = self
                .elements_by_tag("section")
                .into_iter()
                .filter(|section| !self.has_ancestor_tag(*section, "section"))
                .collect();
        }

        if nodes.is_empty() {
            nodes = self.elements_by_tag("body");
        }

        nodes
            .into_iter()
            .enumerate()
            .map(|(index, node)| Section {
                node,
                title: self.section_title(node, index),
            })
            .collect()
    }

    fn section_title(&self, node: NodeId, index: usize) -> String {
        self.descendants(node)
            .into_iter()
            .find(|descendant| {
                matches!(
                    self.tag(*descendant),
                    "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
                )
            })
            .map(|heading| self.rendered_text(heading).replace('\n', " "))
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| format!("Chapter {}", index + 1))
    }

    fn has_ancestor_tag(&self, node: NodeId, tag: &str) -> bool {
        let mut current = self.parent(node);
        while let Some(ancestor) = current {
            if self.tag(ancestor) == tag {
                return true;
            }
            current = self.parent(ancestor);
        }
        false
    }
}

#[derive(Default)]
struct TextBuilder {
    buffer: String,
    pending_space: bool,
    pending_break: bool,
}

impl TextBuilder {
    fn push_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                self.pending_space = true;
                continue;
            }
            if !self.buffer.is_empty() {
                if self.pending_break {
                    self.buffer.push('\n');
                } else if self.pending_space {
                    self.buffer.push(' ');
                }
            }
            self.pending_space = false;
            self.pending_break = false;
            self.buffer.push(ch);
        }
    }

    fn line_break(&mut self) {
        self.pending_break = true;
    }

    fn finish(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(doc: &Document, id: &str) -> NodeId {
        doc.element_by_id(id).unwrap()
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = Document::parse(
            r#"<div id="c"><p id="a">One <b id="b">two</b></p><p id="d">three</p></div>"#,
        );
        let container = find(&doc, "c");
        let tags: Vec<&str> = doc
            .descendants(container)
            .into_iter()
            .map(|node| doc.tag(node))
            .collect();
        assert_eq!(tags, vec!["p", "b", "p"]);
    }

    #[test]
    fn test_rendered_text_collapses_whitespace() {
        let doc = Document::parse("<p id=\"p\">  Hello\n\n   <em>brave</em>   world  </p>");
        assert_eq!(doc.rendered_text(find(&doc, "p")), "Hello brave world");
    }

    #[test]
    fn test_rendered_text_breaks_between_blocks() {
        let doc = Document::parse(
            r#"<div id="d"><p>First</p><p>Second<br>line</p><script>var x;</script></div>"#,
        );
        assert_eq!(doc.rendered_text(find(&doc, "d")), "First\nSecond\nline");
    }

    #[test]
    fn test_rendered_text_of_empty_element() {
        let doc = Document::parse(r#"<div id="d">   <span></span> </div>"#);
        assert_eq!(doc.rendered_text(find(&doc, "d")), "");
    }

    #[test]
    fn test_lang_from_html_element() {
        let doc = Document::parse(r#"<html lang="de"><body><p>Hallo</p></body></html>"#);
        assert_eq!(doc.lang(), Some("de"));

        let doc = Document::parse("<p>Hello</p>");
        assert_eq!(doc.lang(), None);
    }

    #[test]
    fn test_class_attribute_is_tokenized() {
        let doc = Document::parse(r#"<p id="p" class="note  lead">x</p>"#);
        let classes = doc.class_list(find(&doc, "p"));
        assert!(classes.contains("note"));
        assert!(classes.contains("lead"));
        assert_eq!(classes.len(), 2);
    }

    #[test]
    fn test_elements_with_class() {
        let mut doc = Document::parse(
            r#"<p id="a" class="hl">a</p><p id="b">b</p><p id="c" class="x hl">c</p>"#,
        );
        let marked = doc.elements_with_class("hl");
        assert_eq!(marked, vec![find(&doc, "a"), find(&doc, "c")]);

        let b = find(&doc, "b");
        doc.class_list_mut(b).add("hl");
        assert_eq!(doc.elements_with_class("hl").len(), 3);
    }

    #[test]
    fn test_sections_prefer_main_sections() {
        let doc = Document::parse(
            r#"<body><section id="outside"><p>skip</p></section>
               <main><section><h1>Safety</h1><p>a</p></section><section><p>b</p></section></main></body>"#,
        );
        let sections = doc.sections();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "Safety");
        assert_eq!(sections[1].title, "Chapter 2");
    }

    #[test]
    fn test_sections_fall_back_to_top_level_sections_then_body() {
        let doc = Document::parse(
            r#"<section><section><p>nested</p></section></section><section><p>b</p></section>"#,
        );
        assert_eq!(doc.sections().len(), 2);

        let doc = Document::parse("<p>just text</p>");
        let sections = doc.sections();
        assert_eq!(sections.len(), 1);
        assert_eq!(doc.tag(sections[0].node), "body");
    }

    #[test]
    fn test_scroll_into_view_records_target() {
        let mut doc = Document::parse(r#"<p id="a">a</p>"#);
        assert_eq!(doc.scroll_target(), None);
        let a = find(&doc, "a");
        doc.scroll_into_view(a);
        assert_eq!(doc.scroll_target(), Some(a));
    }
}
