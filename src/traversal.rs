use std::collections::HashMap;

use crate::document::{Document, NodeId};

/// Position of the narration inside a chapter's reading list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Nothing selected yet; the next advance starts at the first node.
    BeforeStart,
    /// Index of a node with non-empty text.
    At(usize),
    /// No readable node left (or none at all).
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingNode {
    pub node: NodeId,
    pub text: String,
    /// Set when a direct child already carries text of its own. The child is
    /// read on its own turn, so reading this node too would say it twice.
    pub defers_to_child: bool,
}

impl ReadingNode {
    pub fn is_readable(&self) -> bool {
        !self.defers_to_child && !self.text.is_empty()
    }
}

/// The container currently being narrated, flattened once on load.
#[derive(Debug, Clone)]
pub struct Chapter {
    container: NodeId,
    nodes: Vec<ReadingNode>,
    cursor: Cursor,
}

impl Chapter {
    pub fn flatten(document: &Document, container: NodeId) -> Self {
        let descendants = document.descendants(container);
        let positions: HashMap<NodeId, usize> = descendants
            .iter()
            .enumerate()
            .map(|(index, node)| (*node, index))
            .collect();
        let texts: Vec<String> = descendants
            .iter()
            .map(|node| document.rendered_text(*node))
            .collect();

        let nodes: Vec<ReadingNode> = descendants
            .iter()
            .zip(texts.iter())
            .map(|(node, text)| {
                let defers_to_child = document.children(*node).iter().any(|child| {
                    positions
                        .get(child)
                        .is_some_and(|position| !texts[*position].is_empty())
                });
                ReadingNode {
                    node: *node,
                    text: text.clone(),
                    defers_to_child,
                }
            })
            .collect();

        let cursor = if nodes.is_empty() {
            Cursor::Exhausted
        } else {
            Cursor::BeforeStart
        };

        Self {
            container,
            nodes,
            cursor,
        }
    }

    /// Move to the next readable node after the cursor.
    ///
    /// Once the cursor is exhausted it stays there until [`rewind`](Self::rewind).
    pub fn advance(&mut self) -> Option<&ReadingNode> {
        let start = match self.cursor {
            Cursor::BeforeStart => 0,
            Cursor::At(index) => index + 1,
            Cursor::Exhausted => return None,
        };

        match (start..self.nodes.len()).find(|index| self.nodes[*index].is_readable()) {
            Some(index) => {
                self.cursor = Cursor::At(index);
                Some(&self.nodes[index])
            }
            None => {
                self.cursor = Cursor::Exhausted;
                None
            }
        }
    }

    /// Go back to the first readable node.
    pub fn rewind(&mut self) -> Option<&ReadingNode> {
        if self.nodes.is_empty() {
            return None;
        }
        self.cursor = Cursor::BeforeStart;
        self.advance()
    }

    pub fn current(&self) -> Option<&ReadingNode> {
        match self.cursor {
            Cursor::At(index) => self.nodes.get(index),
            _ => None,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn nodes(&self) -> &[ReadingNode] {
        &self.nodes
    }
}
