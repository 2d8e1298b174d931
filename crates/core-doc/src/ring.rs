//! The ring of open documents.

use tracing::debug;

use crate::document::Document;

/// Every open document, exactly one of which is current. Ring order is
/// most-recently-current first; `B`'s file list and kill-fallthrough both
/// follow it.
#[derive(Default)]
pub struct DocumentRing {
    docs: Vec<Document>,
}

impl DocumentRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Add `doc` and make it current.
    pub fn add(&mut self, doc: Document) {
        debug!(target: "ring", name = %doc.name, open = self.docs.len() + 1, "add");
        self.docs.insert(0, doc);
    }

    pub fn current(&self) -> Option<&Document> {
        self.docs.first()
    }

    pub fn current_mut(&mut self) -> Option<&mut Document> {
        self.docs.first_mut()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.docs.iter().position(|d| d.name == name)
    }

    /// Make the document at `idx` current, preserving relative order of
    /// the rest (move-to-front).
    pub fn switch_to(&mut self, idx: usize) {
        if idx > 0 && idx < self.docs.len() {
            let doc = self.docs.remove(idx);
            self.docs.insert(0, doc);
        }
    }

    /// Switch to the next document in ring order.
    pub fn rotate(&mut self) {
        if self.docs.len() > 1 {
            let doc = self.docs.remove(0);
            self.docs.push(doc);
        }
    }

    /// Remove and return the current document; its ring successor
    /// becomes current.
    pub fn kill_current(&mut self) -> Option<Document> {
        if self.docs.is_empty() {
            return None;
        }
        let doc = self.docs.remove(0);
        debug!(target: "ring", name = %doc.name, left = self.docs.len(), "kill");
        Some(doc)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Document> {
        self.docs.iter_mut()
    }
}
