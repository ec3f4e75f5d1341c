//! Immutable in-memory view of the term index

use std::collections::{HashMap, HashSet};

use super::tokenizer::TermStats;

/// One occurrence record of a term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub commit_id: String,
    /// `None` for commit message terms
    pub path: Option<String>,
    pub position: u32,
    pub frequency: u32,
}

/// Terms of one file version
#[derive(Debug, Clone, Default)]
pub struct DocumentDelta {
    pub path: String,
    pub length: u32,
    pub terms: HashMap<String, TermStats>,
}

/// Everything one commit adds to the index
#[derive(Debug, Clone, Default)]
pub struct CommitDelta {
    pub commit_id: String,
    pub message_terms: HashMap<String, TermStats>,
    pub documents: Vec<DocumentDelta>,
}

/// Published index state.
///
/// Readers hold an `Arc` to a snapshot; updates build a new one and swap it
/// in, so a reader never observes a half-applied delta.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    postings: HashMap<String, Vec<Posting>>,
    content_df: HashMap<String, u32>,
    documents: HashMap<String, HashMap<String, u32>>,
    document_count: usize,
    total_document_length: u64,
    indexed_commits: HashSet<String>,
    last_indexed_commit: Option<String>,
    generation: u64,
    posting_count: u64,
}

impl IndexSnapshot {
    /// Increases with every published update
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_indexed_commit(&self) -> Option<&str> {
        self.last_indexed_commit.as_deref()
    }

    /// True once a build has completed
    pub fn is_built(&self) -> bool {
        self.last_indexed_commit.is_some()
    }

    pub fn contains_commit(&self, commit_id: &str) -> bool {
        self.indexed_commits.contains(commit_id)
    }

    pub fn commit_count(&self) -> usize {
        self.indexed_commits.len()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn posting_count(&self) -> u64 {
        self.posting_count
    }

    /// Number of content documents (file versions)
    pub fn document_count(&self) -> usize {
        self.document_count
    }

    pub fn average_document_length(&self) -> f64 {
        if self.document_count == 0 {
            return 0.0;
        }
        self.total_document_length as f64 / self.document_count as f64
    }

    /// Content documents containing `term`
    pub fn document_frequency(&self, term: &str) -> u32 {
        self.content_df.get(term).copied().unwrap_or(0)
    }

    pub fn document_length(&self, commit_id: &str, path: &str) -> Option<u32> {
        self.documents.get(commit_id)?.get(path).copied()
    }

    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Commits whose message contains `term`
    pub fn commits_with_message_term(&self, term: &str) -> HashSet<&str> {
        self.postings(term)
            .iter()
            .filter(|p| p.path.is_none())
            .map(|p| p.commit_id.as_str())
            .collect()
    }

    pub(crate) fn insert_commit(&mut self, commit_id: &str) {
        self.indexed_commits.insert(commit_id.to_string());
    }

    pub(crate) fn insert_document(&mut self, commit_id: &str, path: &str, length: u32) {
        let previous = self
            .documents
            .entry(commit_id.to_string())
            .or_default()
            .insert(path.to_string(), length);
        match previous {
            Some(old) => {
                self.total_document_length -= u64::from(old);
            }
            None => self.document_count += 1,
        }
        self.total_document_length += u64::from(length);
    }

    pub(crate) fn insert_posting(&mut self, term: &str, posting: Posting) {
        if posting.path.is_some() {
            *self.content_df.entry(term.to_string()).or_default() += 1;
        }
        self.postings
            .entry(term.to_string())
            .or_default()
            .push(posting);
        self.posting_count += 1;
    }

    pub(crate) fn set_last_indexed_commit(&mut self, commit_id: Option<String>) {
        self.last_indexed_commit = commit_id;
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Fold one commit's delta into this snapshot
    pub(crate) fn apply(&mut self, delta: &CommitDelta) {
        self.insert_commit(&delta.commit_id);
        for (term, stats) in &delta.message_terms {
            self.insert_posting(
                term,
                Posting {
                    commit_id: delta.commit_id.clone(),
                    path: None,
                    position: stats.first_position,
                    frequency: stats.frequency,
                },
            );
        }
        for doc in &delta.documents {
            self.insert_document(&delta.commit_id, &doc.path, doc.length);
            for (term, stats) in &doc.terms {
                self.insert_posting(
                    term,
                    Posting {
                        commit_id: delta.commit_id.clone(),
                        path: Some(doc.path.clone()),
                        position: stats.first_position,
                        frequency: stats.frequency,
                    },
                );
            }
        }
    }
}
