//! Provenance carried by a unit of work's result.

use folio_store::CommitInfo;

/// Result types that can attribute the commit they produce.
///
/// Consumed by [`Transaction::do_and_commit_attributed`]. The default methods
/// attribute nothing; wrap a value in [`Attributed`] to name an author.
///
/// [`Transaction::do_and_commit_attributed`]: crate::Transaction::do_and_commit_attributed
pub trait CommitMetadata {
    fn author(&self) -> Option<&str> {
        None
    }

    fn comment(&self) -> Option<&str> {
        None
    }

    fn commit_info(&self) -> CommitInfo {
        CommitInfo {
            author: self.author().map(str::to_owned),
            comment: self.comment().map(str::to_owned),
        }
    }
}

/// A unit of work result tagged with the acting user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attributed<T> {
    pub value: T,
    pub author: String,
    pub comment: Option<String>,
}

impl<T> Attributed<T> {
    pub fn new(value: T, author: impl Into<String>) -> Self {
        Self {
            value,
            author: author.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> CommitMetadata for Attributed<T> {
    fn author(&self) -> Option<&str> {
        Some(&self.author)
    }

    fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}
