use serde::Serialize;
use std::fmt;

/// A content type a post may contribute an embedding for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Title,
    Selftext,
    Image,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modality::Title => "title",
            Modality::Selftext => "selftext",
            Modality::Image => "image",
        };
        f.write_str(name)
    }
}

/// What went wrong, independently of which component failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Remote fetch timed out, was refused or answered with a non-success status
    Network,
    /// Fetched bytes are not a valid image
    Decode,
    /// The encoder rejected or failed on its input
    Encoding,
    /// The vector index rejected or could not complete a request
    Store,
}

/// An optional modality that was dropped while ingesting a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedModality {
    pub modality: Modality,
    pub kind: FailureKind,
    pub reason: String,
}
