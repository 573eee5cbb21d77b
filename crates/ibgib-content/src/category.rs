//! Content categories
//!
//! Coarse classification of a snapshot derived from the first word of its
//! label. Drives which follow-on actions a resolved node offers.

use crate::id::IbGibId;

/// Category of a content snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCategory {
    /// The `ib^gib` sentinel
    Root,
    /// Text comment
    Comment,
    /// Image
    Pic,
    /// Hyperlink
    Link,
    /// Tag
    Tag,
    /// Saved query
    Query,
    /// Identity (attribution)
    Identity,
    /// Session
    Session,
    /// Anything else
    Other,
}

impl ContentCategory {
    /// Classify an identifier by its label
    #[must_use]
    pub fn of(id: &IbGibId) -> Self {
        if id.is_root() {
            return Self::Root;
        }
        Self::from_ib(id.ib())
    }

    /// Classify a label
    #[must_use]
    pub fn from_ib(ib: &str) -> Self {
        match ib.split_whitespace().next().unwrap_or_default() {
            "ib" => Self::Root,
            "comment" => Self::Comment,
            "pic" => Self::Pic,
            "link" => Self::Link,
            "tag" => Self::Tag,
            "query" | "query_result" => Self::Query,
            "identity" | "email" | "node" => Self::Identity,
            "session" => Self::Session,
            _ => Self::Other,
        }
    }

    /// Relation name a target uses to point at a contribution of this category
    #[inline]
    #[must_use]
    pub fn relation_name(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Pic => "pic",
            Self::Link => "link",
            Self::Tag => "tag",
            _ => "adjunct",
        }
    }

    /// Whether the category is user content (can be forked, commented, linked)
    #[inline]
    #[must_use]
    pub fn is_user_content(&self) -> bool {
        !matches!(self, Self::Root | Self::Identity | Self::Session)
    }
}
