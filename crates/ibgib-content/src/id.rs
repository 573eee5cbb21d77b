//! Content identifiers
//!
//! Provides [`IbGibId`], the `"<ib>^<gib>"` token that names one immutable
//! snapshot. Identical identifier implies identical content.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// The distinguished root sentinel. Has no payload.
pub const ROOT_ID: &str = "ib^gib";

const SEPARATOR: char = '^';
const PRIMITIVE_GIB: &str = "gib";

/// Identifier of a single content snapshot
///
/// Two components:
/// - `ib`: free-form label (never empty, never contains `^`)
/// - `gib`: content hash over label, data and relations
///
/// # Example
/// ```
/// use ibgib_content::IbGibId;
///
/// let id: IbGibId = "comment hi^ABC123".parse().unwrap();
/// assert_eq!(id.ib(), "comment hi");
/// assert_eq!(id.gib(), "ABC123");
/// assert_eq!(id.to_string(), "comment hi^ABC123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IbGibId {
    ib: String,
    gib: String,
}

impl IbGibId {
    /// Create identifier from its components
    ///
    /// # Errors
    /// Returns error if `ib` is empty or contains the separator
    pub fn new(ib: impl Into<String>, gib: impl Into<String>) -> Result<Self, IdError> {
        let ib = ib.into();
        if ib.is_empty() {
            return Err(IdError::EmptyIb);
        }
        if ib.contains(SEPARATOR) {
            return Err(IdError::SeparatorInIb(ib));
        }
        Ok(Self {
            ib,
            gib: gib.into(),
        })
    }

    /// Build without validation (snapshot documents are validated separately)
    #[inline]
    pub(crate) fn unchecked(ib: String, gib: String) -> Self {
        Self { ib, gib }
    }

    /// The root sentinel `ib^gib`
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self {
            ib: "ib".to_string(),
            gib: PRIMITIVE_GIB.to_string(),
        }
    }

    /// Label component
    #[inline]
    #[must_use]
    pub fn ib(&self) -> &str {
        &self.ib
    }

    /// Hash component
    #[inline]
    #[must_use]
    pub fn gib(&self) -> &str {
        &self.gib
    }

    /// Check if this is the root sentinel
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.ib == "ib" && self.gib == PRIMITIVE_GIB
    }

    /// Hashless primitive (`<ib>^gib`), the root included
    #[inline]
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.gib == PRIMITIVE_GIB
    }
}

impl Display for IbGibId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.ib, SEPARATOR, self.gib)
    }
}

impl FromStr for IbGibId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(IdError::Blank);
        }
        let (ib, gib) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| IdError::MissingSeparator(s.to_string()))?;
        Self::new(ib, gib)
    }
}

impl serde::Serialize for IbGibId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for IbGibId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing identifiers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Blank input
    #[error("blank identifier")]
    Blank,

    /// No `^` between label and hash
    #[error("identifier has no '^' separator: '{0}'")]
    MissingSeparator(String),

    /// Label component is empty
    #[error("identifier label is empty")]
    EmptyIb,

    /// Label contains the separator
    #[error("identifier label contains '^': '{0}'")]
    SeparatorInIb(String),
}
