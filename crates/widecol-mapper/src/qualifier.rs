//! Synthetic qualifiers for embedded collection members.
//!
//! Each populated member of a collection element is stored under
//! `<owner>#<member>#<index>`, where `owner` is the collection attribute's
//! storage name and `index` the element's position identity in the row.

use std::fmt;
use std::str::FromStr;

use widecol_common::constants::QUALIFIER_DELIMITER;
use widecol_common::error::{WidecolError, WidecolResult};

/// A parsed synthetic qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyntheticQualifier {
    /// Collection attribute storage name.
    pub owner: String,
    /// Member storage name within the embeddable.
    pub member: String,
    /// Element index, never negative.
    pub index: i64,
}

impl SyntheticQualifier {
    /// Creates a qualifier.
    pub fn new(owner: impl Into<String>, member: impl Into<String>, index: i64) -> Self {
        Self {
            owner: owner.into(),
            member: member.into(),
            index,
        }
    }

    /// Renders the qualifier.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}{d}{}{d}{}",
            self.owner,
            self.member,
            self.index,
            d = QUALIFIER_DELIMITER
        )
    }

    /// Parses a qualifier of the form `<owner>#<member>#<index>`.
    pub fn parse(qualifier: &str) -> WidecolResult<Self> {
        let malformed = |reason: &str| WidecolError::decode("synthetic qualifier", format!("'{qualifier}': {reason}"));

        let mut parts = qualifier.splitn(3, QUALIFIER_DELIMITER);
        let owner = parts.next().unwrap_or_default();
        let member = parts.next().ok_or_else(|| malformed("missing member"))?;
        let index = parts.next().ok_or_else(|| malformed("missing index"))?;

        if owner.is_empty() {
            return Err(malformed("empty owner"));
        }
        if member.is_empty() {
            return Err(malformed("empty member"));
        }
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("index is not a non-negative integer"));
        }
        let index = index
            .parse::<i64>()
            .map_err(|e| malformed(&e.to_string()))?;

        Ok(Self::new(owner, member, index))
    }

    /// Returns the prefix shared by every synthetic qualifier of `owner`.
    #[must_use]
    pub fn owner_prefix(owner: &str) -> String {
        format!("{owner}{QUALIFIER_DELIMITER}")
    }
}

impl fmt::Display for SyntheticQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for SyntheticQualifier {
    type Err = WidecolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use widecol_common::error::ErrorCode;

    #[test]
    fn test_encode() {
        let q = SyntheticQualifier::new("phones", "number", 3);
        assert_eq!(q.encode(), "phones#number#3");
        assert_eq!(q.to_string(), "phones#number#3");
        assert_eq!(SyntheticQualifier::owner_prefix("phones"), "phones#");
    }

    #[test]
    fn test_parse() {
        let q: SyntheticQualifier = "phones#number#12".parse().unwrap();
        assert_eq!(q, SyntheticQualifier::new("phones", "number", 12));
    }

    #[test]
    fn test_parse_malformed() {
        for bad in [
            "phones",
            "phones#number",
            "phones#number#",
            "phones#number#x",
            "phones#number#-1",
            "phones#number#+1",
            "phones#number#1#2",
            "#number#1",
            "phones##1",
        ] {
            let err = SyntheticQualifier::parse(bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Decode, "{bad}");
        }
    }
}
