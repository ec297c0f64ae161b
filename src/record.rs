use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The catalog listing never shows authors, so every record carries this placeholder.
pub const PLACEHOLDER_AUTHOR: &str = "Various";

/// Star rating as published in the `star-rating <Word>` class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    One,
    Two,
    Three,
    Four,
    Five,
}

impl Rating {
    pub const ALL: [Rating; 5] = [
        Rating::One,
        Rating::Two,
        Rating::Three,
        Rating::Four,
        Rating::Five,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Rating::One => "One",
            Rating::Two => "Two",
            Rating::Three => "Three",
            Rating::Four => "Four",
            Rating::Five => "Five",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rating::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// One product pulled off a catalog page. Price keeps its currency formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub title: String,
    pub author: String,
    pub price: String,
    pub rating: Rating,
}

impl BookRecord {
    pub fn new(title: impl Into<String>, price: impl Into<String>, rating: Rating) -> Self {
        Self {
            title: title.into(),
            author: PLACEHOLDER_AUTHOR.to_string(),
            price: price.into(),
            rating,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_tokens_round_trip() {
        for r in Rating::ALL {
            assert_eq!(r.as_str().parse::<Rating>(), Ok(r));
        }
    }

    #[test]
    fn rating_rejects_numeric_and_lowercase() {
        assert!("3".parse::<Rating>().is_err());
        assert!("three".parse::<Rating>().is_err());
        assert!("star-rating".parse::<Rating>().is_err());
    }

    #[test]
    fn new_record_defaults_author() {
        let r = BookRecord::new("Olio", "£23.88", Rating::One);
        assert_eq!(r.author, "Various");
    }

    #[test]
    fn serializes_rating_as_word() {
        let r = BookRecord::new("Sapiens", "£54.23", Rating::Five);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["rating"], "Five");
        assert_eq!(json["price"], "£54.23");
    }
}
