//! Maps the free-text answer to a bin color by keyword.
//!
//! The answer is French prose, so the keywords are the feminine color
//! adjectives used with "poubelle". Priority order is fixed; the first
//! keyword found wins even if the answer mentions several bins.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinCategory {
    Yellow,
    Green,
    Brown,
    Grey,
}

impl BinCategory {
    /// Priority order used by [`classify`].
    pub const ALL: [BinCategory; 4] = [Self::Yellow, Self::Green, Self::Brown, Self::Grey];

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Yellow => "jaune",
            Self::Green => "verte",
            Self::Brown => "marron",
            Self::Grey => "grise",
        }
    }

    /// Illustration shown next to the answer.
    pub fn image_path(self) -> &'static str {
        match self {
            Self::Yellow => "/poubelle-jaune.png",
            Self::Green => "/poubelle-verte.png",
            Self::Brown => "/poubelle-marron.png",
            Self::Grey => "/poubelle-grise.png",
        }
    }
}

impl fmt::Display for BinCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poubelle {}", self.keyword())
    }
}

pub fn classify(text: &str) -> Option<BinCategory> {
    let lower = text.to_lowercase();
    BinCategory::ALL
        .into_iter()
        .find(|bin| lower.contains(bin.keyword()))
}
