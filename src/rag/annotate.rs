//! Text annotation used by retrieval post-filters and corpus exploration.
//!
//! Both capabilities sit behind narrow traits so a real NLP component can
//! replace the regex scanners without touching retrieval.

use std::collections::{BTreeSet, HashSet};

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMention {
    pub year: i32,
    /// Byte offset of the mention in the scanned text.
    pub offset: usize,
}

/// Which historical years a text mentions.
pub trait TextAnnotator: Send + Sync {
    /// In-range mentions in order of appearance, duplicates kept.
    fn year_mentions(&self, text: &str) -> Vec<YearMention>;

    fn extract_years(&self, text: &str) -> BTreeSet<i32> {
        self.year_mentions(text).into_iter().map(|m| m.year).collect()
    }

    /// The first year mentioned, which need not be the earliest.
    fn first_year(&self, text: &str) -> Option<i32> {
        self.year_mentions(text).first().map(|m| m.year)
    }
}

/// Standalone four-digit tokens inside a configured historical range.
pub struct RegexYearAnnotator {
    pattern: Regex,
    min: i32,
    max: i32,
}

impl RegexYearAnnotator {
    pub fn new(min: i32, max: i32) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(r"\b(\d{4})\b")?,
            min,
            max,
        })
    }
}

impl TextAnnotator for RegexYearAnnotator {
    fn year_mentions(&self, text: &str) -> Vec<YearMention> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let m = caps.get(1)?;
                let year = m.as_str().parse::<i32>().ok()?;
                Some(YearMention {
                    year,
                    offset: m.start(),
                })
            })
            .filter(|m| (self.min..=self.max).contains(&m.year))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Person,
    Location,
    Ship,
    Date,
    Book,
    Organization,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Person,
        EntityKind::Location,
        EntityKind::Ship,
        EntityKind::Date,
        EntityKind::Book,
        EntityKind::Organization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "PERSON",
            EntityKind::Location => "LOCATION",
            EntityKind::Ship => "SHIP",
            EntityKind::Date => "DATE",
            EntityKind::Book => "BOOK",
            EntityKind::Organization => "ORGANIZATION",
        }
    }

    /// Case-insensitive; `None` for unknown names.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMention {
    pub text: String,
    pub kind: EntityKind,
    pub start: usize,
    pub end: usize,
}

/// Named things a text mentions: people, places, ships and the like.
pub trait EntityAnnotator: Send + Sync {
    /// Mentions grouped by kind, each kind in order of appearance.
    fn entities(&self, text: &str) -> Vec<EntityMention>;
}

const ENTITY_PATTERNS: &[(EntityKind, &str)] = &[
    (EntityKind::Person, r"\b(Zheng He|Hong Bao|Zhou Man|Kublai Khan|Emperor Yongle|Zhu Di)\b"),
    (EntityKind::Person, r"\b(Gavin Menzies|Ian Hudson)\b"),
    (EntityKind::Person, r"\b(Admiral [A-Z][a-z]+)\b"),
    (EntityKind::Person, r"\b(Captain [A-Z][a-z]+)\b"),
    (EntityKind::Person, r"\b(Marco Polo|Christopher Columbus|Vasco da Gama)\b"),
    (EntityKind::Location, r"\b(China|Beijing|Nanjing|Shanghai|Quanzhou|Guangzhou)\b"),
    (EntityKind::Location, r"\b(Malacca|Calicut|Hormuz|Mombasa|Zanzibar|Aden)\b"),
    (EntityKind::Location, r"\b(India|Sri Lanka|Sumatra|Java|Borneo|Philippines)\b"),
    (EntityKind::Location, r"\b(America|California|Peru|Mexico|Brazil|Chile)\b"),
    (EntityKind::Location, r"\b(Pacific Ocean|Indian Ocean|South China Sea|Arabian Sea)\b"),
    (EntityKind::Location, r"\b(Africa|Europe|Asia|Australia|Antarctica)\b"),
    (EntityKind::Ship, r"\b(Treasure Ship|baochuan|great fleet|Ming fleet)\b"),
    (EntityKind::Ship, r"\b(Zheng He's fleet|Chinese fleet|naval fleet)\b"),
    (EntityKind::Ship, r"\b([A-Z][a-z]+\s+(?:Ship|Fleet|Junk|Vessel))\b"),
    (EntityKind::Date, r"\b(1[3-9]\d{2}|20[0-2]\d)\b"),
    (
        EntityKind::Date,
        r"\b(\d{1,2}(?:st|nd|rd|th)?\s+(?:January|February|March|April|May|June|July|August|September|October|November|December)[,.]?\s+\d{4})\b",
    ),
    (EntityKind::Date, r"\b(\d+(?:st|nd|rd|th)?\s+century)\b"),
    (EntityKind::Book, r"\b(1421: The Year China Discovered America)\b"),
    (EntityKind::Book, r"\b(1434: The Year a Magnificent Chinese Fleet)\b"),
    (EntityKind::Book, r"\b(Who Discovered America\?)"),
    (EntityKind::Book, r"\b(The Lost Empire of Atlantis)\b"),
    (EntityKind::Organization, r"\b(1421 Foundation|Ming Dynasty|Chinese Empire)\b"),
    (EntityKind::Organization, r"\b(Royal Geographical Society|Explorers Club)\b"),
    (EntityKind::Organization, r"\b(National Geographic|Smithsonian)\b"),
];

/// Case-insensitive gazetteer-style patterns for the maritime-history corpus.
pub struct RegexEntityAnnotator {
    patterns: Vec<(EntityKind, Regex)>,
}

impl RegexEntityAnnotator {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = ENTITY_PATTERNS
            .iter()
            .map(|(kind, pattern)| Ok((*kind, Regex::new(&format!("(?i){}", pattern))?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }
}

impl EntityAnnotator for RegexEntityAnnotator {
    fn entities(&self, text: &str) -> Vec<EntityMention> {
        let mut seen = HashSet::new();
        let mut mentions = Vec::new();
        for (kind, pattern) in &self.patterns {
            for caps in pattern.captures_iter(text) {
                let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                let matched = m.as_str().trim();
                if matched.chars().count() < 2 {
                    continue;
                }
                if seen.insert((matched.to_string(), m.start(), *kind)) {
                    mentions.push(EntityMention {
                        text: matched.to_string(),
                        kind: *kind,
                        start: m.start(),
                        end: m.end(),
                    });
                }
            }
        }
        mentions
    }
}
