//! Corpus-wide views built by annotating stored documents: a year timeline,
//! entity frequencies and mapped places.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::annotate::{EntityAnnotator, EntityKind, TextAnnotator};
use super::context_builder::truncate_chars;
use super::gazetteer::{self, Place, PlaceKind};
use crate::store::DocumentRecord;

pub const MAX_YEARS_PER_DOCUMENT: usize = 3;
pub const MAX_TIMELINE_EVENTS: usize = 100;
pub const DEFAULT_ENTITY_LIMIT: usize = 50;
pub const MAX_ENTITY_LIMIT: usize = 500;
const MAX_MAP_LOCATIONS: usize = 50;
const CONTEXT_CHARS_BEFORE: usize = 100;
const CONTEXT_CHARS_AFTER: usize = 200;
const DESCRIPTION_CHARS: usize = 100;
const UNKNOWN_LOCATION: &str = "Unknown";

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub id: String,
    #[serde(rename = "date")]
    pub year: i32,
    pub description: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub location: String,
    pub context: String,
    pub document_id: String,
    pub document_title: String,
    pub document_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    /// Events before the display cap.
    pub total: usize,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityCount {
    pub entity_text: String,
    pub entity_type: EntityKind,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityReport {
    pub entities: Vec<EntityCount>,
    pub total: usize,
    /// Mention totals over the returned entities.
    pub by_type: BTreeMap<EntityKind, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "type")]
    pub kind: PlaceKind,
    pub mention_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MapReport {
    pub locations: Vec<MapLocation>,
    pub total: usize,
}

/// Up to three distinct years per document, earliest first overall; the
/// per-document cap applies before the range filter.
pub fn build_timeline(
    documents: &[DocumentRecord],
    years: &dyn TextAnnotator,
    entities: Option<&dyn EntityAnnotator>,
    start_year: Option<i32>,
    end_year: Option<i32>,
) -> Timeline {
    let mut events = Vec::new();
    for doc in documents {
        let text = doc.body();
        let mut taken: Vec<i32> = Vec::with_capacity(MAX_YEARS_PER_DOCUMENT);
        for mention in years.year_mentions(text) {
            if taken.len() == MAX_YEARS_PER_DOCUMENT {
                break;
            }
            if taken.contains(&mention.year) {
                continue;
            }
            taken.push(mention.year);

            let year = mention.year;
            if start_year.is_some_and(|start| year < start) || end_year.is_some_and(|end| year > end)
            {
                continue;
            }

            let context =
                context_window(text, mention.offset, CONTEXT_CHARS_BEFORE, CONTEXT_CHARS_AFTER);
            let location = entities
                .and_then(|annotator| first_location(annotator, context))
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
            let doc_type = if doc.doc_type.trim().is_empty() {
                "document".to_string()
            } else {
                doc.doc_type.clone()
            };

            events.push(TimelineEvent {
                id: format!("{}_{}", doc.id, year),
                year,
                description: truncate_chars(&doc.title, DESCRIPTION_CHARS).to_string(),
                doc_type,
                location,
                context: context.to_string(),
                document_id: doc.id.clone(),
                document_title: doc.title.clone(),
                document_url: doc.url.clone(),
            });
        }
    }

    events.sort_by_key(|event| event.year);
    let total = events.len();
    events.truncate(MAX_TIMELINE_EVENTS);
    Timeline {
        events,
        total,
        start_year,
        end_year,
    }
}

/// Mention counts, most frequent first; `kind` narrows to one entity type.
pub fn count_entities(
    documents: &[DocumentRecord],
    annotator: &dyn EntityAnnotator,
    kind: Option<EntityKind>,
    limit: usize,
) -> EntityReport {
    let mut counts: HashMap<(String, EntityKind), usize> = HashMap::new();
    for doc in documents {
        for mention in annotator.entities(doc.body()) {
            if kind.map_or(true, |k| k == mention.kind) {
                *counts.entry((mention.text, mention.kind)).or_default() += 1;
            }
        }
    }

    let mut entities: Vec<EntityCount> = counts
        .into_iter()
        .map(|((entity_text, entity_type), count)| EntityCount {
            entity_text,
            entity_type,
            count,
        })
        .collect();
    entities.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.entity_text.cmp(&b.entity_text))
            .then_with(|| a.entity_type.cmp(&b.entity_type))
    });
    entities.truncate(limit);

    let mut by_type = BTreeMap::new();
    for entity in &entities {
        *by_type.entry(entity.entity_type).or_default() += entity.count;
    }
    EntityReport {
        total: entities.len(),
        entities,
        by_type,
    }
}

/// Location mentions that resolve in the gazetteer; spellings merge onto the
/// canonical name.
pub fn map_locations(documents: &[DocumentRecord], annotator: &dyn EntityAnnotator) -> MapReport {
    let mut counts: HashMap<&'static str, (Place, usize)> = HashMap::new();
    for doc in documents {
        for mention in annotator.entities(doc.body()) {
            if mention.kind != EntityKind::Location {
                continue;
            }
            if let Some(place) = gazetteer::lookup(&mention.text) {
                counts.entry(place.name).or_insert((place, 0)).1 += 1;
            }
        }
    }

    let mut ranked: Vec<(Place, usize)> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name.cmp(b.0.name)));
    ranked.truncate(MAX_MAP_LOCATIONS);

    let locations: Vec<MapLocation> = ranked
        .into_iter()
        .map(|(place, mention_count)| MapLocation {
            name: place.name.to_string(),
            latitude: place.latitude,
            longitude: place.longitude,
            kind: place.kind,
            mention_count,
        })
        .collect();
    MapReport {
        total: locations.len(),
        locations,
    }
}

fn first_location(annotator: &dyn EntityAnnotator, text: &str) -> Option<String> {
    annotator
        .entities(text)
        .into_iter()
        .filter(|m| m.kind == EntityKind::Location)
        .min_by_key(|m| m.start)
        .map(|m| match gazetteer::lookup(&m.text) {
            Some(place) => place.name.to_string(),
            None => m.text,
        })
}

/// `before` chars ahead of `offset` and `after` chars from it, trimmed.
fn context_window(text: &str, offset: usize, before: usize, after: usize) -> &str {
    let start = if before == 0 {
        offset
    } else {
        text[..offset]
            .char_indices()
            .rev()
            .nth(before - 1)
            .map_or(0, |(i, _)| i)
    };
    let end = text[offset..]
        .char_indices()
        .nth(after)
        .map_or(text.len(), |(i, _)| offset + i);
    text[start..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::annotate::{RegexEntityAnnotator, RegexYearAnnotator};

    fn doc(id: &str, content: &str) -> DocumentRecord {
        let mut doc = DocumentRecord::new(id, format!("Title of {}", id));
        doc.content = content.to_string();
        doc
    }

    fn years() -> RegexYearAnnotator {
        RegexYearAnnotator::new(1300, 2029).unwrap()
    }

    #[test]
    fn timeline_caps_years_per_document_and_sorts() {
        let docs = vec![
            doc(
                "voyages",
                "In 1405 the fleet left Nanjing. It returned in 1407, again in 1405, then 1409 and 1411.",
            ),
            doc("plague", "The 1347 plague reached Europe."),
        ];
        let entities = RegexEntityAnnotator::new().unwrap();

        let timeline = build_timeline(&docs, &years(), Some(&entities), None, None);

        let order: Vec<i32> = timeline.events.iter().map(|e| e.year).collect();
        assert_eq!(order, vec![1347, 1405, 1407, 1409]);
        assert_eq!(timeline.total, 4);
        let voyage = &timeline.events[1];
        assert_eq!(voyage.id, "voyages_1405");
        assert_eq!(voyage.location, "Nanjing");
        assert_eq!(voyage.doc_type, "document");
        assert!(voyage.context.starts_with("In 1405 the fleet"));
        assert_eq!(timeline.events[0].location, "Europe");
    }

    #[test]
    fn timeline_range_filters_and_caps_event_count() {
        let docs = vec![doc("voyages", "1405, 1407 and 1433.")];
        let filtered = build_timeline(&docs, &years(), None, Some(1406), Some(1433));
        let order: Vec<i32> = filtered.events.iter().map(|e| e.year).collect();
        assert_eq!(order, vec![1407, 1433]);
        assert_eq!(filtered.start_year, Some(1406));
        assert_eq!(filtered.events[0].location, "Unknown");

        let many: Vec<DocumentRecord> = (0..40)
            .map(|i| doc(&format!("d{}", i), "1401 1402 1403"))
            .collect();
        let capped = build_timeline(&many, &years(), None, None, None);
        assert_eq!(capped.events.len(), MAX_TIMELINE_EVENTS);
        assert_eq!(capped.total, 120);
    }

    #[test]
    fn context_window_counts_chars_around_offset() {
        assert_eq!(context_window("abcdef", 3, 2, 2), "bcde");
        assert_eq!(context_window("ééé1405ééé", 6, 100, 200), "ééé1405ééé");
    }

    fn explorers() -> Vec<DocumentRecord> {
        vec![
            doc("a", "Zheng He sailed to Calicut. Zheng He returned."),
            doc("b", "Calicut traders met Zheng He in India, not in calicut or Atlantis."),
        ]
    }

    #[test]
    fn entity_counts_rank_by_frequency_and_filter_by_kind() {
        let annotator = RegexEntityAnnotator::new().unwrap();
        let report = count_entities(&explorers(), &annotator, None, DEFAULT_ENTITY_LIMIT);

        assert_eq!(
            report.entities[0],
            EntityCount {
                entity_text: "Zheng He".to_string(),
                entity_type: EntityKind::Person,
                count: 3,
            }
        );
        assert_eq!(report.entities[1].entity_text, "Calicut");
        assert_eq!(report.entities[1].count, 2);
        assert!(report
            .entities
            .iter()
            .any(|e| e.entity_text == "calicut" && e.count == 1));
        assert_eq!(report.by_type[&EntityKind::Person], 3);

        let places = count_entities(&explorers(), &annotator, Some(EntityKind::Location), 10);
        assert!(places
            .entities
            .iter()
            .all(|e| e.entity_type == EntityKind::Location));
        assert_eq!(places.by_type.len(), 1);

        let top = count_entities(&explorers(), &annotator, None, 1);
        assert_eq!(top.total, 1);
    }

    #[test]
    fn map_merges_spellings_and_drops_unknown_places() {
        let annotator = RegexEntityAnnotator::new().unwrap();
        let report = map_locations(&explorers(), &annotator);

        let names: Vec<&str> = report.locations.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Calicut", "India"]);
        assert_eq!(report.locations[0].mention_count, 3);
        assert_eq!(report.locations[0].kind, PlaceKind::City);
        assert_eq!(report.locations[1].kind, PlaceKind::Continent);
        assert_eq!(report.total, 2);
    }
}
