//! Core data models.
//!
//! A [`Document`] is one disruption news item. Ingestion owns its payload;
//! this crate only ever writes the two derived fields, `sentiment` and
//! `entities`.

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// A news document as persisted in the document store.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub url: String,
    pub disruption_type: String,
    pub image_url: Option<String>,
    pub is_deleted: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub location: String,
    pub published_at: DateTime<Utc>,
    pub radius: Option<f64>,
    pub raw_text: String,
    pub severity: String,
    /// Short feed text. Second candidate in the entity text chain.
    pub summary: String,
    pub title: String,
    /// Full article text extracted from `url`. Primary analysis source.
    pub body: String,
    pub sentiment: Option<f64>,
    #[serde(serialize_with = "serialize_entities")]
    pub entities: Entities,
}

impl Document {
    /// Skeleton document with empty payload, for tests and fixtures.
    pub fn new(id: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            url: String::new(),
            disruption_type: String::new(),
            image_url: None,
            is_deleted: false,
            lat: None,
            lng: None,
            location: String::new(),
            published_at,
            radius: None,
            raw_text: String::new(),
            severity: String::new(),
            summary: String::new(),
            title: String::new(),
            body: String::new(),
            sentiment: None,
            entities: Entities::Unanalyzed,
        }
    }
}

/// Entity state of a document.
///
/// `Unanalyzed` and `NoneFound` are both rendered as `null` to clients but
/// differ for selection: only `Unanalyzed` counts as missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Entities {
    #[default]
    Unanalyzed,
    NoneFound,
    Found(EntityMap),
}

impl Entities {
    pub fn is_present(&self) -> bool {
        !matches!(self, Entities::Unanalyzed)
    }

    pub fn map(&self) -> Option<&EntityMap> {
        match self {
            Entities::Found(map) => Some(map),
            _ => None,
        }
    }
}

impl From<Option<EntityMap>> for Entities {
    fn from(value: Option<EntityMap>) -> Self {
        match value {
            Some(map) if !map.is_empty() => Entities::Found(map),
            _ => Entities::NoneFound,
        }
    }
}

fn serialize_entities<S: Serializer>(entities: &Entities, s: S) -> Result<S::Ok, S::Error> {
    entities.map().serialize(s)
}

/// Label → surface forms, with labels kept in first-seen order.
///
/// Serialises as a JSON object. Deserialisation keeps the object's key
/// order and merges repeated keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMap(Vec<(String, Vec<String>)>);

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The forms listed under `label`, appending the label if it is new.
    pub fn forms_mut(&mut self, label: &str) -> &mut Vec<String> {
        let pos = match self.0.iter().position(|(l, _)| l == label) {
            Some(pos) => pos,
            None => {
                self.0.push((label.to_string(), Vec::new()));
                self.0.len() - 1
            }
        };
        &mut self.0[pos].1
    }

    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, forms)| forms.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter().map(|(l, forms)| (l, forms))
    }
}

impl IntoIterator for LabelMap {
    type Item = (String, Vec<String>);
    type IntoIter = std::vec::IntoIter<(String, Vec<String>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for LabelMap {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.0.len()))?;
        for (label, forms) in &self.0 {
            map.serialize_entry(label, forms)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LabelMap {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct LabelMapVisitor;

        impl<'de> Visitor<'de> for LabelMapVisitor {
            type Value = LabelMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of label to surface forms")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<LabelMap, A::Error> {
                let mut out = LabelMap::new();
                while let Some((label, forms)) = access.next_entry::<String, Vec<String>>()? {
                    out.forms_mut(&label).extend(forms);
                }
                Ok(out)
            }
        }

        d.deserialize_map(LabelMapVisitor)
    }
}

/// Category label → distinct surface forms, both in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityMap(LabelMap);

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a surface form under `label` unless it is already listed there.
    /// Comparison is case-sensitive.
    pub fn insert(&mut self, label: &str, surface: &str) -> bool {
        let forms = self.0.forms_mut(label);
        if forms.iter().any(|f| f == surface) {
            return false;
        }
        forms.push(surface.to_string());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.0.get(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Rebuilds the map through [`EntityMap::insert`], dropping duplicate
    /// surface forms and empty labels that arrived from outside.
    pub fn normalized(self) -> Self {
        let mut out = EntityMap::new();
        for (label, forms) in self.0 {
            for form in forms {
                out.insert(&label, &form);
            }
        }
        out
    }
}

impl<L: AsRef<str>, S: AsRef<str>> FromIterator<(L, S)> for EntityMap {
    fn from_iter<I: IntoIterator<Item = (L, S)>>(iter: I) -> Self {
        let mut map = EntityMap::new();
        for (label, surface) in iter {
            map.insert(label.as_ref(), surface.as_ref());
        }
        map
    }
}

/// The derived fields this crate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichedField {
    Sentiment,
    Entities,
}

impl EnrichedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichedField::Sentiment => "sentiment",
            EnrichedField::Entities => "entities",
        }
    }

    pub fn is_present(&self, doc: &Document) -> bool {
        match self {
            EnrichedField::Sentiment => doc.sentiment.is_some(),
            EnrichedField::Entities => doc.entities.is_present(),
        }
    }
}

/// A partial update applied by id.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Sentiment(f64),
    /// `None` records "analysed, nothing found".
    Entities(Option<EntityMap>),
}

impl FieldUpdate {
    pub fn field(&self) -> EnrichedField {
        match self {
            FieldUpdate::Sentiment(_) => EnrichedField::Sentiment,
            FieldUpdate::Entities(_) => EnrichedField::Entities,
        }
    }
}

/// Text columns that can be used in a substring filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentColumn {
    Id,
    Url,
    DisruptionType,
    ImageUrl,
    Location,
    RawText,
    Severity,
    Summary,
    Title,
    Body,
}

impl DocumentColumn {
    /// Column name, identical in the API and the SQLite schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentColumn::Id => "id",
            DocumentColumn::Url => "url",
            DocumentColumn::DisruptionType => "disruption_type",
            DocumentColumn::ImageUrl => "image_url",
            DocumentColumn::Location => "location",
            DocumentColumn::RawText => "raw_text",
            DocumentColumn::Severity => "severity",
            DocumentColumn::Summary => "summary",
            DocumentColumn::Title => "title",
            DocumentColumn::Body => "body",
        }
    }

    pub fn value_of<'a>(&self, doc: &'a Document) -> Option<&'a str> {
        match self {
            DocumentColumn::Id => Some(&doc.id),
            DocumentColumn::Url => Some(&doc.url),
            DocumentColumn::DisruptionType => Some(&doc.disruption_type),
            DocumentColumn::ImageUrl => doc.image_url.as_deref(),
            DocumentColumn::Location => Some(&doc.location),
            DocumentColumn::RawText => Some(&doc.raw_text),
            DocumentColumn::Severity => Some(&doc.severity),
            DocumentColumn::Summary => Some(&doc.summary),
            DocumentColumn::Title => Some(&doc.title),
            DocumentColumn::Body => Some(&doc.body),
        }
    }
}

impl FromStr for DocumentColumn {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "id" | "_id" => DocumentColumn::Id,
            "url" => DocumentColumn::Url,
            "disruption_type" | "disruptionType" => DocumentColumn::DisruptionType,
            "image_url" | "imageUrl" => DocumentColumn::ImageUrl,
            "location" => DocumentColumn::Location,
            "raw_text" => DocumentColumn::RawText,
            "severity" => DocumentColumn::Severity,
            "summary" | "text" => DocumentColumn::Summary,
            "title" => DocumentColumn::Title,
            "body" | "actual_text" => DocumentColumn::Body,
            other => {
                return Err(EngineError::InvalidParameter(format!(
                    "unknown column '{}'",
                    other
                )))
            }
        })
    }
}
