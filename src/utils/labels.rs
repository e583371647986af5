//! Body-region label catalog
//!
//! The model scores every candidate against a fixed, ordered class list. The
//! position of a label in its [`LabelCatalog`] is the class index used to decode
//! raw scores, so the catalog must match the model's training-time order.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// The 18 categories the detector knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    FemaleGenitaliaCovered,
    FaceFemale,
    ButtocksExposed,
    FemaleBreastExposed,
    FemaleGenitaliaExposed,
    MaleBreastExposed,
    AnusExposed,
    FeetExposed,
    BellyCovered,
    FeetCovered,
    ArmpitsCovered,
    ArmpitsExposed,
    FaceMale,
    BellyExposed,
    MaleGenitaliaExposed,
    AnusCovered,
    FemaleBreastCovered,
    ButtocksCovered,
}

impl Label {
    /// Training-time class order of the stock detector
    pub const ALL: [Label; 18] = [
        Label::FemaleGenitaliaCovered,
        Label::FaceFemale,
        Label::ButtocksExposed,
        Label::FemaleBreastExposed,
        Label::FemaleGenitaliaExposed,
        Label::MaleBreastExposed,
        Label::AnusExposed,
        Label::FeetExposed,
        Label::BellyCovered,
        Label::FeetCovered,
        Label::ArmpitsCovered,
        Label::ArmpitsExposed,
        Label::FaceMale,
        Label::BellyExposed,
        Label::MaleGenitaliaExposed,
        Label::AnusCovered,
        Label::FemaleBreastCovered,
        Label::ButtocksCovered,
    ];

    /// Catalog identifier, e.g. `BUTTOCKS_EXPOSED`
    pub fn name(&self) -> &'static str {
        match self {
            Label::FemaleGenitaliaCovered => "FEMALE_GENITALIA_COVERED",
            Label::FaceFemale => "FACE_FEMALE",
            Label::ButtocksExposed => "BUTTOCKS_EXPOSED",
            Label::FemaleBreastExposed => "FEMALE_BREAST_EXPOSED",
            Label::FemaleGenitaliaExposed => "FEMALE_GENITALIA_EXPOSED",
            Label::MaleBreastExposed => "MALE_BREAST_EXPOSED",
            Label::AnusExposed => "ANUS_EXPOSED",
            Label::FeetExposed => "FEET_EXPOSED",
            Label::BellyCovered => "BELLY_COVERED",
            Label::FeetCovered => "FEET_COVERED",
            Label::ArmpitsCovered => "ARMPITS_COVERED",
            Label::ArmpitsExposed => "ARMPITS_EXPOSED",
            Label::FaceMale => "FACE_MALE",
            Label::BellyExposed => "BELLY_EXPOSED",
            Label::MaleGenitaliaExposed => "MALE_GENITALIA_EXPOSED",
            Label::AnusCovered => "ANUS_COVERED",
            Label::FemaleBreastCovered => "FEMALE_BREAST_COVERED",
            Label::ButtocksCovered => "BUTTOCKS_COVERED",
        }
    }

    /// Whether the label denotes an uncovered body region
    pub fn is_exposed(&self) -> bool {
        self.name().ends_with("_EXPOSED")
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Label {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::ALL
            .iter()
            .copied()
            .find(|label| label.name() == s)
            .ok_or_else(|| ConfigError::InvalidValue(format!("unknown label: {}", s)))
    }
}

/// Ordered class-index to label mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCatalog {
    labels: Vec<Label>,
}

impl LabelCatalog {
    /// Build a catalog from an explicit order. Empty or duplicated lists are rejected.
    pub fn new(labels: Vec<Label>) -> Result<Self, ConfigError> {
        if labels.is_empty() {
            return Err(ConfigError::InvalidValue(
                "label catalog must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for label in &labels {
            if !seen.insert(*label) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate label in catalog: {}",
                    label
                )));
            }
        }

        Ok(Self { labels })
    }

    /// The stock detector's class order
    pub fn standard() -> Self {
        Self {
            labels: Label::ALL.to_vec(),
        }
    }

    /// Parse catalog identifiers in class-index order
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let labels = names
            .iter()
            .map(|name| name.as_ref().parse::<Label>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for a model class index
    pub fn get(&self, class_index: usize) -> Option<Label> {
        self.labels.get(class_index).copied()
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }
}

impl Default for LabelCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
