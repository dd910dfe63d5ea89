//! Per-feature SHAP contributions and the bar chart that follows the tree
//! reveal.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use crate::tree::profile::Profile;
use crate::tree::Feature;

/// One bar of the waterfall chart.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallRow {
    pub feature: Feature,
    pub value: f64,
    pub start: f64,
    pub end: f64,
    pub feature_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapExplanation {
    pub base_value: f64,
    pub shap_values: BTreeMap<Feature, f64>,
    pub feature_values: Profile,
}

impl ShapExplanation {
    pub fn final_prediction(&self) -> f64 {
        self.base_value + self.shap_values.values().sum::<f64>()
    }

    /// Contributions accumulated in feature order from the base value, then
    /// sorted by absolute size, largest first.
    pub fn waterfall(&self) -> Vec<WaterfallRow> {
        let mut cumulative = self.base_value;
        let mut rows: Vec<WaterfallRow> = self
            .shap_values
            .iter()
            .map(|(&feature, &value)| {
                let start = cumulative;
                cumulative += value;
                WaterfallRow {
                    feature,
                    value,
                    start,
                    end: cumulative,
                    feature_value: self.feature_values.get(feature),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
        rows
    }
}

/// Something that can explain a model prediction for a profile.
pub trait ExplanationSource {
    fn explain(&self, profile: &Profile) -> Option<ShapExplanation>;
}

#[derive(Debug, Deserialize)]
struct TableEntry {
    profile: Profile,
    base_value: f64,
    shap_values: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct TableDocument {
    explanations: Vec<TableEntry>,
}

/// Precomputed explanations keyed by exact profile.
#[derive(Debug, Clone, Default)]
pub struct ExplanationTable {
    entries: Vec<ShapExplanation>,
}

impl ExplanationTable {
    pub fn from_json(text: &str) -> Result<Self> {
        let document: TableDocument =
            serde_json::from_str(text).context("invalid explanation table")?;
        let entries = document
            .explanations
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let shap_values: BTreeMap<Feature, f64> = entry
                    .shap_values
                    .into_iter()
                    .map(|(name, value)| {
                        Feature::from_name(&name)
                            .map(|feature| (feature, value))
                            .with_context(|| format!("entry {index}: unknown feature `{name}`"))
                    })
                    .collect::<Result<_>>()?;
                Ok(ShapExplanation {
                    base_value: entry.base_value,
                    shap_values,
                    feature_values: entry.profile,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ExplanationSource for ExplanationTable {
    fn explain(&self, profile: &Profile) -> Option<ShapExplanation> {
        let found = self
            .entries
            .iter()
            .find(|entry| entry.feature_values == *profile)
            .cloned();
        if found.is_none() {
            warn!("no SHAP explanation for {}", profile);
        }
        found
    }
}

/// SHAP bar chart state. Highlighted bars follow the same
/// clear, commit, apply discipline as the tree diagram.
#[derive(Debug, Clone, Default)]
pub struct ShapChart {
    explanation: Option<ShapExplanation>,
    highlighted: BTreeSet<Feature>,
    epoch: u64,
}

impl ShapChart {
    pub fn set_explanation(&mut self, explanation: Option<ShapExplanation>) {
        self.explanation = explanation;
    }

    pub fn explanation(&self) -> Option<&ShapExplanation> {
        self.explanation.as_ref()
    }

    pub fn highlight(&mut self, features: &[Feature]) {
        self.highlighted.clear();
        self.epoch += 1;
        self.highlighted.extend(features.iter().copied());
        debug!("shap chart highlights {:?} (epoch {})", features, self.epoch);
    }

    pub fn is_highlighted(&self, feature: Feature) -> bool {
        self.highlighted.contains(&feature)
    }

    #[cfg(test)]
    pub fn highlighted(&self) -> impl Iterator<Item = Feature> + '_ {
        self.highlighted.iter().copied()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::profile::{Sex, TUTORIAL_PASSENGER};

    const TABLE: &str = r#"{
        "explanations": [
            {
                "profile": {"sex": 0, "pclass": 1, "age": 30, "fare": 84},
                "base_value": -0.47,
                "shap_values": {"sex": 1.21, "pclass": 0.84, "age": 0.05, "fare": -0.31}
            }
        ]
    }"#;

    #[test]
    fn looks_up_exact_profile() {
        let table = ExplanationTable::from_json(TABLE).unwrap();
        assert_eq!(table.len(), 1);
        let explanation = table.explain(&TUTORIAL_PASSENGER.profile()).unwrap();
        assert!((explanation.final_prediction() - 1.32).abs() < 1e-9);

        let other = Profile::passenger(Sex::Male, 1, 30.0, 84.0).unwrap();
        assert!(table.explain(&other).is_none());
    }

    #[test]
    fn waterfall_sorts_by_magnitude_and_accumulates_in_feature_order() {
        let table = ExplanationTable::from_json(TABLE).unwrap();
        let rows = table.explain(&TUTORIAL_PASSENGER.profile()).unwrap().waterfall();
        let order: Vec<Feature> = rows.iter().map(|r| r.feature).collect();
        assert_eq!(order, vec![Feature::Sex, Feature::Pclass, Feature::Fare, Feature::Age]);

        let sex = &rows[0];
        assert!((sex.start - -0.47).abs() < 1e-9);
        assert!((sex.end - 0.74).abs() < 1e-9);
        let fare = &rows[2];
        assert!((fare.start - 1.63).abs() < 1e-9);
        assert_eq!(fare.feature_value, Some(84.0));
    }

    #[test]
    fn rejects_unknown_features() {
        let bad = TABLE.replace("\"age\": 0.05", "\"deck\": 0.05");
        assert!(ExplanationTable::from_json(&bad).is_err());
    }

    #[test]
    fn highlight_replaces_previous_set_and_bumps_epoch() {
        let mut chart = ShapChart::default();
        chart.highlight(&[Feature::Sex, Feature::Pclass]);
        chart.highlight(&[Feature::Age]);
        assert!(!chart.is_highlighted(Feature::Sex));
        assert!(chart.is_highlighted(Feature::Age));
        assert_eq!(chart.epoch(), 2);

        chart.highlight(&[Feature::Age]);
        assert_eq!(chart.epoch(), 3);
        assert_eq!(chart.highlighted().count(), 1);
    }
}
