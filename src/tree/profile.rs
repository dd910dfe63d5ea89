use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use thiserror::Error;

use super::Feature;

/// Attribute values must be finite; a NaN or infinity would route silently.
#[derive(Debug, Error)]
#[error("{feature} must be a finite number, got {value}")]
pub struct InvalidValue {
    pub feature: Feature,
    pub value: f64,
}

/// Encoded passenger attributes evaluated against the tree.
///
/// Sex is encoded the same way the tree was trained: 0 = female, 1 = male.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>")]
pub struct Profile {
    values: BTreeMap<Feature, f64>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        feature: Feature,
        value: f64,
    ) -> std::result::Result<Self, InvalidValue> {
        if !value.is_finite() {
            return Err(InvalidValue { feature, value });
        }
        self.values.insert(feature, value);
        Ok(self)
    }

    /// Bypasses the finiteness check so tracing can be tested against it.
    #[cfg(test)]
    pub(crate) fn with_unchecked(mut self, feature: Feature, value: f64) -> Self {
        self.values.insert(feature, value);
        self
    }

    pub fn passenger(
        sex: Sex,
        pclass: u8,
        age: f64,
        fare: f64,
    ) -> std::result::Result<Self, InvalidValue> {
        Self::new()
            .with(Feature::Sex, sex.encoded())?
            .with(Feature::Pclass, pclass as f64)?
            .with(Feature::Age, age)?
            .with(Feature::Fare, fare)
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.values.get(&feature).copied()
    }

    #[cfg(test)]
    pub fn is_complete(&self) -> bool {
        Feature::ALL.iter().all(|f| self.values.contains_key(f))
    }

    /// Parse `sex=female,pclass=1,age=30,fare=84`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut profile = Profile::new();
        for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("expected key=value, got `{pair}`"))?;
            let feature =
                Feature::from_name(key).ok_or_else(|| anyhow!("unknown attribute `{key}`"))?;
            let value = match (feature, Sex::from_keyword(raw)) {
                (Feature::Sex, Some(sex)) => sex.encoded(),
                _ => raw
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("invalid value for {feature}: `{raw}`"))?,
            };
            profile = profile.with(feature, value)?;
        }
        if profile.values.is_empty() {
            bail!("profile `{text}` does not set any attribute");
        }
        Ok(profile)
    }

    /// Human readable summary, e.g. "30-year-old female in 1st class, £84 fare".
    pub fn describe(&self) -> String {
        let age = self
            .get(Feature::Age)
            .map(|a| format!("{}-year-old", a.round() as i64))
            .unwrap_or_else(|| "passenger".to_string());
        let sex = match self.get(Feature::Sex).map(Sex::from_encoded) {
            Some(Some(Sex::Female)) => " female",
            Some(Some(Sex::Male)) => " male",
            _ => "",
        };
        let class = match self.get(Feature::Pclass).map(|c| c.round() as i64) {
            Some(1) => " in 1st class",
            Some(2) => " in 2nd class",
            Some(3) => " in 3rd class",
            _ => "",
        };
        let fare = self
            .get(Feature::Fare)
            .map(|f| format!(", £{:.0} fare", f))
            .unwrap_or_default();
        format!("{age}{sex}{class}{fare}")
    }
}

impl TryFrom<BTreeMap<String, f64>> for Profile {
    type Error = String;

    fn try_from(raw: BTreeMap<String, f64>) -> std::result::Result<Self, Self::Error> {
        let mut profile = Profile::new();
        for (key, value) in raw {
            let feature =
                Feature::from_name(&key).ok_or_else(|| format!("unknown attribute `{key}`"))?;
            profile = profile.with(feature, value).map_err(|err| err.to_string())?;
        }
        Ok(profile)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub fn encoded(self) -> f64 {
        match self {
            Sex::Female => 0.0,
            Sex::Male => 1.0,
        }
    }

    pub fn from_encoded(value: f64) -> Option<Self> {
        if value == 0.0 {
            Some(Sex::Female)
        } else if value == 1.0 {
            Some(Sex::Male)
        } else {
            None
        }
    }

    fn from_keyword(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "female" | "f" | "woman" => Some(Sex::Female),
            "male" | "m" | "man" => Some(Sex::Male),
            _ => None,
        }
    }
}

/// A labelled profile. The label is display-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    pub label: String,
    pub profile: Profile,
}

impl Cohort {
    pub fn new(label: impl Into<String>, profile: Profile) -> Self {
        Self {
            label: label.into(),
            profile,
        }
    }

    /// Cohort labelled with the profile's own description.
    pub fn described(profile: Profile) -> Self {
        Self {
            label: profile.describe(),
            profile,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortPair {
    pub a: Cohort,
    pub b: Cohort,
}

#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub key: &'static str,
    pub label: &'static str,
    pub sex: Sex,
    pub pclass: u8,
    pub age: f64,
    pub fare: f64,
}

impl Preset {
    /// Preset constants are finite, so this skips the per-value check.
    pub fn profile(&self) -> Profile {
        let values = [
            (Feature::Sex, self.sex.encoded()),
            (Feature::Pclass, self.pclass as f64),
            (Feature::Age, self.age),
            (Feature::Fare, self.fare),
        ];
        Profile {
            values: values.into_iter().collect(),
        }
    }

    pub fn cohort(&self) -> Cohort {
        Cohort::new(self.label, self.profile())
    }
}

pub const PRESETS: [Preset; 4] = [
    Preset {
        key: "woman_path",
        label: "Women's path (high survival)",
        sex: Sex::Female,
        pclass: 2,
        age: 30.0,
        fare: 20.0,
    },
    Preset {
        key: "man_path",
        label: "Men's path (low survival)",
        sex: Sex::Male,
        pclass: 3,
        age: 30.0,
        fare: 13.0,
    },
    Preset {
        key: "first_class_child",
        label: "1st class child (best odds)",
        sex: Sex::Female,
        pclass: 1,
        age: 5.0,
        fare: 84.0,
    },
    Preset {
        key: "third_class_male",
        label: "3rd class male (worst odds)",
        sex: Sex::Male,
        pclass: 3,
        age: 40.0,
        fare: 8.0,
    },
];

/// Passenger walked through by the guided tutorial.
pub const TUTORIAL_PASSENGER: Preset = Preset {
    key: "tutorial",
    label: "30-year-old woman in 1st class",
    sex: Sex::Female,
    pclass: 1,
    age: 30.0,
    fare: 84.0,
};

pub fn find_preset(key: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.key.eq_ignore_ascii_case(key.trim()))
}

/// Historical average fare for a passenger class.
pub fn class_average_fare(pclass: u8) -> f64 {
    match pclass {
        1 => 84.0,
        3 => 13.0,
        _ => 20.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keywords_and_numbers() {
        let profile = Profile::parse("sex=female, pclass=1, age=30, fare=84").unwrap();
        assert_eq!(profile.get(Feature::Sex), Some(0.0));
        assert_eq!(profile.get(Feature::Pclass), Some(1.0));
        assert!(profile.is_complete());

        let male = Profile::parse("sex=1,class=3").unwrap();
        assert_eq!(male.get(Feature::Sex), Some(1.0));
        assert!(!male.is_complete());
    }

    #[test]
    fn rejects_bad_profiles() {
        assert!(Profile::parse("").is_err());
        assert!(Profile::parse("embarked=S").is_err());
        assert!(Profile::parse("age=old").is_err());
        assert!(Profile::parse("sex").is_err());
    }

    #[test]
    fn rejects_non_finite_values() {
        for text in ["sex=nan,pclass=1", "age=inf", "fare=-inf", "age=NaN"] {
            let err = Profile::parse(text).unwrap_err();
            assert!(format!("{err:#}").contains("finite"), "{text}: {err:#}");
        }
        assert!(Profile::new().with(Feature::Age, f64::NAN).is_err());
        assert!(Profile::passenger(Sex::Male, 3, 30.0, f64::INFINITY).is_err());
    }

    #[test]
    fn deserializes_from_attribute_map() {
        let profile: Profile =
            serde_json::from_str(r#"{"sex": 0, "pclass": 2, "age": 30, "fare": 20.0}"#).unwrap();
        assert_eq!(profile, find_preset("woman_path").unwrap().profile());

        let bad = serde_json::from_str::<Profile>(r#"{"deck": 1}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn describes_passenger() {
        assert_eq!(
            TUTORIAL_PASSENGER.profile().describe(),
            "30-year-old female in 1st class, £84 fare"
        );
    }

    #[test]
    fn presets_are_complete() {
        for preset in PRESETS {
            assert!(preset.profile().is_complete(), "{}", preset.key);
            assert!(preset.age.is_finite() && preset.fare.is_finite(), "{}", preset.key);
            assert_eq!(preset.cohort().label, preset.label);
        }
        assert!(find_preset("THIRD_CLASS_MALE").is_some());
        assert!(find_preset("nobody").is_none());
    }
}
