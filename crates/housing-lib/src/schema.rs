//! Feature schema for one housing record
//!
//! Defines the typed [`FeatureRecord`] accepted by the prediction path and
//! the validation that turns an untyped JSON body into one. Validation has
//! no side effects and reports every offending field at once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Numeric feature columns, in the order used by training and serving
pub const NUMERIC_FEATURES: [&str; 8] = [
    "longitude",
    "latitude",
    "housing_median_age",
    "total_rooms",
    "total_bedrooms",
    "population",
    "households",
    "median_income",
];

/// Categorical feature column
pub const CATEGORICAL_FEATURE: &str = "ocean_proximity";

/// Regression target column in the training data
pub const TARGET: &str = "median_house_value";

/// Number of numeric features
pub const NUM_NUMERIC: usize = NUMERIC_FEATURES.len();

/// All feature names in pipeline order (numeric first, then categorical)
pub fn feature_names() -> Vec<String> {
    NUMERIC_FEATURES
        .iter()
        .chain(std::iter::once(&CATEGORICAL_FEATURE))
        .map(|s| s.to_string())
        .collect()
}

/// Inclusive bounds for one numeric field
struct NumericBounds {
    field: &'static str,
    min: Option<f64>,
    max: Option<f64>,
}

const NUMERIC_BOUNDS: [NumericBounds; NUM_NUMERIC] = [
    NumericBounds { field: "longitude", min: Some(-125.0), max: Some(-113.0) },
    NumericBounds { field: "latitude", min: Some(32.0), max: Some(43.0) },
    NumericBounds { field: "housing_median_age", min: Some(0.0), max: None },
    NumericBounds { field: "total_rooms", min: Some(0.0), max: None },
    NumericBounds { field: "total_bedrooms", min: Some(0.0), max: None },
    NumericBounds { field: "population", min: Some(0.0), max: None },
    NumericBounds { field: "households", min: Some(0.0), max: None },
    NumericBounds { field: "median_income", min: Some(0.0), max: None },
];

/// Proximity of the block to the ocean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OceanProximity {
    #[serde(rename = "<1H OCEAN")]
    LessThanOneHour,
    #[serde(rename = "INLAND")]
    Inland,
    #[serde(rename = "NEAR BAY")]
    NearBay,
    #[serde(rename = "NEAR OCEAN")]
    NearOcean,
    #[serde(rename = "ISLAND")]
    Island,
}

impl OceanProximity {
    pub const ALL: [OceanProximity; 5] = [
        OceanProximity::LessThanOneHour,
        OceanProximity::Inland,
        OceanProximity::NearBay,
        OceanProximity::NearOcean,
        OceanProximity::Island,
    ];

    /// The literal used in data files and request bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            OceanProximity::LessThanOneHour => "<1H OCEAN",
            OceanProximity::Inland => "INLAND",
            OceanProximity::NearBay => "NEAR BAY",
            OceanProximity::NearOcean => "NEAR OCEAN",
            OceanProximity::Island => "ISLAND",
        }
    }

    fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(|v| format!("'{}'", v.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for OceanProximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OceanProximity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("must be one of {}", Self::allowed_list()))
    }
}

/// Kind of constraint a field violated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Missing,
    WrongType,
    OutOfRange,
    NotInEnumeration,
}

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub constraint: Constraint,
    pub message: String,
}

impl FieldViolation {
    fn new(field: &str, constraint: Constraint, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            constraint,
            message: message.into(),
        }
    }
}

/// Validation failure for a whole record
#[derive(Debug, Clone, Error)]
#[error("invalid feature record: {}", summarize(.violations))]
pub struct ValidationErrors {
    pub violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn single(field: &str, constraint: Constraint, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, constraint, message)],
        }
    }

    /// True if any violation concerns the given field
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// One validated housing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub longitude: f64,
    pub latitude: f64,
    pub housing_median_age: f64,
    pub total_rooms: f64,
    pub total_bedrooms: f64,
    pub population: f64,
    pub households: f64,
    pub median_income: f64,
    pub ocean_proximity: OceanProximity,
}

impl FeatureRecord {
    /// Validate an untyped JSON body into a record
    pub fn from_value(value: &Value) -> Result<Self, ValidationErrors> {
        let object = value.as_object().ok_or_else(|| {
            ValidationErrors::single("body", Constraint::WrongType, "expected a JSON object")
        })?;

        let mut violations = Vec::new();
        let mut numeric = [0.0f64; NUM_NUMERIC];

        for (slot, bounds) in numeric.iter_mut().zip(NUMERIC_BOUNDS.iter()) {
            match object.get(bounds.field) {
                None | Some(Value::Null) => {
                    violations.push(FieldViolation::new(
                        bounds.field,
                        Constraint::Missing,
                        "field required",
                    ));
                }
                Some(Value::Number(n)) => match n.as_f64() {
                    Some(v) => match check_bounds(bounds, v) {
                        Ok(()) => *slot = v,
                        Err(violation) => violations.push(violation),
                    },
                    None => violations.push(FieldViolation::new(
                        bounds.field,
                        Constraint::WrongType,
                        "value is not a valid float",
                    )),
                },
                Some(_) => violations.push(FieldViolation::new(
                    bounds.field,
                    Constraint::WrongType,
                    "value is not a valid float",
                )),
            }
        }

        let ocean_proximity = match object.get(CATEGORICAL_FEATURE) {
            None | Some(Value::Null) => {
                violations.push(FieldViolation::new(
                    CATEGORICAL_FEATURE,
                    Constraint::Missing,
                    "field required",
                ));
                None
            }
            Some(Value::String(s)) => match s.parse::<OceanProximity>() {
                Ok(v) => Some(v),
                Err(message) => {
                    violations.push(FieldViolation::new(
                        CATEGORICAL_FEATURE,
                        Constraint::NotInEnumeration,
                        message,
                    ));
                    None
                }
            },
            Some(_) => {
                violations.push(FieldViolation::new(
                    CATEGORICAL_FEATURE,
                    Constraint::WrongType,
                    "value is not a valid string",
                ));
                None
            }
        };

        match ocean_proximity {
            Some(ocean_proximity) if violations.is_empty() => {
                Ok(Self::from_parts(numeric, ocean_proximity))
            }
            _ => Err(ValidationErrors { violations }),
        }
    }

    /// Re-check the bounds of an already typed record
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let violations: Vec<FieldViolation> = self
            .numeric_values()
            .iter()
            .zip(NUMERIC_BOUNDS.iter())
            .filter_map(|(v, bounds)| check_bounds(bounds, *v).err())
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors { violations })
        }
    }

    fn from_parts(numeric: [f64; NUM_NUMERIC], ocean_proximity: OceanProximity) -> Self {
        Self {
            longitude: numeric[0],
            latitude: numeric[1],
            housing_median_age: numeric[2],
            total_rooms: numeric[3],
            total_bedrooms: numeric[4],
            population: numeric[5],
            households: numeric[6],
            median_income: numeric[7],
            ocean_proximity,
        }
    }

    /// Numeric values in [`NUMERIC_FEATURES`] order
    pub fn numeric_values(&self) -> [f64; NUM_NUMERIC] {
        [
            self.longitude,
            self.latitude,
            self.housing_median_age,
            self.total_rooms,
            self.total_bedrooms,
            self.population,
            self.households,
            self.median_income,
        ]
    }

    /// Tabular row consumed by the model pipeline
    pub fn to_row(&self) -> FeatureRow {
        FeatureRow {
            numeric: self.numeric_values(),
            category: Some(self.ocean_proximity.as_str().to_string()),
        }
    }
}

fn check_bounds(bounds: &NumericBounds, value: f64) -> Result<(), FieldViolation> {
    if !value.is_finite() {
        return Err(FieldViolation::new(
            bounds.field,
            Constraint::WrongType,
            "value is not a finite float",
        ));
    }
    if let Some(min) = bounds.min {
        if value < min {
            return Err(FieldViolation::new(
                bounds.field,
                Constraint::OutOfRange,
                format!("ensure this value is greater than or equal to {}", min),
            ));
        }
    }
    if let Some(max) = bounds.max {
        if value > max {
            return Err(FieldViolation::new(
                bounds.field,
                Constraint::OutOfRange,
                format!("ensure this value is less than or equal to {}", max),
            ));
        }
    }
    Ok(())
}

/// Tabular input row for the pipeline
///
/// Missing numeric cells are NaN; a missing category is `None`. Rows built
/// from a validated [`FeatureRecord`] never contain missing values, rows
/// read from training data may.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub numeric: [f64; NUM_NUMERIC],
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "longitude": -122.1,
            "latitude": 37.5,
            "housing_median_age": 30,
            "total_rooms": 2000,
            "total_bedrooms": 400,
            "population": 900,
            "households": 350,
            "median_income": 4.5,
            "ocean_proximity": "NEAR BAY"
        })
    }

    #[test]
    fn test_valid_record_parses() {
        let record = FeatureRecord::from_value(&sample()).unwrap();
        assert_eq!(record.longitude, -122.1);
        assert_eq!(record.housing_median_age, 30.0);
        assert_eq!(record.ocean_proximity, OceanProximity::NearBay);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let mut body = sample();
        body["longitude"] = json!(-125);
        body["latitude"] = json!(43);
        body["median_income"] = json!(0);
        assert!(FeatureRecord::from_value(&body).is_ok());
    }

    #[test]
    fn test_out_of_range_longitude() {
        let mut body = sample();
        body["longitude"] = json!(-130.0);
        let err = FeatureRecord::from_value(&body).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field, "longitude");
        assert_eq!(err.violations[0].constraint, Constraint::OutOfRange);
    }

    #[test]
    fn test_negative_population_rejected() {
        let mut body = sample();
        body["population"] = json!(-1);
        let err = FeatureRecord::from_value(&body).unwrap_err();
        assert!(err.has_field("population"));
    }

    #[test]
    fn test_missing_and_wrong_type_reported_together() {
        let mut body = sample();
        body.as_object_mut().unwrap().remove("latitude");
        body["total_rooms"] = json!("2000");
        body["ocean_proximity"] = json!("DOWNTOWN");

        let err = FeatureRecord::from_value(&body).unwrap_err();
        assert_eq!(err.violations.len(), 3);

        let by_field = |f: &str| err.violations.iter().find(|v| v.field == f).unwrap().constraint;
        assert_eq!(by_field("latitude"), Constraint::Missing);
        assert_eq!(by_field("total_rooms"), Constraint::WrongType);
        assert_eq!(by_field("ocean_proximity"), Constraint::NotInEnumeration);
    }

    #[test]
    fn test_null_counts_as_missing() {
        let mut body = sample();
        body["households"] = Value::Null;
        let err = FeatureRecord::from_value(&body).unwrap_err();
        assert_eq!(err.violations[0].constraint, Constraint::Missing);
    }

    #[test]
    fn test_non_object_body_rejected() {
        let err = FeatureRecord::from_value(&json!([1, 2, 3])).unwrap_err();
        assert!(err.has_field("body"));
    }

    #[test]
    fn test_extra_fields_ignored() {
        let mut body = sample();
        body["median_house_value"] = json!(1.0);
        assert!(FeatureRecord::from_value(&body).is_ok());
    }

    #[test]
    fn test_ocean_proximity_literals_round_trip() {
        for value in OceanProximity::ALL {
            assert_eq!(value.as_str().parse::<OceanProximity>().unwrap(), value);
            let encoded = serde_json::to_string(&value).unwrap();
            assert_eq!(encoded, format!("\"{}\"", value.as_str()));
        }
    }

    #[test]
    fn test_validate_typed_record() {
        let mut record = FeatureRecord::from_value(&sample()).unwrap();
        assert!(record.validate().is_ok());
        record.latitude = 50.0;
        assert!(record.validate().unwrap_err().has_field("latitude"));
    }

    #[test]
    fn test_to_row_preserves_order() {
        let record = FeatureRecord::from_value(&sample()).unwrap();
        let row = record.to_row();
        assert_eq!(row.numeric[0], -122.1);
        assert_eq!(row.numeric[7], 4.5);
        assert_eq!(row.category.as_deref(), Some("NEAR BAY"));
    }

    #[test]
    fn test_error_display_lists_fields() {
        let mut body = sample();
        body["latitude"] = json!(10);
        let err = FeatureRecord::from_value(&body).unwrap_err();
        assert!(err.to_string().contains("latitude"));
    }
}
