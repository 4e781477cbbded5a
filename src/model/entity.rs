//! Discoverable entity (neighbor or service provider).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{AttributeMap, GeoPoint, Value};
use crate::distance;
use crate::{Error, Result};

/// Unique entity identifier (e.g. `"gen_3"`, `"n12"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self { Self(id.to_owned()) }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self { Self(id) }
}

/// Entity category. Service kinds and neighbor pet kinds share one enum so
/// both discovery variants run through the same filter engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Vet,
    Groomer,
    Walker,
    Trainer,
    Boarding,
    Store,
    Dog,
    Cat,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Vet,
        Category::Groomer,
        Category::Walker,
        Category::Trainer,
        Category::Boarding,
        Category::Store,
        Category::Dog,
        Category::Cat,
        Category::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Vet => "Vet",
            Category::Groomer => "Groomer",
            Category::Walker => "Walker",
            Category::Trainer => "Trainer",
            Category::Boarding => "Boarding",
            Category::Store => "Store",
            Category::Dog => "Dog",
            Category::Cat => "Cat",
            Category::Other => "Other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Case-insensitive. Accepts the list-view filter labels as well
/// ("Dogs Only", "Cats Only", "Others", "Training").
impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase();
        let aliased = match needle.as_str() {
            "dogs only" | "dogs" => "dog",
            "cats only" | "cats" => "cat",
            "others" => "other",
            "training" => "trainer",
            other => other,
        };
        Category::ALL
            .into_iter()
            .find(|c| c.label().to_lowercase() == aliased)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown category '{s}'")))
    }
}

/// A point of interest anchored to the session center.
///
/// Everything but the distance is fixed at synthesis/load time. The distance
/// is engine-computed from `location`; collaborator data that carries its own
/// distance figures is never trusted (the field is skipped by serde).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub category: Category,
    pub location: GeoPoint,
    #[serde(default)]
    pub attributes: AttributeMap,
    #[serde(skip)]
    distance_km: f64,
}

impl Entity {
    pub fn new(
        id: impl Into<EntityId>,
        name: impl Into<String>,
        category: Category,
        location: GeoPoint,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            location,
            attributes: AttributeMap::new(),
            distance_km: 0.0,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Recompute the derived distance against a (new) center.
    pub fn anchored_at(mut self, center: GeoPoint) -> Self {
        self.distance_km = distance::estimate(center, self.location);
        self
    }

    /// Distance from the session center in km.
    pub fn distance_from_center(&self) -> f64 {
        self.distance_km
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn rating(&self) -> Option<f64> {
        self.get("rating").and_then(Value::as_float)
    }

    pub fn price(&self) -> Option<f64> {
        self.get("price_start").and_then(Value::as_float)
    }
}
