//! # Discovery Model
//!
//! Plain DTOs shared by every stage: synthesis ↔ filtering ↔ map sync ↔ UI.
//!
//! Design rule: no renderer handles and no async here.
//! This module is pure data.

pub mod geo;
pub mod entity;
pub mod value;
pub mod attributes;

pub use geo::GeoPoint;
pub use entity::{Entity, EntityId, Category};
pub use value::Value;
pub use attributes::{AttributeMap, attributes};
