//! Thing Types
//!
//! Identifiers, grid positions, and the read-only view of a world entity.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Opaque handle identifying any world entity (actor, item, tile feature, building).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThingId(pub String);

impl ThingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ThingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ThingId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ThingId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Integer tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan (taxicab) distance between two tiles.
    pub fn manhattan(self, other: GridPos) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// The four orthogonal neighbours, in a fixed order.
    pub fn neighbours(self) -> [GridPos; 4] {
        [
            GridPos::new(self.x + 1, self.y),
            GridPos::new(self.x - 1, self.y),
            GridPos::new(self.x, self.y + 1),
            GridPos::new(self.x, self.y - 1),
        ]
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Extra data carried by things that are buildings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingInfo {
    /// Tiles where agents are served; preferred over the raw position for approach.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_points: Vec<GridPos>,
    /// Opening hour (fractional, 0-24). `None` means always open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_hour: Option<f64>,
    /// Closing hour (fractional, 0-24). May be less than `open_hour` for overnight hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_hour: Option<f64>,
}

impl BuildingInfo {
    /// Whether the building is open at the given hour of day.
    pub fn is_open_at(&self, hour: f64) -> bool {
        match (self.open_hour, self.close_hour) {
            (Some(open), Some(close)) if open <= close => hour >= open && hour < close,
            // Overnight schedule, e.g. 20:00 - 02:00
            (Some(open), Some(close)) => hour >= open || hour < close,
            _ => true,
        }
    }

    /// The service point nearest to `from`, ties broken by declaration order.
    pub fn nearest_service_point(&self, from: GridPos) -> Option<GridPos> {
        self.service_points
            .iter()
            .copied()
            .min_by_key(|p| p.manhattan(from))
    }
}

/// Read-only view of a single world entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThingView {
    pub id: ThingId,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GridPos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<BuildingInfo>,
}

impl ThingView {
    pub fn new(id: impl Into<ThingId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Builder: place the thing on a tile.
    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.position = Some(GridPos::new(x, y));
        self
    }

    /// Builder: add a tag.
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Builder: set a numeric attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }

    /// Builder: attach building data.
    pub fn with_building(mut self, building: BuildingInfo) -> Self {
        self.building = Some(building);
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn attr(&self, name: &str) -> Option<f64> {
        self.attrs.get(name).copied()
    }

    /// The tile an agent standing at `from` should walk to in order to use this thing.
    ///
    /// Buildings with service points resolve to the nearest service point; everything
    /// else resolves to its own position.
    pub fn approach_point(&self, from: GridPos) -> Option<GridPos> {
        self.building
            .as_ref()
            .and_then(|b| b.nearest_service_point(from))
            .or(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manhattan() {
        assert_eq!(GridPos::new(0, 0).manhattan(GridPos::new(3, -2)), 5);
        assert_eq!(GridPos::new(4, 4).manhattan(GridPos::new(4, 4)), 0);
    }

    #[test]
    fn test_thing_id_serializes_transparently() {
        let id = ThingId::from("npc-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""npc-1""#);
    }

    #[test]
    fn test_building_hours() {
        let day = BuildingInfo {
            open_hour: Some(9.0),
            close_hour: Some(17.0),
            ..Default::default()
        };
        assert!(day.is_open_at(9.0));
        assert!(day.is_open_at(16.99));
        assert!(!day.is_open_at(17.0));

        let night = BuildingInfo {
            open_hour: Some(20.0),
            close_hour: Some(2.0),
            ..Default::default()
        };
        assert!(night.is_open_at(23.0));
        assert!(night.is_open_at(1.0));
        assert!(!night.is_open_at(12.0));

        assert!(BuildingInfo::default().is_open_at(3.0));
    }

    #[test]
    fn test_approach_point_prefers_service_point() {
        let shop = ThingView::new("shop", "building").at(10, 10).with_building(BuildingInfo {
            service_points: vec![GridPos::new(8, 10), GridPos::new(12, 10)],
            ..Default::default()
        });
        assert_eq!(shop.approach_point(GridPos::new(0, 10)), Some(GridPos::new(8, 10)));
        assert_eq!(shop.approach_point(GridPos::new(20, 10)), Some(GridPos::new(12, 10)));

        let rock = ThingView::new("rock", "node").at(2, 2);
        assert_eq!(rock.approach_point(GridPos::new(0, 0)), Some(GridPos::new(2, 2)));
    }
}
