use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A detected object in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub frame: i64,
    pub y: f64,
    pub x: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// Per-object measurements such as `mean_intensity` or `radius`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, f64>,
}

impl Point {
    pub fn new(frame: i64, y: f64, x: f64) -> Self {
        Self {
            frame,
            y,
            x,
            z: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: f64) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn property(&self, name: &str) -> Option<f64> {
        self.properties.get(name).copied()
    }

    /// Squared distance; z only counts when both points carry it
    pub fn distance_squared(&self, other: &Point) -> f64 {
        let dz = match (self.z, other.z) {
            (Some(a), Some(b)) => a - b,
            _ => 0.0,
        };
        (self.y - other.y).powi(2) + (self.x - other.x).powi(2) + dz.powi(2)
    }

    /// Coordinates used for displacement: `[x, y]` or `[x, y, z]`
    pub fn position(&self) -> Vec<f64> {
        match self.z {
            Some(z) => vec![self.x, self.y, z],
            None => vec![self.x, self.y],
        }
    }
}

/// A point labelled with the track it was linked into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPoint {
    pub track_id: u64,
    #[serde(flatten)]
    pub point: Point,
}

/// All points of one track, ordered by frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: u64,
    pub points: Vec<Point>,
}

impl Track {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn positions(&self) -> Vec<Vec<f64>> {
        self.points.iter().map(Point::position).collect()
    }

    /// Mean of a property over the points that carry it
    pub fn mean_property(&self, name: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .points
            .iter()
            .filter_map(|p| p.property(name))
            .filter(|v| !v.is_nan())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// Keep points whose `property` lies in `[min, max]`; points without it are dropped
pub fn filter_points(points: &[Point], property: &str, min: f64, max: f64) -> Vec<Point> {
    points
        .iter()
        .filter(|p| p.property(property).is_some_and(|v| v >= min && v <= max))
        .cloned()
        .collect()
}

/// Group linked points into tracks ordered by id
pub fn group_tracks(tracked: &[TrackedPoint]) -> Vec<Track> {
    let mut grouped: BTreeMap<u64, Vec<Point>> = BTreeMap::new();
    for tracked_point in tracked {
        grouped
            .entry(tracked_point.track_id)
            .or_default()
            .push(tracked_point.point.clone());
    }

    grouped
        .into_iter()
        .map(|(id, mut points)| {
            points.sort_by_key(|p| p.frame);
            Track { id, points }
        })
        .collect()
}

/// Keep tracks whose length lies in `[min, max]`
pub fn filter_by_length(tracks: &[Track], min: usize, max: usize) -> Vec<Track> {
    tracks
        .iter()
        .filter(|t| t.len() >= min && t.len() <= max)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_points_by_property() {
        let points = vec![
            Point::new(0, 1.0, 1.0).with_property("mean_intensity", 50.0),
            Point::new(0, 2.0, 2.0).with_property("mean_intensity", 150.0),
            Point::new(0, 3.0, 3.0),
        ];
        let kept = filter_points(&points, "mean_intensity", 100.0, 200.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].x, 2.0);
    }

    #[test]
    fn test_group_and_filter_tracks() {
        let tracked = vec![
            TrackedPoint { track_id: 2, point: Point::new(1, 0.0, 0.0) },
            TrackedPoint { track_id: 1, point: Point::new(1, 5.0, 5.0) },
            TrackedPoint { track_id: 1, point: Point::new(0, 4.0, 4.0) },
        ];
        let tracks = group_tracks(&tracked);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, 1);
        assert_eq!(tracks[0].points[0].frame, 0);

        let long = filter_by_length(&tracks, 2, 10);
        assert_eq!(long.len(), 1);
        assert_eq!(long[0].id, 1);
    }

    #[test]
    fn test_point_geometry() {
        let a = Point::new(0, 0.0, 0.0).with_z(0.0);
        let b = Point::new(1, 3.0, 4.0).with_z(12.0);
        assert_eq!(a.distance_squared(&b), 169.0);
        assert_eq!(b.position(), vec![4.0, 3.0, 12.0]);
        assert_eq!(Point::new(0, 3.0, 4.0).distance_squared(&b), 0.0);
    }

    #[test]
    fn test_tracked_point_serializes_flat() {
        let tracked = TrackedPoint {
            track_id: 7,
            point: Point::new(3, 1.5, 2.5),
        };
        let value = serde_json::to_value(&tracked).unwrap();
        assert_eq!(value["track_id"], 7);
        assert_eq!(value["frame"], 3);
        assert_eq!(value["x"], 2.5);
    }
}
