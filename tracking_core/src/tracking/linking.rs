use super::points::{Point, TrackedPoint};
use super::{Result, TrackingError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkOptions {
    /// Largest displacement, in pixels, between linked points
    pub search_range: f64,
    /// Frames a particle may vanish for and still keep its track
    pub memory: u32,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            search_range: 10.0,
            memory: 5,
        }
    }
}

impl LinkOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.search_range.is_finite() || self.search_range <= 0.0 {
            return Err(TrackingError::InvalidParameter(format!(
                "search_range must be positive, got {}",
                self.search_range
            )));
        }
        Ok(())
    }
}

struct ActiveTrack {
    id: u64,
    last: usize,
    last_frame: i64,
}

/// Link points into tracks frame by frame.
///
/// Candidate pairs within `search_range` are assigned greedily, closest
/// first. Track ids start at 1 in order of first appearance. The result is
/// ordered by frame, keeping input order within a frame.
pub fn link(points: &[Point], options: &LinkOptions) -> Result<Vec<TrackedPoint>> {
    options.validate()?;

    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by_key(|&i| points[i].frame);

    let max_distance = options.search_range * options.search_range;
    let max_gap = i64::from(options.memory) + 1;

    let mut assignments = vec![0u64; points.len()];
    let mut active: Vec<ActiveTrack> = Vec::new();
    let mut next_id = 1u64;

    let mut start = 0;
    while start < order.len() {
        let frame = points[order[start]].frame;
        let end = start
            + order[start..]
                .iter()
                .take_while(|&&i| points[i].frame == frame)
                .count();
        let members = &order[start..end];

        active.retain(|track| frame.saturating_sub(track.last_frame) <= max_gap);

        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (track_index, track) in active.iter().enumerate() {
            for (member_index, &point_index) in members.iter().enumerate() {
                let distance = points[track.last].distance_squared(&points[point_index]);
                if distance <= max_distance {
                    candidates.push((distance, track_index, member_index));
                }
            }
        }
        candidates.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut track_taken = vec![false; active.len()];
        let mut member_taken = vec![false; members.len()];
        for (_, track_index, member_index) in candidates {
            if track_taken[track_index] || member_taken[member_index] {
                continue;
            }
            track_taken[track_index] = true;
            member_taken[member_index] = true;

            let point_index = members[member_index];
            let track = &mut active[track_index];
            assignments[point_index] = track.id;
            track.last = point_index;
            track.last_frame = frame;
        }

        for (member_index, &point_index) in members.iter().enumerate() {
            if !member_taken[member_index] {
                assignments[point_index] = next_id;
                active.push(ActiveTrack {
                    id: next_id,
                    last: point_index,
                    last_frame: frame,
                });
                next_id += 1;
            }
        }

        start = end;
    }

    debug!(
        points = points.len(),
        tracks = next_id - 1,
        "Linked points into tracks"
    );

    Ok(order
        .into_iter()
        .map(|i| TrackedPoint {
            track_id: assignments[i],
            point: points[i].clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(tracked: &[TrackedPoint]) -> Vec<u64> {
        tracked.iter().map(|t| t.track_id).collect()
    }

    #[test]
    fn test_links_two_moving_particles() {
        let points = vec![
            Point::new(0, 0.0, 0.0),
            Point::new(0, 50.0, 50.0),
            Point::new(1, 51.0, 50.0),
            Point::new(1, 1.0, 0.0),
            Point::new(2, 2.0, 0.0),
            Point::new(2, 52.0, 50.0),
        ];
        let tracked = link(&points, &LinkOptions { search_range: 5.0, memory: 0 }).unwrap();
        assert_eq!(ids(&tracked), vec![1, 2, 2, 1, 1, 2]);
    }

    #[test]
    fn test_memory_bridges_gaps() {
        let points = vec![
            Point::new(0, 0.0, 0.0),
            Point::new(3, 1.0, 0.0),
        ];

        let forgetful = link(&points, &LinkOptions { search_range: 5.0, memory: 1 }).unwrap();
        assert_eq!(ids(&forgetful), vec![1, 2]);

        let patient = link(&points, &LinkOptions { search_range: 5.0, memory: 2 }).unwrap();
        assert_eq!(ids(&patient), vec![1, 1]);
    }

    #[test]
    fn test_closest_pair_wins() {
        let points = vec![
            Point::new(0, 0.0, 0.0),
            Point::new(0, 0.0, 4.0),
            Point::new(1, 0.0, 3.0),
        ];
        let tracked = link(&points, &LinkOptions { search_range: 5.0, memory: 0 }).unwrap();
        assert_eq!(ids(&tracked), vec![1, 2, 2]);
    }

    #[test]
    fn test_out_of_range_starts_new_track() {
        let points = vec![Point::new(0, 0.0, 0.0), Point::new(1, 0.0, 20.0)];
        let tracked = link(&points, &LinkOptions { search_range: 5.0, memory: 0 }).unwrap();
        assert_eq!(ids(&tracked), vec![1, 2]);
    }

    #[test]
    fn test_extreme_frame_numbers() {
        let points = vec![
            Point::new(i64::MIN, 0.0, 0.0),
            Point::new(i64::MAX, 0.0, 1.0),
            Point::new(i64::MAX - 1, 0.0, 0.5),
        ];
        let tracked = link(&points, &LinkOptions::default()).unwrap();
        assert_eq!(tracked[0].point.frame, i64::MIN);
        assert_eq!(ids(&tracked), vec![1, 2, 2]);
    }

    #[test]
    fn test_rejects_bad_search_range() {
        let result = link(&[], &LinkOptions { search_range: 0.0, memory: 0 });
        assert!(matches!(result, Err(TrackingError::InvalidParameter(_))));
        assert!(link(&[], &LinkOptions::default()).unwrap().is_empty());
    }
}
