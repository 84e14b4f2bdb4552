//! Geospatial distance and ranking
//!
//! Haversine great-circle distance plus radius filtering and ascending
//! distance ordering over candidate restaurant sets. Ranking performs no
//! pagination: it is correct whether fed a partial page or the complete
//! candidate set.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters.
///
/// Symmetric, and zero for coincident points modulo floating precision.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// A candidate annotated with its distance from the ranking origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub distance_meters: f64,
    pub candidate: T,
}

/// Filter candidates to those within `radius_m` of the origin, then sort
/// ascending by distance. The sort is stable, so equidistant candidates
/// keep their input order.
pub fn rank_nearby<T, F>(
    origin_lat: f64,
    origin_lon: f64,
    candidates: Vec<T>,
    radius_m: f64,
    position: F,
) -> Vec<Ranked<T>>
where
    F: Fn(&T) -> (f64, f64),
{
    let mut ranked: Vec<Ranked<T>> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let (lat, lon) = position(&candidate);
            let distance = distance_meters(origin_lat, origin_lon, lat, lon);
            (distance <= radius_m).then_some(Ranked {
                distance_meters: distance,
                candidate,
            })
        })
        .collect();

    ranked.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coincident_points_have_zero_distance() {
        assert_eq!(distance_meters(37.7749, -122.4194, 37.7749, -122.4194), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let ab = distance_meters(37.7749, -122.4194, 34.0522, -118.2437);
        let ba = distance_meters(34.0522, -118.2437, 37.7749, -122.4194);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn one_degree_latitude_near_equator() {
        // 1 degree of latitude is about 111,195 m at this radius.
        let d = distance_meters(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn respects_triangle_inequality() {
        let a = (37.7749, -122.4194);
        let b = (36.1699, -115.1398);
        let c = (34.0522, -118.2437);
        let ab = distance_meters(a.0, a.1, b.0, b.1);
        let bc = distance_meters(b.0, b.1, c.0, c.1);
        let ac = distance_meters(a.0, a.1, c.0, c.1);
        assert!(ac <= ab + bc + 1e-6);
    }

    #[test]
    fn rank_filters_and_sorts_ascending() {
        // Candidates at roughly 0m, ~1.1km, ~11km, ~111km north of origin.
        let candidates = vec![
            ("far", 1.0, 0.0),
            ("near", 0.01, 0.0),
            ("here", 0.0, 0.0),
            ("mid", 0.1, 0.0),
        ];
        let ranked = rank_nearby(0.0, 0.0, candidates, 50_000.0, |c| (c.1, c.2));

        let names: Vec<&str> = ranked.iter().map(|r| r.candidate.0).collect();
        assert_eq!(names, vec!["here", "near", "mid"]);
        assert!(ranked[0].distance_meters < 1.0);
        assert!(ranked.last().unwrap().distance_meters <= 50_000.0);
    }

    #[test]
    fn equidistant_candidates_keep_input_order() {
        // Same latitude offset north and the duplicate entry after it.
        let candidates = vec![("first", 0.01, 0.0), ("second", 0.01, 0.0)];
        let ranked = rank_nearby(0.0, 0.0, candidates, 10_000.0, |c| (c.1, c.2));
        let names: Vec<&str> = ranked.iter().map(|r| r.candidate.0).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn partial_candidate_sets_rank_correctly() {
        let full = vec![("a", 0.02, 0.0), ("b", 0.01, 0.0), ("c", 0.03, 0.0)];
        let partial = vec![("a", 0.02, 0.0), ("b", 0.01, 0.0)];

        let ranked_partial = rank_nearby(0.0, 0.0, partial, 10_000.0, |c| (c.1, c.2));
        let names: Vec<&str> = ranked_partial.iter().map(|r| r.candidate.0).collect();
        assert_eq!(names, vec!["b", "a"]);

        let ranked_full = rank_nearby(0.0, 0.0, full, 10_000.0, |c| (c.1, c.2));
        let names: Vec<&str> = ranked_full.iter().map(|r| r.candidate.0).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
