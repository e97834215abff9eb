use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::pad_db::db_structs::Request;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_MAX_AGE_MINUTES: f64 = 15.0;
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 50.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let sin_dlat = (d_lat / 2.0).sin();
    let sin_dlon = (d_lon / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

// Clients never see exact distances on request cards, only bands.
// Upper bounds are inclusive: 100 m is still "0-100".
pub fn proximity_band(distance_m: f64) -> &'static str {
    assert!(distance_m >= 0.0, "negative distance passed to proximity_band");
    if distance_m <= 100.0 {
        "0-100"
    } else if distance_m <= 250.0 {
        "100-250"
    } else if distance_m <= 500.0 {
        "250-500"
    } else if distance_m <= 1000.0 {
        "500-1000"
    } else {
        ">1000"
    }
}

pub fn proximity_label(band: &str) -> &'static str {
    match band {
        "0-100" => "in this building",
        "100-250" => "very nearby",
        "250-500" => "nearby",
        "500-1000" => "in the area",
        ">1000" => "further away",
        _ => "nearby",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyRequest {
    #[serde(flatten)]
    pub request: Request,
    pub distance_km: f64,
    pub band: &'static str,
    pub band_label: &'static str,
}

// Candidate selection for the helper-side feed: pending only, never your own,
// nothing older than max_age_minutes, nothing farther than max_distance_km,
// closest first. A request whose creation stamp is not visible yet is treated
// as not expired, so a fresh post is never hidden while the server stamp
// settles.
pub fn nearby(
    all: &[Request],
    origin: GeoPoint,
    self_owner_id: &str,
    max_age_minutes: f64,
    max_distance_km: f64,
    now_ts: f64,
) -> Vec<NearbyRequest> {
    all.iter()
        .filter(|r| {
            if r.request_id.is_empty() || r.request_owner_id.is_empty() || r.request_status.is_empty() {
                return false;
            }
            if r.request_status != "pending" {
                return false;
            }
            if r.request_owner_id == self_owner_id {
                return false;
            }
            match r.request_created_ts {
                Some(created_ts) => now_ts - created_ts <= max_age_minutes * 60.0,
                None => true,
            }
        })
        .map(|r| {
            let distance_km = haversine_km(origin, GeoPoint {
                latitude: r.request_latitude,
                longitude: r.request_longitude,
            });
            let band = proximity_band(distance_km * 1000.0);
            NearbyRequest {
                request: r.clone(),
                distance_km,
                band,
                band_label: proximity_label(band),
            }
        })
        .filter(|n| n.distance_km <= max_distance_km)
        .sorted_by(|a, b| a.distance_km.partial_cmp(&b.distance_km).unwrap_or(std::cmp::Ordering::Equal))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn pt(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint { latitude, longitude }
    }

    fn pending_request(id: &str, owner: &str, latitude: f64, longitude: f64, created_ts: Option<f64>) -> Request {
        Request {
            request_id: id.to_string(),
            request_owner_id: owner.to_string(),
            request_latitude: latitude,
            request_longitude: longitude,
            request_status: "pending".to_string(),
            request_urgency: "normal".to_string(),
            request_created_ts: created_ts,
            ..Default::default()
        }
    }

    #[test]
    fn test_haversine_symmetric_and_zero_on_identity() {
        let a = pt(40.0, -73.0);
        let b = pt(40.001, -73.001);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-12);
        assert_eq!(haversine_km(a, a), 0.0);
    }

    #[test]
    fn test_haversine_triangle_inequality() {
        let a = pt(40.0, -73.0);
        let b = pt(40.5, -73.5);
        let c = pt(41.0, -72.5);
        let ab = haversine_km(a, b);
        let bc = haversine_km(b, c);
        let ac = haversine_km(a, c);
        assert!(ac <= ab + bc + 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // ~0.14 km for one thousandth of a degree in both axes at 40N
        let d = haversine_km(pt(40.000, -73.000), pt(40.001, -73.001));
        assert!(d > 0.10 && d < 0.20, "got {}", d);
    }

    #[test]
    fn test_band_boundaries_inclusive() {
        assert_eq!(proximity_band(99.0), "0-100");
        assert_eq!(proximity_band(100.0), "0-100");
        assert_eq!(proximity_band(101.0), "100-250");
        assert_eq!(proximity_band(250.0), "100-250");
        assert_eq!(proximity_band(500.0), "250-500");
        assert_eq!(proximity_band(1000.0), "500-1000");
        assert_eq!(proximity_band(1001.0), ">1000");
        assert_eq!(proximity_band(0.0), "0-100");
    }

    #[test]
    #[should_panic]
    fn test_band_rejects_negative_distance() {
        proximity_band(-1.0);
    }

    #[test]
    fn test_band_labels() {
        assert_eq!(proximity_label("0-100"), "in this building");
        assert_eq!(proximity_label(">1000"), "further away");
        assert_eq!(proximity_label("garbage"), "nearby");
    }

    #[test]
    fn test_nearby_excludes_matched_own_and_expired() {
        let now = 10_000.0;
        let origin = pt(40.0, -73.0);
        let mut matched = pending_request("r1", "other", 40.001, -73.001, Some(now - 60.0));
        matched.request_status = "matched".to_string();
        let own = pending_request("r2", "me", 40.001, -73.001, Some(now - 60.0));
        let too_old = pending_request("r3", "other", 40.001, -73.001, Some(now - 16.0 * 60.0));
        let fresh_far = pending_request("r4", "other", 40.09, -73.0, Some(now - 14.0 * 60.0)); // ~10 km
        let all = vec![matched, own, too_old, fresh_far];
        let result = nearby(&all, origin, "me", 15.0, 50.0, now);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].request.request_id, "r4");
    }

    #[test]
    fn test_nearby_missing_created_ts_never_expires() {
        let now = 1e9;
        let all = vec![pending_request("r1", "other", 40.0005, -73.0, None)];
        let result = nearby(&all, pt(40.0, -73.0), "me", 15.0, 50.0, now);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_nearby_excludes_beyond_max_distance() {
        let now = 0.0;
        let all = vec![pending_request("r1", "other", 41.0, -73.0, None)]; // ~111 km north
        assert!(nearby(&all, pt(40.0, -73.0), "me", 15.0, 50.0, now).is_empty());
    }

    #[test]
    fn test_nearby_sorted_ascending_with_bands() {
        let now = 0.0;
        let all = vec![
            pending_request("far", "a", 40.01, -73.0, None),    // ~1.1 km
            pending_request("close", "b", 40.0005, -73.0, None), // ~55 m
            pending_request("mid", "c", 40.003, -73.0, None),   // ~330 m
        ];
        let result = nearby(&all, pt(40.0, -73.0), "me", 15.0, 50.0, now);
        let ids: Vec<&str> = result.iter().map(|n| n.request.request_id.as_str()).collect();
        assert_eq!(ids, vec!["close", "mid", "far"]);
        assert_eq!(result[0].band, "0-100");
        assert_eq!(result[0].band_label, "in this building");
        assert_eq!(result[1].band, "250-500");
        assert_eq!(result[2].band, ">1000");
    }
}
