use super::*;

// =============================================================================
// haversine_m
// =============================================================================

#[test]
fn haversine_identical_points_is_zero() {
    let p = Coord::new(12.9, 77.6);
    assert!(haversine_m(p, p).abs() < 1e-9);
}

#[test]
fn haversine_one_degree_longitude_at_equator() {
    // One degree of arc on the mean-radius sphere: R * pi / 180.
    let a = Coord::new(0.0, 0.0);
    let b = Coord::new(0.0, 1.0);
    let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    assert!((haversine_m(a, b) - expected).abs() < 1.0);
}

#[test]
fn haversine_one_degree_latitude_matches_longitude_at_equator() {
    let origin = Coord::new(0.0, 0.0);
    let north = haversine_m(origin, Coord::new(1.0, 0.0));
    let east = haversine_m(origin, Coord::new(0.0, 1.0));
    assert!((north - east).abs() < 1e-6);
}

#[test]
fn haversine_is_symmetric() {
    let a = Coord::new(12.9, 77.6);
    let b = Coord::new(13.1, 77.7);
    assert!((haversine_m(a, b) - haversine_m(b, a)).abs() < 1e-9);
}

#[test]
fn haversine_short_urban_hop() {
    // ~0.0005 deg in each axis near Bengaluru: a bit under 80 m.
    let a = Coord::new(12.9, 77.6);
    let b = Coord::new(12.9005, 77.6005);
    let d = haversine_m(a, b);
    assert!(d > 60.0 && d < 90.0, "got {d}");
}

// =============================================================================
// bearing_deg
// =============================================================================

#[test]
fn bearing_due_north_is_zero() {
    let b = bearing_deg(Coord::new(0.0, 0.0), Coord::new(1.0, 0.0));
    assert!(b.abs() < 1e-9);
}

#[test]
fn bearing_due_east_is_ninety() {
    let b = bearing_deg(Coord::new(0.0, 0.0), Coord::new(0.0, 1.0));
    assert!((b - 90.0).abs() < 1e-9);
}

#[test]
fn bearing_due_south_is_one_eighty() {
    let b = bearing_deg(Coord::new(1.0, 0.0), Coord::new(0.0, 0.0));
    assert!((b - 180.0).abs() < 1e-9);
}

#[test]
fn bearing_due_west_normalized_into_range() {
    let b = bearing_deg(Coord::new(0.0, 1.0), Coord::new(0.0, 0.0));
    assert!((b - 270.0).abs() < 1e-9);
}

#[test]
fn bearing_always_in_range() {
    let pairs = [
        (Coord::new(51.5, -0.1), Coord::new(40.7, -74.0)),
        (Coord::new(-33.9, 151.2), Coord::new(35.7, 139.7)),
        (Coord::new(12.9, 77.6), Coord::new(12.8, 77.7)),
    ];
    for (a, b) in pairs {
        let deg = bearing_deg(a, b);
        assert!((0.0..360.0).contains(&deg), "bearing {deg} out of range");
    }
}

// =============================================================================
// lerp
// =============================================================================

#[test]
fn lerp_endpoints() {
    assert!((lerp(2.0, 10.0, 0.0) - 2.0).abs() < 1e-12);
    assert!((lerp(2.0, 10.0, 1.0) - 10.0).abs() < 1e-12);
}

#[test]
fn lerp_midpoint() {
    assert!((lerp(2.0, 10.0, 0.5) - 6.0).abs() < 1e-12);
}

#[test]
fn lerp_does_not_clamp() {
    assert!((lerp(0.0, 10.0, 1.5) - 15.0).abs() < 1e-12);
    assert!((lerp(0.0, 10.0, -0.5) + 5.0).abs() < 1e-12);
}

#[test]
fn lerp_coord_componentwise() {
    let a = Coord::new(10.0, 20.0);
    let b = Coord::new(12.0, 24.0);
    let mid = lerp_coord(a, b, 0.5);
    assert!((mid.lat - 11.0).abs() < 1e-12);
    assert!((mid.lng - 22.0).abs() < 1e-12);
}

// =============================================================================
// format_distance
// =============================================================================

#[test]
fn format_distance_meters() {
    assert_eq!(format_distance(0.0), "0 m");
    assert_eq!(format_distance(42.4), "42 m");
    assert_eq!(format_distance(999.0), "999 m");
}

#[test]
fn format_distance_kilometers() {
    assert_eq!(format_distance(1000.0), "1.0 km");
    assert_eq!(format_distance(1500.0), "1.5 km");
    assert_eq!(format_distance(12_340.0), "12.3 km");
}

// =============================================================================
// format_duration
// =============================================================================

#[test]
fn format_duration_under_a_minute() {
    assert_eq!(format_duration(0.0), "< 1 min");
    assert_eq!(format_duration(59.9), "< 1 min");
}

#[test]
fn format_duration_minutes() {
    assert_eq!(format_duration(60.0), "1 min");
    assert_eq!(format_duration(119.0), "1 min");
    assert_eq!(format_duration(3540.0), "59 min");
}

#[test]
fn format_duration_hours() {
    assert_eq!(format_duration(3600.0), "1h");
    assert_eq!(format_duration(3661.0), "1h 1m");
    assert_eq!(format_duration(7200.0), "2h");
    assert_eq!(format_duration(9000.0), "2h 30m");
}

// =============================================================================
// Coord
// =============================================================================

#[test]
fn null_island_detection() {
    assert!(Coord::new(0.0, 0.0).is_null_island());
    assert!(!Coord::new(0.0, 0.1).is_null_island());
    assert!(!Coord::new(12.9, 77.6).is_null_island());
}

#[test]
fn coord_serde_round_trip() {
    let c = Coord::new(12.9, 77.6);
    let json = serde_json::to_string(&c).unwrap();
    let restored: Coord = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, c);
}
