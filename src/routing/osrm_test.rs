use super::*;

fn test_client() -> OsrmClient {
    OsrmClient::new(RoutingConfig {
        base_url: "https://router.example.com".into(),
        profile: "driving".into(),
        request_timeout_secs: 10,
        connect_timeout_secs: 5,
    })
    .expect("client build")
}

// =============================================================================
// route_url
// =============================================================================

#[test]
fn route_url_uses_lng_lat_order() {
    let client = test_client();
    let url = client.route_url(Coord::new(12.9, 77.6), Coord::new(13.0, 77.7));
    assert_eq!(
        url,
        "https://router.example.com/route/v1/driving/77.6,12.9;77.7,13?overview=full&geometries=polyline"
    );
}

#[test]
fn route_url_respects_profile() {
    let client = OsrmClient::new(RoutingConfig {
        base_url: "http://localhost:5000".into(),
        profile: "walking".into(),
        request_timeout_secs: 10,
        connect_timeout_secs: 5,
    })
    .expect("client build");
    let url = client.route_url(Coord::new(0.0, 0.0), Coord::new(1.0, 1.0));
    assert!(url.starts_with("http://localhost:5000/route/v1/walking/"));
}

// =============================================================================
// parse_response
// =============================================================================

#[test]
fn parse_ok_response() {
    let json = r#"{
        "code": "Ok",
        "routes": [
            {"geometry": "_p~iF~ps|U_ulLnnqC", "distance": 4231.5, "duration": 512.0},
            {"geometry": "alternate", "distance": 5000.0, "duration": 700.0}
        ]
    }"#;
    let route = parse_response(json).expect("parse should succeed");
    assert_eq!(route.geometry, "_p~iF~ps|U_ulLnnqC");
    assert!((route.distance_m - 4231.5).abs() < f64::EPSILON);
    assert!((route.duration_s - 512.0).abs() < f64::EPSILON);
}

#[test]
fn parse_error_code_is_no_route() {
    let json = r#"{"code": "NoRoute", "routes": []}"#;
    let err = parse_response(json).expect_err("should fail");
    assert!(matches!(err, RoutingError::NoRoute(code) if code == "NoRoute"));
}

#[test]
fn parse_ok_with_empty_routes_is_no_route() {
    let json = r#"{"code": "Ok", "routes": []}"#;
    let err = parse_response(json).expect_err("should fail");
    assert!(matches!(err, RoutingError::NoRoute(_)));
}

#[test]
fn parse_ok_with_missing_routes_field_is_no_route() {
    let json = r#"{"code": "Ok"}"#;
    let err = parse_response(json).expect_err("should fail");
    assert!(matches!(err, RoutingError::NoRoute(_)));
}

#[test]
fn parse_malformed_json_is_parse_error() {
    let err = parse_response("{not json").expect_err("should fail");
    assert!(matches!(err, RoutingError::Parse(_)));
}

// =============================================================================
// RoutingError::retryable
// =============================================================================

#[test]
fn transport_and_server_errors_are_retryable() {
    assert!(RoutingError::Request("timeout".into()).retryable());
    assert!(RoutingError::Response { status: 503, body: String::new() }.retryable());
    assert!(RoutingError::Response { status: 429, body: String::new() }.retryable());
}

#[test]
fn permanent_failures_are_not_retryable() {
    assert!(!RoutingError::NoRoute("NoRoute".into()).retryable());
    assert!(!RoutingError::Parse("bad".into()).retryable());
    assert!(!RoutingError::Response { status: 400, body: String::new() }.retryable());
    assert!(!RoutingError::MissingBaseUrl { var: "ROUTING_BASE_URL".into() }.retryable());
}
