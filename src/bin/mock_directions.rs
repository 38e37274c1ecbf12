//! Mock directions API server
//!
//! Answers `POST /v2/directions/{profile}/geojson` like the real service for
//! local runs without an API key quota:
//! - 401 when the `Authorization` header is missing (or does not match `--api-key`)
//! - 400 for unknown profiles or malformed bodies
//! - otherwise a straight-line route between the two coordinates, with
//!   distance from the great-circle length and duration from a per-profile speed
//!
//! Usage:
//!   cargo run --bin mock-directions -- --port 8088 --latency-ms 300

use bytes::Bytes;
use campus_router::domain::types::{Coordinate, TravelProfile};
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "mock-directions")]
#[command(about = "Mock directions API for local simulation")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "8088")]
    port: u16,

    /// Delay before answering each request (ms)
    #[arg(long, default_value = "0")]
    latency_ms: u64,

    /// Require this exact Authorization value (any non-empty value if unset)
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct DirectionsBody {
    coordinates: Vec<[f64; 2]>,
}

/// Typical speed in m/s
fn profile_speed(profile: TravelProfile) -> f64 {
    match profile {
        TravelProfile::Car => 8.3,
        TravelProfile::BikeRegular => 4.2,
        TravelProfile::BikeElectric => 5.6,
        TravelProfile::Walking => 1.4,
    }
}

fn error_response(status: StatusCode, code: u32, message: &str) -> Response<Full<Bytes>> {
    let body = json!({ "error": { "code": code, "message": message } }).to_string();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn straight_route(origin: Coordinate, destination: Coordinate, profile: TravelProfile) -> Value {
    let distance = (origin.distance_to(&destination) * 10.0).round() / 10.0;
    let duration = (distance / profile_speed(profile) * 10.0).round() / 10.0;
    json!({
        "type": "FeatureCollection",
        "bbox": [
            origin.longitude.min(destination.longitude),
            origin.latitude.min(destination.latitude),
            origin.longitude.max(destination.longitude),
            origin.latitude.max(destination.latitude),
        ],
        "features": [{
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": [origin.lon_lat(), destination.lon_lat()],
            },
            "properties": {
                "segments": [{
                    "distance": distance,
                    "duration": duration,
                    "steps": [
                        { "distance": distance, "duration": duration, "type": 11,
                          "instruction": "Head toward your destination" },
                        { "distance": 0.0, "duration": 0.0, "type": 10,
                          "instruction": "Arrive at your destination" },
                    ],
                }],
                "summary": { "distance": distance, "duration": duration },
            },
        }],
        "metadata": { "query": { "profile": profile.as_str() } },
    })
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    args: Arc<Args>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let profile = path
        .strip_prefix("/v2/directions/")
        .and_then(|rest| rest.strip_suffix("/geojson"))
        .map(str::to_string);

    let Some(profile) = profile.filter(|_| req.method() == Method::POST) else {
        return Ok(error_response(StatusCode::NOT_FOUND, 404, "Not Found"));
    };

    let authorized = match req.headers().get("Authorization").and_then(|v| v.to_str().ok()) {
        Some(key) => args.api_key.as_deref().map_or(!key.is_empty(), |expected| key == expected),
        None => false,
    };
    if !authorized {
        println!("[MOCK] {} rejected: bad Authorization", path);
        return Ok(error_response(StatusCode::UNAUTHORIZED, 401, "Authorization field missing"));
    }

    let Ok(profile) = profile.parse::<TravelProfile>() else {
        println!("[MOCK] {} rejected: unknown profile", path);
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            2003,
            "Parameter 'profile' has incorrect value or format.",
        ));
    };

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Ok(error_response(StatusCode::BAD_REQUEST, 2000, "Unreadable body")),
    };
    let coordinates = match serde_json::from_slice::<DirectionsBody>(&body) {
        Ok(parsed) if parsed.coordinates.len() == 2 => parsed.coordinates,
        _ => {
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                2001,
                "Parameter 'coordinates' is missing or has incorrect format.",
            ))
        }
    };

    if args.latency_ms > 0 {
        tokio::time::sleep(Duration::from_millis(args.latency_ms)).await;
    }

    let origin = Coordinate::from(coordinates[0]);
    let destination = Coordinate::from(coordinates[1]);
    let route = straight_route(origin, destination, profile);
    println!(
        "[MOCK] {} {} -> {} ({} m)",
        profile.as_str(),
        origin,
        destination,
        route["features"][0]["properties"]["segments"][0]["distance"]
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/geo+json;charset=UTF-8")
        .body(Full::new(Bytes::from(route.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Arc::new(Args::parse());
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;

    println!("[MOCK] Directions API listening on {} (latency {} ms)", addr, args.latency_ms);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                eprintln!("[MOCK] Accept failed: {}", e);
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let args = args.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, args.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                eprintln!("[MOCK] Connection from {} failed: {}", peer, e);
            }
        });
    }
}
