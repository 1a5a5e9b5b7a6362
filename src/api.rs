use std::io::Read;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::alarm::model::{Alarm, AlarmId};
use crate::alarm::scheduler::Intent;
use crate::runtime::RuntimeHandle;

const MAX_BODY_BYTES: u64 = 4 * 1024;

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

/// Local HTTP front end. Every request is forwarded to the runtime, so the
/// engine still sees one event at a time.
pub struct ApiServer {
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(config: ApiServerConfig, runtime: RuntimeHandle) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start API server on {bind}: {err}"))?;
        info!("API listening on http://{bind}/v1");
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let http_join =
            thread::spawn(move || run_server_loop(server, runtime, stop_for_thread));
        Ok(Self {
            stop,
            http_join: Some(http_join),
        })
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop(server: Server, runtime: RuntimeHandle, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => {
                if let Err(err) = handle_request(request, &runtime) {
                    warn!("API request failed: {err:#}");
                }
            }
            Ok(None) => continue,
            Err(_) => continue,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum Route {
    Health,
    State,
    Alarms,
    Intent(Intent),
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum RouteError {
    NotFound,
    MethodNotAllowed,
    BadRequest(String),
}

#[derive(Debug, Deserialize)]
struct TimeBody {
    time: String,
}

fn handle_request(mut request: tiny_http::Request, runtime: &RuntimeHandle) -> Result<()> {
    let Some(remote_addr) = request.remote_addr() else {
        return send_text(request, StatusCode(400), "missing remote address");
    };
    if !is_local_network_ip(remote_addr.ip()) {
        return send_text(request, StatusCode(403), "forbidden: local network only");
    }

    let method = request.method().clone();
    let url = request.url().to_string();
    let path = strip_query(&url);

    let mut raw_body = Vec::new();
    if matches!(method, Method::Post | Method::Put) {
        request
            .as_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut raw_body)?;
    }
    let body = match decode_body(raw_body) {
        Ok(body) => body,
        Err(message) => return send_text(request, StatusCode(400), &message),
    };
    debug!("API {method:?} {path}");

    match route(&method, path, &body) {
        Ok(Route::Health) => send_text(request, StatusCode(200), "ok"),
        Ok(Route::State) => {
            let state = runtime.query()?;
            send_json(request, StatusCode(200), &state)
        }
        Ok(Route::Alarms) => {
            #[derive(Serialize)]
            struct AlarmsResponse {
                count: usize,
                alarms: Vec<Alarm>,
            }

            let state = runtime.query()?;
            let payload = AlarmsResponse {
                count: state.alarms.len(),
                alarms: state.alarms,
            };
            send_json(request, StatusCode(200), &payload)
        }
        Ok(Route::Intent(intent)) => {
            let reply = runtime.submit(intent)?;
            send_json(request, StatusCode(200), &reply)
        }
        Err(RouteError::NotFound) => send_text(request, StatusCode(404), "not found"),
        Err(RouteError::MethodNotAllowed) => {
            send_text(request, StatusCode(405), "method not allowed")
        }
        Err(RouteError::BadRequest(message)) => send_text(request, StatusCode(400), &message),
    }
}

fn route(method: &Method, path: &str, body: &str) -> std::result::Result<Route, RouteError> {
    let segments = path
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();

    match (method, segments.as_slice()) {
        (Method::Get, ["healthz"]) => Ok(Route::Health),
        (Method::Get, [] | ["v1"] | ["v1", "state"]) => Ok(Route::State),
        (Method::Get, ["v1", "alarms"]) => Ok(Route::Alarms),
        (Method::Post, ["v1", "alarms"]) => Ok(Route::Intent(Intent::Add {
            time: parse_time_body(body)?,
        })),
        (Method::Put, ["v1", "alarms", id]) => Ok(Route::Intent(Intent::Update {
            id: parse_path_id(id)?,
            time: parse_time_body(body)?,
        })),
        (Method::Delete, ["v1", "alarms", id]) => Ok(Route::Intent(Intent::Delete {
            id: parse_path_id(id)?,
        })),
        (Method::Post, ["v1", "alarms", id, "edit"]) => Ok(Route::Intent(Intent::BeginEdit {
            id: parse_path_id(id)?,
        })),
        (Method::Post, ["v1", "submit"]) => Ok(Route::Intent(Intent::Submit {
            time: parse_time_body(body)?,
        })),
        (Method::Post, ["v1", "snooze"]) => Ok(Route::Intent(Intent::Snooze)),
        (Method::Post, ["v1", "cancel"]) => Ok(Route::Intent(Intent::Cancel)),
        (
            _,
            ["healthz"]
            | []
            | ["v1"]
            | ["v1", "state" | "alarms" | "submit" | "snooze" | "cancel"]
            | ["v1", "alarms", _]
            | ["v1", "alarms", _, "edit"],
        ) => Err(RouteError::MethodNotAllowed),
        _ => Err(RouteError::NotFound),
    }
}

fn decode_body(raw: Vec<u8>) -> std::result::Result<String, String> {
    String::from_utf8(raw).map_err(|_| "request body is not valid UTF-8".to_string())
}

fn parse_time_body(body: &str) -> std::result::Result<String, RouteError> {
    serde_json::from_str::<TimeBody>(body)
        .map(|parsed| parsed.time)
        .map_err(|err| RouteError::BadRequest(format!("invalid JSON body: {err}")))
}

fn parse_path_id(raw: &str) -> std::result::Result<AlarmId, RouteError> {
    raw.parse::<AlarmId>()
        .map_err(|_| RouteError::BadRequest(format!("'{raw}' is not an alarm id")))
}

fn send_json<T: Serialize>(
    request: tiny_http::Request,
    status: StatusCode,
    body: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_data(payload)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn strip_query(url: &str) -> &str {
    match url.split_once('?') {
        Some((path, _)) => path,
        None => url,
    }
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || is_ipv4_mapped_local(v6)
        }
    }
}

fn is_ipv4_mapped_local(v6: Ipv6Addr) -> bool {
    match v6.to_ipv4_mapped() {
        Some(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        None => false,
    }
}
