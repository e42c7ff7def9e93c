use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use acq400_protocol::{CaptureState, KnobCommand, PortMap, Reply, Service};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::config::DeviceConfig;

/// Highest site number routed to the dead port when not configured.
const MAX_SITE: u8 = 15;
/// Highest channel number routed to the dead port when not configured.
const MAX_CHANNEL: u32 = 64;

pub struct MockSite {
    knobs: BTreeMap<String, String>,
    delay: Duration,
}

impl MockSite {
    pub fn new(model: &str) -> Self {
        let mut knobs = BTreeMap::new();
        knobs.insert("MODEL".to_owned(), model.to_owned());
        Self {
            knobs,
            delay: Duration::ZERO,
        }
    }

    pub fn knob(mut self, name: &str, value: &str) -> Self {
        self.knobs.insert(name.to_owned(), value.to_owned());
        self
    }

    /// Delay every reply, to simulate a site that never answers in time.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub enum MockService {
    /// Write the bytes (in `chunk`-sized writes), then close.
    Emit { data: Vec<u8>, chunk: usize },
    /// Reply `ack` to every received line; on client EOF write `last`, close.
    LineAck { ack: String, last: String },
    /// Read until client EOF, then write `reply` and close.
    Sink { reply: Vec<u8> },
}

impl MockService {
    pub fn emit(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let chunk = data.len().max(1);
        Self::Emit { data, chunk }
    }

    pub fn emit_chunked(data: impl Into<Vec<u8>>, chunk: usize) -> Self {
        Self::Emit {
            data: data.into(),
            chunk: chunk.max(1),
        }
    }
}

struct StatusScript {
    lines: Vec<String>,
    interval: Duration,
    close: bool,
}

#[derive(Default)]
struct MockState {
    sites: HashMap<u8, BTreeMap<String, String>>,
    writes: Vec<(u8, String)>,
    received: HashMap<Service, Vec<u8>>,
}

#[derive(Default)]
pub struct MockBuilder {
    sites: BTreeMap<u8, MockSite>,
    status: Option<StatusScript>,
    services: Vec<(Service, MockService)>,
}

impl MockBuilder {
    pub fn site(mut self, n: u8, site: MockSite) -> Self {
        self.sites.insert(n, site);
        self
    }

    /// Status feed sending `lines` spaced by `interval`, then held open.
    pub fn status(mut self, lines: &[&str], interval: Duration) -> Self {
        self.status = Some(StatusScript {
            lines: lines.iter().map(|l| (*l).to_owned()).collect(),
            interval,
            close: false,
        });
        self
    }

    /// Status feed that closes after its script.
    pub fn status_then_close(mut self, lines: &[&str], interval: Duration) -> Self {
        self.status = Some(StatusScript {
            lines: lines.iter().map(|l| (*l).to_owned()).collect(),
            interval,
            close: true,
        });
        self
    }

    pub fn service(mut self, service: Service, behaviour: MockService) -> Self {
        self.services.push((service, behaviour));
        self
    }

    pub async fn start(self) -> MockAppliance {
        let state = Arc::new(Mutex::new(MockState::default()));

        let mut site_listeners = Vec::new();
        for (n, site) in self.sites {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            state.lock().unwrap().sites.insert(n, site.knobs);
            site_listeners.push((n, site.delay, listener));
        }
        let mut status_listener = None;
        if let Some(script) = self.status {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            status_listener = Some((Arc::new(script), listener));
        }
        let mut service_listeners = Vec::new();
        for (service, behaviour) in self.services {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            service_listeners.push((service, Arc::new(behaviour), listener));
        }

        // Bound after the live listeners so it cannot collide with them.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_port = dead.local_addr().unwrap().port();
        drop(dead);

        let mut ports = PortMap::new();
        for n in 0..=MAX_SITE {
            ports.set_override(Service::Site(n), dead_port);
        }
        for ch in 1..=MAX_CHANNEL {
            ports.set_override(Service::Channel(ch), dead_port);
        }
        for svc in [
            Service::Status,
            Service::SegmentWrite,
            Service::SegmentRead,
            Service::DpgStl,
            Service::GpgStl,
            Service::GpgDump,
            Service::MgtDram,
            Service::LiveTop,
            Service::OneShot,
            Service::AwgOnce,
            Service::AwgAutoRearm,
        ] {
            ports.set_override(svc, dead_port);
        }

        for (n, delay, listener) in site_listeners {
            ports.set_override(Service::Site(n), listener.local_addr().unwrap().port());
            let state = state.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve_site(stream, n, delay, state.clone()));
                }
            });
        }

        if let Some((script, listener)) = status_listener {
            ports.set_override(Service::Status, listener.local_addr().unwrap().port());
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve_status(stream, script.clone()));
                }
            });
        }

        for (service, behaviour, listener) in service_listeners {
            ports.set_override(service, listener.local_addr().unwrap().port());
            let state = state.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve_service(
                        stream,
                        service,
                        behaviour.clone(),
                        state.clone(),
                    ));
                }
            });
        }

        MockAppliance { state, ports }
    }
}

pub struct MockAppliance {
    state: Arc<Mutex<MockState>>,
    ports: PortMap,
}

impl MockAppliance {
    pub fn builder() -> MockBuilder {
        MockBuilder::default()
    }

    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    /// Device config routed to this mock, with an inert fatal hook.
    pub fn config(&self) -> DeviceConfig {
        DeviceConfig {
            ports: self.ports.clone(),
            read_timeout: Some(Duration::from_secs(5)),
            fatal_hook: Some(Arc::new(|_: CaptureState, _: CaptureState| {})),
            ..DeviceConfig::default()
        }
    }

    /// Knob writes seen by every site, in arrival order.
    pub fn writes(&self) -> Vec<(u8, String)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn knob(&self, site: u8, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .sites
            .get(&site)
            .and_then(|k| k.get(name).cloned())
    }

    pub fn set_knob(&self, site: u8, name: &str, value: &str) {
        if let Some(knobs) = self.state.lock().unwrap().sites.get_mut(&site) {
            knobs.insert(name.to_owned(), value.to_owned());
        }
    }

    /// Bytes received by `service` once its connection has finished.
    pub async fn received(&self, service: Service) -> Vec<u8> {
        for _ in 0..200 {
            if let Some(data) = self.state.lock().unwrap().received.get(&service) {
                return data.clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("service {service:?} received nothing");
    }
}

async fn serve_site(stream: TcpStream, site: u8, delay: Duration, state: Arc<Mutex<MockState>>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = site_reply(&state, site, line.trim());
        if write_half.write_all(&reply.to_bytes()).await.is_err() {
            break;
        }
        let _ = write_half.flush().await;
    }
}

fn site_reply(state: &Mutex<MockState>, site: u8, line: &str) -> Reply {
    let mut state = state.lock().unwrap();

    if line == "help" {
        let knobs = &state.sites[&site];
        return Reply::Value(knobs.keys().cloned().collect::<Vec<_>>().join(" "));
    }

    match KnobCommand::parse(line) {
        Ok(KnobCommand::Query { name }) => match state.sites[&site].get(&name) {
            Some(value) => Reply::Value(value.clone()),
            None => Reply::Error(format!("unknown knob {name}")),
        },
        Ok(KnobCommand::Set { name, value }) => {
            let known = name.starts_with('*') || state.sites[&site].contains_key(&name);
            if !known {
                return Reply::Error(format!("unknown knob {name}"));
            }
            state.writes.push((site, format!("{name}={value}")));
            if let Some(knobs) = state.sites.get_mut(&site) {
                knobs.insert(name, value);
            }
            Reply::Value(String::new())
        }
        _ => Reply::Error(format!("bad command {line}")),
    }
}

async fn serve_status(mut stream: TcpStream, script: Arc<StatusScript>) {
    for line in &script.lines {
        tokio::time::sleep(script.interval).await;
        if stream.write_all(format!("{line}\n").as_bytes()).await.is_err() {
            return;
        }
        let _ = stream.flush().await;
    }
    if script.close {
        let _ = stream.shutdown().await;
        return;
    }
    let mut sink = Vec::new();
    let _ = stream.read_to_end(&mut sink).await;
}

async fn serve_service(
    stream: TcpStream,
    service: Service,
    behaviour: Arc<MockService>,
    state: Arc<Mutex<MockState>>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut received = Vec::new();

    match behaviour.as_ref() {
        MockService::Emit { data, chunk } => {
            for piece in data.chunks(*chunk) {
                if write_half.write_all(piece).await.is_err() {
                    return;
                }
                let _ = write_half.flush().await;
                tokio::task::yield_now().await;
            }
            let _ = write_half.shutdown().await;
        }
        MockService::LineAck { ack, last } => {
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                received.extend_from_slice(&line);
                let _ = write_half.write_all(ack.as_bytes()).await;
                let _ = write_half.flush().await;
            }
            let _ = write_half.write_all(last.as_bytes()).await;
            let _ = write_half.shutdown().await;
        }
        MockService::Sink { reply } => {
            let _ = reader.read_to_end(&mut received).await;
            let _ = write_half.write_all(reply).await;
            let _ = write_half.shutdown().await;
        }
    }

    state.lock().unwrap().received.insert(service, received);
}
