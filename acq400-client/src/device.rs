use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use acq400_protocol::calibration::{self, OFFSET_REGISTER, SLOPE_REGISTER};
use acq400_protocol::routing::dx;
use acq400_protocol::scale::{self, ModuleFormat};
use acq400_protocol::sitelist::{parse_aggregator_sites, parse_site_list};
use acq400_protocol::stl::{STL_EOF, stl_lines};
use acq400_protocol::{
    CaptureState, ClockSource, SampleWidth, Samples, Service, StatusTuple, SyncRole,
    TriggerSource,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::calibration::CalibrationTable;
use crate::channel::ChannelClient;
use crate::config::DeviceConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::monitor::StatusMonitor;
use crate::process::{DEFAULT_TERMINATOR, LineSink, ProcessMonitor};
use crate::site::SiteHandle;
use crate::variant::KnobStep;

/// Highest `clkdiv` tried when the requested clock is below the PLL minimum.
const MAX_CLKDIV: u64 = 2000;

/// Host-side proxy for one ACQ400 appliance.
///
/// Opening connects the root site, discovers every populated module site in
/// parallel, reads the initial capture status and (unless disabled) starts a
/// [`StatusMonitor`]. Sites are looked up by name (`"s0"`, `"s1"`, `"cA"`).
///
/// # Example
///
/// ```no_run
/// # async fn example() -> acq400_client::Result<()> {
/// use acq400_client::DeviceProxy;
///
/// let uut = DeviceProxy::open("acq2106_123").await?;
/// println!("{} modules, model {}", uut.mod_count(), uut.s0().model());
/// uut.wait_stopped().await?;
/// let data = uut.read_channels(&[1, 2]).await?;
/// # Ok(())
/// # }
/// ```
pub struct DeviceProxy {
    addr: String,
    config: DeviceConfig,
    s0: Arc<SiteHandle>,
    services: BTreeMap<String, Arc<SiteHandle>>,
    modules: BTreeMap<u8, Arc<SiteHandle>>,
    awg_site: Option<u8>,
    initial: StatusTuple,
    monitor: Option<StatusMonitor>,
    calibration: Mutex<CalibrationTable>,
}

impl DeviceProxy {
    /// Open `addr` with default configuration.
    ///
    /// An unreachable root service is [`ClientError::Connect`], whether the
    /// connect was refused or timed out.
    pub async fn open(addr: &str) -> Result<Self> {
        Self::open_with_config(addr, DeviceConfig::default()).await
    }

    pub async fn open_with_config(addr: &str, config: DeviceConfig) -> Result<Self> {
        info!(addr, variant = config.variant.name, "opening device");

        let s0 = Arc::new(SiteHandle::connect(addr, "s0", 0, &config).await?);
        let site_list = parse_site_list(&s0.get("SITELIST").await?)?;
        debug!(addr, sites = ?site_list, "site list");

        let modules = discover(addr, &site_list, &config).await;
        let awg_site = modules
            .iter()
            .find(|(_, m)| m.model().starts_with("ao"))
            .map(|(&n, _)| n);

        let mut services = BTreeMap::new();
        services.insert("s0".to_owned(), s0.clone());
        for (n, m) in &modules {
            services.insert(format!("s{n}"), m.clone());
        }

        let mut extras: Vec<_> = config.variant.extra_sites.to_vec();
        if config.has_mgtdram
            && let Some(mgt) = config.variant.mgtdram_site
        {
            extras.push(mgt);
        }
        for extra in extras {
            match SiteHandle::connect(addr, extra.name, extra.site, &config).await {
                Ok(handle) => {
                    services.insert(extra.name.to_owned(), Arc::new(handle));
                }
                Err(e) => warn!(addr, site = extra.site, error = %e, "site not populated"),
            }
        }

        let initial = StatusTuple::parse(&s0.get("state").await?)?;
        let monitor = if config.monitor {
            Some(StatusMonitor::connect(addr, initial, &config).await?)
        } else {
            None
        };

        info!(
            addr,
            mod_count = modules.len(),
            awg_site = ?awg_site,
            state = %initial.state,
            "device open"
        );

        Ok(Self {
            addr: addr.to_owned(),
            config,
            s0,
            services,
            modules,
            awg_site,
            initial,
            monitor,
            calibration: Mutex::new(CalibrationTable::new()),
        })
    }

    /// Open several devices in parallel.
    ///
    /// Each open is joined for at most `config.discovery_timeout`; devices
    /// that fail or time out are logged and left out.
    pub async fn open_many(addrs: &[&str], config: &DeviceConfig) -> Vec<DeviceProxy> {
        let tasks: Vec<_> = addrs
            .iter()
            .map(|&addr| {
                let addr = addr.to_owned();
                let config = config.clone();
                tokio::spawn(async move { DeviceProxy::open_with_config(&addr, config).await })
            })
            .collect();

        let mut devices = Vec::with_capacity(addrs.len());
        for (addr, mut task) in addrs.iter().zip(tasks) {
            match tokio::time::timeout(config.discovery_timeout, &mut task).await {
                Ok(Ok(Ok(device))) => devices.push(device),
                Ok(Ok(Err(e))) => warn!(addr, error = %e, "open failed"),
                Ok(Err(e)) => warn!(addr, error = %e, "open task failed"),
                Err(_) => {
                    task.abort();
                    warn!(addr, "open timed out");
                }
            }
        }
        devices
    }

    // -- Lookup --

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Site service by dispatch name.
    pub fn resolve(&self, name: &str) -> Result<Arc<SiteHandle>> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::SiteNotFound(name.to_owned()))
    }

    /// Site service by number.
    pub fn site(&self, n: u8) -> Result<Arc<SiteHandle>> {
        self.resolve(&format!("s{n}"))
    }

    /// Root site service.
    pub fn s0(&self) -> &Arc<SiteHandle> {
        &self.s0
    }

    /// Every connected site service, by name.
    pub fn sites(&self) -> impl Iterator<Item = (&str, &Arc<SiteHandle>)> {
        self.services.iter().map(|(name, h)| (name.as_str(), h))
    }

    /// Enumerated module sites, by site number.
    pub fn modules(&self) -> impl Iterator<Item = (u8, &Arc<SiteHandle>)> {
        self.modules.iter().map(|(&n, h)| (n, h))
    }

    /// Number of module sites discovered from `SITELIST`.
    pub fn mod_count(&self) -> usize {
        self.modules.len()
    }

    /// Lowest site holding an `ao*` module.
    pub fn awg_site(&self) -> Option<u8> {
        self.awg_site
    }

    // -- Status --

    pub fn monitor(&self) -> Option<&StatusMonitor> {
        self.monitor.as_ref()
    }

    /// Latest status, or the snapshot read at open when unmonitored.
    pub fn status(&self) -> StatusTuple {
        self.monitor
            .as_ref()
            .map_or(self.initial, StatusMonitor::status)
    }

    pub fn state(&self) -> CaptureState {
        self.status().state
    }

    pub fn pre_samples(&self) -> u64 {
        self.status().pre
    }

    pub fn post_samples(&self) -> u64 {
        self.status().post
    }

    pub fn elapsed_samples(&self) -> u64 {
        self.status().elapsed
    }

    pub fn demux_status(&self) -> u64 {
        self.status().demux
    }

    /// `pre + post` of the last shot.
    pub fn samples(&self) -> u64 {
        self.status().samples()
    }

    pub async fn wait_armed(&self) -> Result<()> {
        match &self.monitor {
            Some(m) => m.wait_armed().await,
            None => Err(ClientError::MonitorStopped),
        }
    }

    pub async fn wait_stopped(&self) -> Result<()> {
        match &self.monitor {
            Some(m) => m.wait_stopped().await,
            None => Err(ClientError::MonitorStopped),
        }
    }

    // -- Data --

    /// Channel count from the root site.
    pub async fn nchan(&self) -> Result<u32> {
        self.s0.get_parsed("NCHAN").await
    }

    /// Sites contributing to the aggregated data stream.
    pub async fn aggregator_sites(&self) -> Result<Vec<u8>> {
        Ok(parse_aggregator_sites(&self.s0.get("aggregator").await?)?)
    }

    /// Right-justify raw words using the format of the first module.
    ///
    /// `volts` keeps 8 more bits for 32-bit formats, matching the 24-bit
    /// normalisation of the volts calibration.
    pub async fn scale_raw(&self, raw: &[i32], volts: bool) -> Result<Vec<i32>> {
        let Some(module) = self.modules.values().next() else {
            return Ok(raw.to_vec());
        };

        let format = if module.model().starts_with("ACQ43") {
            ModuleFormat::from_knobs(module.model(), "0", "0")
        } else {
            let data32 = module.get("data32").await?;
            let adc_18b = if data32.trim() == "1" {
                module.get("adc_18b").await?
            } else {
                "0".to_owned()
            };
            ModuleFormat::from_knobs(module.model(), &data32, &adc_18b)
        };

        let shift = scale::rshift(&format, volts);
        debug!(site = module.name(), shift, volts, "scale_raw");
        Ok(scale::apply_shift(raw, shift))
    }

    /// Calibrated volts for `raw` codes of `channel` (1..=nchan).
    ///
    /// Coefficients are fetched from every aggregated module on first use.
    pub async fn chan2volts(&self, channel: u32, raw: &[i32]) -> Result<Vec<f64>> {
        let mut table = self.calibration.lock().await;
        if !table.is_fetched() {
            *table = self.fetch_all_calibration().await?;
        }
        table.apply(channel, raw)
    }

    async fn fetch_all_calibration(&self) -> Result<CalibrationTable> {
        info!(addr = %self.addr, "fetching calibration data");
        let mut table = CalibrationTable::new();
        for site in self.aggregator_sites().await? {
            let module = self
                .modules
                .get(&site)
                .ok_or_else(|| ClientError::SiteNotFound(format!("s{site}")))?;
            let slope = calibration::parse_register(SLOPE_REGISTER, &module.get(SLOPE_REGISTER).await?)?;
            let offset =
                calibration::parse_register(OFFSET_REGISTER, &module.get(OFFSET_REGISTER).await?)?;
            debug!(site, channels = slope.len(), "calibration");
            table.extend(slope, offset);
        }
        Ok(table)
    }

    /// Read `nsam` samples of one channel; `0` means the last shot's
    /// `pre + post`.
    pub async fn read_chan(&self, channel: u32, nsam: usize) -> Result<Samples> {
        let nsam = if nsam == 0 {
            usize::try_from(self.samples())
                .map_err(|_| ClientError::InvalidArgument("sample count overflows".into()))?
        } else {
            nsam
        };
        let width = SampleWidth::from_data32(&self.s0.get("data32").await?);

        let mut cc = ChannelClient::connect(&self.addr, channel, &self.config).await?;
        let samples = cc.read(nsam, width, self.config.max_chunk).await?;

        if let Some(dir) = &self.config.save_dir {
            tokio::fs::create_dir_all(dir).await?;
            let path = dir.join(format!("{}_CH{channel:02}", self.addr));
            tokio::fs::write(&path, samples.to_le_bytes()).await?;
            debug!(path = %path.display(), "saved");
        }
        Ok(samples)
    }

    /// Read post-shot data of `channels`; empty means `1..=nchan`.
    pub async fn read_channels(&self, channels: &[u32]) -> Result<Vec<Samples>> {
        let channels = if channels.is_empty() {
            (1..=self.nchan().await?).collect()
        } else {
            channels.to_vec()
        };

        let mut chx = Vec::with_capacity(channels.len());
        for ch in channels {
            let start = Instant::now();
            let samples = self.read_chan(ch, 0).await?;
            if self.config.trace > 0 {
                let secs = start.elapsed().as_secs_f64();
                let bytes = samples.len() * samples.width().bytes();
                let mb_per_s = if secs > 0.0 { bytes as f64 / 1e6 / secs } else { 0.0 };
                info!(addr = %self.addr, channel = ch, secs, mb_per_s, "channel complete");
            }
            chx.push(samples);
        }
        Ok(chx)
    }

    // -- Orchestration --

    /// Reset the counters of every site service.
    pub async fn clear_counters(&self) -> Result<()> {
        for site in self.services.values() {
            site.sr("*RESET=1").await?;
        }
        Ok(())
    }

    /// Drive clock and trigger onto the HDMI sync chain on lines `clk_dx` and
    /// `trg_dx`.
    pub async fn set_sync_routing_master(&self, clk_dx: &str, trg_dx: &str) -> Result<()> {
        self.s0.set("SIG_SYNC_OUT_CLK", "CLK").await?;
        self.s0.set("SIG_SYNC_OUT_CLK_DX", clk_dx).await?;
        self.s0.set("SIG_SYNC_OUT_TRG", "TRG").await?;
        self.s0.set("SIG_SYNC_OUT_TRG_DX", trg_dx).await
    }

    /// Take clock and trigger from the HDMI sync chain, and repeat them on.
    pub async fn set_sync_routing_slave(&self) -> Result<()> {
        self.set_sync_routing_master(dx::MB_CLK, dx::EXT_TRG).await?;
        self.s0.set("SIG_SRC_CLK_1", "HDMI").await?;
        self.s0.set("SIG_SRC_TRG_0", "HDMI").await?;
        self.apply_steps(self.config.variant.slave_routing_steps).await
    }

    pub async fn set_sync_routing(&self, role: SyncRole) -> Result<()> {
        match role {
            SyncRole::Master => self.set_sync_routing_master(dx::MB_CLK, dx::EXT_TRG).await,
            SyncRole::Slave => self.set_sync_routing_slave().await,
        }
    }

    /// Program the motherboard clock to `hz` from `source`.
    ///
    /// Rates below the variant's PLL minimum run the PLL at `hz * clkdiv`
    /// and divide on site 1.
    pub async fn set_mb_clk(&self, hz: u64, source: ClockSource) -> Result<()> {
        info!(addr = %self.addr, hz, ?source, "set_mb_clk");
        if source == ClockSource::Zclk {
            self.s0.set("SIG_ZCLK_SRC", "INT33M").await?;
        }
        let (fpmux, fin) = source.fpmux_and_fin();
        self.s0.set("SYS_CLK_FPMUX", fpmux).await?;
        self.s0.set("SIG_CLK_MB_FIN", fin).await?;

        let min = self.config.variant.mb_clk_min;
        let (mb_set, clkdiv) = if hz >= min {
            (hz, 1)
        } else {
            (1..MAX_CLKDIV)
                .find(|&div| hz * div >= min)
                .map(|div| (hz * div, div))
                .ok_or_else(|| ClientError::InvalidArgument(format!("frequency out of range {hz}")))?
        };

        self.s0.set("SIG_CLK_MB_SET", mb_set).await?;
        info!(clkdiv, "putting CLKDIV on site 1");
        self.site(1)?.set("CLKDIV", clkdiv).await?;

        self.apply_steps(self.config.variant.clock_steps).await
    }

    /// Select the master trigger input.
    pub async fn set_master_trg(&self, trg: TriggerSource, enabled: bool) -> Result<()> {
        match trg {
            TriggerSource::FrontPanel => {
                self.s0
                    .set("SIG_SRC_TRG_0", if enabled { "EXT" } else { "HOSTB" })
                    .await
            }
            TriggerSource::Internal => self.s0.set("SIG_SRC_TRG_1", "STRIG").await,
        }
    }

    async fn apply_steps(&self, steps: &[KnobStep]) -> Result<()> {
        for step in steps {
            match self.s0.set(step.knob, step.value).await {
                Err(ClientError::KnobNotFound { knob, .. }) if step.optional => {
                    warn!(addr = %self.addr, knob = %knob, "knob absent, deprecated");
                }
                other => other?,
            }
        }
        Ok(())
    }

    async fn service_connection(&self, service: Service, read_timeout: Option<Duration>) -> Result<Connection> {
        let addr = format!("{}:{}", self.addr, self.config.ports.port(service)?);
        Connection::connect(&addr, self.config.connect_timeout, read_timeout).await
    }

    /// Send an STL script to `service`; returns the final reply.
    pub async fn load_stl(&self, stl: &str, service: Service) -> Result<String> {
        let mut conn = self.service_connection(service, self.config.read_timeout).await?;
        for line in stl_lines(stl) {
            conn.send_line(line).await?;
            let rx = conn.read_chunk(4096).await?;
            debug!(line, reply = %String::from_utf8_lossy(&rx).trim_end(), "stl");
        }
        conn.send_line(STL_EOF).await?;
        conn.shutdown_write().await?;
        let rx = conn.read_chunk(4096).await?;
        Ok(String::from_utf8_lossy(&rx).into_owned())
    }

    /// Load a gate pulse generator program and return the generator's dump.
    pub async fn load_gpg(&self, stl: &str) -> Result<String> {
        self.load_stl(stl, Service::GpgStl).await?;

        let mut conn = self.service_connection(Service::GpgDump, self.config.read_timeout).await?;
        let mut dump = String::new();
        loop {
            let rx = conn.read_chunk(4096).await?;
            if rx.is_empty() {
                break;
            }
            let text = String::from_utf8_lossy(&rx);
            dump.push_str(&text);
            if text.contains(STL_EOF) {
                break;
            }
        }
        Ok(dump)
    }

    /// Load a digital pattern generator program.
    pub async fn load_dpg(&self, stl: &str) -> Result<String> {
        self.load_stl(stl, Service::DpgStl).await
    }

    pub async fn load_segments(&self, segments: &[&str]) -> Result<()> {
        let mut conn = self.service_connection(Service::SegmentWrite, self.config.read_timeout).await?;
        for seg in segments {
            conn.send_line(seg).await?;
        }
        conn.shutdown_write().await
    }

    pub async fn show_segments(&self) -> Result<String> {
        let mut conn = self.service_connection(Service::SegmentRead, self.config.read_timeout).await?;
        let mut text = String::new();
        loop {
            let rx = conn.read_chunk(1024).await?;
            if rx.is_empty() {
                break;
            }
            text.push_str(&String::from_utf8_lossy(&rx));
        }
        Ok(text)
    }

    /// Upload a waveform to the AWG, one-shot or auto-rearming.
    ///
    /// Fails with [`ClientError::AwgBusy`] while the generator is playing.
    pub async fn load_awg(&self, data: &[u8], autorearm: bool) -> Result<()> {
        if let Some(site) = self.awg_site
            && self.site(site)?.get("task_active").await?.trim() == "1"
        {
            return Err(ClientError::AwgBusy(site));
        }

        let service = if autorearm {
            Service::AwgAutoRearm
        } else {
            Service::AwgOnce
        };
        let mut conn = self.service_connection(service, self.config.read_timeout).await?;
        conn.send_raw(data).await?;
        conn.shutdown_write().await?;
        loop {
            let rx = conn.read_chunk(128).await?;
            if rx.is_empty() || rx.starts_with(b"DONE") {
                break;
            }
        }
        info!(addr = %self.addr, bytes = data.len(), autorearm, "awg loaded");
        Ok(())
    }

    /// Run a line service until a line starting with `eof`, logging each
    /// line behind `prompt`. Returns the transcript.
    pub async fn run_service(&self, service: Service, eof: &str, prompt: &str) -> Result<String> {
        let mut conn = self.service_connection(service, None).await?;
        let mut txt = String::new();
        loop {
            let rx = match conn.receive_message("\n").await {
                Ok(rx) => rx,
                Err(ClientError::Disconnected) => break,
                Err(e) => return Err(e),
            };
            info!("{prompt}{rx}");
            txt.push_str(&rx);
            txt.push('\n');
            if rx.starts_with(eof) {
                break;
            }
        }
        Ok(txt)
    }

    /// Run one shot via the one-shot service, until `SHOT_COMPLETE`.
    pub async fn run_oneshot(&self) -> Result<String> {
        let hn = self.s0.get("HN").await?;
        self.run_service(Service::OneShot, "SHOT_COMPLETE", &format!("{hn}> "))
            .await
    }

    /// One snapshot line from the live `top` service.
    pub async fn run_livetop(&self) -> Result<String> {
        let mut conn = self.service_connection(Service::LiveTop, None).await?;
        conn.receive_message("\n").await
    }

    /// Run an MGT-DRAM offload, feeding its progress lines to `sink`.
    pub async fn run_mgt(&self, sink: LineSink) -> Result<()> {
        if !self.config.variant.has_mgt {
            return Err(ClientError::InvalidArgument(format!(
                "{} has no MGT-DRAM service",
                self.config.variant.name
            )));
        }
        let mut pm = ProcessMonitor::connect(&self.addr, DEFAULT_TERMINATOR, sink, &self.config).await?;
        pm.wait().await
    }
}

impl std::fmt::Debug for DeviceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceProxy")
            .field("addr", &self.addr)
            .field("sites", &self.services.keys().collect::<Vec<_>>())
            .field("awg_site", &self.awg_site)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Connect every listed site in parallel; failed and late sites are absent.
async fn discover(addr: &str, site_list: &[u8], config: &DeviceConfig) -> BTreeMap<u8, Arc<SiteHandle>> {
    let tasks: Vec<_> = site_list
        .iter()
        .map(|&site| {
            let addr = addr.to_owned();
            let config = config.clone();
            tokio::spawn(async move {
                SiteHandle::connect(&addr, &format!("s{site}"), site, &config).await
            })
        })
        .collect();

    let mut modules = BTreeMap::new();
    for (&site, mut task) in site_list.iter().zip(tasks) {
        match tokio::time::timeout(config.discovery_timeout, &mut task).await {
            Ok(Ok(Ok(handle))) => {
                info!(addr, site, model = handle.model(), "site discovered");
                modules.insert(site, Arc::new(handle));
            }
            Ok(Ok(Err(e))) => warn!(addr, site, error = %e, "site discovery failed"),
            Ok(Err(e)) => warn!(addr, site, error = %e, "site discovery task failed"),
            Err(_) => {
                task.abort();
                warn!(addr, site, timeout = ?config.discovery_timeout, "site discovery timed out");
            }
        }
    }
    modules
}
