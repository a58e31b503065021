//! Shared test fixtures: simulated hardware and a recording stack interface.

// Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use mqnic::{
    FilterFlags, HwCaps, HwError, HwFeatures, HwOps, HwStats, IrqMode, LinkSpeed, LinkStatus,
    Netif, NicConfig, PowerState, TxDesc,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Simulated hardware.
///
/// Clones share state, so a test can keep a handle after moving another clone
/// into the controller: script failures per operation, raise the link, advance
/// completion heads and inspect the call log and submitted descriptor runs.
#[derive(Clone)]
pub struct SimHw(Arc<SimState>);

pub struct SimState {
    caps: HwCaps,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    link: Mutex<LinkStatus>,
    heads: Vec<AtomicU32>,
    submitted: Mutex<Vec<(u32, Vec<TxDesc>)>>,
    stats: Mutex<HwStats>,
}

/// Routes crate logging into the test harness output.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn caps(vecs: u32, irq_mode: IrqMode) -> HwCaps {
    HwCaps {
        vecs,
        txds: 4096,
        rxds: 4096,
        link_speed_msk: LinkSpeed::RATE_1G | LinkSpeed::RATE_10G,
        features: HwFeatures::all(),
        mtu: 16334,
        regs_count: 4,
        irq_mode,
    }
}

impl SimHw {
    pub fn new(caps: HwCaps) -> Self {
        let heads = (0..caps.vecs).map(|_| AtomicU32::new(0)).collect();
        SimHw(Arc::new(SimState {
            caps,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            link: Mutex::new(LinkStatus::default()),
            heads,
            submitted: Mutex::new(Vec::new()),
            stats: Mutex::new(HwStats::default()),
        }))
    }

    pub fn msix(vecs: u32) -> Self {
        Self::new(caps(vecs, IrqMode::Msix))
    }

    /// Makes every future call of `op` fail until cleared.
    pub fn fail(&self, op: &'static str) {
        self.0.failing.lock().unwrap().insert(op);
    }

    pub fn clear_failures(&self) {
        self.0.failing.lock().unwrap().clear();
    }

    pub fn set_link(&self, mbps: u32) {
        *self.0.link.lock().unwrap() = LinkStatus {
            mbps,
            full_duplex: mbps != 0,
        };
    }

    /// Marks `count` more descriptors of `ring` as completed by the engine.
    pub fn complete(&self, ring: u32, count: u32) {
        self.0.heads[ring as usize].fetch_add(count, Ordering::SeqCst);
    }

    pub fn set_rx_stats(&self, stats: HwStats) {
        *self.0.stats.lock().unwrap() = stats;
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.calls.lock().unwrap().clone()
    }

    pub fn called(&self, op: &str) -> usize {
        self.0
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == op)
            .count()
    }

    pub fn submitted(&self) -> Vec<(u32, Vec<TxDesc>)> {
        self.0.submitted.lock().unwrap().clone()
    }

    fn op(&self, name: &'static str) -> Result<(), HwError> {
        self.0.calls.lock().unwrap().push(name.to_string());
        if self.0.failing.lock().unwrap().contains(name) {
            return Err(HwError::new(name));
        }
        Ok(())
    }
}

impl HwOps for SimHw {
    fn caps(&self) -> Result<HwCaps, HwError> {
        self.op("caps")?;
        Ok(self.0.caps.clone())
    }

    fn reset(&self) -> Result<(), HwError> {
        self.op("reset")
    }

    fn init(&self, _cfg: &NicConfig, _mac: [u8; 6]) -> Result<(), HwError> {
        self.op("init")
    }

    fn start(&self) -> Result<(), HwError> {
        self.op("start")
    }

    fn stop(&self) -> Result<(), HwError> {
        self.op("stop")
    }

    fn deinit(&self) -> Result<(), HwError> {
        self.op("deinit")
    }

    fn set_power(&self, _state: PowerState) -> Result<(), HwError> {
        self.op("set_power")
    }

    fn link_status(&self) -> Result<LinkStatus, HwError> {
        self.op("link_status")?;
        Ok(*self.0.link.lock().unwrap())
    }

    fn set_link_speed(&self, _rate: LinkSpeed) -> Result<(), HwError> {
        self.op("set_link_speed")
    }

    fn mac_permanent(&self) -> Result<[u8; 6], HwError> {
        self.op("mac_permanent")?;
        Ok([0x02, 0x00, 0x00, 0xaa, 0xbb, 0xcc])
    }

    fn set_mac_address(&self, _mac: [u8; 6]) -> Result<(), HwError> {
        self.op("set_mac_address")
    }

    fn set_multicast_list(&self, _macs: &[[u8; 6]]) -> Result<(), HwError> {
        self.op("set_multicast_list")
    }

    fn set_packet_filter(&self, _filter: FilterFlags) -> Result<(), HwError> {
        self.op("set_packet_filter")
    }

    fn irq_enable(&self, _mask: u32) -> Result<(), HwError> {
        self.op("irq_enable")
    }

    fn irq_disable(&self, _mask: u32) -> Result<(), HwError> {
        self.op("irq_disable")
    }

    fn set_interrupt_moderation(&self, _on: bool, _rate: u32) -> Result<(), HwError> {
        self.op("set_interrupt_moderation")
    }

    fn fw_version(&self) -> Result<u32, HwError> {
        self.op("fw_version")?;
        Ok(0x0301_002a)
    }

    fn hw_stats(&self) -> Result<HwStats, HwError> {
        self.op("hw_stats")?;
        Ok(*self.0.stats.lock().unwrap())
    }

    fn regs(&self, buf: &mut [u32]) -> Result<(), HwError> {
        self.op("regs")?;
        for (i, reg) in buf.iter_mut().enumerate() {
            *reg = i as u32;
        }
        Ok(())
    }

    fn ring_tx_init(&self, _ring: u32, _depth: u32) -> Result<(), HwError> {
        self.op("ring_tx_init")
    }

    fn ring_tx_start(&self, _ring: u32) -> Result<(), HwError> {
        self.op("ring_tx_start")
    }

    fn ring_tx_stop(&self, _ring: u32) -> Result<(), HwError> {
        self.op("ring_tx_stop")
    }

    fn ring_tx_submit(&self, ring: u32, descs: &[TxDesc]) -> Result<(), HwError> {
        self.op("ring_tx_submit")?;
        self.0
            .submitted
            .lock()
            .unwrap()
            .push((ring, descs.to_vec()));
        Ok(())
    }

    fn ring_tx_head(&self, ring: u32) -> Result<u32, HwError> {
        self.op("ring_tx_head")?;
        Ok(self.0.heads[ring as usize].load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    QueueStart(u32),
    QueueStop(u32),
    CarrierOn,
    CarrierOff,
    Attach,
    Detach,
}

/// Records every stack-facing signal in order.
#[derive(Default)]
pub struct RecordingNetif {
    events: Mutex<Vec<Event>>,
}

impl RecordingNetif {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: Event) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == event)
            .count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl Netif for RecordingNetif {
    fn queue_start(&self, idx: u32) {
        self.push(Event::QueueStart(idx));
    }

    fn queue_stop(&self, idx: u32) {
        self.push(Event::QueueStop(idx));
    }

    fn carrier_on(&self) {
        self.push(Event::CarrierOn);
    }

    fn carrier_off(&self) {
        self.push(Event::CarrierOff);
    }

    fn device_attach(&self) {
        self.push(Event::Attach);
    }

    fn device_detach(&self) {
        self.push(Event::Detach);
    }
}
