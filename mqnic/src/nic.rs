//! # NIC Controller
//!
//! ## Purpose
//!
//! This file implements the top-level owner of the data path: configuration,
//! the per-queue rings and vectors, link and power state, the periodic monitor
//! and the transmit entry point exposed to the surrounding driver shell.
//!
//! ## How it works
//!
//! Construction negotiates capability, corrects the configuration and builds
//! the rings and vectors ("cold" then "hot" allocation). The transmit path
//! pre-checks readiness and ring availability, then acquires the ring lock with
//! a bounded non-blocking retry, maps the packet to descriptors and submits
//! them; every failure mode leaves the ring untouched. Link transitions are
//! observed by the service tick and signaled to the stack at most once per
//! actual change. Stop closes the quiescence gate and drains in-flight
//! operations before any destructive teardown.
//!
//! ## Main components
//!
//! - `Netif`: the stack-facing signal sink (queue start/stop, carrier).
//! - `Nic`: the controller; `transmit`, lifecycle, reconfiguration operations.
//! - `NetStats`: the aggregated device statistics snapshot.

use crate::busy::BusyGate;
use crate::cfg::{
    IRQ_MASK, LOCK_TRYS, MULTICAST_ADDRESS_MAX, NicConfig, POLL_INTERVAL, SERVICE_INTERVAL,
    TX_FRAGS_MAX,
};
use crate::error::{NicError, TxError};
use crate::hw::{FilterFlags, HwCaps, HwOps, HwStats, LinkSpeed, LinkStatus, PowerState};
use crate::mapper::{MapError, map_packet};
use crate::monitor::PeriodicTask;
use crate::packet::Packet;
use crate::ring::{TxCounters, TxDesc, TxRing};
use crate::vec::Vector;
use bitflags::bitflags;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Stack-facing signals produced by the data path.
///
/// Queue stalls are the normal backpressure mechanism, not errors. The
/// controller guarantees one signal per actual edge: stopping an already
/// stopped queue (or starting a running one) emits nothing.
pub trait Netif: Send + Sync {
    fn queue_start(&self, idx: u32);
    fn queue_stop(&self, idx: u32);
    fn carrier_on(&self);
    fn carrier_off(&self);
    fn device_attach(&self) {}
    fn device_detach(&self) {}
}

/// Aggregated device statistics, refreshed by the service tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStats {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub rx_errors: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_errors: u64,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct NicFlags: u32 {
        /// Set until `start` completes and again from the moment `stop` begins.
        const NOT_READY = 1 << 0;
        /// Link has been up at least once since start.
        const STARTED = 1 << 1;
        /// Last observed link state was down.
        const LINK_DOWN = 1 << 2;
    }
}

#[derive(Default)]
struct Timers {
    service: Option<PeriodicTask>,
    polling: Option<PeriodicTask>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The multi-queue NIC controller.
///
/// Generic over the hardware generation via [`HwOps`]. Lifecycle operations
/// (`start`, `stop`, `set_power_state`) are async because they arm and disarm
/// the periodic tasks; the transmit path is synchronous and never sleeps.
pub struct Nic<H: HwOps> {
    hw: H,
    caps: HwCaps,
    cfg: Mutex<NicConfig>,
    vecs: u32,
    rings: Vec<Arc<TxRing>>,
    vectors: Vec<Vector>,
    netif: Arc<dyn Netif>,
    mac: Mutex<[u8; 6]>,
    mc_list: Mutex<Vec<[u8; 6]>>,
    packet_filter: Mutex<FilterFlags>,
    link: Mutex<LinkStatus>,
    power: Mutex<PowerState>,
    flags: AtomicU32,
    gate: BusyGate,
    stats: Mutex<NetStats>,
    timers: Mutex<Timers>,
}

impl<H: HwOps> Nic<H> {
    /// Builds a controller with default configuration.
    pub fn new(hw: H, netif: Arc<dyn Netif>) -> Result<Arc<Self>, NicError> {
        Self::with_config(hw, netif, NicConfig::default())
    }

    /// Builds a controller, correcting `cfg` against the negotiated capability
    /// and allocating the per-queue rings and vectors.
    ///
    /// A failure part-way through construction drops whatever was built; no
    /// partially constructed device ever escapes.
    pub fn with_config(
        hw: H,
        netif: Arc<dyn Netif>,
        mut cfg: NicConfig,
    ) -> Result<Arc<Self>, NicError> {
        let caps = hw.caps()?;
        let online_cpus = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        cfg.resolve(&caps, online_cpus);

        let vecs = cfg.vecs;
        let tcs = cfg.tcs;
        let mut rings = Vec::with_capacity((tcs * vecs) as usize);
        for idx in 0..tcs * vecs {
            rings.push(Arc::new(TxRing::new(idx, cfg.txds)?));
        }
        let vectors = (0..vecs)
            .map(|i| {
                let owned = (0..tcs)
                    .map(|tc| rings[(tc * vecs + i) as usize].clone())
                    .collect();
                Vector::new(i, owned)
            })
            .collect();

        let mac = hw.mac_permanent()?;
        netif.carrier_off();

        Ok(Arc::new(Nic {
            hw,
            caps,
            cfg: Mutex::new(cfg),
            vecs,
            rings,
            vectors,
            netif,
            mac: Mutex::new(mac),
            mc_list: Mutex::new(Vec::new()),
            packet_filter: Mutex::new(FilterFlags::BROADCAST | FilterFlags::MULTICAST),
            link: Mutex::new(LinkStatus::default()),
            power: Mutex::new(PowerState::D0),
            flags: AtomicU32::new(NicFlags::NOT_READY.bits()),
            gate: BusyGate::new(),
            stats: Mutex::new(NetStats::default()),
            timers: Mutex::new(Timers::default()),
        }))
    }

    fn flag_set(&self, f: NicFlags) {
        self.flags.fetch_or(f.bits(), Ordering::AcqRel);
    }

    fn flag_clear(&self, f: NicFlags) {
        self.flags.fetch_and(!f.bits(), Ordering::AcqRel);
    }

    fn flag_test(&self, f: NicFlags) -> bool {
        self.flags.load(Ordering::Acquire) & f.bits() != 0
    }

    fn queue_stop_ring(&self, ring: &TxRing) {
        if ring.stop() {
            self.netif.queue_stop(ring.idx());
        }
    }

    fn queue_start_ring(&self, ring: &TxRing) {
        if ring.start() {
            self.netif.queue_start(ring.idx());
        }
    }

    /// Transmits one packet.
    ///
    /// Exactly one of the following happens: the packet's descriptor run is
    /// submitted to hardware and counted, or the packet is released (or handed
    /// back inside `TxError::Busy`) with the ring untouched. The path never
    /// blocks: the ring lock is attempted at most `LOCK_TRYS` times.
    pub fn transmit(&self, packet: Packet) -> Result<(), TxError> {
        let Some(_busy) = self.gate.enter() else {
            return Err(TxError::Busy(packet));
        };

        // Budget check counts the head, the fragments and the optional
        // segmentation context; violations never reach the ring.
        let mut budget = packet.fragment_count();
        if packet.gso_mss().is_some() {
            budget += 1;
        }
        if budget > TX_FRAGS_MAX {
            return Err(TxError::TooFragmented);
        }

        let tc = 0u32;
        let vec = packet.queue() % self.vecs;
        let ring = &self.rings[(tc * self.vecs + vec) as usize];

        let not_ready =
            self.flag_test(NicFlags::NOT_READY) || self.flag_test(NicFlags::LINK_DOWN);
        if not_ready || ring.available() < TX_FRAGS_MAX as u32 {
            self.queue_stop_ring(ring);
            return Err(TxError::Busy(packet));
        }

        let mut descs = [TxDesc::default(); TX_FRAGS_MAX];
        for _ in 0..LOCK_TRYS {
            let Some(mut state) = ring.try_lock() else {
                continue;
            };
            let n = match map_packet(&packet, &mut descs) {
                Ok(n) => n,
                Err(MapError::TooFragmented) => return Err(TxError::TooFragmented),
            };
            let bytes = u64::from(packet.total_len());
            ring.enqueue(&mut state, &descs[..n], packet);
            if let Err(err) = self.hw.ring_tx_submit(ring.idx(), &descs[..n]) {
                ring.rollback(&mut state, n);
                return Err(TxError::Hw(err));
            }
            // Stop early while a full-budget packet still fits; the owning
            // vector restarts the queue once reclaim frees enough slots.
            if ring.available() < TX_FRAGS_MAX as u32 + 1 {
                self.queue_stop_ring(ring);
            }
            drop(state);
            ring.stats().add_tx(1, bytes);
            return Ok(());
        }
        Err(TxError::Busy(packet))
    }

    /// Resets and initializes hardware and programs the descriptor rings.
    pub fn init(&self) -> Result<(), NicError> {
        *lock(&self.power) = PowerState::D0;
        self.hw.reset()?;
        let cfg = lock(&self.cfg).clone();
        self.hw.init(&cfg, *lock(&self.mac))?;
        for vector in &self.vectors {
            vector.init(&self.hw, cfg.txds)?;
        }
        Ok(())
    }

    /// Brings the data path up: filters, rings, hardware start, timers,
    /// interrupts (or the polling task) and finally the stack-facing queues.
    ///
    /// Any failing step aborts the remainder and propagates; the caller is
    /// responsible for bringing the device back to a safe stopped state.
    pub async fn start(self: &Arc<Self>) -> Result<(), NicError> {
        let cfg = lock(&self.cfg).clone();

        self.hw.set_multicast_list(&lock(&self.mc_list))?;
        self.hw.set_packet_filter(*lock(&self.packet_filter))?;
        for vector in &self.vectors {
            vector.start(&self.hw)?;
        }
        self.hw.start()?;
        self.hw
            .set_interrupt_moderation(cfg.is_interrupt_moderation, cfg.itr)?;

        {
            let mut timers = lock(&self.timers);
            let weak = Arc::downgrade(self);
            timers.service = Some(PeriodicTask::spawn(SERVICE_INTERVAL, move || {
                if let Some(nic) = weak.upgrade() {
                    nic.service_tick();
                }
            }));
            if cfg.is_polling {
                let weak = Arc::downgrade(self);
                timers.polling = Some(PeriodicTask::spawn(POLL_INTERVAL, move || {
                    if let Some(nic) = weak.upgrade() {
                        nic.poll_tick();
                    }
                }));
            }
        }
        if !cfg.is_polling {
            self.hw.irq_enable(IRQ_MASK)?;
        }

        self.gate.reopen();
        self.flag_clear(NicFlags::NOT_READY);
        for ring in &self.rings {
            self.queue_start_ring(ring);
        }
        log::debug!("data path started with {} vector(s)", self.vecs);
        Ok(())
    }

    /// Stops the data path.
    ///
    /// Admission closes first and in-flight operations drain before timers are
    /// disarmed and hardware is halted, so teardown never races a transmit or
    /// a monitor tick.
    pub async fn stop(&self) -> Result<(), NicError> {
        for ring in &self.rings {
            self.queue_stop_ring(ring);
        }
        self.flag_set(NicFlags::NOT_READY);
        self.gate.close();
        self.gate.drain().await;

        let service = lock(&self.timers).service.take();
        if let Some(task) = service {
            task.disarm().await;
        }
        self.hw.irq_disable(IRQ_MASK)?;
        let polling = lock(&self.timers).polling.take();
        if let Some(task) = polling {
            task.disarm().await;
        }
        for vector in &self.vectors {
            vector.stop(&self.hw)?;
        }
        self.hw.stop()?;
        log::debug!("data path stopped");
        Ok(())
    }

    /// Deinitializes hardware, power-state aware: a device headed for D3 gets
    /// a power-set instead of the full deinit sequence.
    pub fn deinit(&self) {
        let power = *lock(&self.power);
        let result = if power == PowerState::D0 {
            self.hw.deinit()
        } else {
            self.hw.set_power(power)
        };
        if let Err(err) = result {
            log::warn!("hardware deinit failed: {err}");
        }
    }

    /// Suspends (D3) or resumes (D0) the device.
    ///
    /// Suspend on a device that never started is a no-op. Resume re-runs the
    /// full init/start sequence and re-attaches the stack-facing device.
    pub async fn set_power_state(self: &Arc<Self>, target: PowerState) -> Result<(), NicError> {
        match target {
            PowerState::D3 => {
                if self.flag_test(NicFlags::NOT_READY) {
                    return Ok(());
                }
                *lock(&self.power) = PowerState::D3;
                self.netif.device_detach();
                self.stop().await?;
                self.deinit();
            }
            PowerState::D0 => {
                self.init()?;
                self.start().await?;
                self.netif.device_attach();
            }
        }
        Ok(())
    }

    /// One service-timer pass: link supervision and statistics aggregation.
    ///
    /// Interrupt-context-equivalent: short, non-blocking, and every failure is
    /// absorbed so the next interval simply retries.
    pub fn service_tick(&self) {
        let Some(_busy) = self.gate.enter() else {
            return;
        };
        if self.flag_test(NicFlags::NOT_READY) {
            return;
        }

        let status = match self.hw.link_status() {
            Ok(status) => status,
            Err(err) => {
                log::warn!("link status poll failed: {err}");
                return;
            }
        };

        let (moderation, itr) = {
            let cfg = lock(&self.cfg);
            (cfg.is_interrupt_moderation, cfg.itr)
        };
        if let Err(err) = self.hw.set_interrupt_moderation(moderation, itr) {
            log::warn!("interrupt moderation update failed: {err}");
        }

        {
            let mut link = lock(&self.link);
            if *link != status {
                if status.is_up() {
                    self.flag_set(NicFlags::STARTED);
                    self.flag_clear(NicFlags::LINK_DOWN);
                    log::debug!("carrier on: {} Mbps", status.mbps);
                    self.netif.carrier_on();
                } else {
                    log::debug!("carrier off");
                    self.flag_set(NicFlags::LINK_DOWN);
                    self.netif.carrier_off();
                }
                *link = status;
            }
        }

        let mut tx = TxCounters::default();
        for vector in &self.vectors {
            vector.add_stats(&mut tx);
        }
        let mut stats = lock(&self.stats);
        let rx = match self.hw.hw_stats() {
            Ok(hw_stats) => hw_stats,
            Err(err) => {
                log::warn!("hardware stats read failed: {err}");
                // Keep the last good receive-side numbers for this interval.
                HwStats {
                    rx_packets: stats.rx_packets,
                    rx_bytes: stats.rx_bytes,
                    rx_errors: stats.rx_errors,
                    rx_dropped: 0,
                }
            }
        };
        *stats = NetStats {
            rx_packets: rx.rx_packets,
            rx_bytes: rx.rx_bytes,
            rx_errors: rx.rx_errors,
            tx_packets: tx.packets,
            tx_bytes: tx.bytes,
            tx_errors: tx.errors,
        };
    }

    /// One polling pass over every vector; substitutes for hardware interrupts
    /// when the device runs in polling mode.
    pub fn poll_tick(&self) {
        let Some(_busy) = self.gate.enter() else {
            return;
        };
        for vector in &self.vectors {
            vector.dispatch(&self.hw, self.netif.as_ref());
        }
    }

    /// Dispatch entry for one vector, wired to its interrupt by the shell.
    pub fn vector_isr(&self, idx: usize) {
        let Some(_busy) = self.gate.enter() else {
            return;
        };
        if let Some(vector) = self.vectors.get(idx) {
            vector.dispatch(&self.hw, self.netif.as_ref());
        }
    }

    // ---- reconfiguration operations ----

    /// Sets the MTU; values above the hardware ceiling are rejected and the
    /// stored MTU stays unchanged.
    pub fn set_mtu(&self, mtu: u32) -> Result<(), NicError> {
        if mtu > self.caps.mtu {
            return Err(NicError::ConfigInvalid("mtu above hardware maximum"));
        }
        lock(&self.cfg).mtu = mtu;
        Ok(())
    }

    pub fn mtu(&self) -> u32 {
        lock(&self.cfg).mtu
    }

    /// Sets the advertised link rate. With autonegotiation the full capability
    /// mask is advertised; a fixed speed must be inside the capability mask.
    pub fn set_link_speed(&self, autoneg: bool, mbps: u32) -> Result<(), NicError> {
        let rate = if autoneg {
            self.caps.link_speed_msk
        } else {
            let rate = LinkSpeed::from_mbps(mbps)
                .ok_or(NicError::ConfigInvalid("unsupported link speed"))?;
            if !self.caps.link_speed_msk.contains(rate) {
                return Err(NicError::ConfigInvalid("speed outside capability"));
            }
            rate
        };
        self.hw.set_link_speed(rate)?;
        let mut cfg = lock(&self.cfg);
        cfg.is_autoneg = autoneg;
        cfg.link_speed_msk = rate;
        Ok(())
    }

    pub fn set_packet_filter(&self, filter: FilterFlags) -> Result<(), NicError> {
        self.hw.set_packet_filter(filter)?;
        *lock(&self.packet_filter) = filter;
        Ok(())
    }

    /// Replaces the multicast filter list; lists longer than
    /// `MULTICAST_ADDRESS_MAX` are rejected with the stored list unchanged.
    pub fn set_multicast_list(&self, macs: &[[u8; 6]]) -> Result<(), NicError> {
        if macs.len() > MULTICAST_ADDRESS_MAX {
            return Err(NicError::ConfigInvalid("multicast list too long"));
        }
        self.hw.set_multicast_list(macs)?;
        *lock(&self.mc_list) = macs.to_vec();
        Ok(())
    }

    pub fn set_mac_address(&self, mac: [u8; 6]) -> Result<(), NicError> {
        self.hw.set_mac_address(mac)?;
        *lock(&self.mac) = mac;
        Ok(())
    }

    pub fn mac_address(&self) -> [u8; 6] {
        *lock(&self.mac)
    }

    // ---- diagnostics & accessors ----

    pub fn link_status(&self) -> LinkStatus {
        *lock(&self.link)
    }

    /// Current link speed in Mbps; zero while the link is down.
    pub fn link_speed(&self) -> u32 {
        lock(&self.link).mbps
    }

    pub fn power_state(&self) -> PowerState {
        *lock(&self.power)
    }

    pub fn fw_version(&self) -> Result<u32, NicError> {
        Ok(self.hw.fw_version()?)
    }

    /// Diagnostic register dump, sized by the capability's register count.
    pub fn regs(&self) -> Result<Vec<u32>, NicError> {
        let mut buf = vec![0u32; self.caps.regs_count as usize];
        self.hw.regs(&mut buf)?;
        Ok(buf)
    }

    pub fn regs_count(&self) -> u32 {
        self.caps.regs_count
    }

    pub fn stats(&self) -> NetStats {
        *lock(&self.stats)
    }

    pub fn config(&self) -> NicConfig {
        lock(&self.cfg).clone()
    }

    pub fn caps(&self) -> &HwCaps {
        &self.caps
    }
}

impl<H: HwOps> Drop for Nic<H> {
    fn drop(&mut self) {
        // Timer tasks hold only weak references; cancel them so they do not
        // keep ticking against a dead device.
        let mut timers = lock(&self.timers);
        if let Some(task) = timers.service.take() {
            task.cancel();
        }
        if let Some(task) = timers.polling.take() {
            task.cancel();
        }
    }
}
