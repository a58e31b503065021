//! # Hardware Abstraction Boundary
//!
//! ## Purpose
//!
//! This file defines the capability set the data-path core consumes from the
//! register-level driver: reset/init/start/stop, descriptor-ring programming,
//! link-status reads, interrupt control and filter-table writes. The register
//! protocol itself lives behind this trait and is out of scope here.
//!
//! ## How it works
//!
//! Each hardware generation provides one `HwOps` implementation, selected at
//! device-construction time. The controller never inspects registers; it calls
//! these operations and reacts to their results. Ring completion state is
//! exposed as a monotonically increasing per-ring head counter, which the
//! owning vector folds into its reclaim pass.
//!
//! ## Main components
//!
//! - `HwOps`: the capability trait.
//! - `HwCaps`: negotiated limits (vectors, descriptor depths, speeds, features).
//! - `LinkStatus`, `PowerState`, `IrqMode`, `HwStats`: plain state carriers.

use crate::cfg::NicConfig;
use crate::error::HwError;
use crate::ring::TxDesc;
use bitflags::bitflags;

bitflags! {
    /// Advertised link-rate mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LinkSpeed: u32 {
        const RATE_100M = 1 << 0;
        const RATE_1G   = 1 << 1;
        const RATE_2G5  = 1 << 2;
        const RATE_5G   = 1 << 3;
        const RATE_10G  = 1 << 4;
    }
}

impl LinkSpeed {
    /// Maps an exact speed in Mbps to its rate bit.
    pub fn from_mbps(mbps: u32) -> Option<LinkSpeed> {
        match mbps {
            100 => Some(LinkSpeed::RATE_100M),
            1_000 => Some(LinkSpeed::RATE_1G),
            2_500 => Some(LinkSpeed::RATE_2G5),
            5_000 => Some(LinkSpeed::RATE_5G),
            10_000 => Some(LinkSpeed::RATE_10G),
            _ => None,
        }
    }
}

bitflags! {
    /// Offload features a hardware generation may support.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HwFeatures: u32 {
        const CSUM = 1 << 0;
        const TSO  = 1 << 1;
        const LRO  = 1 << 2;
        const RSS  = 1 << 3;
        const VLAN = 1 << 4;
    }
}

bitflags! {
    /// Stack-facing packet filter modes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FilterFlags: u32 {
        const PROMISC   = 1 << 0;
        const ALLMULTI  = 1 << 1;
        const MULTICAST = 1 << 2;
        const BROADCAST = 1 << 3;
    }
}

/// Interrupt delivery mode reported by the bus layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqMode {
    Legacy,
    Msi,
    Msix,
}

/// Device power state. Transitions only through the explicit power-change
/// operation on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Fully operational.
    D0,
    /// Suspended.
    D3,
}

/// A link-status snapshot. `mbps == 0` means the link is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatus {
    pub mbps: u32,
    pub full_duplex: bool,
}

impl LinkStatus {
    pub fn is_up(&self) -> bool {
        self.mbps != 0
    }
}

/// Negotiated hardware limits, read once at device construction.
#[derive(Debug, Clone)]
pub struct HwCaps {
    /// Maximum number of interrupt/poll vectors.
    pub vecs: u32,
    /// Maximum transmit descriptors per ring.
    pub txds: u32,
    /// Maximum receive descriptors per ring.
    pub rxds: u32,
    /// Supported link rates.
    pub link_speed_msk: LinkSpeed,
    /// Supported offload features.
    pub features: HwFeatures,
    /// Largest MTU the MAC accepts.
    pub mtu: u32,
    /// Number of diagnostic registers exported by `HwOps::regs`.
    pub regs_count: u32,
    /// Interrupt delivery mode.
    pub irq_mode: IrqMode,
}

/// Device-wide counters maintained by hardware (receive side and MAC drops).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HwStats {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
}

/// The hardware-operations capability set.
///
/// Preconditions are ordering-only: `init` after `reset`, ring operations after
/// `init`, `start` before any `ring_tx_submit`. Implementations must be safe to
/// call from the transmit path and the monitor task concurrently.
pub trait HwOps: Send + Sync + 'static {
    fn caps(&self) -> Result<HwCaps, HwError>;

    fn reset(&self) -> Result<(), HwError>;
    fn init(&self, cfg: &NicConfig, mac: [u8; 6]) -> Result<(), HwError>;
    fn start(&self) -> Result<(), HwError>;
    fn stop(&self) -> Result<(), HwError>;
    fn deinit(&self) -> Result<(), HwError>;
    fn set_power(&self, state: PowerState) -> Result<(), HwError>;

    fn link_status(&self) -> Result<LinkStatus, HwError>;
    fn set_link_speed(&self, rate: LinkSpeed) -> Result<(), HwError>;

    fn mac_permanent(&self) -> Result<[u8; 6], HwError>;
    fn set_mac_address(&self, mac: [u8; 6]) -> Result<(), HwError>;
    fn set_multicast_list(&self, macs: &[[u8; 6]]) -> Result<(), HwError>;
    fn set_packet_filter(&self, filter: FilterFlags) -> Result<(), HwError>;

    fn irq_enable(&self, mask: u32) -> Result<(), HwError>;
    fn irq_disable(&self, mask: u32) -> Result<(), HwError>;
    fn set_interrupt_moderation(&self, on: bool, rate: u32) -> Result<(), HwError>;

    fn fw_version(&self) -> Result<u32, HwError>;
    fn hw_stats(&self) -> Result<HwStats, HwError>;
    fn regs(&self, buf: &mut [u32]) -> Result<(), HwError>;

    /// Programs one transmit descriptor ring of the given depth.
    fn ring_tx_init(&self, ring: u32, depth: u32) -> Result<(), HwError>;
    fn ring_tx_start(&self, ring: u32) -> Result<(), HwError>;
    fn ring_tx_stop(&self, ring: u32) -> Result<(), HwError>;

    /// Hands a packet's descriptor run to the DMA engine. The run is already
    /// resident in the software ring; the slice is the freshly appended part.
    fn ring_tx_submit(&self, ring: u32, descs: &[TxDesc]) -> Result<(), HwError>;

    /// Cumulative count of descriptors the hardware has completed on `ring`.
    /// Monotonic with u32 wraparound; completions are reported strictly in
    /// submission order.
    fn ring_tx_head(&self, ring: u32) -> Result<u32, HwError>;
}
