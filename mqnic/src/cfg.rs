//! # Device Configuration
//!
//! ## Purpose
//!
//! This file holds the compile-time tuning constants, the runtime configuration
//! record and the RSS parameters. The configuration is filled with defaults at
//! device construction, corrected against the negotiated hardware capability
//! once, and is immutable afterwards except through the explicit
//! reconfiguration operations on the controller.
//!
//! ## Main components
//!
//! - Tuning constants (`TX_FRAGS_MAX`, `TX_FRAME_MAX`, `LOCK_TRYS`, ...).
//! - `RssParams`: secret hash key plus the bucket-to-queue indirection table.
//! - `NicConfig`: the immutable-after-start configuration record and its
//!   capability-correction pass `resolve`.

use crate::hw::{HwCaps, HwFeatures, IrqMode, LinkSpeed};
use static_assertions::const_assert;
use std::time::Duration;

/// Hard ceiling on interrupt/poll vectors (and so on RSS queues).
pub const VECS_MAX: u32 = 8;
/// Default requested vector count, corrected against capability at start.
pub const VECS_DEF: u32 = 4;
/// Traffic classes carried by this implementation.
pub const TCS_DEF: u32 = 1;

/// Default transmit ring depth.
pub const TXDS_DEF: u32 = 1024;
/// Default receive ring depth.
pub const RXDS_DEF: u32 = 1024;

/// Per-transmit descriptor budget: the most descriptors one packet may consume
/// including the optional segmentation-offload context descriptor.
pub const TX_FRAGS_MAX: usize = 32;
/// Largest payload one descriptor may carry; longer fragments are split.
pub const TX_FRAME_MAX: u32 = 16 * 1024;
/// Ring lock acquisition attempts before the transmit path reports busy.
pub const LOCK_TRYS: u32 = 100;

/// Longest multicast filter list accepted by `set_multicast_list`.
pub const MULTICAST_ADDRESS_MAX: usize = 32;

pub const MTU_DEF: u32 = 1514;
pub const IS_AUTONEG_DEF: bool = true;
pub const IS_POLLING_DEF: bool = false;
pub const IS_RSS_DEF: bool = true;
pub const IS_LRO_DEF: bool = true;
pub const IS_INTERRUPT_MODERATION_DEF: bool = true;
pub const INTERRUPT_MODERATION_RATE_DEF: u32 = 0xffff;

/// Interrupt source mask handed to `irq_enable`/`irq_disable`.
pub const IRQ_MASK: u32 = (1 << VECS_MAX) - 1;

/// Service (monitor) timer period.
pub const SERVICE_INTERVAL: Duration = Duration::from_secs(1);
/// Polling-mode dispatch period, substituting for hardware interrupts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Entries in the RSS indirection table.
pub const RSS_INDIRECTION_TABLE_MAX: usize = 64;

const_assert!(TXDS_DEF.is_power_of_two());
const_assert!(RXDS_DEF.is_power_of_two());
const_assert!(VECS_MAX.is_power_of_two());
const_assert!(TX_FRAGS_MAX < TXDS_DEF as usize);
const_assert!(RSS_INDIRECTION_TABLE_MAX.is_power_of_two());

/// The 40-byte Toeplitz hash key programmed into the receive-side scaler.
/// A fixed key keeps flow-to-queue placement deterministic across restarts.
pub const RSS_KEY: [u8; 40] = [
    0x1e, 0xad, 0x71, 0x87, 0x65, 0xfc, 0x26, 0x7d, 0x0d, 0x45, 0x67, 0x74, 0xcd, 0x06, 0x1a,
    0x18, 0xb6, 0xc1, 0xf0, 0xc7, 0xbb, 0x18, 0xbe, 0xf8, 0x19, 0x13, 0x4b, 0xa9, 0xd0, 0x3e,
    0xfe, 0x70, 0x25, 0x03, 0xab, 0x50, 0x6a, 0x8b, 0x82, 0x0c,
];

/// Receive-side scaling parameters: the hash key and the table mapping hash
/// buckets onto queue indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RssParams {
    pub key: [u8; 40],
    pub table: Vec<u8>,
}

impl RssParams {
    /// Builds the indirection table for `queues` receive queues
    /// (`bucket & (queues - 1)`; the queue count is a power of two).
    pub fn new(queues: u32) -> Self {
        debug_assert!(queues.is_power_of_two());
        let table = (0..RSS_INDIRECTION_TABLE_MAX)
            .map(|bucket| (bucket as u32 & (queues - 1)) as u8)
            .collect();
        RssParams {
            key: RSS_KEY,
            table,
        }
    }
}

/// The device configuration record.
///
/// Created with defaults, corrected once against `HwCaps` by [`resolve`], then
/// only touched by the explicit reconfiguration operations (MTU, link speed,
/// filters), each of which re-validates against capability.
///
/// [`resolve`]: NicConfig::resolve
#[derive(Debug, Clone)]
pub struct NicConfig {
    /// Interrupt/poll vectors, one transmit queue each per traffic class.
    pub vecs: u32,
    pub tcs: u32,
    pub txds: u32,
    pub rxds: u32,
    pub is_interrupt_moderation: bool,
    /// Moderation rate; zero when moderation is off.
    pub itr: u32,
    pub is_rss: bool,
    pub rss: RssParams,
    pub mtu: u32,
    pub link_speed_msk: LinkSpeed,
    pub is_autoneg: bool,
    pub is_polling: bool,
    pub is_lro: bool,
    pub vlan_id: u16,
    pub features: HwFeatures,
}

impl Default for NicConfig {
    fn default() -> Self {
        NicConfig {
            vecs: VECS_DEF,
            tcs: TCS_DEF,
            txds: TXDS_DEF,
            rxds: RXDS_DEF,
            is_interrupt_moderation: IS_INTERRUPT_MODERATION_DEF,
            itr: if IS_INTERRUPT_MODERATION_DEF {
                INTERRUPT_MODERATION_RATE_DEF
            } else {
                0
            },
            is_rss: IS_RSS_DEF,
            rss: RssParams::new(VECS_DEF),
            mtu: MTU_DEF,
            link_speed_msk: LinkSpeed::all(),
            is_autoneg: IS_AUTONEG_DEF,
            is_polling: IS_POLLING_DEF,
            is_lro: IS_LRO_DEF,
            vlan_id: 0,
            features: HwFeatures::all(),
        }
    }
}

impl NicConfig {
    /// Corrects the requested configuration against the negotiated capability.
    ///
    /// Ring depths and the vector count are clamped to hardware limits and the
    /// online CPU count, then the vector count is rounded down to a power of
    /// two in [1, `VECS_MAX`]. Legacy single-vector interrupt mode (or hardware
    /// reporting one vector) forces a single queue with RSS disabled. The
    /// link-speed and feature masks are intersected with capability, and the
    /// RSS indirection table is rebuilt for the final queue count.
    pub fn resolve(&mut self, caps: &HwCaps, online_cpus: u32) {
        self.txds = self.txds.min(caps.txds);
        self.rxds = self.rxds.min(caps.rxds);

        self.vecs = self.vecs.min(caps.vecs).min(online_cpus.max(1));
        self.vecs = match self.vecs {
            v if v >= 8 => 8,
            v if v >= 4 => 4,
            v if v >= 2 => 2,
            _ => 1,
        };

        if caps.irq_mode == IrqMode::Legacy || caps.vecs == 1 || self.vecs == 1 {
            self.is_rss = false;
            self.vecs = 1;
        }

        self.link_speed_msk &= caps.link_speed_msk;
        self.features &= caps.features;
        self.mtu = self.mtu.min(caps.mtu);
        self.rss = RssParams::new(self.vecs);
    }
}
