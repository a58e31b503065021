//! # Multi-Queue NIC Data Path
//!
//! ## Purpose
//!
//! This crate implements the transmit data path of a multi-queue Ethernet
//! controller: packet-to-descriptor mapping with checksum and segmentation
//! offload, per-queue descriptor rings with non-blocking producer locking,
//! per-vector completion dispatch, and the controller that owns configuration,
//! link supervision and the device lifecycle.
//!
//! ## How it works
//!
//! The surrounding driver shell hands outbound packets to [`Nic::transmit`]
//! and receives backpressure and carrier signals through its [`Netif`]
//! implementation. Hardware access goes through the [`HwOps`] trait, so the
//! same data path drives any controller generation (and the simulated hardware
//! used in tests). Lifecycle operations are async because they arm and disarm
//! the tokio-based monitor and polling timers; the transmit path itself never
//! blocks.
//!
//! ## Main components
//!
//! - [`Nic`]: the controller; transmit, lifecycle, power and reconfiguration.
//! - [`HwOps`]: the hardware abstraction seam.
//! - [`Packet`]: one outbound frame with its offload requests.
//! - [`NicConfig`]: configuration, corrected against hardware capability.

pub mod busy;
pub mod cfg;
pub mod error;
pub mod hw;
pub mod mapper;
pub mod monitor;
pub mod nic;
pub mod packet;
pub mod ring;
pub mod vec;

pub use cfg::NicConfig;
pub use error::{HwError, NicError, TxError};
pub use hw::{
    FilterFlags, HwCaps, HwFeatures, HwOps, HwStats, IrqMode, LinkSpeed, LinkStatus, PowerState,
};
pub use nic::{Netif, NetStats, Nic};
pub use packet::{Frag, L4Proto, Packet, TxLayout};
pub use ring::{DescFlags, TxDesc};
