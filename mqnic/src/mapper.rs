//! # Packet-to-Descriptor Mapping
//!
//! ## Purpose
//!
//! This file implements the pure algorithm that converts one outbound packet
//! into its ordered descriptor run: an optional leading context descriptor for
//! segmentation offload, a start-of-packet head descriptor carrying the total
//! length and any checksum flags, and one or more fragment descriptors with
//! oversized fragments split at the hardware's single-transfer maximum.
//!
//! ## How it works
//!
//! Descriptors are written into a caller-provided scratch slice sized to the
//! per-transmit budget. Running out of scratch means the packet needs more
//! descriptors than the budget allows; the mapper rejects it before any ring or
//! hardware state is touched. Checksum flags are resolved from the parsed head
//! layout and are mutually exclusive: the transport checksum wins over the
//! bare IPv4 header checksum.

use crate::cfg::TX_FRAME_MAX;
use crate::packet::{L4Proto, Packet};
use crate::ring::{DescFlags, TxDesc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    /// The packet needs more descriptors than the per-transmit budget.
    #[error("packet needs more descriptors than the per-transmit budget")]
    TooFragmented,
}

/// Maps `packet` onto descriptors in `descs`, returning the count consumed.
///
/// The scratch slice length is the per-transmit budget; exceeding it yields
/// `MapError::TooFragmented` with no other side effects. On success the run
/// carries exactly one `SOP` and one `EOP`.
pub fn map_packet(packet: &Packet, descs: &mut [TxDesc]) -> Result<usize, MapError> {
    let layout = packet.layout();
    let mut n = 0;

    // Leading context descriptor for segmentation offload. It contributes no
    // payload bytes, only the header geometry and segment size.
    if let Some(mss) = packet.gso_mss() {
        if let Some(layout) = layout {
            if n == descs.len() {
                return Err(MapError::TooFragmented);
            }
            descs[n] = TxDesc {
                len_pkt: packet.total_len(),
                flags: DescFlags::TXC,
                len_l2: layout.l2_len,
                len_l3: layout.l3_len,
                len_l4: layout.l4_len,
                mss,
                ..TxDesc::default()
            };
            n += 1;
        }
    }

    if n == descs.len() {
        return Err(MapError::TooFragmented);
    }
    let mut flags = DescFlags::SOP | DescFlags::MAPPED;
    if packet.csum_offload() {
        if let Some(layout) = layout {
            flags |= match layout.proto {
                L4Proto::Tcp => DescFlags::TCP_CSO,
                L4Proto::Udp => DescFlags::UDP_CSO,
                L4Proto::Other if layout.is_ipv4 => DescFlags::IP_CSO,
                L4Proto::Other => DescFlags::empty(),
            };
        }
    }
    descs[n] = TxDesc {
        addr: packet.head_addr(),
        len: packet.head().len() as u32,
        len_pkt: packet.total_len(),
        flags,
        ..TxDesc::default()
    };
    n += 1;

    for frag in packet.frags() {
        let mut addr = frag.addr;
        let mut len = frag.len;
        while len > 0 {
            if n == descs.len() {
                return Err(MapError::TooFragmented);
            }
            let chunk = len.min(TX_FRAME_MAX);
            descs[n] = TxDesc {
                addr,
                len: chunk,
                flags: DescFlags::MAPPED,
                ..TxDesc::default()
            };
            n += 1;
            addr += u64::from(chunk);
            len -= chunk;
        }
    }

    descs[n - 1].flags |= DescFlags::EOP;
    Ok(n)
}
