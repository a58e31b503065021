//! # Outbound Packet Model
//!
//! ## Purpose
//!
//! This file models one outbound frame as the transmit path sees it: a linear
//! head region that carries the protocol headers, an optional scatter-gather
//! fragment list of DMA-mapped regions, and the per-packet offload requests
//! (checksum insertion, generic segmentation offload).
//!
//! ## How it works
//!
//! The head bytes are parsed with `etherparse` to resolve the L2/L3/L4 header
//! lengths and the transport protocol. That layout drives both the checksum
//! flags on the head descriptor and the leading context descriptor for
//! segmentation offload. A head that does not parse simply yields no layout,
//! and the frame goes out without offload flags.
//!
//! ## Main components
//!
//! - `Frag`: one DMA-mapped scatter-gather region.
//! - `Packet`: the frame handle carried through the ring until reclaim.
//! - `TxLayout` / `L4Proto`: resolved header geometry.

use etherparse::{
    Ethernet2Header, Ipv6Header, NetHeaders, PacketHeaders, TransportHeader, UdpHeader,
};

/// One scatter-gather fragment: a DMA address and its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frag {
    pub addr: u64,
    pub len: u32,
}

/// Transport protocol resolved from the head bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L4Proto {
    Tcp,
    Udp,
    Other,
}

/// Header geometry of a frame, as needed by checksum and segmentation offload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxLayout {
    pub l2_len: u8,
    pub l3_len: u8,
    pub l4_len: u8,
    pub proto: L4Proto,
    pub is_ipv4: bool,
}

/// One outbound frame.
///
/// The head region is owned bytes (headers plus any linear payload) with its
/// own DMA address; additional payload arrives as pre-mapped fragments. The
/// handle travels with the end-of-packet descriptor and is released when the
/// owning vector reclaims the completed run.
#[derive(Debug)]
pub struct Packet {
    head: Vec<u8>,
    head_addr: u64,
    frags: Vec<Frag>,
    queue: u32,
    csum_offload: bool,
    gso_mss: Option<u16>,
}

impl Packet {
    pub fn new(head: Vec<u8>, head_addr: u64) -> Self {
        Packet {
            head,
            head_addr,
            frags: Vec::new(),
            queue: 0,
            csum_offload: false,
            gso_mss: None,
        }
    }

    /// Appends scatter-gather fragments following the head region.
    pub fn with_frags(mut self, frags: Vec<Frag>) -> Self {
        self.frags = frags;
        self
    }

    /// Tags the packet with the stack's queue mapping.
    pub fn with_queue(mut self, queue: u32) -> Self {
        self.queue = queue;
        self
    }

    /// Requests hardware checksum insertion for this packet.
    pub fn with_csum_offload(mut self) -> Self {
        self.csum_offload = true;
        self
    }

    /// Requests generic segmentation offload with the given max segment size.
    pub fn with_gso(mut self, mss: u16) -> Self {
        self.gso_mss = Some(mss);
        self
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn head_addr(&self) -> u64 {
        self.head_addr
    }

    pub fn frags(&self) -> &[Frag] {
        &self.frags
    }

    pub fn queue(&self) -> u32 {
        self.queue
    }

    pub fn csum_offload(&self) -> bool {
        self.csum_offload
    }

    pub fn gso_mss(&self) -> Option<u16> {
        self.gso_mss
    }

    /// Head plus all fragment bytes.
    pub fn total_len(&self) -> u32 {
        self.head.len() as u32 + self.frags.iter().map(|f| f.len).sum::<u32>()
    }

    /// Head region plus scatter-gather fragments, before any splitting.
    pub fn fragment_count(&self) -> usize {
        1 + self.frags.len()
    }

    /// Resolves the header geometry from the head bytes.
    ///
    /// Returns `None` for frames that are not IP, leaving them to go out as
    /// plain frames without offload flags.
    pub fn layout(&self) -> Option<TxLayout> {
        let headers = PacketHeaders::from_ethernet_slice(&self.head).ok()?;

        // VLAN tags (and any other link extensions) widen the L2 region.
        let mut l2_len = Ethernet2Header::LEN as u8;
        for ext in &headers.link_exts {
            l2_len += ext.header_len() as u8;
        }

        let (l3_len, is_ipv4) = match &headers.net {
            Some(NetHeaders::Ipv4(ip, _)) => (ip.header_len() as u8, true),
            Some(NetHeaders::Ipv6(_, _)) => (Ipv6Header::LEN as u8, false),
            _ => return None,
        };

        let (l4_len, proto) = match &headers.transport {
            Some(TransportHeader::Tcp(tcp)) => (tcp.header_len() as u8, L4Proto::Tcp),
            Some(TransportHeader::Udp(_)) => (UdpHeader::LEN as u8, L4Proto::Udp),
            _ => (0, L4Proto::Other),
        };

        Some(TxLayout {
            l2_len,
            l3_len,
            l4_len,
            proto,
            is_ipv4,
        })
    }
}
