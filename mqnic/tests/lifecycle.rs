//! Lifecycle, link supervision, power and reconfiguration behavior.

mod common;

use common::{Event, RecordingNetif, SimHw};
use etherparse::PacketBuilder;
use mqnic::{NicConfig, NicError, Packet, PowerState, TxError};

fn packet() -> Packet {
    let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
        .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
        .udp(5000, 5001);
    let mut head = Vec::new();
    builder.write(&mut head, b"payload").unwrap();
    Packet::new(head, 0x1000)
}

#[tokio::test]
async fn start_sequences_hardware_and_raises_every_queue() {
    common::init_logging();
    let hw = SimHw::msix(4);
    let netif = RecordingNetif::new();
    let nic = mqnic::Nic::new(hw.clone(), netif.clone()).unwrap();
    nic.init().unwrap();
    nic.start().await.unwrap();

    // The resolved vector count also depends on the online CPUs.
    let vecs = nic.config().vecs;
    assert_eq!(hw.called("reset"), 1);
    assert_eq!(hw.called("init"), 1);
    assert_eq!(hw.called("ring_tx_init"), vecs as usize);
    assert_eq!(hw.called("ring_tx_start"), vecs as usize);
    assert_eq!(hw.called("start"), 1);
    assert_eq!(hw.called("set_packet_filter"), 1);
    assert_eq!(hw.called("irq_enable"), 1);
    for idx in 0..vecs {
        assert_eq!(netif.count(Event::QueueStart(idx)), 1);
    }
    // Carrier starts off until the monitor observes a live link.
    assert_eq!(netif.count(Event::CarrierOff), 1);
}

#[tokio::test]
async fn polling_mode_runs_without_interrupts() {
    let hw = SimHw::msix(2);
    let cfg = NicConfig {
        is_polling: true,
        ..NicConfig::default()
    };
    let nic = mqnic::Nic::with_config(hw.clone(), RecordingNetif::new(), cfg).unwrap();
    nic.start().await.unwrap();
    assert_eq!(hw.called("irq_enable"), 0);
    nic.stop().await.unwrap();
}

#[tokio::test]
async fn stop_halts_hardware_and_blocks_transmit() {
    let hw = SimHw::msix(2);
    let netif = RecordingNetif::new();
    let nic = mqnic::Nic::new(hw.clone(), netif.clone()).unwrap();
    nic.start().await.unwrap();
    nic.stop().await.unwrap();

    let vecs = nic.config().vecs;
    assert_eq!(hw.called("irq_disable"), 1);
    assert_eq!(hw.called("ring_tx_stop"), vecs as usize);
    assert_eq!(hw.called("stop"), 1);
    for idx in 0..vecs {
        assert_eq!(netif.count(Event::QueueStop(idx)), 1);
    }
    assert!(matches!(nic.transmit(packet()), Err(TxError::Busy(_))));
}

#[tokio::test]
async fn start_failure_aborts_the_remaining_sequence() {
    let hw = SimHw::msix(2);
    let netif = RecordingNetif::new();
    let nic = mqnic::Nic::new(hw.clone(), netif.clone()).unwrap();
    hw.fail("start");

    assert!(nic.start().await.is_err());
    assert_eq!(hw.called("set_interrupt_moderation"), 0);
    assert_eq!(hw.called("irq_enable"), 0);
    assert_eq!(netif.count(Event::QueueStart(0)), 0);
    assert!(matches!(nic.transmit(packet()), Err(TxError::Busy(_))));
}

#[tokio::test]
async fn link_transitions_signal_carrier_exactly_once() {
    let hw = SimHw::msix(1);
    let netif = RecordingNetif::new();
    let nic = mqnic::Nic::new(hw.clone(), netif.clone()).unwrap();
    nic.start().await.unwrap();
    let offs_at_start = netif.count(Event::CarrierOff);

    hw.set_link(10_000);
    nic.service_tick();
    nic.service_tick();
    assert_eq!(netif.count(Event::CarrierOn), 1);
    assert_eq!(nic.link_speed(), 10_000);
    assert!(nic.link_status().is_up());

    hw.set_link(0);
    nic.service_tick();
    nic.service_tick();
    assert_eq!(netif.count(Event::CarrierOff), offs_at_start + 1);
    assert_eq!(nic.link_speed(), 0);
}

#[tokio::test]
async fn monitor_absorbs_link_poll_failures() {
    let hw = SimHw::msix(1);
    let netif = RecordingNetif::new();
    let nic = mqnic::Nic::new(hw.clone(), netif.clone()).unwrap();
    nic.start().await.unwrap();

    hw.fail("link_status");
    nic.service_tick();
    assert_eq!(netif.count(Event::CarrierOn), 0);

    hw.clear_failures();
    hw.set_link(1_000);
    nic.service_tick();
    assert_eq!(netif.count(Event::CarrierOn), 1);
}

#[tokio::test]
async fn suspend_and_resume_cycle_the_device() {
    let hw = SimHw::msix(2);
    let netif = RecordingNetif::new();
    let nic = mqnic::Nic::new(hw.clone(), netif.clone()).unwrap();
    nic.init().unwrap();
    nic.start().await.unwrap();

    nic.set_power_state(PowerState::D3).await.unwrap();
    assert_eq!(netif.count(Event::Detach), 1);
    assert_eq!(hw.called("stop"), 1);
    assert_eq!(hw.called("set_power"), 1);
    assert_eq!(nic.power_state(), PowerState::D3);
    assert!(matches!(nic.transmit(packet()), Err(TxError::Busy(_))));

    nic.set_power_state(PowerState::D0).await.unwrap();
    assert_eq!(netif.count(Event::Attach), 1);
    assert_eq!(hw.called("reset"), 2);
    assert_eq!(hw.called("start"), 2);
    assert_eq!(nic.power_state(), PowerState::D0);
    nic.transmit(packet()).unwrap();

    nic.stop().await.unwrap();
}

#[tokio::test]
async fn suspend_of_a_stopped_device_is_a_no_op() {
    let hw = SimHw::msix(1);
    let nic = mqnic::Nic::new(hw.clone(), RecordingNetif::new()).unwrap();
    nic.set_power_state(PowerState::D3).await.unwrap();
    assert_eq!(hw.called("stop"), 0);
    assert_eq!(hw.called("set_power"), 0);
}

#[test]
fn mtu_above_capability_is_rejected() {
    let nic = mqnic::Nic::new(SimHw::msix(1), RecordingNetif::new()).unwrap();
    let before = nic.mtu();
    assert!(matches!(
        nic.set_mtu(64 * 1024),
        Err(NicError::ConfigInvalid(_))
    ));
    assert_eq!(nic.mtu(), before);
    nic.set_mtu(9000).unwrap();
    assert_eq!(nic.mtu(), 9000);
}

#[test]
fn fixed_link_speed_must_be_within_capability() {
    let hw = SimHw::msix(1);
    let nic = mqnic::Nic::new(hw.clone(), RecordingNetif::new()).unwrap();

    // 2.5G is a valid rate but outside this hardware's mask.
    assert!(matches!(
        nic.set_link_speed(false, 2_500),
        Err(NicError::ConfigInvalid(_))
    ));
    assert!(matches!(
        nic.set_link_speed(false, 1_234),
        Err(NicError::ConfigInvalid(_))
    ));
    assert_eq!(hw.called("set_link_speed"), 0);

    nic.set_link_speed(false, 10_000).unwrap();
    nic.set_link_speed(true, 0).unwrap();
    assert_eq!(hw.called("set_link_speed"), 2);
}

#[test]
fn multicast_list_is_bounded() {
    let hw = SimHw::msix(1);
    let nic = mqnic::Nic::new(hw.clone(), RecordingNetif::new()).unwrap();

    let too_many = vec![[0x01, 0, 0x5e, 0, 0, 1]; 33];
    assert!(matches!(
        nic.set_multicast_list(&too_many),
        Err(NicError::ConfigInvalid(_))
    ));
    assert_eq!(hw.called("set_multicast_list"), 0);

    let ok = vec![[0x01, 0, 0x5e, 0, 0, 1]; 8];
    nic.set_multicast_list(&ok).unwrap();
    assert_eq!(hw.called("set_multicast_list"), 1);
}

#[test]
fn mac_address_updates_after_hardware_accepts() {
    let hw = SimHw::msix(1);
    let nic = mqnic::Nic::new(hw.clone(), RecordingNetif::new()).unwrap();
    assert_eq!(nic.mac_address(), [0x02, 0x00, 0x00, 0xaa, 0xbb, 0xcc]);

    hw.fail("set_mac_address");
    let new_mac = [0x02, 0, 0, 1, 2, 3];
    assert!(nic.set_mac_address(new_mac).is_err());
    assert_ne!(nic.mac_address(), new_mac);

    hw.clear_failures();
    nic.set_mac_address(new_mac).unwrap();
    assert_eq!(nic.mac_address(), new_mac);
}

#[test]
fn diagnostics_expose_firmware_and_registers() -> anyhow::Result<()> {
    let nic = mqnic::Nic::new(SimHw::msix(1), RecordingNetif::new())?;
    assert_eq!(nic.fw_version()?, 0x0301_002a);
    let regs = nic.regs()?;
    assert_eq!(regs.len(), nic.regs_count() as usize);
    assert_eq!(regs, vec![0, 1, 2, 3]);
    Ok(())
}
