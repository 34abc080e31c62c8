//! End-to-end scenarios against the mock bus and timer: scheduling, CCA,
//! cancellation, the receive pipeline and the notification guarantees.

mod common;

use common::{BusCtl, MockBus, MockTimer, TimerCtl, mock_bus, mock_timer};
use sun_radios::{
    PhyState, Radio, RadioError, RadioEvent,
    params::{
        CcaMode, FskParams, Modulation, OfdmInterleaving, OfdmMcs, OfdmOption, OfdmParams,
        PhyConfig,
    },
    regs::{Band, bb_irq, rf_irq},
    time::time_diff,
    timing,
    tx::{TimeMode, TxConfirm, TxId, TxRequest, TxResult},
};

type TestRadio = Radio<MockBus, MockTimer>;

const CMD_TRXOFF: u8 = 0x2;
const CMD_TX: u8 = 0x4;
const CMD_RX: u8 = 0x5;

const REG_AMCS: u16 = 0x0340;
const REG_FBLI: u16 = 0x030A;

fn fsk_radio() -> (TestRadio, BusCtl, TimerCtl) {
    let (bus, bus_ctl) = mock_bus();
    let (timer, timer_ctl) = mock_timer();
    let radio = Radio::new(bus, timer, Band::SubGhz, PhyConfig::default(), 0)
        .expect("radio init");
    (radio, bus_ctl, timer_ctl)
}

fn ofdm_radio() -> (TestRadio, BusCtl, TimerCtl) {
    let (bus, bus_ctl) = mock_bus();
    let (timer, timer_ctl) = mock_timer();
    let config = PhyConfig {
        modulation: Modulation::Ofdm(OfdmParams::default()),
        ..PhyConfig::default()
    };
    let radio = Radio::new(bus, timer, Band::SubGhz, config, 0).expect("radio init");
    (radio, bus_ctl, timer_ctl)
}

/// Drive an already-started transmission through TRXRDY and TXFE.
fn finish_tx(radio: &mut TestRadio, bus: &BusCtl) {
    bus.raise_irq(rf_irq::TRXRDY, 0);
    radio.handle_interrupt().unwrap();
    bus.raise_irq(0, bb_irq::TXFE);
    radio.handle_interrupt().unwrap();
}

fn poll_confirm(radio: &mut TestRadio) -> TxConfirm {
    match radio.poll().unwrap() {
        Some(RadioEvent::TxConfirm(c)) => c,
        other => panic!("expected confirm, got {other:?}"),
    }
}

fn poll_frame(radio: &mut TestRadio) -> sun_radios::rx::RxFrame {
    match radio.poll().unwrap() {
        Some(RadioEvent::Rx(f)) => f,
        other => panic!("expected frame, got {other:?}"),
    }
}

fn assert_idle(radio: &mut TestRadio) {
    assert!(radio.poll().unwrap().is_none());
}

/// Begin a reception of `payload` up to the validated header.
fn start_reception(radio: &mut TestRadio, bus: &BusCtl, payload: &[u8]) {
    bus.stage_rx_frame(payload, 0x00);
    bus.raise_irq(0, bb_irq::AGCH);
    radio.handle_interrupt().unwrap();
    assert_eq!(radio.state(), PhyState::ReceivingHeader);
    bus.raise_irq(0, bb_irq::RXFS);
    radio.handle_interrupt().unwrap();
    assert_eq!(radio.state(), PhyState::ReceivingPayload);
}

#[test]
fn init_leaves_radio_listening() {
    let (mut radio, bus, _timer) = fsk_radio();
    assert_eq!(radio.state(), PhyState::Listening);
    assert_eq!(bus.cmd_log().last(), Some(&CMD_RX));
    assert_idle(&mut radio);
}

#[test]
fn init_rejects_unknown_part() {
    let (bus, bus_ctl) = mock_bus();
    let (timer, _timer_ctl) = mock_timer();
    bus_ctl.set_reg(0x000D, 0x99);
    let result = Radio::new(bus, timer, Band::SubGhz, PhyConfig::default(), 0);
    assert!(matches!(result, Err(RadioError::PartNumber)));
}

#[test]
fn instantaneous_fsk_matches_closed_form() {
    let (mut radio, bus, _timer) = fsk_radio();
    // 50 kHz, 2-FSK, FEC off: the synchronization header alone is 80
    // symbols.
    assert_eq!(timing::fsk_shr_symbols(&FskParams::default()), 80);

    let psdu = [0u8; 8];
    radio
        .transmit(&TxRequest::immediate(TxId(1), &psdu))
        .unwrap();
    finish_tx(&mut radio, &bus);

    let confirm = poll_confirm(&mut radio);
    assert_eq!(confirm.id, TxId(1));
    assert_eq!(confirm.result, TxResult::Success);
    let expected = timing::frame_timing(&Modulation::Fsk(FskParams::default()), 8).duration_us;
    assert_eq!(confirm.duration_us, expected);
    assert_eq!(confirm.duration_us, 3_200);
    assert_eq!(radio.state(), PhyState::Listening);
    assert_idle(&mut radio);
}

#[test]
fn ofdm_mcs_below_option_minimum_rejected_without_hardware() {
    let (mut radio, bus, _timer) = ofdm_radio();
    let writes_before = bus.writes();
    let psdu = [0u8; 16];
    let req = TxRequest {
        modulation: Some(Modulation::Ofdm(OfdmParams {
            option: OfdmOption::Option4,
            mcs: OfdmMcs::Mcs1,
            interleaving: OfdmInterleaving::Mode0,
        })),
        ..TxRequest::immediate(TxId(2), &psdu)
    };
    radio.transmit(&req).unwrap();

    assert_eq!(bus.writes(), writes_before);
    let confirm = poll_confirm(&mut radio);
    assert_eq!(confirm.result, TxResult::InvalidParam);
    assert_eq!(confirm.duration_us, 0);
}

#[test]
fn undersized_psdu_rejected_without_hardware() {
    let (mut radio, bus, _timer) = fsk_radio();
    let writes_before = bus.writes();
    // Shorter than the 32-bit FCS alone.
    radio
        .transmit(&TxRequest::immediate(TxId(3), &[0u8; 2]))
        .unwrap();
    assert_eq!(bus.writes(), writes_before);
    assert_eq!(poll_confirm(&mut radio).result, TxResult::InvalidLength);
}

#[test]
fn repeated_id_while_in_flight_stays_single() {
    let (mut radio, bus, _timer) = fsk_radio();
    let psdu = [0u8; 8];
    radio
        .transmit(&TxRequest::immediate(TxId(5), &psdu))
        .unwrap();
    // Retransmission request for the same logical frame: a no-op.
    radio
        .transmit(&TxRequest::immediate(TxId(5), &psdu))
        .unwrap();
    finish_tx(&mut radio, &bus);

    let tx_cmds = bus.cmd_log().iter().filter(|&&c| c == CMD_TX).count();
    assert_eq!(tx_cmds, 1);
    assert_eq!(poll_confirm(&mut radio).result, TxResult::Success);
    assert_idle(&mut radio);
}

#[test]
fn programmed_same_id_updates_in_place() {
    let (mut radio, _bus, timer) = fsk_radio();
    let psdu = [0u8; 8];
    let target = timer.now() + 50_000;
    let req = TxRequest {
        time_us: target,
        mode: TimeMode::Absolute,
        ..TxRequest::immediate(TxId(7), &psdu)
    };
    radio.transmit(&req).unwrap();
    assert_eq!(timer.pending(), 1);

    // Identical request: nothing changes.
    radio.transmit(&req).unwrap();
    assert_eq!(timer.pending(), 1);
    assert_idle(&mut radio);

    // Changed parameters: updated in place, still one slot, one callback.
    let changed = TxRequest {
        attenuation_db: 6,
        ..req.clone()
    };
    radio.transmit(&changed).unwrap();
    assert_eq!(timer.pending(), 1);
    assert_idle(&mut radio);

    // The pool holds two slots; a third identifier finds none free.
    let other = TxRequest {
        id: TxId(8),
        ..req.clone()
    };
    radio.transmit(&other).unwrap();
    assert_eq!(timer.pending(), 2);
    let third = TxRequest {
        id: TxId(9),
        ..req.clone()
    };
    radio.transmit(&third).unwrap();
    let confirm = poll_confirm(&mut radio);
    assert_eq!(confirm.id, TxId(9));
    assert_eq!(confirm.result, TxResult::QueueFull);
}

#[test]
fn scheduled_transmission_fires_at_programmed_instant() {
    let (mut radio, bus, timer) = fsk_radio();
    let psdu = [0u8; 8];
    let target = timer.now() + 50_000;
    radio
        .transmit(&TxRequest {
            time_us: target,
            mode: TimeMode::Absolute,
            ..TxRequest::immediate(TxId(2), &psdu)
        })
        .unwrap();

    // Not due yet.
    timer.advance(49_000);
    assert!(timer.due_tokens().is_empty());

    timer.advance(800);
    let tokens = timer.due_tokens();
    assert_eq!(tokens.len(), 1);
    radio.timer_expired(tokens[0]).unwrap();
    assert_eq!(radio.state(), PhyState::PreparingToTransmit);

    bus.raise_irq(rf_irq::TRXRDY, 0);
    radio.handle_interrupt().unwrap();
    assert_eq!(radio.state(), PhyState::Transmitting);
    // The trigger went out at (target - trigger latency), within the
    // spin loop's counter granularity.
    let fired_at = timer.now();
    let offset = time_diff(fired_at, target - 100);
    assert!((0..20).contains(&offset), "trigger offset {offset}");

    bus.raise_irq(0, bb_irq::TXFE);
    radio.handle_interrupt().unwrap();
    assert_eq!(poll_confirm(&mut radio).result, TxResult::Success);
}

#[test]
fn programming_window_overflow_times_out() {
    let (mut radio, _bus, _timer) = fsk_radio();
    let psdu = [0u8; 8];
    radio
        .transmit(&TxRequest {
            time_us: 700_000_000, // beyond the ~10 minute window
            mode: TimeMode::Relative,
            ..TxRequest::immediate(TxId(1), &psdu)
        })
        .unwrap();
    assert_eq!(poll_confirm(&mut radio).result, TxResult::Timeout);
}

#[test]
fn cca_clear_channel_transmits() {
    let (mut radio, bus, _timer) = fsk_radio();
    let psdu = [0u8; 8];
    bus.set_ed_level(-100);
    radio
        .transmit(&TxRequest {
            cca: CcaMode::EnergyDetect,
            ..TxRequest::immediate(TxId(4), &psdu)
        })
        .unwrap();

    bus.raise_irq(rf_irq::TRXRDY, 0);
    radio.handle_interrupt().unwrap();
    assert_eq!(radio.state(), PhyState::AwaitingEnergyDetection);
    // Single (final) measurement: CCA-then-transmit armed in hardware.
    assert_eq!(bus.reg(REG_AMCS), 0x03);

    bus.raise_irq(rf_irq::EDC, 0);
    radio.handle_interrupt().unwrap();
    assert_eq!(radio.state(), PhyState::Transmitting);

    bus.raise_irq(0, bb_irq::TXFE);
    radio.handle_interrupt().unwrap();
    assert_eq!(poll_confirm(&mut radio).result, TxResult::Success);
    // Automatism disarmed again, auto-receive kept.
    assert_eq!(bus.reg(REG_AMCS), 0x01);
}

#[test]
fn cca_busy_channel_aborts() {
    let (mut radio, bus, _timer) = fsk_radio();
    let psdu = [0u8; 8];
    bus.set_ed_level(-40);
    radio
        .transmit(&TxRequest {
            cca: CcaMode::EnergyDetect,
            ..TxRequest::immediate(TxId(4), &psdu)
        })
        .unwrap();

    bus.raise_irq(rf_irq::TRXRDY, 0);
    radio.handle_interrupt().unwrap();
    bus.raise_irq(rf_irq::EDC, 0);
    radio.handle_interrupt().unwrap();

    let confirm = poll_confirm(&mut radio);
    assert_eq!(confirm.result, TxResult::ChannelBusy);
    assert_eq!(radio.state(), PhyState::Listening);
    assert_eq!(radio.statistics().tx_busy, 1);
}

#[test]
fn contention_window_runs_extra_detections() {
    let (mut radio, bus, timer) = fsk_radio();
    let psdu = [0u8; 8];
    bus.set_ed_level(-100);
    radio
        .transmit(&TxRequest {
            cca: CcaMode::EnergyDetect,
            contention_window: 2,
            ..TxRequest::immediate(TxId(4), &psdu)
        })
        .unwrap();

    bus.raise_irq(rf_irq::TRXRDY, 0);
    radio.handle_interrupt().unwrap();
    // Two backoff slots remain: the automatism must not be armed yet.
    assert_eq!(bus.reg(REG_AMCS), 0x01);

    for _ in 0..2 {
        bus.raise_irq(rf_irq::EDC, 0);
        radio.handle_interrupt().unwrap();
        assert_eq!(radio.state(), PhyState::AwaitingEnergyDetection);
        timer.advance(1_100);
        for token in timer.due_tokens() {
            radio.timer_expired(token).unwrap();
        }
    }
    // Final measurement is the armed one.
    assert_eq!(bus.reg(REG_AMCS), 0x03);
    bus.raise_irq(rf_irq::EDC, 0);
    radio.handle_interrupt().unwrap();
    assert_eq!(radio.state(), PhyState::Transmitting);

    bus.raise_irq(0, bb_irq::TXFE);
    radio.handle_interrupt().unwrap();
    assert_eq!(poll_confirm(&mut radio).result, TxResult::Success);
}

#[test]
fn cancel_before_commit_frees_slot() {
    let (mut radio, _bus, timer) = fsk_radio();
    let psdu = [0u8; 8];
    radio
        .transmit(&TxRequest {
            time_us: 50_000,
            mode: TimeMode::Relative,
            ..TxRequest::immediate(TxId(3), &psdu)
        })
        .unwrap();
    assert_eq!(timer.pending(), 1);

    radio
        .transmit(&TxRequest {
            mode: TimeMode::Cancel,
            ..TxRequest::immediate(TxId(3), &[])
        })
        .unwrap();
    assert_eq!(timer.pending(), 0);
    let confirm = poll_confirm(&mut radio);
    assert_eq!(confirm.result, TxResult::Cancelled);
    assert_eq!(confirm.duration_us, 0);
    // Exactly one terminal notification.
    assert_idle(&mut radio);
}

#[test]
fn cancel_unknown_id_reports_invalid() {
    let (mut radio, _bus, _timer) = fsk_radio();
    radio
        .transmit(&TxRequest {
            mode: TimeMode::Cancel,
            ..TxRequest::immediate(TxId(9), &[])
        })
        .unwrap();
    assert_eq!(poll_confirm(&mut radio).result, TxResult::InvalidParam);
}

#[test]
fn cancel_in_flight_reports_clipped_elapsed() {
    let (mut radio, bus, timer) = fsk_radio();
    let psdu = [0u8; 100]; // 17.92 ms on the air
    radio
        .transmit(&TxRequest::immediate(TxId(6), &psdu))
        .unwrap();
    bus.raise_irq(rf_irq::TRXRDY, 0);
    radio.handle_interrupt().unwrap();
    assert_eq!(radio.state(), PhyState::Transmitting);

    timer.advance(5_000);
    radio
        .transmit(&TxRequest {
            mode: TimeMode::Cancel,
            ..TxRequest::immediate(TxId(6), &[])
        })
        .unwrap();

    let confirm = poll_confirm(&mut radio);
    assert_eq!(confirm.result, TxResult::Aborted);
    assert!(
        (4_000..=7_000).contains(&confirm.duration_us),
        "elapsed {}",
        confirm.duration_us
    );
    // Abort sequence went through the off state and back to listening.
    let log = bus.cmd_log();
    assert!(log.contains(&CMD_TRXOFF));
    assert_eq!(log.last(), Some(&CMD_RX));
    assert_eq!(radio.state(), PhyState::Listening);
    assert_idle(&mut radio);
}

#[test]
fn confirmations_surface_in_finalize_order() {
    let (mut radio, bus, timer) = fsk_radio();
    let long = [0u8; 200];
    let short = [0u8; 8];
    let base = timer.now();
    // The long frame is requested first but scheduled later.
    radio
        .transmit(&TxRequest {
            time_us: base + 80_000,
            mode: TimeMode::Absolute,
            ..TxRequest::immediate(TxId(1), &long)
        })
        .unwrap();
    radio
        .transmit(&TxRequest {
            time_us: base + 30_000,
            mode: TimeMode::Absolute,
            ..TxRequest::immediate(TxId(2), &short)
        })
        .unwrap();

    timer.advance(31_000);
    for token in timer.due_tokens() {
        radio.timer_expired(token).unwrap();
    }
    finish_tx(&mut radio, &bus);

    timer.advance(50_000);
    for token in timer.due_tokens() {
        radio.timer_expired(token).unwrap();
    }
    finish_tx(&mut radio, &bus);

    assert_eq!(poll_confirm(&mut radio).id, TxId(2));
    assert_eq!(poll_confirm(&mut radio).id, TxId(1));
}

#[test]
fn reception_end_to_end() {
    let (mut radio, bus, _timer) = fsk_radio();
    let payload: Vec<u8> = (0..16).collect();
    start_reception(&mut radio, &bus, &payload);

    bus.set_ed_level(-70);
    bus.raise_irq(0, bb_irq::RXFE);
    radio.handle_interrupt().unwrap();
    assert_eq!(radio.state(), PhyState::Listening);

    let frame = poll_frame(&mut radio);
    assert_eq!(frame.psdu.as_slice(), payload.as_slice());
    assert!(frame.fcs_valid);
    assert_eq!(frame.rssi_dbm, -70);
    let expected = timing::frame_timing(&Modulation::Fsk(FskParams::default()), 16).duration_us;
    assert_eq!(frame.duration_us, expected);
    assert_eq!(radio.statistics().rx_total, 1);
    assert_idle(&mut radio);
}

#[test]
fn reception_drains_partial_buffer_first() {
    let (mut radio, bus, _timer) = fsk_radio();
    let payload: Vec<u8> = (0..100).collect();
    start_reception(&mut radio, &bus, &payload);
    // 400 µs headroom at 160 µs/octet keeps two octets for the final read.
    assert_eq!(bus.reg(REG_FBLI), 98);

    bus.set_buffer_level(98);
    bus.raise_irq(0, bb_irq::FBLI);
    radio.handle_interrupt().unwrap();

    bus.set_buffer_level(100);
    bus.raise_irq(0, bb_irq::RXFE);
    radio.handle_interrupt().unwrap();

    let frame = poll_frame(&mut radio);
    assert_eq!(frame.psdu.as_slice(), payload.as_slice());
}

#[test]
fn fast_frame_start_and_end_in_one_batch() {
    let (mut radio, bus, _timer) = fsk_radio();
    let payload: Vec<u8> = (0..8).collect();
    bus.stage_rx_frame(&payload, 0x00);
    bus.raise_irq(0, bb_irq::AGCH);
    radio.handle_interrupt().unwrap();
    // Start and end captured by the same interrupt poll.
    bus.raise_irq(0, bb_irq::RXFS | bb_irq::RXFE);
    radio.handle_interrupt().unwrap();

    let frame = poll_frame(&mut radio);
    assert_eq!(frame.psdu.as_slice(), payload.as_slice());
    assert_eq!(radio.state(), PhyState::Listening);
}

#[test]
fn zero_length_header_counts_bad_length() {
    let (mut radio, bus, _timer) = fsk_radio();
    bus.stage_rx_frame(&[], 0x00);
    bus.raise_irq(0, bb_irq::AGCH);
    radio.handle_interrupt().unwrap();
    bus.raise_irq(0, bb_irq::RXFS);
    radio.handle_interrupt().unwrap();

    assert_eq!(radio.statistics().rx_bad_len, 1);
    assert_eq!(radio.state(), PhyState::Listening);
    assert_eq!(bus.cmd_log().last(), Some(&CMD_RX));
    assert_idle(&mut radio);
}

#[test]
fn reserved_header_bits_count_bad_format() {
    let (mut radio, bus, _timer) = fsk_radio();
    bus.stage_rx_frame(&[0u8; 16], 0x80);
    bus.raise_irq(0, bb_irq::AGCH);
    radio.handle_interrupt().unwrap();
    bus.raise_irq(0, bb_irq::RXFS);
    radio.handle_interrupt().unwrap();

    assert_eq!(radio.statistics().rx_bad_format, 1);
    assert_eq!(radio.state(), PhyState::Listening);
}

#[test]
fn agc_release_with_full_buffer_is_failed_fcs() {
    let (mut radio, bus, _timer) = fsk_radio();
    let payload: Vec<u8> = (0..16).collect();
    start_reception(&mut radio, &bus, &payload);

    bus.raise_irq(0, bb_irq::AGCR);
    radio.handle_interrupt().unwrap();

    let frame = poll_frame(&mut radio);
    assert!(!frame.fcs_valid);
    assert_eq!(radio.statistics().rx_bad_fcs, 1);
    assert_eq!(radio.statistics().rx_total, 0);
}

#[test]
fn agc_release_mid_payload_is_an_override() {
    let (mut radio, bus, _timer) = fsk_radio();
    let payload: Vec<u8> = (0..64).collect();
    start_reception(&mut radio, &bus, &payload);
    // Only part of the payload ever arrived.
    bus.set_buffer_level(10);
    bus.raise_irq(0, bb_irq::FBLI);
    radio.handle_interrupt().unwrap();

    bus.raise_irq(0, bb_irq::AGCR);
    radio.handle_interrupt().unwrap();

    assert_eq!(radio.statistics().rx_override, 1);
    assert_eq!(radio.state(), PhyState::Listening);
    assert_idle(&mut radio);
}

#[test]
fn preamble_during_reception_counts_override() {
    let (mut radio, bus, _timer) = fsk_radio();
    start_reception(&mut radio, &bus, &[0u8; 32]);

    bus.raise_irq(0, bb_irq::AGCH);
    radio.handle_interrupt().unwrap();
    assert_eq!(radio.statistics().rx_override, 1);
    assert_eq!(radio.state(), PhyState::ReceivingHeader);
}

#[test]
fn indication_overflow_drops_oldest() {
    let (mut radio, bus, _timer) = fsk_radio();
    for first in [0x11u8, 0x22, 0x33] {
        let mut payload = vec![0u8; 16];
        payload[0] = first;
        start_reception(&mut radio, &bus, &payload);
        bus.raise_irq(0, bb_irq::RXFE);
        radio.handle_interrupt().unwrap();
    }
    // Capacity is two: the first frame gave way, and was counted.
    assert_eq!(radio.statistics().rx_not_handled, 1);
    assert_eq!(radio.statistics().rx_total, 3);
    assert_eq!(poll_frame(&mut radio).psdu[0], 0x22);
    assert_eq!(poll_frame(&mut radio).psdu[0], 0x33);
    assert_idle(&mut radio);
}

#[test]
fn confirm_overflow_drops_oldest_and_counts() {
    let (mut radio, _bus, _timer) = fsk_radio();
    // Four synthetic failures against a three-deep queue.
    for id in 1..=4u8 {
        radio
            .transmit(&TxRequest::immediate(TxId(id), &[0u8; 1]))
            .unwrap();
    }
    assert_eq!(radio.statistics().cfm_not_handled, 1);
    assert_eq!(poll_confirm(&mut radio).id, TxId(2));
    assert_eq!(poll_confirm(&mut radio).id, TxId(3));
    assert_eq!(poll_confirm(&mut radio).id, TxId(4));
    assert_idle(&mut radio);
}

#[test]
fn duplicate_failure_confirm_overwrites_in_place() {
    let (mut radio, _bus, _timer) = fsk_radio();
    radio
        .transmit(&TxRequest::immediate(TxId(7), &[0u8; 1]))
        .unwrap();
    radio
        .transmit(&TxRequest::immediate(TxId(7), &[0u8; 1]))
        .unwrap();
    assert_eq!(poll_confirm(&mut radio).id, TxId(7));
    assert_idle(&mut radio);
}

#[test]
fn instantaneous_during_reception_is_busy_rx() {
    let (mut radio, bus, _timer) = fsk_radio();
    start_reception(&mut radio, &bus, &[0u8; 64]);

    radio
        .transmit(&TxRequest::immediate(TxId(1), &[0u8; 8]))
        .unwrap();
    assert_eq!(poll_confirm(&mut radio).result, TxResult::BusyRx);
    assert_eq!(radio.statistics().tx_busy, 1);
    // The reception carries on.
    assert_eq!(radio.state(), PhyState::ReceivingPayload);
}

#[test]
fn programmed_transmission_preempts_reception() {
    let (mut radio, bus, timer) = fsk_radio();
    let psdu = [0u8; 8];
    radio
        .transmit(&TxRequest {
            time_us: 20_000,
            mode: TimeMode::Relative,
            ..TxRequest::immediate(TxId(2), &psdu)
        })
        .unwrap();

    // A long reception is under way when the programmed instant arrives.
    start_reception(&mut radio, &bus, &[0u8; 1500]);

    timer.advance(20_000);
    for token in timer.due_tokens() {
        radio.timer_expired(token).unwrap();
    }
    assert_eq!(radio.state(), PhyState::PreparingToTransmit);
    // The dropped reception had a validated header; it is accounted for.
    assert_eq!(radio.statistics().rx_not_handled, 1);

    finish_tx(&mut radio, &bus);
    assert_eq!(poll_confirm(&mut radio).result, TxResult::Success);
}

#[test]
fn reception_cancels_flagged_programmed_transmission() {
    let (mut radio, bus, timer) = fsk_radio();
    let psdu = [0u8; 8];
    radio
        .transmit(&TxRequest {
            time_us: 500_000,
            mode: TimeMode::Relative,
            cancel_on_rx: true,
            ..TxRequest::immediate(TxId(3), &psdu)
        })
        .unwrap();
    assert_eq!(timer.pending(), 1);

    start_reception(&mut radio, &bus, &[0u8; 16]);
    bus.raise_irq(0, bb_irq::RXFE);
    radio.handle_interrupt().unwrap();

    assert_eq!(timer.pending(), 0);
    assert_eq!(poll_confirm(&mut radio).result, TxResult::Cancelled);
    assert!(matches!(
        radio.poll().unwrap(),
        Some(RadioEvent::Rx(_))
    ));
}

#[test]
fn sleep_aborts_programmed_work_and_blocks_requests() {
    let (mut radio, _bus, timer) = fsk_radio();
    let psdu = [0u8; 8];
    radio
        .transmit(&TxRequest {
            time_us: 50_000,
            mode: TimeMode::Relative,
            ..TxRequest::immediate(TxId(1), &psdu)
        })
        .unwrap();

    radio.sleep().unwrap();
    assert_eq!(radio.state(), PhyState::Slept);
    assert_eq!(timer.pending(), 0);
    assert_eq!(poll_confirm(&mut radio).result, TxResult::Cancelled);

    assert!(matches!(
        radio.transmit(&TxRequest::immediate(TxId(2), &psdu)),
        Err(RadioError::State)
    ));

    radio.wake().unwrap();
    assert_eq!(radio.state(), PhyState::Listening);
}

#[test]
fn family_change_requires_matching_override() {
    let (mut radio, _bus, _timer) = fsk_radio();
    // An OFDM override on an FSK instance cannot be carried per-frame.
    let req = TxRequest {
        modulation: Some(Modulation::Ofdm(OfdmParams::default())),
        ..TxRequest::immediate(TxId(1), &[0u8; 8])
    };
    radio.transmit(&req).unwrap();
    assert_eq!(poll_confirm(&mut radio).result, TxResult::InvalidParam);
}

#[test]
fn set_config_switches_family_after_quiesce() {
    let (mut radio, bus, _timer) = fsk_radio();
    let config = PhyConfig {
        modulation: Modulation::Ofdm(OfdmParams::default()),
        ..PhyConfig::default()
    };
    radio.set_config(config).unwrap();
    assert_eq!(radio.state(), PhyState::Listening);
    // Quiesced through the off state on the way.
    assert!(bus.cmd_log().contains(&CMD_TRXOFF));
    // PHY type field now reads OFDM.
    assert_eq!(bus.reg(0x0301) & 0b11, 0b10);
}
