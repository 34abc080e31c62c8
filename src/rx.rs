//! The receive pipeline: the four baseband receive signals (preamble, frame
//! start, buffer level, frame end) drive a partial-frame buffer and publish
//! completed frames through the pump.

use heapless::Vec;

use crate::{
    PhyState, Radio, RadioError,
    bus::CommandBus,
    params::{MAX_PSDU_LEN, Modulation, OfdmMcs},
    regs::{BbReg, RfReg, bb_irq},
    time::{IrqGuard, TimerSource},
    timing,
};

/// A completed (or FCS-failed) reception, handed to the caller by
/// [`Radio::poll`].
#[derive(Clone, Debug)]
pub struct RxFrame {
    /// Payload octets, trailer included.
    pub psdu: Vec<u8, MAX_PSDU_LEN>,
    /// Frame start on the local microsecond timebase (latched hardware
    /// counter plus the clock-correlation offset).
    pub start_time_us: u32,
    /// Computed airtime of the whole frame.
    pub duration_us: u32,
    /// Modulation parameters actually observed in the PHY header.
    pub modulation: Modulation,
    pub rssi_dbm: i8,
    pub fcs_valid: bool,
}

/// A reception between its validated header and its final octet.
pub(crate) struct RxInProgress {
    pub frame: RxFrame,
    pub declared_len: usize,
    /// Octets already drained from the frame buffer.
    pub read_offset: usize,
}

impl<B: CommandBus, T: TimerSource> Radio<B, T> {
    /// Receive-side interrupt dispatch.
    ///
    /// A fast frame can report start and end in the same batch, before the
    /// state machine has advanced past the header; the flag matching the
    /// current stage is therefore served first, then the rest in document
    /// order (preamble, frame start, frame end, buffer level).
    pub(crate) fn dispatch_rx(&mut self, bb: u8) -> Result<(), RadioError> {
        let mut pending = bb
            & (bb_irq::RXFS | bb_irq::RXFE | bb_irq::AGCH | bb_irq::AGCR | bb_irq::FBLI);
        if pending == 0 {
            return Ok(());
        }

        if pending & bb_irq::RXFS != 0 && self.state == PhyState::ReceivingHeader {
            self.on_frame_start()?;
            pending &= !bb_irq::RXFS;
        }
        if self.state == PhyState::ReceivingPayload {
            if pending & bb_irq::RXFE != 0 {
                self.on_frame_end()?;
                pending &= !(bb_irq::RXFE | bb_irq::AGCR | bb_irq::FBLI);
            } else if pending & bb_irq::AGCR != 0 {
                self.on_agc_release()?;
                pending &= !(bb_irq::AGCR | bb_irq::FBLI);
            }
        }

        if pending & bb_irq::AGCH != 0 {
            self.on_preamble()?;
        }
        if pending & bb_irq::RXFS != 0
            && matches!(
                self.state,
                PhyState::Listening | PhyState::ReceivingHeader
            )
        {
            self.on_frame_start()?;
        }
        if pending & bb_irq::RXFE != 0 && self.state == PhyState::ReceivingPayload {
            self.on_frame_end()?;
            pending &= !bb_irq::FBLI;
        }
        if pending & bb_irq::FBLI != 0 && self.state == PhyState::ReceivingPayload {
            self.on_buffer_level()?;
        }
        Ok(())
    }

    /// AGC locked onto a preamble.
    fn on_preamble(&mut self) -> Result<(), RadioError> {
        match self.state {
            PhyState::Listening => self.state = PhyState::ReceivingHeader,
            PhyState::ReceivingHeader | PhyState::ReceivingPayload => {
                // A stronger signal pre-empted the reception in progress.
                self.stats.rx_override += 1;
                self.rx = None;
                self.state = PhyState::ReceivingHeader;
            }
            _ => {}
        }
        Ok(())
    }

    /// A valid PHY header was detected: validate the declared length,
    /// decode the header fields, set up buffering and timestamp the frame.
    fn on_frame_start(&mut self) -> Result<(), RadioError> {
        let declared = self.interface.read_bb_len(BbReg::RxFll)?;
        if declared < self.config.fcs.len() || declared > MAX_PSDU_LEN {
            debug!("bad rx length {=usize}", declared);
            self.stats.rx_bad_len += 1;
            return self.abort_rx_to_listen();
        }

        let Some(modulation) = self.observed_modulation()? else {
            self.stats.rx_bad_format += 1;
            return self.abort_rx_to_listen();
        };

        let t = timing::frame_timing(&modulation, declared);
        // One buffer-level interrupt drains the bulk of the payload; the
        // frame-end read stays small.
        let threshold =
            timing::fbli_threshold(&modulation, declared, self.timing_model.fbli_headroom_us);
        self.interface.write_bb_len(BbReg::FbliL, threshold)?;

        // Timestamp: the baseband latched its counter on the frame start;
        // the correlation offset moves it onto the local timebase.
        let latched = self.interface.read_counter()?;
        let start_time_us = latched.wrapping_add(self.counter_offset);

        self.rx = Some(RxInProgress {
            frame: RxFrame {
                psdu: Vec::new(),
                start_time_us,
                duration_us: t.duration_us,
                modulation,
                rssi_dbm: 0,
                fcs_valid: false,
            },
            declared_len: declared,
            read_offset: 0,
        });
        self.state = PhyState::ReceivingPayload;
        Ok(())
    }

    /// Decode the family-specific header fields the transmitter actually
    /// used. `None` means a malformed header.
    fn observed_modulation(&mut self) -> Result<Option<Modulation>, RadioError> {
        match &self.config.modulation {
            Modulation::Fsk(p) => {
                let phr = self.interface.read_bb(BbReg::FskPhrRx)?;
                if phr & 0xC0 != 0 {
                    // Reserved header bits set.
                    return Ok(None);
                }
                let mut params = p.clone();
                params.fec = phr & 0x01 != 0;
                Ok(Some(Modulation::Fsk(params)))
            }
            Modulation::Ofdm(p) => {
                let phr = self.interface.read_bb(BbReg::OfdmPhrRx)?;
                let Some(mcs) = OfdmMcs::from_header_bits(phr) else {
                    return Ok(None);
                };
                if mcs < p.option.min_mcs() {
                    return Ok(None);
                }
                let mut params = p.clone();
                params.mcs = mcs;
                Ok(Some(Modulation::Ofdm(params)))
            }
        }
    }

    /// The frame buffer reached the programmed level: drain what is there
    /// so the frame-end read stays short.
    fn on_buffer_level(&mut self) -> Result<(), RadioError> {
        let available = self.interface.read_bb_len(BbReg::FbLvlL)?;
        self.drain_rx(available)
    }

    /// Copy frame-buffer octets up to `upto` into the frame, resuming at
    /// the recorded offset.
    fn drain_rx(&mut self, upto: usize) -> Result<(), RadioError> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(());
        };
        let upto = upto.min(rx.declared_len);
        if upto <= rx.read_offset {
            return Ok(());
        }
        if rx.frame.psdu.resize_default(upto).is_err() {
            // Cannot happen: declared_len was bounds-checked at frame
            // start.
            return Err(RadioError::PayloadSize(upto));
        }
        let from = rx.read_offset;
        self.interface
            .read_frame(from, &mut rx.frame.psdu[from..upto])?;
        rx.read_offset = upto;
        Ok(())
    }

    /// Frame complete: final drain, signal level, FCS verdict, publish.
    fn on_frame_end(&mut self) -> Result<(), RadioError> {
        let declared = match &self.rx {
            Some(rx) => rx.declared_len,
            None => return Ok(()),
        };
        self.drain_rx(declared)?;
        let rssi = self.interface.read_rf(RfReg::Edv)? as i8;

        let Some(mut rx) = self.rx.take() else {
            return Ok(());
        };
        rx.frame.rssi_dbm = rssi;
        // With automatic checking enabled the end interrupt only fires for
        // frames whose FCS checked out.
        rx.frame.fcs_valid = true;
        self.stats.rx_total += 1;
        self.publish_frame(rx.frame);

        // A valid reception may be what a programmed transmission was
        // waiting to avoid.
        self.cancel_on_rx_slots();

        self.state = PhyState::Listening;
        Ok(())
    }

    /// AGC released without a frame end. With automatic FCS checking that
    /// means either a failed check (buffer already holds the declared
    /// length) or a stronger competitor stomped on the reception.
    fn on_agc_release(&mut self) -> Result<(), RadioError> {
        if self.rx.is_none() {
            self.state = PhyState::Listening;
            return Ok(());
        }
        // Only what actually arrived; the frame may have been cut short.
        let available = self.interface.read_bb_len(BbReg::FbLvlL)?;
        self.drain_rx(available)?;
        let rssi = self.interface.read_rf(RfReg::Edv)? as i8;

        let Some(mut rx) = self.rx.take() else {
            return Ok(());
        };
        if rx.frame.psdu.len() >= rx.declared_len {
            rx.frame.rssi_dbm = rssi;
            rx.frame.fcs_valid = false;
            self.stats.rx_bad_fcs += 1;
            self.publish_frame(rx.frame);
        } else {
            self.stats.rx_override += 1;
        }
        self.state = PhyState::Listening;
        Ok(())
    }

    /// Hand a finished frame to the pump queue; when the caller has fallen
    /// behind, the oldest unread one gives way and is counted.
    fn publish_frame(&mut self, frame: RxFrame) {
        let _guard = IrqGuard::new(&mut self.timer);
        if self.indications.push_drop_oldest(frame) {
            self.stats.rx_not_handled += 1;
        }
    }

    /// Drop a reception in progress during an abort-class transition. Its
    /// header was already validated, so it is accounted as not handled
    /// rather than silently lost.
    pub(crate) fn abort_reception(&mut self) {
        if self.rx.take().is_some() {
            self.stats.rx_not_handled += 1;
        }
        if matches!(
            self.state,
            PhyState::ReceivingHeader | PhyState::ReceivingPayload
        ) {
            self.state = PhyState::Listening;
        }
    }

    /// Invalid header: discard and return to listening immediately.
    fn abort_rx_to_listen(&mut self) -> Result<(), RadioError> {
        self.rx = None;
        self.enter_rx()
    }
}
