//! The transmit scheduler: request validation, time-programmed transmission
//! slots, CCA / contention-window sequencing, precise-instant triggering and
//! cancellation.
//!
//! A request either fails validation (synthetic confirmation, no hardware
//! touched) or is accepted; every accepted request produces exactly one
//! terminal [`TxConfirm`] through the pump, including cancelled and aborted
//! ones.

use heapless::Vec;

use crate::{
    PhyState, Radio, RadioError, TX_SLOT_COUNT,
    bus::CommandBus,
    params::{CcaMode, MAX_PSDU_LEN, Modulation},
    queue::PushOutcome,
    regs::{BbReg, EdMode, RfReg, TrxCmd, amcs, bb_irq, rf_irq},
    time::{IrqGuard, TimerHandle, TimerSource, TimerToken, time_diff},
    timing,
};

/// Callback tag for the precise-start wake of the already-prepared
/// transmission.
pub(crate) const TOKEN_ACTIVE: TimerToken = TimerToken(0xFE);
/// Callback tag for the next contention-window energy detection.
pub(crate) const TOKEN_ED_STEP: TimerToken = TimerToken(0xFD);

/// Caller-chosen identifier correlating a request with its confirmation,
/// re-programming and cancellation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxId(pub u8);

/// How `time_us` in a request is to be interpreted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeMode {
    /// Send as soon as possible; `time_us` is ignored.
    Instantaneous,
    /// Send `time_us` µs from now.
    Relative,
    /// Send when the counter reads `time_us`.
    Absolute,
    /// Abort the request previously made under the same identifier.
    Cancel,
}

/// A transmit request. The PSDU is copied on acceptance; the reference only
/// needs to live for the `transmit` call.
#[derive(Clone, Debug)]
pub struct TxRequest<'a> {
    /// Payload octets, trailer included.
    pub psdu: &'a [u8],
    pub time_us: u32,
    pub mode: TimeMode,
    pub cca: CcaMode,
    /// Frontend attenuation below maximum output power, 0..=31 dB.
    pub attenuation_db: u8,
    pub id: TxId,
    /// Remaining slotted-CSMA backoff slots; 0 means unslotted.
    pub contention_window: u8,
    /// Drop this programmed transmission when a valid frame is received
    /// first.
    pub cancel_on_rx: bool,
    /// Modulation override for this frame; `None` uses the instance
    /// configuration. The family must match the configured one.
    pub modulation: Option<Modulation>,
}

impl<'a> TxRequest<'a> {
    /// An unscheduled, CCA-less request at full power.
    pub fn immediate(id: TxId, psdu: &'a [u8]) -> Self {
        Self {
            psdu,
            time_us: 0,
            mode: TimeMode::Instantaneous,
            cca: CcaMode::Off,
            attenuation_db: 0,
            id,
            contention_window: 0,
            cancel_on_rx: false,
            modulation: None,
        }
    }
}

/// Terminal result of a transmit request.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxResult {
    Success,
    /// An energy-detection step found the channel occupied.
    ChannelBusy,
    /// The radio was already transmitting.
    BusyTx,
    /// The radio was receiving a frame.
    BusyRx,
    InvalidLength,
    InvalidParam,
    /// The programming window or a hardware-ready wait was missed.
    Timeout,
    /// No free programmed-transmission slot.
    QueueFull,
    /// Cancelled before reaching the air.
    Cancelled,
    /// Aborted after energy had (or may have) left the antenna.
    Aborted,
}

/// The one terminal notification per accepted request.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxConfirm {
    pub id: TxId,
    pub result: TxResult,
    /// Frame airtime: the expected duration on success, the clipped elapsed
    /// time on abort, zero otherwise.
    pub duration_us: u32,
}

/// Accepted request, owned by the driver.
#[derive(Clone, Debug)]
pub(crate) struct TxDescriptor {
    pub psdu: Vec<u8, MAX_PSDU_LEN>,
    pub modulation: Modulation,
    /// Absolute start time (the request instant for unscheduled ones).
    pub target_us: u32,
    pub cca: CcaMode,
    pub attenuation_db: u8,
    pub id: TxId,
    pub contention_window: u8,
    pub cancel_on_rx: bool,
}

impl TxDescriptor {
    /// Would re-programming with `req`/`target` change anything?
    fn matches(&self, req: &TxRequest<'_>, target: u32, modulation: &Modulation) -> bool {
        self.psdu.as_slice() == req.psdu
            && self.target_us == target
            && self.cca == req.cca
            && self.attenuation_db == req.attenuation_db
            && self.contention_window == req.contention_window
            && self.cancel_on_rx == req.cancel_on_rx
            && &self.modulation == modulation
    }
}

/// A not-yet-due transmission and its scheduled wake callback.
pub(crate) struct ProgrammedTx {
    pub desc: TxDescriptor,
    pub handle: TimerHandle,
}

/// The transmission currently owning the hardware.
pub(crate) struct ActiveTx {
    pub desc: TxDescriptor,
    /// Precise start instant, when the request was timed.
    pub target: Option<u32>,
    /// Contention-window energy detections still owed.
    pub cw_remaining: u8,
    /// Expected airtime from the timing calculator.
    pub duration_us: u32,
    /// When energy started leaving the antenna.
    pub started_us: u32,
    /// The transmit trigger has been issued (or armed in hardware); past
    /// this point cancellation means aborting, not discarding.
    pub committed: bool,
}

impl<B: CommandBus, T: TimerSource> Radio<B, T> {
    /// Request a transmission (or, with [`TimeMode::Cancel`], abort one).
    ///
    /// Returns `Err` only for requests that cannot be accepted at all (the
    /// radio is in reset/sleep, or the bus failed); those produce no
    /// confirmation. Everything else — including validation failures — is
    /// answered with exactly one [`TxConfirm`] via [`Radio::poll`].
    pub fn transmit(&mut self, req: &TxRequest<'_>) -> Result<(), RadioError> {
        if matches!(self.state, PhyState::Reset | PhyState::Slept) {
            return Err(RadioError::State);
        }
        if req.mode == TimeMode::Cancel {
            return self.cancel_tx(req.id);
        }

        if let Some(reason) = self.validate_tx(req) {
            self.queue_confirm(TxConfirm {
                id: req.id,
                result: reason,
                duration_us: 0,
            });
            return Ok(());
        }

        // At most one active transmission per identifier: a request for an
        // id already in flight changes nothing and confirms once, through
        // the in-flight one.
        if self.active.as_ref().is_some_and(|a| a.desc.id == req.id) {
            return Ok(());
        }

        let now = self.timer.now();
        let target = match req.mode {
            TimeMode::Relative => now.wrapping_add(req.time_us),
            TimeMode::Absolute => req.time_us,
            _ => now,
        };

        if let Some(idx) = self.slot_index(req.id) {
            return self.reprogram_slot(idx, req, target);
        }

        match req.mode {
            TimeMode::Instantaneous => self.begin_immediate(req),
            _ => self.program_slot(req, target),
        }
    }

    /// Timer-service callback entry point (interrupt context). `token` is
    /// whatever was passed to the time source when the callback was armed.
    pub fn timer_expired(&mut self, token: TimerToken) -> Result<(), RadioError> {
        match token {
            TOKEN_ACTIVE => self.on_active_wake(),
            TOKEN_ED_STEP => {
                if self.state == PhyState::AwaitingEnergyDetection {
                    self.begin_ed_step()
                } else {
                    Ok(())
                }
            }
            TimerToken(idx) if (idx as usize) < TX_SLOT_COUNT => self.on_slot_wake(idx as usize),
            _ => Ok(()),
        }
    }

    /// Check a request against the things that must hold before any
    /// hardware is touched.
    fn validate_tx(&self, req: &TxRequest<'_>) -> Option<TxResult> {
        let min = self.config.fcs.len();
        if req.psdu.len() < min || req.psdu.len() > MAX_PSDU_LEN {
            return Some(TxResult::InvalidLength);
        }
        if req.attenuation_db > 31 {
            return Some(TxResult::InvalidParam);
        }
        if let Some(m) = &req.modulation {
            if m.validate().is_err() {
                return Some(TxResult::InvalidParam);
            }
            // Per-frame overrides may retune within the family, not switch
            // family (that requires quiescing the transceiver).
            if core::mem::discriminant(m) != core::mem::discriminant(&self.config.modulation) {
                return Some(TxResult::InvalidParam);
            }
        }
        None
    }

    /// Delay between starting the hardware sequence and energy leaving the
    /// antenna, for the request's CCA/backoff settings. Programmed wake
    /// times subtract this so the requested instant holds for the final
    /// transmission, not for the first CCA sub-step.
    pub(crate) fn tx_total_delay(&self, cca: CcaMode, cw: u8) -> u32 {
        let tm = &self.timing_model;
        let mut delay = tm.tx_prep_us + tm.tx_cmd_us;
        if cca == CcaMode::EnergyDetect {
            delay += self.config.ed.duration_us as u32 + self.turnaround_us;
            delay += cw as u32 * self.turnaround_us;
        }
        delay
    }

    fn descriptor_from(&self, req: &TxRequest<'_>, target: u32) -> TxDescriptor {
        TxDescriptor {
            psdu: Vec::from_slice(req.psdu).unwrap_or_default(),
            modulation: self.tx_modulation(req),
            target_us: target,
            cca: req.cca,
            attenuation_db: req.attenuation_db,
            id: req.id,
            contention_window: req.contention_window,
            cancel_on_rx: req.cancel_on_rx,
        }
    }

    fn tx_modulation(&self, req: &TxRequest<'_>) -> Modulation {
        req.modulation
            .clone()
            .unwrap_or_else(|| self.config.modulation.clone())
    }

    fn slot_index(&self, id: TxId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|p| p.desc.id == id))
    }

    fn begin_immediate(&mut self, req: &TxRequest<'_>) -> Result<(), RadioError> {
        match self.state {
            PhyState::Listening => {}
            PhyState::ReceivingHeader | PhyState::ReceivingPayload => {
                self.stats.tx_busy += 1;
                self.queue_confirm(TxConfirm {
                    id: req.id,
                    result: TxResult::BusyRx,
                    duration_us: 0,
                });
                return Ok(());
            }
            _ => {
                self.stats.tx_busy += 1;
                self.queue_confirm(TxConfirm {
                    id: req.id,
                    result: TxResult::BusyTx,
                    duration_us: 0,
                });
                return Ok(());
            }
        }
        let desc = self.descriptor_from(req, self.timer.now());
        self.start_transmission(desc, None)
    }

    /// Park a relative/absolute request in a free slot and arm its wake
    /// callback at (target - total delay).
    fn program_slot(&mut self, req: &TxRequest<'_>, target: u32) -> Result<(), RadioError> {
        let Some(free) = self.slots.iter().position(|s| s.is_none()) else {
            self.queue_confirm(TxConfirm {
                id: req.id,
                result: TxResult::QueueFull,
                duration_us: 0,
            });
            return Ok(());
        };

        let total = self.tx_total_delay(req.cca, req.contention_window);
        let wake = target.wrapping_sub(total);
        match self.timer.schedule(wake, false, TimerToken(free as u8)) {
            Ok(handle) => {
                self.slots[free] = Some(ProgrammedTx {
                    desc: self.descriptor_from(req, target),
                    handle,
                });
                Ok(())
            }
            Err(_) => {
                // The service would not take a callback that far out (or
                // that near); a timed request that cannot be programmed is
                // a timeout.
                self.queue_confirm(TxConfirm {
                    id: req.id,
                    result: TxResult::Timeout,
                    duration_us: 0,
                });
                Ok(())
            }
        }
    }

    /// A repeated request for a programmed identifier: no-op when nothing
    /// changes, in-place update otherwise.
    fn reprogram_slot(
        &mut self,
        idx: usize,
        req: &TxRequest<'_>,
        target: u32,
    ) -> Result<(), RadioError> {
        let modulation = self.tx_modulation(req);
        if let Some(slot) = &self.slots[idx] {
            if slot.desc.matches(req, target, &modulation) {
                return Ok(());
            }
        }
        if let Some(old) = self.slots[idx].take() {
            // Cancel before re-arming, so one logical request can never
            // fire twice.
            let _ = self.timer.cancel(old.handle);
        }
        self.program_slot(req, target)
    }

    /// A programmed transmission's wake callback fired.
    fn on_slot_wake(&mut self, idx: usize) -> Result<(), RadioError> {
        let Some(slot) = self.slots[idx].take() else {
            return Ok(());
        };
        let desc = slot.desc;
        let total = self.tx_total_delay(desc.cca, desc.contention_window);
        let start_at = desc.target_us.wrapping_sub(total);
        let early = -time_diff(self.timer.now(), start_at);

        if early > self.timing_model.rearm_margin_us as i32 {
            // Woken well before the margin (coarse timer); re-arm tighter.
            if let Ok(handle) = self.timer.schedule(start_at, false, TimerToken(idx as u8)) {
                self.slots[idx] = Some(ProgrammedTx { desc, handle });
                return Ok(());
            }
            // Could not re-arm; carry on now rather than lose the frame.
        }

        match self.state {
            PhyState::Listening => {}
            PhyState::ReceivingHeader | PhyState::ReceivingPayload => {
                // The timed transmission wins over a reception in progress.
                self.abort_reception();
            }
            _ => {
                self.stats.tx_busy += 1;
                self.queue_confirm(TxConfirm {
                    id: desc.id,
                    result: TxResult::BusyTx,
                    duration_us: 0,
                });
                return Ok(());
            }
        }

        let target = desc.target_us;
        self.start_transmission(desc, Some(target))
    }

    /// Hand the descriptor to the hardware; any failure degrades to a
    /// timeout-class confirmation instead of taking the driver down.
    fn start_transmission(
        &mut self,
        desc: TxDescriptor,
        target: Option<u32>,
    ) -> Result<(), RadioError> {
        let id = desc.id;
        if let Err(_err) = self.begin_hardware(desc, target) {
            warning!("transmit start failed, id {=u8}", id.0);
            self.stats.tx_err += 1;
            self.active = None;
            self.queue_confirm(TxConfirm {
                id,
                result: TxResult::Timeout,
                duration_us: 0,
            });
            let _ = self.enter_rx();
        }
        Ok(())
    }

    /// Load the frame buffer and start the prepare sequence.
    fn begin_hardware(
        &mut self,
        desc: TxDescriptor,
        target: Option<u32>,
    ) -> Result<(), RadioError> {
        self.claim_bus()?;

        let duration_us = timing::frame_timing(&desc.modulation, desc.psdu.len()).duration_us;

        // Output power: the register takes steps below maximum.
        self.interface
            .write_rf(RfReg::Pac, 0x60 | (31 - desc.attenuation_db))?;
        self.interface.write_bb_len(BbReg::TxFll, desc.psdu.len())?;
        self.interface.write_frame(&desc.psdu)?;

        self.trx_command(TrxCmd::TxPrep)?;
        self.state = PhyState::PreparingToTransmit;
        self.active = Some(ActiveTx {
            cw_remaining: desc.contention_window,
            duration_us,
            started_us: 0,
            committed: false,
            target,
            desc,
        });
        Ok(())
    }

    /// Synthesizer locked (TRXRDY); decide between CCA and the trigger.
    pub(crate) fn on_trx_ready(&mut self) -> Result<(), RadioError> {
        let Some(active) = self.active.as_ref() else {
            return self.enter_rx();
        };

        if active.desc.cca == CcaMode::EnergyDetect {
            // Measurements run from RX.
            self.trx_command(TrxCmd::Rx)?;
            self.state = PhyState::AwaitingEnergyDetection;
            return self.begin_ed_step();
        }

        let Some(target) = active.target else {
            return self.trigger_tx();
        };
        let fire = target.wrapping_sub(self.timing_model.tx_cmd_us);
        let wait = time_diff(fire, self.timer.now());
        if wait <= self.timing_model.spin_threshold_us as i32 {
            return self.spin_until_tx(fire);
        }
        // Too long to pin the CPU; come back just before the instant.
        let wake = fire.wrapping_sub(self.timing_model.spin_threshold_us / 2);
        if self.timer.schedule(wake, false, TOKEN_ACTIVE).is_err() {
            return self.spin_until_tx(fire);
        }
        Ok(())
    }

    /// The precise-start callback for the prepared transmission fired.
    fn on_active_wake(&mut self) -> Result<(), RadioError> {
        if self.state != PhyState::PreparingToTransmit {
            return Ok(());
        }
        let Some(active) = self.active.as_ref() else {
            return Ok(());
        };
        match active.target {
            Some(target) => self.spin_until_tx(target.wrapping_sub(self.timing_model.tx_cmd_us)),
            None => self.trigger_tx(),
        }
    }

    /// Pin the CPU until `fire`, then trigger. Bounded by elapsed time, not
    /// iterations, so it degrades identically on any core clock.
    fn spin_until_tx(&mut self, fire: u32) -> Result<(), RadioError> {
        let entered = self.timer.now();
        loop {
            let now = self.timer.now();
            if time_diff(now, fire) >= 0 {
                break;
            }
            if time_diff(now, entered) > self.timing_model.spin_limit_us as i32 {
                self.stats.tx_err += 1;
                return self.fail_active(TxResult::Timeout);
            }
        }
        self.trigger_tx()
    }

    fn trigger_tx(&mut self) -> Result<(), RadioError> {
        self.trx_command(TrxCmd::Tx)?;
        let now = self.timer.now();
        if let Some(active) = self.active.as_mut() {
            active.started_us = now;
            active.committed = true;
        }
        self.state = PhyState::Transmitting;
        Ok(())
    }

    /// Start one energy-detection measurement. The final one is armed with
    /// the hardware CCA-then-transmit automatism, so a clear channel fires
    /// the transmission without host latency.
    fn begin_ed_step(&mut self) -> Result<(), RadioError> {
        let final_step = self
            .active
            .as_ref()
            .map(|a| a.cw_remaining == 0)
            .unwrap_or(true);
        if final_step {
            self.interface
                .write_bb(BbReg::Amcs, amcs::TX2RX | amcs::CCATX)?;
        }
        self.state = PhyState::AwaitingEnergyDetection;
        self.interface.write_rf(RfReg::Edc, EdMode::Single as u8)
    }

    /// An energy-detection measurement finished.
    pub(crate) fn on_ed_complete(&mut self) -> Result<(), RadioError> {
        if self.active.is_none() {
            return self.enter_rx();
        }
        let level = self.interface.read_rf(RfReg::Edv)? as i8;
        if level >= self.config.ed.threshold_dbm {
            debug!("channel busy at {=i8} dBm", level);
            self.stats.tx_busy += 1;
            // Disarm the automatism before going back to listen.
            self.interface.write_bb(BbReg::Amcs, amcs::TX2RX)?;
            return self.fail_active(TxResult::ChannelBusy);
        }

        let mut more_steps = false;
        let now = self.timer.now();
        if let Some(active) = self.active.as_mut() {
            if active.cw_remaining > 0 {
                active.cw_remaining -= 1;
                more_steps = true;
            } else {
                // The armed final measurement came back clear: the hardware
                // is already driving the transmission on its own.
                active.started_us = now;
                active.committed = true;
            }
        }

        if more_steps {
            // Next contention slot, one turnaround later.
            if self
                .timer
                .schedule(self.turnaround_us, true, TOKEN_ED_STEP)
                .is_err()
            {
                return self.begin_ed_step();
            }
            Ok(())
        } else {
            self.state = PhyState::Transmitting;
            Ok(())
        }
    }

    /// Transmission finished on the air.
    pub(crate) fn on_tx_frame_end(&mut self) -> Result<(), RadioError> {
        // Leave only the auto-receive follow-on armed for the next cycle.
        self.interface.write_bb(BbReg::Amcs, amcs::TX2RX)?;
        if let Some(active) = self.active.take() {
            self.stats.tx_total += 1;
            self.queue_confirm(TxConfirm {
                id: active.desc.id,
                result: TxResult::Success,
                duration_us: active.duration_us,
            });
        }
        // The follow-on has already put the transceiver back in RX.
        self.state = PhyState::Listening;
        Ok(())
    }

    /// Transmit-side interrupt dispatch; receive signals have already been
    /// served.
    pub(crate) fn dispatch_tx(&mut self, rf: u8, bb: u8) -> Result<(), RadioError> {
        if rf & rf_irq::TRXERR != 0 {
            warning!("transceiver rejected a command");
            self.stats.tx_err += 1;
            if matches!(
                self.state,
                PhyState::PreparingToTransmit
                    | PhyState::AwaitingEnergyDetection
                    | PhyState::Transmitting
            ) {
                self.fail_active(TxResult::Timeout)?;
            }
        }
        if rf & rf_irq::TRXRDY != 0 && self.state == PhyState::PreparingToTransmit {
            self.on_trx_ready()?;
        }
        if rf & rf_irq::EDC != 0 && self.state == PhyState::AwaitingEnergyDetection {
            self.on_ed_complete()?;
        }
        if bb & bb_irq::TXFE != 0
            && matches!(
                self.state,
                PhyState::Transmitting | PhyState::TransmitAborting
            )
        {
            self.on_tx_frame_end()?;
        }
        Ok(())
    }

    /// Cancel by identifier: free a programmed slot, or abort the in-flight
    /// transmission.
    fn cancel_tx(&mut self, id: TxId) -> Result<(), RadioError> {
        if let Some(idx) = self.slot_index(id) {
            if let Some(slot) = self.slots[idx].take() {
                let _ = self.timer.cancel(slot.handle);
                self.queue_confirm(TxConfirm {
                    id,
                    result: TxResult::Cancelled,
                    duration_us: 0,
                });
            }
            return Ok(());
        }
        if self.active.as_ref().is_some_and(|a| a.desc.id == id) {
            return self.abort_active();
        }
        // Nothing pending under this identifier.
        self.queue_confirm(TxConfirm {
            id,
            result: TxResult::InvalidParam,
            duration_us: 0,
        });
        Ok(())
    }

    /// Abort the transmission that owns the hardware, without racing the
    /// device's automatic sequences.
    pub(crate) fn abort_active(&mut self) -> Result<(), RadioError> {
        match self.state {
            PhyState::PreparingToTransmit | PhyState::AwaitingEnergyDetection => {
                self.state = PhyState::TransmitAborting;
                // Disarm CCA-then-transmit first, so the hardware cannot
                // fire mid-abort.
                self.interface.write_bb(BbReg::Amcs, amcs::TX2RX)?;
                self.trx_command(TrxCmd::TrxOff)?;
                if let Some(active) = self.active.take() {
                    self.queue_confirm(TxConfirm {
                        id: active.desc.id,
                        result: TxResult::Cancelled,
                        duration_us: 0,
                    });
                }
                self.enter_rx()
            }
            PhyState::Transmitting => {
                let expected_end = self.active.as_ref().map(|a| {
                    a.started_us.wrapping_add(a.duration_us)
                });
                if let Some(end) = expected_end {
                    let remaining = time_diff(end, self.timer.now());
                    if remaining < self.timing_model.abort_margin_us as i32 {
                        // Too close to the natural end to abort without
                        // racing it; wait (bounded) for the end interrupt.
                        let entered = self.timer.now();
                        while self.active.is_some() {
                            self.handle_interrupt()?;
                            if time_diff(self.timer.now(), entered)
                                > self.timing_model.spin_limit_us as i32
                            {
                                break;
                            }
                        }
                        if self.active.is_none() {
                            // Finished cleanly; the success confirmation is
                            // already queued.
                            return Ok(());
                        }
                    }
                }
                self.state = PhyState::TransmitAborting;
                // Auto-receive off before the abort, then off we go.
                self.interface.write_bb(BbReg::Amcs, 0)?;
                self.trx_command(TrxCmd::TrxOff)?;
                if let Some(active) = self.active.take() {
                    let elapsed = time_diff(self.timer.now(), active.started_us)
                        .clamp(0, active.duration_us as i32) as u32;
                    self.queue_confirm(TxConfirm {
                        id: active.desc.id,
                        result: TxResult::Aborted,
                        duration_us: elapsed,
                    });
                }
                self.interface.write_bb(BbReg::Amcs, amcs::TX2RX)?;
                self.enter_rx()
            }
            _ => {
                if let Some(active) = self.active.take() {
                    let result = if active.committed {
                        TxResult::Aborted
                    } else {
                        TxResult::Cancelled
                    };
                    self.queue_confirm(TxConfirm {
                        id: active.desc.id,
                        result,
                        duration_us: 0,
                    });
                }
                Ok(())
            }
        }
    }

    /// Cancel every programmed slot and abort the in-flight transmission,
    /// synthesizing each terminal confirmation. Used by the abort-class
    /// state changes (configuration change, sleep, reset).
    pub(crate) fn abort_all_tx(&mut self) -> Result<(), RadioError> {
        for idx in 0..TX_SLOT_COUNT {
            if let Some(slot) = self.slots[idx].take() {
                let _ = self.timer.cancel(slot.handle);
                self.queue_confirm(TxConfirm {
                    id: slot.desc.id,
                    result: TxResult::Cancelled,
                    duration_us: 0,
                });
            }
        }
        if self.active.is_some() {
            self.abort_active()?;
        }
        Ok(())
    }

    /// A valid frame arrived; drop the programmed transmissions that asked
    /// for that.
    pub(crate) fn cancel_on_rx_slots(&mut self) {
        for idx in 0..TX_SLOT_COUNT {
            if self.slots[idx]
                .as_ref()
                .is_some_and(|s| s.desc.cancel_on_rx)
            {
                if let Some(slot) = self.slots[idx].take() {
                    let _ = self.timer.cancel(slot.handle);
                    self.queue_confirm(TxConfirm {
                        id: slot.desc.id,
                        result: TxResult::Cancelled,
                        duration_us: 0,
                    });
                }
            }
        }
    }

    /// Queue a terminal confirmation. A stale entry under the same
    /// identifier is overwritten in place (never two confirmations per id);
    /// overflow drops the oldest and counts it.
    pub(crate) fn queue_confirm(&mut self, confirm: TxConfirm) {
        let id = confirm.id;
        let _guard = IrqGuard::new(&mut self.timer);
        if self.confirms.replace_or_push(confirm, |c| c.id == id) == PushOutcome::DroppedOldest {
            self.stats.cfm_not_handled += 1;
        }
    }

    /// Terminate the active transmission with `result` and go back to
    /// listening.
    fn fail_active(&mut self, result: TxResult) -> Result<(), RadioError> {
        if let Some(active) = self.active.take() {
            self.queue_confirm(TxConfirm {
                id: active.desc.id,
                result,
                duration_us: 0,
            });
        }
        self.enter_rx()
    }
}
