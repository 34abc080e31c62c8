//! Driver for dual-band (sub-1 GHz / 2.4 GHz) IEEE 802.15.4 SUN-FSK and
//! SUN-OFDM radio transceivers, controlled over a register-oriented command
//! bus and driven by an edge interrupt plus a microsecond hardware timer.
//!
//! One [`Radio`] instance drives one band of the transceiver. The caller
//! wires three entry points into its platform: the device ISR calls
//! [`Radio::handle_interrupt`], the timer service delivers scheduled
//! callbacks to [`Radio::timer_expired`], and the main loop drains
//! confirmations and received frames through [`Radio::poll`]. Nothing
//! caller-visible ever runs from interrupt context.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod bus;
pub mod params;
pub mod pib;
pub mod queue;
pub mod regs;
pub mod rx;
pub mod time;
pub mod timing;
pub mod tx;

#[cfg(feature = "hal")]
pub mod stm32;

use crate::{
    bus::{Channel, CommandBus},
    params::PhyConfig,
    pib::Statistics,
    queue::SlotQueue,
    regs::{Band, BbReg, RfReg, TrxCmd, TrxState, bb_irq, pc, rf_irq},
    rx::{RxFrame, RxInProgress},
    time::{IrqGuard, TimerSource, TimingModel, time_diff},
    tx::{ActiveTx, ProgrammedTx, TxConfirm},
};

/// Programmed (future-time) transmissions held at once.
pub const TX_SLOT_COUNT: usize = 2;

/// Pending transmit confirmations: one per programmed slot plus the
/// instantaneous one.
pub const CONFIRM_QUEUE_CAP: usize = TX_SLOT_COUNT + 1;

/// Completed receptions waiting for the caller before the oldest is dropped.
pub const RX_INDICATION_CAP: usize = 2;

/// Driver-level errors. Asynchronous outcomes are never reported this way;
/// they arrive as [`TxConfirm`] result codes through [`Radio::poll`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// Command-channel transaction failed.
    Bus,
    /// Command channel stayed mid-transaction past the claim deadline.
    BusBusy,
    /// Synthesizer/transceiver never reported the expected state.
    LockTimeout,
    /// Invalid configuration, channel or parameter.
    Config,
    /// PSDU length out of bounds.
    PayloadSize(usize),
    /// Part-number probe failed; not a supported device.
    PartNumber,
    /// The device reported a state byte the driver does not recognize.
    UnexpectedState(u8),
    /// Unknown attribute id, or an access the attribute does not permit.
    Access,
    /// Operation not permitted in the current PHY state.
    State,
}

/// What the radio is doing right now. The single source of truth shared by
/// the transmit scheduler and the receive pipeline; transitions happen only
/// on explicit commands and on hardware interrupt notifications.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhyState {
    Reset,
    Slept,
    /// Idle-but-receptive; re-entered after every completed or aborted
    /// operation.
    Listening,
    ReceivingHeader,
    ReceivingPayload,
    TransmitAborting,
    PreparingToTransmit,
    AwaitingEnergyDetection,
    Transmitting,
}

/// Asynchronous outcome handed to the caller by [`Radio::poll`].
#[derive(Debug)]
pub enum RadioEvent {
    TxConfirm(TxConfirm),
    Rx(RxFrame),
}

/// One radio instance: one band of the transceiver, its PHY configuration,
/// state machine, scheduler and receive pipeline.
pub struct Radio<B: CommandBus, T: TimerSource> {
    pub interface: Channel<B>,
    pub(crate) timer: T,
    pub(crate) config: PhyConfig,
    pub(crate) channel: u16,
    /// Receive/transmit turnaround, also the slotted-CSMA backoff unit, µs.
    pub(crate) turnaround_us: u32,
    pub(crate) state: PhyState,
    pub(crate) timing_model: TimingModel,
    pub(crate) stats: Statistics,
    pub(crate) slots: [Option<ProgrammedTx>; TX_SLOT_COUNT],
    pub(crate) active: Option<ActiveTx>,
    pub(crate) confirms: SlotQueue<TxConfirm, CONFIRM_QUEUE_CAP>,
    pub(crate) rx: Option<RxInProgress>,
    pub(crate) indications: SlotQueue<RxFrame, RX_INDICATION_CAP>,
    /// Local-clock minus baseband-counter correlation for timestamps.
    pub(crate) counter_offset: u32,
    pub(crate) counter_synced_at: u32,
}

impl<B: CommandBus, T: TimerSource> Radio<B, T> {
    /// Bring the transceiver out of reset and leave it listening.
    ///
    /// The whole power-on sequence runs here; there is no persisted state,
    /// so a failed startup is recovered by dropping the instance and calling
    /// `new` again.
    pub fn new(
        bus: B,
        timer: T,
        band: Band,
        config: PhyConfig,
        channel: u16,
    ) -> Result<Self, RadioError> {
        config.validate()?;
        if !config.channel_plan.contains(channel) {
            return Err(RadioError::Config);
        }

        let mut radio = Self {
            interface: Channel::new(bus, band),
            timer,
            config,
            channel,
            turnaround_us: 1_000,
            state: PhyState::Reset,
            timing_model: TimingModel::default(),
            stats: Statistics::default(),
            slots: core::array::from_fn(|_| None),
            active: None,
            confirms: SlotQueue::new(),
            rx: None,
            indications: SlotQueue::new(),
            counter_offset: 0,
            counter_synced_at: 0,
        };
        radio.initialize()?;
        Ok(radio)
    }

    /// Full reset-and-configure sequence. Any error here is fatal to the
    /// startup attempt.
    fn initialize(&mut self) -> Result<(), RadioError> {
        self.interface.write_rf(RfReg::Cmd, TrxCmd::Reset as u8)?;
        self.wait_trx_state(TrxState::TrxOff)?;

        // Sanity check before touching anything else: is this a device we
        // know how to drive?
        let mut pn = [0u8];
        self.interface.bus.read(regs::REG_PART_NUMBER, &mut pn)?;
        if !regs::PART_NUMBERS.contains(&pn[0]) {
            warning!("unsupported part number {=u8:#x}", pn[0]);
            return Err(RadioError::PartNumber);
        }

        self.apply_config()?;
        self.apply_channel()?;

        self.interface.write_rf(
            RfReg::Irqm,
            rf_irq::TRXRDY | rf_irq::EDC | rf_irq::TRXERR,
        )?;
        self.interface.write_bb(
            BbReg::Irqm,
            bb_irq::RXFS | bb_irq::RXFE | bb_irq::AGCH | bb_irq::AGCR | bb_irq::FBLI
                | bb_irq::TXFE,
        )?;

        self.sync_counter()?;
        self.enter_rx()?;
        debug!("radio up, channel {=u16}", self.channel);
        Ok(())
    }

    /// Replace the PHY configuration. Quiesces the transceiver first; any
    /// in-flight operation is terminated with an aborted notification.
    pub fn set_config(&mut self, config: PhyConfig) -> Result<(), RadioError> {
        config.validate()?;
        self.abort_operations()?;
        self.trx_command(TrxCmd::TrxOff)?;
        self.wait_trx_state(TrxState::TrxOff)?;

        self.config = config;
        if !self.config.channel_plan.contains(self.channel) {
            self.channel = self.config.channel_plan.primary.first;
        }
        self.apply_config()?;
        self.apply_channel()?;
        self.enter_rx()
    }

    pub fn config(&self) -> &PhyConfig {
        &self.config
    }

    /// Retune to `channel`. Invalid numbers are rejected before the
    /// transceiver is disturbed.
    pub fn set_channel(&mut self, channel: u16) -> Result<(), RadioError> {
        if !self.config.channel_plan.contains(channel) {
            return Err(RadioError::Config);
        }
        self.channel = channel;
        if self.state == PhyState::Slept {
            return Ok(());
        }
        // Retuning forces the synthesizer through the off state.
        self.abort_operations()?;
        self.trx_command(TrxCmd::TrxOff)?;
        self.wait_trx_state(TrxState::TrxOff)?;
        self.apply_channel()?;
        self.enter_rx()
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn state(&self) -> PhyState {
        self.state
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Scheduling margins; adjust before heavy use if the platform's bus or
    /// interrupt latencies differ much from the defaults.
    pub fn timing_model_mut(&mut self) -> &mut TimingModel {
        &mut self.timing_model
    }

    /// Put the transceiver into its lowest-power state. In-flight
    /// operations are terminated with aborted notifications first.
    pub fn sleep(&mut self) -> Result<(), RadioError> {
        self.abort_operations()?;
        self.trx_command(TrxCmd::TrxOff)?;
        self.wait_trx_state(TrxState::TrxOff)?;
        self.trx_command(TrxCmd::Sleep)?;
        self.state = PhyState::Slept;
        Ok(())
    }

    /// Wake from [`sleep`](Self::sleep) and resume listening.
    pub fn wake(&mut self) -> Result<(), RadioError> {
        if self.state != PhyState::Slept {
            return Err(RadioError::State);
        }
        self.trx_command(TrxCmd::TrxOff)?;
        self.wait_trx_state(TrxState::TrxOff)?;
        self.sync_counter()?;
        self.enter_rx()
    }

    /// The pump: hand back the next finalized confirmation or received
    /// frame, oldest first. Call this from the main loop; the queues fill
    /// from interrupt context, in finalize order (a later, shorter
    /// transmission can surface before an earlier, longer one).
    pub fn poll(&mut self) -> Result<Option<RadioEvent>, RadioError> {
        // The clock-correlation refresh rides the pump so it never runs
        // from interrupt context.
        if self.state == PhyState::Listening
            && time_diff(self.timer.now(), self.counter_synced_at)
                >= self.timing_model.counter_sync_period_us as i32
        {
            self.sync_counter()?;
        }

        // Both interrupt contexts push into these queues.
        let _timer_guard = IrqGuard::new(&mut self.timer);
        let _dev_guard = IrqGuard::new(&mut self.interface.bus);
        if let Some(confirm) = self.confirms.pop() {
            return Ok(Some(RadioEvent::TxConfirm(confirm)));
        }
        if let Some(frame) = self.indications.pop() {
            return Ok(Some(RadioEvent::Rx(frame)));
        }
        Ok(None)
    }

    /// Device-signal interrupt entry point. Reads and clears the interrupt
    /// status, then serves receive signals (in their documented priority)
    /// before transmit ones.
    pub fn handle_interrupt(&mut self) -> Result<(), RadioError> {
        let mut irqs = [0u8; 4];
        self.claim_bus()?;
        self.interface
            .bus
            .read(regs::REG_IRQ_STATUS_BASE, &mut irqs)?;
        let rf = irqs[regs::rf_irq_index(self.interface.band)];
        let bb = irqs[regs::bb_irq_index(self.interface.band)];
        if rf == 0 && bb == 0 {
            return Ok(());
        }
        trace!("irq rf={=u8:#x} bb={=u8:#x}", rf, bb);
        self.dispatch_rx(bb)?;
        self.dispatch_tx(rf, bb)?;
        Ok(())
    }

    /// Correlate the baseband cycle counter with the local clock; receive
    /// timestamps are the latched counter plus this offset.
    pub(crate) fn sync_counter(&mut self) -> Result<(), RadioError> {
        let cnt = self.interface.read_counter()?;
        let now = self.timer.now();
        self.counter_offset = now.wrapping_sub(cnt);
        self.counter_synced_at = now;
        Ok(())
    }

    /// Terminate every in-flight and programmed operation, synthesizing its
    /// terminal notification, before an abort-class state change
    /// (configuration change, retune, sleep, reset).
    pub(crate) fn abort_operations(&mut self) -> Result<(), RadioError> {
        self.abort_all_tx()?;
        self.abort_reception();
        Ok(())
    }

    /// Issue a transceiver state-machine command.
    pub(crate) fn trx_command(&mut self, cmd: TrxCmd) -> Result<(), RadioError> {
        self.claim_bus()?;
        self.interface.write_rf(RfReg::Cmd, cmd as u8)
    }

    /// Wait (bounded) for the command channel to finish any in-flight
    /// transaction, so a multi-step sequence never corrupts one.
    pub(crate) fn claim_bus(&mut self) -> Result<(), RadioError> {
        if !self.interface.bus.is_busy() {
            return Ok(());
        }
        let start = self.timer.now();
        while self.interface.bus.is_busy() {
            if time_diff(self.timer.now(), start)
                > self.timing_model.bus_claim_timeout_us as i32
            {
                return Err(RadioError::BusBusy);
            }
        }
        Ok(())
    }

    /// Wait (bounded, elapsed-time) for the transceiver to reach `want`.
    pub(crate) fn wait_trx_state(&mut self, want: TrxState) -> Result<(), RadioError> {
        let start = self.timer.now();
        loop {
            let raw = self.interface.read_rf(RfReg::State)?;
            match TrxState::from_byte(raw) {
                Some(state) if state == want => return Ok(()),
                Some(_) => {}
                None => return Err(RadioError::UnexpectedState(raw)),
            }
            if time_diff(self.timer.now(), start)
                > self.timing_model.trx_ready_timeout_us as i32
            {
                return Err(RadioError::LockTimeout);
            }
        }
    }

    /// Return to the idle-but-receptive state.
    pub(crate) fn enter_rx(&mut self) -> Result<(), RadioError> {
        self.trx_command(TrxCmd::Rx)?;
        self.state = PhyState::Listening;
        Ok(())
    }

    /// Write the PHY-type/FCS/ED configuration to the baseband and radio
    /// blocks. The transceiver must be quiesced when the family changes.
    fn apply_config(&mut self) -> Result<(), RadioError> {
        let mut pc_val = pc::BBEN | pc::TXAFCS | pc::FCSFE | self.config.modulation.pt_value();
        if self.config.fcs == params::FcsType::Fcs16 {
            pc_val |= pc::FCST;
        }
        self.interface.write_bb(BbReg::Pc, pc_val)?;

        // ED duration register counts 32 µs steps.
        let edd = (self.config.ed.duration_us / 32).clamp(1, 255) as u8;
        self.interface.write_rf(RfReg::Edd, edd)?;
        self.interface
            .write_bb(BbReg::Amedt, self.config.ed.threshold_dbm as u8)?;

        // Stay in RX after a completed transmission without host action.
        self.interface.write_bb(BbReg::Amcs, regs::amcs::TX2RX)
    }

    /// Tune the synthesizer to the configured channel. The deeper
    /// channel-table math lives in the frontend; these registers take the
    /// plan's center/spacing in 25 kHz steps.
    fn apply_channel(&mut self) -> Result<(), RadioError> {
        let plan = &self.config.channel_plan;
        // The 2.4 GHz synthesizer is programmed relative to 1.5 GHz.
        let base_off: u32 = match self.interface.band {
            Band::SubGhz => 0,
            Band::Ghz24 => 1_500_000_000,
        };
        let center = plan.center_hz.saturating_sub(base_off) / 25_000;
        let spacing = (plan.spacing_hz / 25_000).min(0xFF) as u8;

        self.interface.write_rf(RfReg::Cs, spacing)?;
        self.interface
            .write_rf(RfReg::Ccf0L, (center & 0xFF) as u8)?;
        self.interface
            .write_rf(RfReg::Ccf0H, ((center >> 8) & 0xFF) as u8)?;
        self.interface
            .write_rf(RfReg::CnL, (self.channel & 0xFF) as u8)?;
        // Writing the high bits latches the new tuning.
        self.interface
            .write_rf(RfReg::CnM, ((self.channel >> 8) & 0x07) as u8)
    }
}
