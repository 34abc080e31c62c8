//! Time services consumed by the driver: the microsecond time source, the
//! interrupt-masking guard used for critical regions, and the timing-model
//! constants that gather every empirically-tuned scheduling margin in one
//! place.

/// Something whose interrupt delivery can be masked. Implemented by the
/// time source (timer interrupt) and the command bus (device signal line).
pub trait InterruptSource {
    fn interrupt_enabled(&self) -> bool;
    fn set_interrupt_enabled(&mut self, enabled: bool);
}

/// Cancellation handle for a scheduled callback.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerHandle(pub u32);

/// Opaque tag passed back to [`crate::Radio::timer_expired`] when the
/// callback fires; the scheduler uses it to find the matching slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerToken(pub u8);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError {
    /// The requested expiry is outside the window the service accepts
    /// (roughly 10 ms in the past to 10 minutes ahead).
    Window,
    /// No free callback slot.
    NoSlot,
    /// The handle does not name a pending callback.
    Stale,
}

/// The monotonic 32-bit microsecond counter and its one-shot callbacks.
///
/// Callbacks fire from interrupt context: the platform's timer ISR calls
/// [`crate::Radio::timer_expired`] with the token given to [`schedule`].
/// The counter wraps roughly every 71 minutes; compare timestamps with
/// [`time_diff`], never with `<`.
///
/// [`schedule`]: TimerSource::schedule
pub trait TimerSource: InterruptSource {
    /// Current counter value, in µs.
    fn now(&self) -> u32;

    /// Request a one-shot callback at `time_us` (absolute counter value, or
    /// offset from now when `relative`).
    fn schedule(
        &mut self,
        time_us: u32,
        relative: bool,
        token: TimerToken,
    ) -> Result<TimerHandle, TimerError>;

    /// Cancel a pending callback.
    fn cancel(&mut self, handle: TimerHandle) -> Result<(), TimerError>;
}

/// Signed distance from `b` to `a` on the wrapping microsecond counter.
/// Positive when `a` is later than `b`.
pub fn time_diff(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

/// Critical-region guard: masks an interrupt source on construction and
/// restores its previous masking on drop, so every exit path (including `?`)
/// re-enables it.
pub struct IrqGuard<'a, S: InterruptSource + ?Sized> {
    source: &'a mut S,
    was_enabled: bool,
}

impl<'a, S: InterruptSource + ?Sized> IrqGuard<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        let was_enabled = source.interrupt_enabled();
        source.set_interrupt_enabled(false);
        Self {
            source,
            was_enabled,
        }
    }
}

impl<S: InterruptSource + ?Sized> Drop for IrqGuard<'_, S> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.source.set_interrupt_enabled(true);
        }
    }
}

/// Scheduling margins, in elapsed-time terms.
///
/// These are safety margins, not protocol constants: the defaults suit a
/// cortex-M-class host with a DMA-less SPI link and can be tightened or
/// relaxed per board without touching the scheduler.
#[derive(Clone)]
pub struct TimingModel {
    /// Command issue to the transceiver accepting a transmit trigger.
    pub tx_prep_us: u32,
    /// Transmit trigger to the first symbol leaving the antenna.
    pub tx_cmd_us: u32,
    /// A callback firing earlier than this before its deadline is re-armed
    /// tighter instead of acted on.
    pub rearm_margin_us: u32,
    /// Below this much remaining time, stop waiting for interrupts and spin
    /// on the counter for the exact trigger instant.
    pub spin_threshold_us: u32,
    /// Hard ceiling on any counter-polling loop.
    pub spin_limit_us: u32,
    /// Ceiling on waiting for the synthesizer to report ready.
    pub trx_ready_timeout_us: u32,
    /// Ceiling on waiting for the command channel to go idle.
    pub bus_claim_timeout_us: u32,
    /// Closer than this to an automatic hardware transition, an abort waits
    /// for the hardware to finish instead of racing it.
    pub abort_margin_us: u32,
    /// How much payload airtime to leave after the buffer-level interrupt,
    /// sizing the final in-interrupt buffer read.
    pub fbli_headroom_us: u32,
    /// How often the clock-correlation offset used for receive timestamps
    /// is refreshed.
    pub counter_sync_period_us: u32,
}

impl Default for TimingModel {
    fn default() -> Self {
        Self {
            tx_prep_us: 200,
            tx_cmd_us: 100,
            rearm_margin_us: 500,
            spin_threshold_us: 300,
            spin_limit_us: 5_000,
            trx_ready_timeout_us: 1_000,
            bus_claim_timeout_us: 2_000,
            abort_margin_us: 300,
            fbli_headroom_us: 400,
            counter_sync_period_us: 1_000_000,
        }
    }
}
