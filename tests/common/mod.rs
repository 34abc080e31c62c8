//! Mock command bus and timer service for driving the radio on the host.

use std::cell::RefCell;
use std::rc::Rc;

use sun_radios::RadioError;
use sun_radios::bus::CommandBus;
use sun_radios::time::{
    InterruptSource, TimerError, TimerHandle, TimerSource, TimerToken, time_diff,
};

const MEM_SIZE: usize = 0x5000;

/// Sub-GHz register addresses the mock has to model specially.
const REG_RF_STATE: usize = 0x0102;
const REG_RF_CMD: usize = 0x0103;

pub struct BusState {
    pub mem: Vec<u8>,
    pub irq_enabled: bool,
    /// Every value written to the transceiver command register, in order.
    pub cmd_log: Vec<u8>,
    /// Total write transactions.
    pub writes: usize,
}

impl BusState {
    fn new() -> Self {
        let mut mem = vec![0u8; MEM_SIZE];
        mem[0x000D] = 0x34; // part number
        Self {
            mem,
            irq_enabled: true,
            cmd_log: Vec::new(),
            writes: 0,
        }
    }
}

/// The bus half handed to the radio.
pub struct MockBus(Rc<RefCell<BusState>>);

/// The test's handle onto the same state.
#[derive(Clone)]
pub struct BusCtl(Rc<RefCell<BusState>>);

pub fn mock_bus() -> (MockBus, BusCtl) {
    let state = Rc::new(RefCell::new(BusState::new()));
    (MockBus(state.clone()), BusCtl(state))
}

impl InterruptSource for MockBus {
    fn interrupt_enabled(&self) -> bool {
        self.0.borrow().irq_enabled
    }
    fn set_interrupt_enabled(&mut self, enabled: bool) {
        self.0.borrow_mut().irq_enabled = enabled;
    }
}

impl CommandBus for MockBus {
    fn write(&mut self, addr: u16, data: &[u8]) -> Result<(), RadioError> {
        let mut s = self.0.borrow_mut();
        s.writes += 1;
        for (i, b) in data.iter().enumerate() {
            s.mem[addr as usize + i] = *b;
        }
        if addr as usize == REG_RF_CMD {
            let cmd = data[0];
            s.cmd_log.push(cmd);
            // Command reached -> state reached, instantly.
            s.mem[REG_RF_STATE] = match cmd {
                0x1 => 0x2, // sleep reads back as off
                0x2 | 0x7 => 0x2,
                0x3 => 0x3,
                0x4 => 0x4,
                0x5 => 0x5,
                _ => s.mem[REG_RF_STATE],
            };
        }
        Ok(())
    }

    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), RadioError> {
        let mut s = self.0.borrow_mut();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = s.mem[addr as usize + i];
        }
        if addr == 0x0000 {
            // Interrupt status clears on read.
            for b in &mut s.mem[0..4] {
                *b = 0;
            }
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        false
    }
}

impl BusCtl {
    /// Latch interrupt flags for the sub-GHz band.
    pub fn raise_irq(&self, rf: u8, bb: u8) {
        let mut s = self.0.borrow_mut();
        s.mem[0] |= rf;
        s.mem[2] |= bb;
    }

    pub fn set_reg(&self, addr: u16, value: u8) {
        self.0.borrow_mut().mem[addr as usize] = value;
    }

    pub fn reg(&self, addr: u16) -> u8 {
        self.0.borrow().mem[addr as usize]
    }

    pub fn cmd_log(&self) -> Vec<u8> {
        self.0.borrow().cmd_log.clone()
    }

    pub fn writes(&self) -> usize {
        self.0.borrow().writes
    }

    /// Stage an incoming FSK frame: declared length, PHR byte and payload
    /// in the receive frame buffer.
    pub fn stage_rx_frame(&self, payload: &[u8], phr: u8) {
        let mut s = self.0.borrow_mut();
        let len = payload.len() as u16;
        s.mem[0x0304] = (len & 0xFF) as u8; // RXFLL
        s.mem[0x0305] = (len >> 8) as u8;
        s.mem[0x0363] = phr; // FSKPHRRX
        s.mem[0x2000..0x2000 + payload.len()].copy_from_slice(payload);
        // Buffer level: everything already arrived.
        s.mem[0x0308] = (len & 0xFF) as u8;
        s.mem[0x0309] = (len >> 8) as u8;
    }

    /// Current receive-buffer level register (for partial-drain tests).
    pub fn set_buffer_level(&self, level: u16) {
        let mut s = self.0.borrow_mut();
        s.mem[0x0308] = (level & 0xFF) as u8;
        s.mem[0x0309] = (level >> 8) as u8;
    }

    /// Energy-detection result register, two's-complement dBm.
    pub fn set_ed_level(&self, dbm: i8) {
        self.0.borrow_mut().mem[0x0110] = dbm as u8;
    }
}

pub struct TimerState {
    now: u32,
    enabled: bool,
    next_handle: u32,
    pending: Vec<(TimerHandle, u32, TimerToken)>,
}

pub struct MockTimer(Rc<RefCell<TimerState>>);

#[derive(Clone)]
pub struct TimerCtl(Rc<RefCell<TimerState>>);

pub fn mock_timer() -> (MockTimer, TimerCtl) {
    let state = Rc::new(RefCell::new(TimerState {
        now: 1_000,
        enabled: true,
        next_handle: 1,
        pending: Vec::new(),
    }));
    (MockTimer(state.clone()), TimerCtl(state))
}

impl InterruptSource for MockTimer {
    fn interrupt_enabled(&self) -> bool {
        self.0.borrow().enabled
    }
    fn set_interrupt_enabled(&mut self, enabled: bool) {
        self.0.borrow_mut().enabled = enabled;
    }
}

impl TimerSource for MockTimer {
    fn now(&self) -> u32 {
        let mut s = self.0.borrow_mut();
        // The clock keeps running while the driver polls it, so bounded
        // busy-waits make progress.
        s.now = s.now.wrapping_add(1);
        s.now
    }

    fn schedule(
        &mut self,
        time_us: u32,
        relative: bool,
        token: TimerToken,
    ) -> Result<TimerHandle, TimerError> {
        let mut s = self.0.borrow_mut();
        let expiry = if relative {
            s.now.wrapping_add(time_us)
        } else {
            time_us
        };
        let delta = time_diff(expiry, s.now);
        // The service window: 10 ms into the past, 10 minutes ahead.
        if delta < -10_000 || delta > 600_000_000 {
            return Err(TimerError::Window);
        }
        let handle = TimerHandle(s.next_handle);
        s.next_handle += 1;
        s.pending.push((handle, expiry, token));
        Ok(handle)
    }

    fn cancel(&mut self, handle: TimerHandle) -> Result<(), TimerError> {
        let mut s = self.0.borrow_mut();
        let before = s.pending.len();
        s.pending.retain(|(h, _, _)| *h != handle);
        if s.pending.len() == before {
            Err(TimerError::Stale)
        } else {
            Ok(())
        }
    }
}

impl TimerCtl {
    pub fn now(&self) -> u32 {
        self.0.borrow().now
    }

    pub fn advance(&self, us: u32) {
        let mut s = self.0.borrow_mut();
        s.now = s.now.wrapping_add(us);
    }

    pub fn pending(&self) -> usize {
        self.0.borrow().pending.len()
    }

    /// Pop every callback due at the current time, earliest first. The test
    /// delivers them to `Radio::timer_expired` itself.
    pub fn due_tokens(&self) -> Vec<TimerToken> {
        let mut s = self.0.borrow_mut();
        let now = s.now;
        let mut due: Vec<(u32, TimerToken)> = s
            .pending
            .iter()
            .filter(|(_, expiry, _)| time_diff(*expiry, now) <= 0)
            .map(|(_, expiry, token)| (*expiry, *token))
            .collect();
        s.pending.retain(|(_, expiry, _)| time_diff(*expiry, now) > 0);
        due.sort_by_key(|(expiry, _)| *expiry);
        due.into_iter().map(|(_, t)| t).collect()
    }
}
