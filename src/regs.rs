//! Register map for the transceiver. The device pairs a sub-GHz radio core
//! with a 2.4 GHz one; each band owns a radio block and a baseband block with
//! identical internal layouts at different base addresses, so every register
//! below is addressed as (band base + offset).

/// Which of the two transceiver cores a radio instance drives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Band {
    /// Sub-1 GHz core.
    SubGhz,
    /// 2.4 GHz core.
    Ghz24,
}

impl Band {
    /// Base address of the band's radio (frontend/state machine) block.
    pub fn rf_base(self) -> u16 {
        match self {
            Self::SubGhz => 0x0100,
            Self::Ghz24 => 0x0200,
        }
    }

    /// Base address of the band's baseband (framing/FCS) block.
    pub fn bb_base(self) -> u16 {
        match self {
            Self::SubGhz => 0x0300,
            Self::Ghz24 => 0x0400,
        }
    }

    /// Start of the band's receive frame buffer.
    pub fn rx_frame_buf(self) -> u16 {
        match self {
            Self::SubGhz => 0x2000,
            Self::Ghz24 => 0x3000,
        }
    }

    /// Start of the band's transmit frame buffer.
    pub fn tx_frame_buf(self) -> u16 {
        match self {
            Self::SubGhz => 0x2800,
            Self::Ghz24 => 0x3800,
        }
    }
}

/// The four interrupt-status bytes sit at the bottom of the address space so
/// one burst read fetches all of them. Reading clears the device-side flags.
pub const REG_IRQ_STATUS_BASE: u16 = 0x0000;

/// Index into the 4-byte IRQ status read for a band's radio flags.
pub fn rf_irq_index(band: Band) -> usize {
    match band {
        Band::SubGhz => 0,
        Band::Ghz24 => 1,
    }
}

/// Index into the 4-byte IRQ status read for a band's baseband flags.
pub fn bb_irq_index(band: Band) -> usize {
    match band {
        Band::SubGhz => 2,
        Band::Ghz24 => 3,
    }
}

/// Device part number; read once at startup as a sanity check.
pub const REG_PART_NUMBER: u16 = 0x000D;
/// Device version number register.
pub const REG_VERSION_NUMBER: u16 = 0x000E;

/// Part numbers this driver accepts (dual-band base part and the variant
/// with the extended baseband).
pub const PART_NUMBERS: [u8; 2] = [0x34, 0x36];

/// Radio-block registers, as offsets from [`Band::rf_base`].
#[repr(u16)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum RfReg {
    /// Radio interrupt mask.
    Irqm = 0x00,
    /// Current transceiver state (read-only). See [`TrxState`].
    State = 0x02,
    /// Transceiver command. See [`TrxCmd`].
    Cmd = 0x03,
    /// Channel spacing, in 25 kHz steps.
    Cs = 0x04,
    /// Channel center frequency, low byte (25 kHz steps).
    Ccf0L = 0x05,
    /// Channel center frequency, high byte.
    Ccf0H = 0x06,
    /// Channel number, low byte. Writing the high byte latches the tuning.
    CnL = 0x07,
    /// Channel number high bits + channel mode.
    CnM = 0x08,
    /// Energy-detection control (mode in bits 1:0).
    Edc = 0x0E,
    /// Energy-detection duration.
    Edd = 0x0F,
    /// Energy-detection value, two's-complement dBm (read-only).
    Edv = 0x10,
    /// Transmit frontend power-amplifier control; attenuation in bits 4:0.
    Pac = 0x14,
}

impl RfReg {
    pub fn addr(self, band: Band) -> u16 {
        band.rf_base() + self as u16
    }
}

/// Baseband-block registers, as offsets from [`Band::bb_base`].
#[repr(u16)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum BbReg {
    /// Baseband interrupt mask.
    Irqm = 0x00,
    /// PHY control: baseband enable, PHY type, FCS type/auto bits.
    Pc = 0x01,
    /// Received frame length, low byte (valid from frame start).
    RxFll = 0x04,
    /// Received frame length, high bits.
    RxFlh = 0x05,
    /// Transmit frame length, low byte.
    TxFll = 0x06,
    /// Transmit frame length, high bits.
    TxFlh = 0x07,
    /// Current receive frame-buffer fill level, low byte.
    FbLvlL = 0x08,
    /// Current receive frame-buffer fill level, high bits.
    FbLvlH = 0x09,
    /// Frame-buffer level interrupt threshold, low byte.
    FbliL = 0x0A,
    /// Frame-buffer level interrupt threshold, high bits.
    FbliH = 0x0B,
    /// Frame-start timestamp counter, byte 0 (latched on frame start).
    Cnt0 = 0x24,
    /// Frame-start timestamp counter, byte 1.
    Cnt1 = 0x25,
    /// Frame-start timestamp counter, byte 2.
    Cnt2 = 0x26,
    /// Frame-start timestamp counter, byte 3.
    Cnt3 = 0x27,
    /// Auto-mode control and status: TX2RX, CCATX, CCA result. See `amcs`.
    Amcs = 0x40,
    /// Energy threshold for the armed CCA, two's-complement dBm.
    Amedt = 0x41,
    /// Received FSK PHY header (FEC and data-whitening bits).
    FskPhrRx = 0x63,
    /// Received OFDM PHY header (MCS in bits 2:0).
    OfdmPhrRx = 0x6A,
}

impl BbReg {
    pub fn addr(self, band: Band) -> u16 {
        band.bb_base() + self as u16
    }
}

/// Transceiver commands, written to `RfReg::Cmd`.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(dead_code)]
pub enum TrxCmd {
    Nop = 0x0,
    /// Deep sleep; register file is retained, frame buffers are not.
    Sleep = 0x1,
    /// The quiesced state; required before reconfiguring the PHY.
    TrxOff = 0x2,
    /// Lock the synthesizer and get ready to transmit on command.
    TxPrep = 0x3,
    Tx = 0x4,
    Rx = 0x5,
    Reset = 0x7,
}

/// Transceiver states, read from `RfReg::State`.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(dead_code)]
pub enum TrxState {
    TrxOff = 0x2,
    TxPrep = 0x3,
    Tx = 0x4,
    Rx = 0x5,
    /// In between two of the above; transient.
    Transition = 0x6,
    Reset = 0x7,
}

impl TrxState {
    pub fn from_byte(raw: u8) -> Option<Self> {
        match raw & 0x07 {
            0x2 => Some(Self::TrxOff),
            0x3 => Some(Self::TxPrep),
            0x4 => Some(Self::Tx),
            0x5 => Some(Self::Rx),
            0x6 => Some(Self::Transition),
            0x7 => Some(Self::Reset),
            _ => None,
        }
    }
}

/// Radio-block interrupt flags, as read from the band's radio IRQ status
/// byte. One bit each; a single read may carry several.
pub mod rf_irq {
    /// Chip woke from sleep/reset and is ready for commands.
    pub const WAKEUP: u8 = 1 << 0;
    /// Synthesizer locked; transceiver reached TXPREP.
    pub const TRXRDY: u8 = 1 << 1;
    /// Single energy-detection measurement finished.
    pub const EDC: u8 = 1 << 2;
    /// Supply voltage dipped below the configured threshold.
    pub const BATLOW: u8 = 1 << 3;
    /// A command was refused in the current state.
    pub const TRXERR: u8 = 1 << 4;
}

/// Baseband-block interrupt flags.
pub mod bb_irq {
    /// A valid PHY header was detected (frame start).
    pub const RXFS: u8 = 1 << 0;
    /// Frame fully received, FCS checked.
    pub const RXFE: u8 = 1 << 1;
    /// Address filter match.
    pub const RXAM: u8 = 1 << 2;
    /// Extended address filter match.
    pub const RXEM: u8 = 1 << 3;
    /// AGC latched onto a preamble.
    pub const AGCH: u8 = 1 << 4;
    /// AGC released without a completed frame.
    pub const AGCR: u8 = 1 << 5;
    /// Receive frame buffer reached the programmed level.
    pub const FBLI: u8 = 1 << 6;
    /// Transmission finished.
    pub const TXFE: u8 = 1 << 7;
}

/// Bits of `BbReg::Pc`.
pub mod pc {
    /// PHY type field, bits 1:0: 0 = off, 1 = FSK, 2 = OFDM.
    pub const PT_MASK: u8 = 0b11;
    pub const PT_FSK: u8 = 0b01;
    pub const PT_OFDM: u8 = 0b10;
    /// Baseband enable.
    pub const BBEN: u8 = 1 << 2;
    /// FCS type: 0 = 32-bit, 1 = 16-bit.
    pub const FCST: u8 = 1 << 3;
    /// Automatic FCS append on transmit.
    pub const TXAFCS: u8 = 1 << 4;
    /// FCS filter: discard frames whose FCS fails.
    pub const FCSFE: u8 = 1 << 6;
}

/// Bits of `BbReg::Amcs` (automatic mode control/status).
pub mod amcs {
    /// After a completed transmission, return to RX without host action.
    pub const TX2RX: u8 = 1 << 0;
    /// Arm CCA-then-transmit: a clear energy measurement fires TX itself.
    pub const CCATX: u8 = 1 << 1;
    /// Measurement outcome of the armed CCA: set when the channel was busy.
    pub const CCAED: u8 = 1 << 2;
}

/// Energy-detection modes, bits 1:0 of `RfReg::Edc`.
#[repr(u8)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum EdMode {
    /// Automatic, driven by AGC events during reception.
    Auto = 0x0,
    /// One measurement of the configured duration, then an EDC interrupt.
    Single = 0x1,
    /// Free-running measurements.
    Continuous = 0x2,
    Off = 0x3,
}
