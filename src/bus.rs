//! The register/command channel: a trait over the SPI-like bus the
//! transceiver is controlled through, plus the typed register helpers the
//! rest of the driver uses.

use crate::{
    RadioError,
    regs::{Band, BbReg, RfReg},
    time::InterruptSource,
};

/// The raw command channel. One transaction at a time; [`is_busy`] reports a
/// transfer still in flight (e.g. DMA) so callers can avoid corrupting a
/// multi-byte sequence. The device-signal interrupt line is masked through
/// the [`InterruptSource`] supertrait.
///
/// [`is_busy`]: CommandBus::is_busy
pub trait CommandBus: InterruptSource {
    /// Write `data` to the register file starting at `addr`.
    fn write(&mut self, addr: u16, data: &[u8]) -> Result<(), RadioError>;

    /// Read `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), RadioError>;

    /// A transaction is still in flight.
    fn is_busy(&self) -> bool;
}

/// Typed access to the register file of one band over a [`CommandBus`].
pub struct Channel<B> {
    pub bus: B,
    pub band: Band,
}

impl<B: CommandBus> Channel<B> {
    pub fn new(bus: B, band: Band) -> Self {
        Self { bus, band }
    }

    /// Write a single radio-block register.
    pub fn write_rf(&mut self, reg: RfReg, word: u8) -> Result<(), RadioError> {
        self.bus.write(reg.addr(self.band), &[word])
    }

    /// Read a single radio-block register.
    pub fn read_rf(&mut self, reg: RfReg) -> Result<u8, RadioError> {
        let mut buf = [0];
        self.bus.read(reg.addr(self.band), &mut buf)?;
        Ok(buf[0])
    }

    /// Write a single baseband register.
    pub fn write_bb(&mut self, reg: BbReg, word: u8) -> Result<(), RadioError> {
        self.bus.write(reg.addr(self.band), &[word])
    }

    /// Read a single baseband register.
    pub fn read_bb(&mut self, reg: BbReg) -> Result<u8, RadioError> {
        let mut buf = [0];
        self.bus.read(reg.addr(self.band), &mut buf)?;
        Ok(buf[0])
    }

    /// Read a little-endian 11-bit length from a (low, high) register pair.
    pub fn read_bb_len(&mut self, low: BbReg) -> Result<usize, RadioError> {
        let mut buf = [0; 2];
        self.bus.read(low.addr(self.band), &mut buf)?;
        Ok((u16::from_le_bytes(buf) & 0x07FF) as usize)
    }

    /// Write an 11-bit length to a (low, high) register pair.
    pub fn write_bb_len(&mut self, low: BbReg, len: usize) -> Result<(), RadioError> {
        let bytes = ((len as u16) & 0x07FF).to_le_bytes();
        self.bus.write(low.addr(self.band), &bytes)
    }

    /// Read the 32-bit frame-start timestamp counter latched by the
    /// baseband.
    pub fn read_counter(&mut self) -> Result<u32, RadioError> {
        let mut buf = [0; 4];
        self.bus.read(BbReg::Cnt0.addr(self.band), &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Copy a transmit payload into the band's frame buffer.
    pub fn write_frame(&mut self, psdu: &[u8]) -> Result<(), RadioError> {
        self.bus.write(self.band.tx_frame_buf(), psdu)
    }

    /// Read `buf.len()` received octets starting `offset` octets into the
    /// band's receive frame buffer.
    pub fn read_frame(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), RadioError> {
        self.bus.read(self.band.rx_frame_buf() + offset as u16, buf)
    }
}
