//! STM32 command-bus backend, for boards wiring the transceiver to an SPI
//! peripheral plus chip-select/reset GPIOs, with the IRQ pin on an EXTI
//! line.

use hal::{
    delay_us,
    pac::{EXTI, SPI2},
    spi::Spi,
};

use crate::{RadioError, bus::CommandBus, time::InterruptSource};

pub type Spi_ = Spi<SPI2>;

const AHB_FREQ: u32 = 170_000_000;

/// Address-space command bits of the SPI protocol: the two MSBs of the
/// 16-bit address select read (00) or write (10) access.
const SPI_CMD_WRITE: u16 = 0x8000;
const SPI_ADDR_MASK: u16 = 0x3FFF;

pub struct RadioPins {
    pub cs: hal::gpio::Pin,
    pub reset: hal::gpio::Pin,
}

pub struct SpiBus {
    pub spi: Spi_,
    pub pins: RadioPins,
    /// EXTI line carrying the transceiver's IRQ pin.
    pub exti_line: u8,
    irq_enabled: bool,
}

impl SpiBus {
    pub fn new(spi: Spi_, pins: RadioPins, exti_line: u8) -> Self {
        Self {
            spi,
            pins,
            exti_line,
            irq_enabled: true,
        }
    }

    /// Pulse the reset line. The device needs well under a millisecond to
    /// come back up.
    pub fn hardware_reset(&mut self) {
        self.pins.reset.set_low();
        delay_us(500, AHB_FREQ);
        self.pins.reset.set_high();
    }
}

impl InterruptSource for SpiBus {
    fn interrupt_enabled(&self) -> bool {
        self.irq_enabled
    }

    fn set_interrupt_enabled(&mut self, enabled: bool) {
        self.irq_enabled = enabled;
        // Mask at the EXTI line so the pending bit survives and delivers
        // once re-enabled.
        let exti = unsafe { &(*EXTI::ptr()) };
        if enabled {
            exti.imr1
                .modify(|r, w| unsafe { w.bits(r.bits() | (1 << self.exti_line)) });
        } else {
            exti.imr1
                .modify(|r, w| unsafe { w.bits(r.bits() & !(1 << self.exti_line)) });
        }
    }
}

impl CommandBus for SpiBus {
    fn write(&mut self, addr: u16, data: &[u8]) -> Result<(), RadioError> {
        let cmd = ((addr & SPI_ADDR_MASK) | SPI_CMD_WRITE).to_be_bytes();

        self.pins.cs.set_low();
        if self.spi.write(&cmd).is_err() || self.spi.write(data).is_err() {
            self.pins.cs.set_high();
            return Err(RadioError::Bus);
        }
        self.pins.cs.set_high();
        Ok(())
    }

    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), RadioError> {
        let cmd = (addr & SPI_ADDR_MASK).to_be_bytes();

        self.pins.cs.set_low();
        if self.spi.write(&cmd).is_err() || self.spi.transfer(buf).is_err() {
            self.pins.cs.set_high();
            return Err(RadioError::Bus);
        }
        self.pins.cs.set_high();
        Ok(())
    }

    fn is_busy(&self) -> bool {
        // Transfers here are blocking; the channel is idle between calls.
        false
    }
}
