//! PHY information base: typed get/set over a flat numeric attribute space,
//! plus the per-instance statistics those attributes expose.

use crate::{
    Radio, RadioError,
    bus::CommandBus,
    regs::{BbReg, RfReg},
    time::TimerSource,
};

/// Attribute identifiers. Each entry documents its value width and access
/// class; a get on a write-only attribute (or the reverse) fails with
/// [`RadioError::Access`].
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PibAttribute {
    /// u16, read-write: current channel number.
    Channel = 0x00,
    /// u32, read-write: receive/transmit turnaround time, µs.
    TurnaroundTime = 0x01,
    /// u16, read-write: energy-detection duration, µs.
    EdDuration = 0x02,
    /// i8, read-write: energy-detection busy threshold, dBm.
    EdThreshold = 0x03,
    /// u8, read-only: device part number.
    PartNumber = 0x04,
    /// u32, read-only: frames transmitted.
    TxTotal = 0x10,
    /// u32, read-only: transmissions refused busy (radio or channel).
    TxBusy = 0x11,
    /// u32, read-only: transmit-side hardware/timing errors.
    TxError = 0x12,
    /// u32, read-only: frames received with a valid FCS.
    RxTotal = 0x13,
    /// u32, read-only: receptions pre-empted by a stronger signal.
    RxOverride = 0x14,
    /// u32, read-only: headers rejected for their declared length.
    RxBadLength = 0x15,
    /// u32, read-only: headers rejected as malformed.
    RxBadFormat = 0x16,
    /// u32, read-only: frames discarded for a failed check sequence.
    RxBadFcs = 0x17,
    /// u32, read-only: finished receptions dropped unread by the caller.
    RxNotHandled = 0x18,
    /// u32, read-only: confirmations dropped unread by the caller.
    ConfirmNotHandled = 0x19,
    /// write-only: any write clears every counter above.
    StatsReset = 0x20,
}

/// A typed attribute value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PibValue {
    U8(u8),
    I8(i8),
    U16(u16),
    U32(u32),
}

/// Per-instance counters. All saturating at u32 in practice (they are
/// cleared far more often than they could wrap).
#[derive(Clone, Default, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Statistics {
    pub tx_total: u32,
    pub tx_busy: u32,
    pub tx_err: u32,
    pub rx_total: u32,
    pub rx_override: u32,
    pub rx_bad_len: u32,
    pub rx_bad_format: u32,
    pub rx_bad_fcs: u32,
    pub rx_not_handled: u32,
    pub cfm_not_handled: u32,
}

impl<B: CommandBus, T: TimerSource> Radio<B, T> {
    /// Read an attribute.
    pub fn pib_get(&mut self, attr: PibAttribute) -> Result<PibValue, RadioError> {
        use PibAttribute::*;
        let value = match attr {
            Channel => PibValue::U16(self.channel),
            TurnaroundTime => PibValue::U32(self.turnaround_us),
            EdDuration => PibValue::U16(self.config.ed.duration_us),
            EdThreshold => PibValue::I8(self.config.ed.threshold_dbm),
            PartNumber => {
                let mut pn = [0u8];
                self.interface
                    .bus
                    .read(crate::regs::REG_PART_NUMBER, &mut pn)?;
                PibValue::U8(pn[0])
            }
            TxTotal => PibValue::U32(self.stats.tx_total),
            TxBusy => PibValue::U32(self.stats.tx_busy),
            TxError => PibValue::U32(self.stats.tx_err),
            RxTotal => PibValue::U32(self.stats.rx_total),
            RxOverride => PibValue::U32(self.stats.rx_override),
            RxBadLength => PibValue::U32(self.stats.rx_bad_len),
            RxBadFormat => PibValue::U32(self.stats.rx_bad_format),
            RxBadFcs => PibValue::U32(self.stats.rx_bad_fcs),
            RxNotHandled => PibValue::U32(self.stats.rx_not_handled),
            ConfirmNotHandled => PibValue::U32(self.stats.cfm_not_handled),
            StatsReset => return Err(RadioError::Access),
        };
        Ok(value)
    }

    /// Write an attribute. The value must carry the attribute's documented
    /// width.
    pub fn pib_set(&mut self, attr: PibAttribute, value: PibValue) -> Result<(), RadioError> {
        use PibAttribute::*;
        match (attr, value) {
            (Channel, PibValue::U16(ch)) => self.set_channel(ch),
            (TurnaroundTime, PibValue::U32(us)) => {
                self.turnaround_us = us;
                Ok(())
            }
            (EdDuration, PibValue::U16(us)) => {
                self.config.ed.duration_us = us;
                let edd = (us / 32).clamp(1, 255) as u8;
                self.interface.write_rf(RfReg::Edd, edd)
            }
            (EdThreshold, PibValue::I8(dbm)) => {
                self.config.ed.threshold_dbm = dbm;
                self.interface.write_bb(BbReg::Amedt, dbm as u8)
            }
            (StatsReset, _) => {
                self.stats = Statistics::default();
                Ok(())
            }
            // Read-only attribute, or a value of the wrong width.
            _ => Err(RadioError::Access),
        }
    }
}
