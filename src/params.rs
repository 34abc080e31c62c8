//! Modulation, channel-plan and energy-detection parameters for the SUN-FSK
//! and SUN-OFDM PHYs.

use crate::RadioError;

/// Largest PSDU (payload + trailer) either PHY accepts, per the SUN PHYs'
/// `aMaxPhyPacketSize`.
pub const MAX_PSDU_LEN: usize = 2047;

/// FSK symbol rates the frontend supports. The discriminant is the register
/// value of the rate field.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(dead_code)]
pub enum FskSymbolRate {
    R50 = 0x0,
    R100 = 0x1,
    R150 = 0x2,
    R200 = 0x3,
    R300 = 0x4,
    R400 = 0x5,
}

impl FskSymbolRate {
    /// Rate in kHz (= ksymbol/s).
    pub fn khz(self) -> u32 {
        match self {
            Self::R50 => 50,
            Self::R100 => 100,
            Self::R150 => 150,
            Self::R200 => 200,
            Self::R300 => 300,
            Self::R400 => 400,
        }
    }
}

/// Filtered-FSK modulation order.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FskModOrder {
    /// Binary FSK: one bit per symbol.
    Fsk2 = 0x0,
    /// 4-level FSK: two bits per symbol. The synchronization header is
    /// always sent 2-level regardless.
    Fsk4 = 0x1,
}

impl FskModOrder {
    pub fn bits_per_symbol(self) -> u32 {
        match self {
            Self::Fsk2 => 1,
            Self::Fsk4 => 2,
        }
    }
}

/// FSK modulation index (frequency-deviation-to-rate ratio).
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(dead_code)]
pub enum FskModIndex {
    Index0_5 = 0x0,
    Index1_0 = 0x1,
}

/// SUN-FSK operating parameters.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FskParams {
    pub symbol_rate: FskSymbolRate,
    pub mod_order: FskModOrder,
    pub mod_index: FskModIndex,
    /// Forward error correction (rate-1/2 convolutional coding) of the PHY
    /// header and payload. Halves throughput, roughly doubles range.
    pub fec: bool,
    /// Preamble length in octets. Longer preambles buy receiver wake-up
    /// margin at the cost of airtime.
    pub preamble_octets: u16,
}

impl Default for FskParams {
    fn default() -> Self {
        Self {
            symbol_rate: FskSymbolRate::R50,
            mod_order: FskModOrder::Fsk2,
            mod_index: FskModIndex::Index1_0,
            fec: false,
            preamble_octets: 8,
        }
    }
}

/// SUN-OFDM bandwidth options, widest (option 1, 96 data tones) to narrowest
/// (option 4, 12 data tones).
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(dead_code)]
pub enum OfdmOption {
    Option1 = 0x0,
    Option2 = 0x1,
    Option3 = 0x2,
    Option4 = 0x3,
}

impl OfdmOption {
    /// Active data tones per OFDM symbol.
    pub fn data_tones(self) -> u32 {
        match self {
            Self::Option1 => 96,
            Self::Option2 => 48,
            Self::Option3 => 24,
            Self::Option4 => 12,
        }
    }

    /// Lowest MCS the option may carry. The narrower options lack the tones
    /// to spread the most robust schemes, so those schemes are illegal on
    /// them.
    pub fn min_mcs(self) -> OfdmMcs {
        match self {
            Self::Option1 | Self::Option2 => OfdmMcs::Mcs0,
            Self::Option3 => OfdmMcs::Mcs1,
            Self::Option4 => OfdmMcs::Mcs2,
        }
    }
}

/// OFDM modulation-and-coding schemes. Low indices trade throughput for
/// robustness via heavier coding and frequency repetition.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(dead_code)]
pub enum OfdmMcs {
    /// BPSK, rate 1/2, 4x frequency repetition.
    Mcs0 = 0x0,
    /// BPSK, rate 1/2, 2x repetition.
    Mcs1 = 0x1,
    /// QPSK, rate 1/2, 2x repetition.
    Mcs2 = 0x2,
    /// QPSK, rate 1/2.
    Mcs3 = 0x3,
    /// QPSK, rate 3/4.
    Mcs4 = 0x4,
    /// 16-QAM, rate 1/2.
    Mcs5 = 0x5,
    /// 16-QAM, rate 3/4.
    Mcs6 = 0x6,
}

impl OfdmMcs {
    /// Modulated bits per data tone.
    pub fn bits_per_tone(self) -> u32 {
        match self {
            Self::Mcs0 | Self::Mcs1 => 1,
            Self::Mcs2 | Self::Mcs3 | Self::Mcs4 => 2,
            Self::Mcs5 | Self::Mcs6 => 4,
        }
    }

    /// Frequency-domain repetition factor.
    pub fn frequency_repetition(self) -> u32 {
        match self {
            Self::Mcs0 => 4,
            Self::Mcs1 | Self::Mcs2 => 2,
            _ => 1,
        }
    }

    /// Whether the convolutional code is punctured to rate 3/4 (vs 1/2).
    pub fn rate_three_quarters(self) -> bool {
        matches!(self, Self::Mcs4 | Self::Mcs6)
    }

    pub fn from_header_bits(raw: u8) -> Option<Self> {
        match raw & 0x07 {
            0x0 => Some(Self::Mcs0),
            0x1 => Some(Self::Mcs1),
            0x2 => Some(Self::Mcs2),
            0x3 => Some(Self::Mcs3),
            0x4 => Some(Self::Mcs4),
            0x5 => Some(Self::Mcs5),
            0x6 => Some(Self::Mcs6),
            _ => None,
        }
    }
}

/// OFDM interleaving depth: mode 0 interleaves over one symbol, mode 1 over
/// the frequency-repetition factor, which pads frames to a symbol multiple
/// of that factor.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OfdmInterleaving {
    Mode0 = 0x0,
    Mode1 = 0x1,
}

/// SUN-OFDM operating parameters.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OfdmParams {
    pub option: OfdmOption,
    pub mcs: OfdmMcs,
    pub interleaving: OfdmInterleaving,
}

impl Default for OfdmParams {
    fn default() -> Self {
        Self {
            option: OfdmOption::Option1,
            mcs: OfdmMcs::Mcs3,
            interleaving: OfdmInterleaving::Mode0,
        }
    }
}

/// The active modulation family and its parameters. Exactly one family is in
/// force at a time; switching families quiesces the transceiver first.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Modulation {
    Fsk(FskParams),
    Ofdm(OfdmParams),
}

impl Modulation {
    /// Reject parameter combinations the PHY cannot carry.
    pub fn validate(&self) -> Result<(), RadioError> {
        match self {
            Self::Fsk(p) => {
                // Receivers need a handful of preamble octets to lock; the
                // upper bound is the register field width.
                if p.preamble_octets < 2 || p.preamble_octets > 1_000 {
                    return Err(RadioError::Config);
                }
            }
            Self::Ofdm(p) => {
                if p.mcs < p.option.min_mcs() {
                    return Err(RadioError::Config);
                }
            }
        }
        Ok(())
    }

    /// Value of the baseband PHY-type field for this family.
    pub fn pt_value(&self) -> u8 {
        match self {
            Self::Fsk(_) => crate::regs::pc::PT_FSK,
            Self::Ofdm(_) => crate::regs::pc::PT_OFDM,
        }
    }
}

impl Default for Modulation {
    fn default() -> Self {
        Self::Fsk(Default::default())
    }
}

/// A contiguous run of valid channel numbers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelRange {
    pub first: u16,
    pub last: u16,
}

impl ChannelRange {
    pub fn contains(&self, channel: u16) -> bool {
        channel >= self.first && channel <= self.last
    }
}

/// Channel plan: where channel 0 sits, how far apart channels are, and which
/// channel numbers are usable (regional plans sometimes carve the band into
/// two runs).
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelPlan {
    pub center_hz: u32,
    pub spacing_hz: u32,
    pub primary: ChannelRange,
    pub secondary: Option<ChannelRange>,
}

impl ChannelPlan {
    pub fn contains(&self, channel: u16) -> bool {
        self.primary.contains(channel)
            || self.secondary.map(|r| r.contains(channel)).unwrap_or(false)
    }

    /// Center frequency of `channel`, in Hz.
    pub fn channel_hz(&self, channel: u16) -> u32 {
        self.center_hz + self.spacing_hz * channel as u32
    }
}

impl Default for ChannelPlan {
    /// 863-870 MHz plan with 200 kHz spacing.
    fn default() -> Self {
        Self {
            center_hz: 863_100_000,
            spacing_hz: 200_000,
            primary: ChannelRange { first: 0, last: 33 },
            secondary: None,
        }
    }
}

/// Energy-detection settings used for CCA and signal-level reads.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EdConfig {
    /// Single-measurement duration, in µs.
    pub duration_us: u16,
    /// Channel is busy at or above this level.
    pub threshold_dbm: i8,
}

impl Default for EdConfig {
    fn default() -> Self {
        Self {
            duration_us: 128,
            threshold_dbm: -85,
        }
    }
}

/// Frame-check-sequence width. The SUN PHYs default to the 32-bit FCS; the
/// 16-bit one is kept for interoperability modes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FcsType {
    Fcs16,
    Fcs32,
}

impl FcsType {
    pub fn len(self) -> usize {
        match self {
            Self::Fcs16 => 2,
            Self::Fcs32 => 4,
        }
    }
}

/// Clear-channel-assessment mode for a transmit request.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcaMode {
    /// Transmit unconditionally.
    Off,
    /// Energy-detect first; abort on a busy channel.
    EnergyDetect,
}

/// Complete PHY configuration of one radio instance.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyConfig {
    pub modulation: Modulation,
    pub channel_plan: ChannelPlan,
    pub ed: EdConfig,
    pub fcs: FcsType,
}

impl PhyConfig {
    pub fn validate(&self) -> Result<(), RadioError> {
        self.modulation.validate()
    }
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            modulation: Default::default(),
            channel_plan: Default::default(),
            ed: Default::default(),
            fcs: FcsType::Fcs32,
        }
    }
}
