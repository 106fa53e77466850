//! FIFO RAM layout and word packing
//!
//! The controller has one block of FIFO RAM, measured in 32-bit words. The
//! Rx FIFO always starts at word zero. Tx FIFOs follow it, back to back, in
//! declaration order. Layouts are computed once when a role is initialized,
//! and never change while that role is active.

use crate::{ral::ENDPOINT_COUNT, Error};

/// The smallest Tx FIFO the controller accepts, in words
pub const MIN_TX_FIFO_WORDS: u16 = 16;

/// Selects a Tx FIFO to flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum TxFifo {
    /// One Tx FIFO, by number
    ///
    /// In device mode, this is the IN endpoint number. In host mode, 0 is the
    /// non-periodic FIFO and 1 is the periodic FIFO. Numbers at or above
    /// the endpoint count select no FIFO.
    Number(u8),
    /// Every Tx FIFO at once
    All,
}

impl TxFifo {
    /// Returns `None` for a FIFO the controller doesn't have
    pub(crate) fn bits(self) -> Option<u32> {
        match self {
            TxFifo::Number(n) if usize::from(n) < ENDPOINT_COUNT => Some(u32::from(n)),
            TxFifo::Number(_) => None,
            TxFifo::All => Some(crate::ral::GRSTCTL::TXFNUM::RW::ALL),
        }
    }
}

/// A range of FIFO RAM, in words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct Region {
    /// First word of the region
    pub start: u16,
    /// Number of words in the region
    pub words: u16,
}

impl Region {
    /// One past the last word of the region
    pub const fn end(&self) -> u32 {
        self.start as u32 + self.words as u32
    }

    /// Indicates if two regions share any word
    pub const fn overlaps(&self, other: &Region) -> bool {
        self.words != 0
            && other.words != 0
            && (self.start as u32) < other.end()
            && (other.start as u32) < self.end()
    }
}

/// Device mode FIFO placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct DeviceLayout {
    /// The shared Rx FIFO
    pub rx: Region,
    /// One Tx FIFO per IN endpoint
    pub tx: [Region; ENDPOINT_COUNT],
}

impl DeviceLayout {
    /// Place the Rx FIFO, then each IN endpoint's Tx FIFO
    ///
    /// Endpoint 0 always gets at least [`MIN_TX_FIFO_WORDS`]. Returns
    /// [`Error::FifoOverflow`] if the layout needs more than `capacity` words.
    pub fn new(
        rx_words: u16,
        tx_words: [u16; ENDPOINT_COUNT],
        capacity: u16,
    ) -> Result<Self, Error> {
        let rx = Region {
            start: 0,
            words: rx_words,
        };
        let mut tx = [Region::default(); ENDPOINT_COUNT];
        let mut next = rx.end();
        for (n, (region, &words)) in tx.iter_mut().zip(tx_words.iter()).enumerate() {
            let words = if n == 0 {
                words.max(MIN_TX_FIFO_WORDS)
            } else {
                words
            };
            *region = Region {
                start: u16::try_from(next).map_err(|_| Error::FifoOverflow)?,
                words,
            };
            next = region.end();
        }
        if next > u32::from(capacity) {
            return Err(Error::FifoOverflow);
        }
        Ok(Self { rx, tx })
    }

    /// Total words used by the layout
    pub fn words(&self) -> u32 {
        self.tx.iter().map(Region::end).fold(self.rx.end(), u32::max)
    }
}

/// Host mode FIFO placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct HostLayout {
    /// Rx FIFO for all IN channels
    pub rx: Region,
    /// Tx FIFO for control and bulk OUT channels
    pub non_periodic: Region,
    /// Tx FIFO for interrupt and isochronous OUT channels
    pub periodic: Region,
}

impl HostLayout {
    /// Place the Rx FIFO, then the non-periodic and periodic Tx FIFOs
    pub fn new(
        rx_words: u16,
        non_periodic_words: u16,
        periodic_words: u16,
        capacity: u16,
    ) -> Result<Self, Error> {
        let rx = Region {
            start: 0,
            words: rx_words,
        };
        let non_periodic = Region {
            start: rx_words,
            words: non_periodic_words,
        };
        let periodic = Region {
            start: u16::try_from(non_periodic.end()).map_err(|_| Error::FifoOverflow)?,
            words: periodic_words,
        };
        if periodic.end() > u32::from(capacity) {
            return Err(Error::FifoOverflow);
        }
        Ok(Self {
            rx,
            non_periodic,
            periodic,
        })
    }
}

/// Number of FIFO words needed to carry `bytes`
pub const fn words_for(bytes: usize) -> usize {
    (bytes + 3) / 4
}

/// Pack bytes into little-endian FIFO words, zero padding the final word
pub fn pack_words(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    bytes.chunks(4).map(|chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        u32::from_le_bytes(word)
    })
}

/// Unpack little-endian FIFO words into `bytes`
///
/// `next_word` is called once per four bytes, rounded up. Bytes of the final
/// word that don't fit are discarded.
pub fn unpack_words(bytes: &mut [u8], mut next_word: impl FnMut() -> u32) {
    for chunk in bytes.chunks_mut(4) {
        let word = next_word().to_le_bytes();
        let len = chunk.len();
        chunk.copy_from_slice(&word[..len]);
    }
}
