//! SAMD21 DMA transfer descriptors.
//!
//! ## Layout
//!
//! Each descriptor is 16 bytes and must sit on a 16-byte boundary
//! (datasheet 20.8.15 / 20.8.16):
//!
//! | Offset | Register | Content |
//! |--------|----------|---------|
//! | 0x00 | `BTCTRL` | valid, event output, block action, beat size, increments |
//! | 0x02 | `BTCNT` | beats in the block |
//! | 0x04 | `SRCADDR` | source address (end of block when incrementing) |
//! | 0x08 | `DSTADDR` | destination address (end of block when incrementing) |
//! | 0x0C | `DESCADDR` | next descriptor, 0 for none |
//!
//! The controller fetches descriptors from a primary section and writes
//! progress into a write-back section; both live in one [`DescriptorTable`].

use crate::constants::{DMA_CHANNEL_COUNT, DMA_DESCRIPTOR_ALIGNMENT};

const BTCTRL_VALID: u16 = 1 << 0;
const BTCTRL_EVOSEL_SHIFT: u16 = 1;
const BTCTRL_BLOCKACT_SHIFT: u16 = 3;
const BTCTRL_BEATSIZE_SHIFT: u16 = 8;
const BTCTRL_SRCINC: u16 = 1 << 10;
const BTCTRL_DSTINC: u16 = 1 << 11;

/// Width of one beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeatSize {
    /// 8-bit beats.
    Byte = 0,
    /// 16-bit beats.
    HalfWord = 1,
    /// 32-bit beats.
    Word = 2,
}

impl BeatSize {
    /// Beat width in bytes.
    pub const fn bytes(self) -> u32 {
        1 << (self as u32)
    }

    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => BeatSize::Byte,
            1 => BeatSize::HalfWord,
            _ => BeatSize::Word,
        }
    }
}

/// When the channel strobes its output event (`EVOSEL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventOutput {
    /// No event output.
    Disabled = 0,
    /// Strobe at the end of each block.
    Block = 1,
    /// Strobe after every beat.
    Beat = 3,
}

/// What the channel does when a block completes (`BLOCKACT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockAction {
    /// Disable the channel if this was the last block.
    NoAction = 0,
    /// Disable the channel and raise the block interrupt.
    Interrupt = 1,
    /// Suspend the channel.
    Suspend = 2,
    /// Suspend the channel and raise the block interrupt.
    Both = 3,
}

/// One hardware transfer descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct DmaDescriptor {
    btctrl: u16,
    btcnt: u16,
    srcaddr: u32,
    dstaddr: u32,
    descaddr: u32,
}

impl DmaDescriptor {
    /// An invalid, all-zero descriptor.
    pub const fn new() -> Self {
        DmaDescriptor {
            btctrl: 0,
            btcnt: 0,
            srcaddr: 0,
            dstaddr: 0,
            descaddr: 0,
        }
    }

    /// Raw `BTCTRL` value.
    pub fn btctrl(&self) -> u16 {
        self.btctrl
    }

    /// Mark the descriptor as valid for the controller to fetch.
    pub fn set_valid(&mut self, valid: bool) {
        self.set_flag(BTCTRL_VALID, valid);
    }

    pub fn is_valid(&self) -> bool {
        self.btctrl & BTCTRL_VALID != 0
    }

    pub fn set_event_output(&mut self, event: EventOutput) {
        self.set_field(BTCTRL_EVOSEL_SHIFT, event as u16);
    }

    pub fn set_block_action(&mut self, action: BlockAction) {
        self.set_field(BTCTRL_BLOCKACT_SHIFT, action as u16);
    }

    pub fn set_beat_size(&mut self, size: BeatSize) {
        self.set_field(BTCTRL_BEATSIZE_SHIFT, size as u16);
    }

    pub fn beat_size(&self) -> BeatSize {
        BeatSize::from_bits(self.btctrl >> BTCTRL_BEATSIZE_SHIFT)
    }

    pub fn set_source_increment(&mut self, increment: bool) {
        self.set_flag(BTCTRL_SRCINC, increment);
    }

    pub fn source_increment(&self) -> bool {
        self.btctrl & BTCTRL_SRCINC != 0
    }

    pub fn set_destination_increment(&mut self, increment: bool) {
        self.set_flag(BTCTRL_DSTINC, increment);
    }

    pub fn destination_increment(&self) -> bool {
        self.btctrl & BTCTRL_DSTINC != 0
    }

    pub fn set_beat_count(&mut self, beats: u16) {
        self.btcnt = beats;
    }

    pub fn beat_count(&self) -> u16 {
        self.btcnt
    }

    pub fn set_source_address(&mut self, address: u32) {
        self.srcaddr = address;
    }

    pub fn source_address(&self) -> u32 {
        self.srcaddr
    }

    pub fn set_destination_address(&mut self, address: u32) {
        self.dstaddr = address;
    }

    pub fn destination_address(&self) -> u32 {
        self.dstaddr
    }

    pub fn set_next_descriptor(&mut self, address: u32) {
        self.descaddr = address;
    }

    /// Point the source at a block of `beats` beats starting at `start`.
    ///
    /// With source increment enabled the hardware expects the address one
    /// past the last beat, so the end address is stored instead.
    pub fn set_source_block(&mut self, start: usize, beats: u16) {
        let address = self.block_address(start, beats, self.source_increment());
        self.srcaddr = address;
        self.btcnt = beats;
    }

    /// Point the destination at a block of `beats` beats starting at `start`.
    pub fn set_destination_block(&mut self, start: usize, beats: u16) {
        let address = self.block_address(start, beats, self.destination_increment());
        self.dstaddr = address;
        self.btcnt = beats;
    }

    // Addresses are 32 bits on the target.
    fn block_address(&self, start: usize, beats: u16, increments: bool) -> u32 {
        let start = start as u32;
        if increments {
            start.wrapping_add(u32::from(beats) * self.beat_size().bytes())
        } else {
            start
        }
    }

    fn set_flag(&mut self, mask: u16, on: bool) {
        if on {
            self.btctrl |= mask;
        } else {
            self.btctrl &= !mask;
        }
    }

    fn set_field(&mut self, shift: u16, value: u16) {
        self.btctrl = (self.btctrl & !(0b11 << shift)) | ((value & 0b11) << shift);
    }
}

/// Primary and write-back descriptor sections, one block of memory.
#[repr(C, align(16))]
pub struct DescriptorTable {
    pub(crate) descriptors: [DmaDescriptor; DMA_CHANNEL_COUNT],
    pub(crate) write_back: [DmaDescriptor; DMA_CHANNEL_COUNT],
}

const _: () = assert!(core::mem::size_of::<DmaDescriptor>() == 16);
const _: () = assert!(core::mem::align_of::<DescriptorTable>() == DMA_DESCRIPTOR_ALIGNMENT);

impl DescriptorTable {
    pub const fn new() -> Self {
        DescriptorTable {
            descriptors: [DmaDescriptor::new(); DMA_CHANNEL_COUNT],
            write_back: [DmaDescriptor::new(); DMA_CHANNEL_COUNT],
        }
    }

    /// Base addresses of the primary and write-back sections.
    pub fn addresses(&self) -> (u32, u32) {
        (
            self.descriptors.as_ptr() as usize as u32,
            self.write_back.as_ptr() as usize as u32,
        )
    }
}
