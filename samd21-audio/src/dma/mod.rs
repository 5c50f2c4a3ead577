//! DMA controller (DMAC) channel management.
//!
//! Channels are handed out by [`DmaController::allocate_channel`] and
//! numbered from 1, so 0 can never name a live channel. Channel `n` drives
//! hardware channel `n - 1`.
//!
//! Drivers own a channel's descriptor, arm it with
//! [`DmaController::start_transfer`], and learn about completion by
//! registering as a [`DmaComponent`]. The DMAC interrupt handler calls
//! [`DmaController::on_interrupt`], which reads the completed-channel mask
//! and notifies each registered owner.

mod controller;
mod descriptor;

pub use controller::DmaController;
pub use descriptor::{BeatSize, BlockAction, DescriptorTable, DmaDescriptor, EventOutput};

/// A driver that wants to hear about transfer completion on its channel.
///
/// Called from interrupt context, so implementations keep their state
/// behind atomics or a critical section.
pub trait DmaComponent: Sync {
    fn dma_transfer_complete(&self);
}

/// Which transfer unit a trigger starts (`CHCTRLB.TRIGACT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerAction {
    /// One trigger moves a whole block.
    Block = 0,
    /// One trigger moves one beat.
    Beat = 2,
    /// One trigger moves the whole transaction.
    Transaction = 3,
}

/// Channel arbitration level (`CHCTRLB.LVL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    Level0 = 0,
    Level1 = 1,
    Level2 = 2,
    Level3 = 3,
}

/// Per-channel trigger configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    /// Peripheral trigger source (`CHCTRLB.TRIGSRC`).
    pub trigger: u8,
    pub trigger_action: TriggerAction,
    pub priority: Priority,
}

impl ChannelConfig {
    /// Beat-per-trigger transfers at the lowest priority.
    pub const fn beat(trigger: u8) -> Self {
        ChannelConfig {
            trigger,
            trigger_action: TriggerAction::Beat,
            priority: Priority::Level0,
        }
    }
}

/// Register-level access to the DMAC.
///
/// Channel arguments are hardware indices (`0..DMA_CHANNEL_COUNT`).
pub trait DmaHardware {
    /// Program `BASEADDR` and `WRBADDR`.
    fn set_descriptor_memory(&mut self, base: u32, write_back: u32);

    /// Set or clear `CTRL.DMAENABLE`.
    fn set_enabled(&mut self, enabled: bool);

    fn configure_channel(&mut self, channel: u8, config: &ChannelConfig);

    /// Set `CHCTRLA.ENABLE`. `descriptor` is the entry the controller will
    /// fetch from descriptor memory.
    fn enable_channel(&mut self, channel: u8, descriptor: &DmaDescriptor);

    fn disable_channel(&mut self, channel: u8);

    /// Read and acknowledge transfer-complete flags, one bit per channel.
    fn take_completed(&mut self) -> u32;
}
