use core::cell::RefCell;

use critical_section::Mutex;

use super::{ChannelConfig, DescriptorTable, DmaComponent, DmaDescriptor, DmaHardware};
use crate::constants::DMA_CHANNEL_COUNT;
use crate::error::{Error, Result};

#[derive(Clone, Copy)]
struct ChannelSlot<'a> {
    allocated: bool,
    config: Option<ChannelConfig>,
    owner: Option<&'a dyn DmaComponent>,
}

impl<'a> ChannelSlot<'a> {
    const fn free() -> Self {
        ChannelSlot {
            allocated: false,
            config: None,
            owner: None,
        }
    }
}

struct Inner<'a, H> {
    hw: H,
    table: DescriptorTable,
    channels: [ChannelSlot<'a>; DMA_CHANNEL_COUNT],
    enabled: bool,
}

/// The DMAC and its channel pool.
///
/// All methods take `&self`; state sits behind a critical section so the
/// interrupt handler and drivers can share one controller. The descriptor
/// table lives inside the controller, so it must not move once
/// [`enable`](Self::enable) has published the table's address. Place it in a
/// `static` or pin it on the stack of `main`.
pub struct DmaController<'a, H> {
    inner: Mutex<RefCell<Inner<'a, H>>>,
}

impl<'a, H: DmaHardware> DmaController<'a, H> {
    pub const fn new(hw: H) -> Self {
        DmaController {
            inner: Mutex::new(RefCell::new(Inner {
                hw,
                table: DescriptorTable::new(),
                channels: [ChannelSlot::free(); DMA_CHANNEL_COUNT],
                enabled: false,
            })),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner<'a, H>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    fn index(channel: u8) -> Result<usize> {
        match channel as usize {
            n @ 1..=DMA_CHANNEL_COUNT => Ok(n - 1),
            _ => Err(Error::InvalidArgument),
        }
    }

    fn allocated_index(inner: &Inner<'a, H>, channel: u8) -> Result<usize> {
        let idx = Self::index(channel)?;
        if inner.channels[idx].allocated {
            Ok(idx)
        } else {
            Err(Error::InvalidArgument)
        }
    }

    /// Reserve the lowest free channel.
    pub fn allocate_channel(&self) -> Result<u8> {
        self.with_inner(|inner| {
            let Some(idx) = inner.channels.iter().position(|slot| !slot.allocated) else {
                warn!("dma: all {} channels in use", DMA_CHANNEL_COUNT);
                return Err(Error::ResourceExhausted);
            };
            inner.channels[idx].allocated = true;
            let channel = idx as u8 + 1;
            debug!("dma: allocated channel {}", channel);
            Ok(channel)
        })
    }

    /// Stop the channel and return it to the pool.
    pub fn free_channel(&self, channel: u8) -> Result<()> {
        let idx = Self::index(channel)?;
        self.with_inner(|inner| {
            inner.hw.disable_channel(idx as u8);
            inner.channels[idx] = ChannelSlot::free();
            inner.table.descriptors[idx] = DmaDescriptor::new();
            inner.table.write_back[idx] = DmaDescriptor::new();
        });
        debug!("dma: freed channel {}", channel);
        Ok(())
    }

    pub fn is_allocated(&self, channel: u8) -> bool {
        self.with_inner(|inner| Self::allocated_index(inner, channel).is_ok())
    }

    /// Edit the channel's descriptor in place.
    pub fn with_descriptor<R>(
        &self,
        channel: u8,
        f: impl FnOnce(&mut DmaDescriptor) -> R,
    ) -> Result<R> {
        self.with_inner(|inner| {
            let idx = Self::allocated_index(inner, channel)?;
            Ok(f(&mut inner.table.descriptors[idx]))
        })
    }

    /// A copy of the channel's descriptor.
    pub fn descriptor(&self, channel: u8) -> Result<DmaDescriptor> {
        self.with_descriptor(channel, |d| *d)
    }

    pub fn configure_channel(&self, channel: u8, config: ChannelConfig) -> Result<()> {
        self.with_inner(|inner| {
            let idx = Self::allocated_index(inner, channel)?;
            inner.hw.configure_channel(idx as u8, &config);
            inner.channels[idx].config = Some(config);
            Ok(())
        })
    }

    pub fn channel_config(&self, channel: u8) -> Option<ChannelConfig> {
        self.with_inner(|inner| {
            Self::allocated_index(inner, channel)
                .ok()
                .and_then(|idx| inner.channels[idx].config)
        })
    }

    /// Arm the channel with its current descriptor.
    pub fn start_transfer(&self, channel: u8) -> Result<()> {
        self.with_inner(|inner| {
            let idx = Self::allocated_index(inner, channel)?;
            let descriptor = inner.table.descriptors[idx];
            inner.hw.enable_channel(idx as u8, &descriptor);
            trace!("dma: channel {} armed, {} beats", channel, descriptor.beat_count());
            Ok(())
        })
    }

    /// Publish the descriptor table and set the global enable.
    pub fn enable(&self) {
        self.with_inner(|inner| {
            let (base, write_back) = inner.table.addresses();
            inner.hw.set_descriptor_memory(base, write_back);
            inner.hw.set_enabled(true);
            inner.enabled = true;
        });
    }

    /// Clear the global enable. Required before reconfiguring channels.
    pub fn disable(&self) {
        self.with_inner(|inner| {
            inner.hw.set_enabled(false);
            inner.enabled = false;
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.with_inner(|inner| inner.enabled)
    }

    /// Register the owner notified when `channel` completes a transfer.
    pub fn on_transfer_complete(&self, channel: u8, owner: &'a dyn DmaComponent) -> Result<()> {
        self.with_inner(|inner| {
            let idx = Self::allocated_index(inner, channel)?;
            inner.channels[idx].owner = Some(owner);
            Ok(())
        })
    }

    /// Service the DMAC interrupt.
    ///
    /// Owners run outside the critical section so they can re-arm their
    /// channels from the callback.
    pub fn on_interrupt(&self) {
        let mut ready: [Option<&'a dyn DmaComponent>; DMA_CHANNEL_COUNT] =
            [None; DMA_CHANNEL_COUNT];
        self.with_inner(|inner| {
            let completed = inner.hw.take_completed();
            for (idx, slot) in inner.channels.iter().enumerate() {
                if completed & (1 << idx) != 0 {
                    ready[idx] = slot.owner;
                }
            }
        });
        for owner in ready.into_iter().flatten() {
            owner.dma_transfer_complete();
        }
    }

    /// Run `f` against the register backend.
    pub fn with_hardware<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        self.with_inner(|inner| f(&mut inner.hw))
    }
}
