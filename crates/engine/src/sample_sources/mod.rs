pub(crate) mod symphonia_impl;

/// Describes a decoded audio source: its sample rate, channel layout, and duration if known.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    pub(crate) sample_rate: u32,
    pub(crate) duration: u64,
    pub(crate) channel_format: crate::channel_format::ChannelFormat,
}

impl Descriptor {
    pub(crate) fn get_channel_count(&self) -> usize {
        self.channel_format.get_channel_count().get()
    }
}
