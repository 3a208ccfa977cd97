use h2duplex_frame::FrameConfig;

/// How the inbound side of a connection is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnMode {
    /// Raw bytes: `read` forwards straight to the inbound stream.
    #[default]
    Stream,
    /// Line-framed messages moved by two background pumps.
    Messages,
}

/// Connection behavior config.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Stream or message mode.
    pub mode: ConnMode,
    /// Framing limits used by the inbound pump in message mode.
    pub frame: FrameConfig,
    /// Capacity of the send and receive queues in message mode.
    /// Default: 1, so producers wait for the pump.
    pub queue_capacity: usize,
    /// Flush the outbound sink after every write. Default: true.
    pub flush_after_write: bool,
}

impl ConnConfig {
    /// Default config with message mode enabled.
    pub fn messages() -> Self {
        Self {
            mode: ConnMode::Messages,
            ..Self::default()
        }
    }
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            mode: ConnMode::Stream,
            frame: FrameConfig::default(),
            queue_capacity: 1,
            flush_after_write: true,
        }
    }
}
