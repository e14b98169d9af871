use crate::cache::{ReadingCache, ReadingSnapshot};
use crate::transport::ChannelOpener;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod utils;
pub mod structs;
pub mod session;
pub mod meter_definitions;

use meter_definitions::REGISTER_CATALOG;
use session::MeterSession;
use structs::PollResult;

/// Everything that can go wrong during one poll cycle, none of it is fatal for the process
#[derive(Error, Debug)]
pub enum EnergomeraError {
    #[error("Unable to open channel: {0}")]
    ChannelOpenFailure(#[source] std::io::Error),
    #[error("Unable to write to channel: {0}")]
    ChannelWrite(#[source] std::io::Error),
    #[error("Wrong starting char {0:#04x}")]
    UnexpectedStartByte(u8),
    #[error("Short read, expected {expected} bytes but got {received}")]
    ShortRead { expected: usize, received: usize },
    #[error("Timeout while waiting for frame terminator")]
    Timeout,
    #[error("Wrong prefix {}", hex::encode(.0))]
    UnexpectedPrefix(Vec<u8>),
    #[error("Wrong suffix {0:#04x}")]
    UnexpectedSuffix(u8),
    #[error("Wrong BCC, expected {expected:#04x} calculated {calculated:#04x}")]
    ChecksumMismatch { expected: u8, calculated: u8 },
    #[error("Failed to authorize, meter answered {0:#04x}")]
    AuthorizationRejected(u8),
    #[error("Wrong header {0:#04x}")]
    MissingHeader(u8),
    #[error("Malformed value for {register}: {reason}")]
    MalformedValue { register: String, reason: String },
    #[error("Frame exceeds {0} bytes without terminator")]
    FrameTooLong(usize),
}

/// Drives the poll loop: open, talk to the meter, publish the snapshot, sleep
#[derive(Clone)]
pub struct EnergomeraManager {
    opener: Arc<dyn ChannelOpener>,
    cache: Arc<ReadingCache>,
    password: String,
    poll_interval: Duration,
    max_frame_len: usize,
}

impl EnergomeraManager {
    pub fn new(
        opener: Arc<dyn ChannelOpener>,
        cache: Arc<ReadingCache>,
        password: String,
        poll_interval: Duration,
        max_frame_len: usize,
    ) -> Self {
        Self { opener, cache, password, poll_interval, max_frame_len }
    }

    /// Runs one complete session on a fresh channel, the channel is closed afterwards in any case
    pub fn run_cycle(&self) -> Result<PollResult, EnergomeraError> {
        let mut channel = self.opener.open()?;
        debug!("Port opened");

        let result = MeterSession::new(channel.as_mut(), self.max_frame_len).run(&self.password, &REGISTER_CATALOG);

        if let Err(e) = channel.close() {
            warn!("Closing the channel failed: {e}");
        }
        result
    }

    /// One cycle including the cache update, blocking
    pub fn poll_once(&self) -> Result<(), EnergomeraError> {
        match self.run_cycle() {
            Ok(result) => {
                info!("Read {} values from meter {}", result.readings.len(), result.serial_number);
                self.cache.publish(ReadingSnapshot::from_poll(result));
                Ok(())
            }
            Err(e) => {
                error!("Energomera poll failed: {e}");
                self.cache.publish(ReadingSnapshot::failed(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn start_thread(&self) -> ! {
        info!("Starting Energomera poll thread, interval {:?}", self.poll_interval);

        loop {
            let cycle = self.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || cycle.poll_once()).await {
                error!("Energomera poll cycle aborted: {e}");
                self.cache.publish(ReadingSnapshot::failed(e.to_string()));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
