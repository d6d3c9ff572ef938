use crate::error::ServerError;
use shared::{DEFAULT_PORT, DEFAULT_TICK_RATE};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Upper bound keeps the tick period at one millisecond or more
pub const MAX_TICK_RATE: u32 = 1000;

/// Startup settings for a [`crate::network::Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Snapshot broadcasts per second
    pub tick_rate: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            tick_rate: DEFAULT_TICK_RATE,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr, tick_rate: u32) -> Self {
        Self {
            bind_addr,
            tick_rate,
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            return Err(ServerError::InvalidConfig(format!(
                "tick rate must be between 1 and {}, got {}",
                MAX_TICK_RATE, self.tick_rate
            )));
        }
        Ok(())
    }

    /// Whole-millisecond period between ticks
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.tick_rate.max(1)))
    }
}
