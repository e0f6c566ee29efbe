//! Core types used throughout Crossbar.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

/// Full address of one crosspoint: which source feeds which destination, on
/// which level of which matrix frame.
///
/// Matrix and level each occupy 4 bits and share one wire byte. Destination
/// and source each decompose into a 3-bit high nibble and a 7-bit low byte
/// (`addr = high * 128 + low`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrosspointAddress {
    /// Matrix frame number (0..15).
    pub matrix: u8,
    /// Level within the matrix (0..15).
    pub level: u8,
    /// Destination (sink) number (0..1023).
    pub destination: u16,
    /// Source number (0..1023).
    pub source: u16,
}

impl CrosspointAddress {
    pub fn new(matrix: u8, level: u8, destination: u16, source: u16) -> Self {
        Self {
            matrix,
            level,
            destination,
            source,
        }
    }

    /// The cache key for this address: source is the value, not part of the
    /// key.
    pub fn key(&self) -> CrosspointKey {
        CrosspointKey {
            matrix: self.matrix,
            level: self.level,
            destination: self.destination,
        }
    }
}

impl fmt::Display for CrosspointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m{}/l{} d{}<-s{}",
            self.matrix, self.level, self.destination, self.source
        )
    }
}

/// Cache key for crosspoint state: the destination is the sink, so the
/// mapping is destination -> source per (matrix, level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrosspointKey {
    pub matrix: u8,
    pub level: u8,
    pub destination: u16,
}

impl fmt::Display for CrosspointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}/l{} d{}", self.matrix, self.level, self.destination)
    }
}

/// Connection status of a crosspoint as observed by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrosspointStatus {
    /// Router has tallied this route.
    Connected,
    /// Take issued, tally not yet seen.
    Pending,
    /// Route known to be torn down.
    Disconnected,
}

impl fmt::Display for CrosspointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Pending => write!(f, "pending"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// One entry of the tally cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrosspointState {
    pub address: CrosspointAddress,
    pub status: CrosspointStatus,
    /// Source-status bit from the wire multiplier byte (set on TDM routers).
    pub source_status: bool,
    /// When this entry was last written.
    #[serde(with = "humantime_serde")]
    pub last_update: SystemTime,
}

impl CrosspointState {
    pub fn new(address: CrosspointAddress, status: CrosspointStatus, source_status: bool) -> Self {
        Self {
            address,
            status,
            source_status,
            last_update: SystemTime::now(),
        }
    }
}

/// Validation bounds for session-level operations, taken from the matrix
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixLimits {
    #[serde(default = "default_max_addresses")]
    pub max_sources: u16,
    #[serde(default = "default_max_addresses")]
    pub max_destinations: u16,
    #[serde(default = "default_max_levels")]
    pub max_levels: u8,
}

fn default_max_addresses() -> u16 {
    1024
}
fn default_max_levels() -> u8 {
    16
}

impl Default for MatrixLimits {
    fn default() -> Self {
        Self {
            max_sources: default_max_addresses(),
            max_destinations: default_max_addresses(),
            max_levels: default_max_levels(),
        }
    }
}

impl MatrixLimits {
    /// Reject out-of-range fields before any wire traffic.
    pub fn check(&self, matrix: u8, level: u8, destination: u16, source: u16) -> Result<()> {
        self.check_destination(matrix, level, destination)?;
        if source >= self.max_sources {
            return Err(ValidationError::Source {
                value: source,
                max: self.max_sources - 1,
            }
            .into());
        }
        Ok(())
    }

    /// Range check for operations that carry no source (interrogate).
    pub fn check_destination(&self, matrix: u8, level: u8, destination: u16) -> Result<()> {
        if matrix > 15 {
            return Err(ValidationError::Matrix {
                value: matrix,
                max: 15,
            }
            .into());
        }
        if level >= self.max_levels || level > 15 {
            return Err(ValidationError::Level {
                value: level,
                max: self.max_levels.min(16) - 1,
            }
            .into());
        }
        if destination >= self.max_destinations {
            return Err(ValidationError::Destination {
                value: destination,
                max: self.max_destinations - 1,
            }
            .into());
        }
        Ok(())
    }
}

/// Whether a label names a source or a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelTarget {
    Source,
    Destination,
}

impl fmt::Display for LabelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Destination => write!(f, "destination"),
        }
    }
}

/// Key for the label store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelKey {
    pub target: LabelTarget,
    pub matrix: u8,
    pub level: u8,
    pub index: u16,
}

/// One crosspoint inside a salvo. Salvos are applied on matrix 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalvoEntry {
    pub destination: u16,
    pub source: u16,
    pub level: u8,
}

/// A named group of crosspoints applied as a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salvo {
    pub id: u32,
    pub name: String,
    pub crosspoints: Vec<SalvoEntry>,
}

/// Snapshot returned by `get-status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterStatus {
    pub connected: bool,
    pub connection_type: String,
    pub crosspoint_count: usize,
    #[serde(with = "humantime_serde")]
    pub last_update: Option<SystemTime>,
}
