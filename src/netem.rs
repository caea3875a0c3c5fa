//! Netem parameter derivation
//!
//! Converts the user-facing loss percentage and millisecond latency into the
//! numeric encodings the kernel's `netem` qdisc expects:
//! - loss as a fraction of `u32::MAX`
//! - latency in packet scheduler ticks
//! - a fixed queue limit in packets

use std::io;
use std::path::Path;
use tracing::debug;

/// Path to the kernel's packet scheduler timing information
pub const PSCHED_PATH: &str = "/proc/net/psched";

/// Queue limit written into every netem qdisc.
///
/// A limit of 0 stalls all traffic on the interface.
pub const NETEM_LIMIT: u32 = 1000;

/// Converts microseconds into kernel packet scheduler ticks.
pub trait TickConverter: Send + Sync {
    fn usec_to_ticks(&self, usec: u32) -> u32;
}

/// Tick converter backed by the running kernel's `/proc/net/psched`.
///
/// The file holds four hex words, `t2us us2t clock resolution`; the ratio
/// `t2us / us2t` is the number of ticks per microsecond (see iproute2
/// `tc/tc_core.c`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PschedClock {
    tick_in_usec: f64,
}

impl PschedClock {
    /// Read the tick rate of the running kernel
    pub fn from_proc() -> io::Result<Self> {
        Self::from_path(PSCHED_PATH)
    }

    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let clock = Self::parse(&contents)?;
        debug!(
            "Read {}: {} ticks per usec",
            path.as_ref().display(),
            clock.tick_in_usec
        );
        Ok(clock)
    }

    /// Parse the contents of a psched file
    pub fn parse(contents: &str) -> io::Result<Self> {
        let mut words = contents.split_whitespace();
        let t2us = parse_hex_word(words.next(), "t2us")?;
        let us2t = parse_hex_word(words.next(), "us2t")?;

        if us2t == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "psched us2t is zero",
            ));
        }

        Ok(Self {
            tick_in_usec: f64::from(t2us) / f64::from(us2t),
        })
    }

    pub fn tick_in_usec(&self) -> f64 {
        self.tick_in_usec
    }
}

fn parse_hex_word(word: Option<&str>, field: &str) -> io::Result<u32> {
    let word = word.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("psched is missing the {} field", field),
        )
    })?;
    u32::from_str_radix(word, 16).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("psched {} field {:?} is not hex: {}", field, word, e),
        )
    })
}

impl TickConverter for PschedClock {
    fn usec_to_ticks(&self, usec: u32) -> u32 {
        scale_ticks(usec, self.tick_in_usec)
    }
}

/// Tick converter with a known, fixed rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTickRate {
    pub ticks_per_usec: f64,
}

impl FixedTickRate {
    pub fn new(ticks_per_usec: f64) -> Self {
        Self { ticks_per_usec }
    }
}

impl TickConverter for FixedTickRate {
    fn usec_to_ticks(&self, usec: u32) -> u32 {
        scale_ticks(usec, self.ticks_per_usec)
    }
}

// Truncates toward zero like iproute2; `as` saturates at u32::MAX.
fn scale_ticks(usec: u32, ticks_per_usec: f64) -> u32 {
    (f64::from(usec) * ticks_per_usec) as u32
}

/// Encode a loss percentage as a proportion of `u32::MAX`.
///
/// Rounds half away from zero, so 50% encodes as 2147483648.
pub fn encode_loss(loss_pct: u32) -> u32 {
    (f64::from(u32::MAX) * (f64::from(loss_pct) / 100.0)).round() as u32
}

/// Kernel-level netem settings derived from one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetemParameters {
    pub limit: u32,
    /// Loss probability scaled to the u32 range
    pub loss: u32,
    /// Latency in packet scheduler ticks
    pub latency: u32,
}

impl NetemParameters {
    /// Derive parameters from a loss percentage and a latency in microseconds.
    pub fn derive(loss_pct: u32, latency_usec: u32, ticks: &dyn TickConverter) -> Self {
        Self {
            limit: NETEM_LIMIT,
            loss: encode_loss(loss_pct),
            latency: ticks.usec_to_ticks(latency_usec),
        }
    }

    /// Serialize as the kernel's `struct tc_netem_qopt`.
    ///
    /// ```c
    /// struct tc_netem_qopt {
    ///     __u32 latency;
    ///     __u32 limit;
    ///     __u32 loss;
    ///     __u32 gap;
    ///     __u32 duplicate;
    ///     __u32 jitter;
    /// };
    /// ```
    ///
    /// Gap, duplicate and jitter are always zero. Native endian.
    pub fn to_qopt_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 * 6);
        buf.extend_from_slice(&self.latency.to_ne_bytes());
        buf.extend_from_slice(&self.limit.to_ne_bytes());
        buf.extend_from_slice(&self.loss.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf
    }
}
