use crate::FormatError;

use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds subtracted from every timestamp before it is packed.
pub const EPOCH_MS: u64 = 0;

pub const DEFAULT_SHARD_ID: u16 = 1;

const TIMESTAMP_SHIFT: u32 = 22;
const SHARD_SHIFT: u32 = 12;
const SEQUENCE_BITS: u32 = 12;
const SHARD_MASK: u64 = 0x3ff;
const SEQUENCE_MASK: u64 = 0xfff;
const TIMESTAMP_MASK: u64 = (1 << 41) - 1;

/// Clock shared by every generator in the process that was not given its own.
static PROCESS_CLOCK: SequenceClock = SequenceClock::new(1);

/// The last `(millisecond, sequence)` pair handed out, packed as `ms << 12 | sequence`.
///
/// Every draw advances the sequence by one, wrapping mod 4096. A draw never returns a pair it returned before: when the
/// sequence comes back around inside one millisecond, the millisecond moves forward instead.
#[derive(Debug)]
pub struct SequenceClock(AtomicU64);

impl SequenceClock {
    /// A clock whose first draw yields `first_sequence` (mod 4096).
    pub const fn new(first_sequence: u16) -> Self {
        Self(AtomicU64::new((first_sequence as u64 + SEQUENCE_MASK) & SEQUENCE_MASK))
    }

    /// The next pair no earlier than `timestamp`, strictly greater than every pair drawn before.
    fn draw(&self, timestamp: u64) -> u64 {
        let step = |last: u64| ((timestamp << SEQUENCE_BITS) | ((last + 1) & SEQUENCE_MASK)).max(last + 1);
        let last = match self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| Some(step(last)))
        {
            Ok(last) | Err(last) => last,
        };
        step(last)
    }
}

/// A 64-bit ordered identifier: `[41-bit ms since epoch][10-bit shard][12-bit sequence]`.
///
/// Doubles as the primary key of a batch and as the logical clock of the log: a batch with a larger id supersedes any older
/// batch it overlaps.
#[derive(
    Archive, Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize,
)]
#[archive(check_bytes)]
#[archive_attr(derive(Debug, Eq, PartialEq, PartialOrd, Ord))]
pub struct Snowflake(pub u64);

impl Snowflake {
    pub const MIN: Self = Self(0);

    pub const fn into_sled_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_sled_key(bytes: &[u8]) -> Self {
        let mut id_bytes = [0; 8];
        id_bytes.copy_from_slice(&bytes[..8]);
        Self(u64::from_be_bytes(id_bytes))
    }

    pub const fn timestamp_ms(self) -> u64 {
        (self.0 >> TIMESTAMP_SHIFT) + EPOCH_MS
    }

    pub const fn shard_id(self) -> u16 {
        ((self.0 >> SHARD_SHIFT) & SHARD_MASK) as u16
    }

    pub const fn sequence(self) -> u16 {
        (self.0 & SEQUENCE_MASK) as u16
    }

    /// `(timestamp_ms, shard_id, sequence)`
    pub const fn parts(self) -> (u64, u16, u16) {
        (self.timestamp_ms(), self.shard_id(), self.sequence())
    }

    const fn pack(timestamp: u64, shard_id: u16, sequence: u64) -> Self {
        Self(
            ((timestamp & TIMESTAMP_MASK) << TIMESTAMP_SHIFT)
                | ((shard_id as u64 % 1024) << SHARD_SHIFT)
                | (sequence & SEQUENCE_MASK),
        )
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Accepts exactly 19 decimal digits.
impl FromStr for Snowflake {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 19 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FormatError::InvalidSnowflake(s.to_owned()));
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| FormatError::InvalidSnowflake(s.to_owned()))
    }
}

pub fn is_valid_snowflake(s: &str) -> bool {
    s.parse::<Snowflake>().is_ok()
}

/// Generates [`Snowflake`]s for one shard.
///
/// The sequence field comes from a [`SequenceClock`] shared by all generators using the same clock, so no two calls to
/// [`generate`](Self::generate) on one clock ever produce the same id, even past 4096 ids in one millisecond.
#[derive(Clone, Copy, Debug)]
pub struct SnowflakeGenerator {
    shard_id: u16,
    clock: &'static SequenceClock,
}

impl Default for SnowflakeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_ID)
    }
}

impl SnowflakeGenerator {
    /// A generator drawing from the process-wide clock.
    pub fn new(shard_id: u16) -> Self {
        Self::with_clock(shard_id, &PROCESS_CLOCK)
    }

    pub fn with_clock(shard_id: u16, clock: &'static SequenceClock) -> Self {
        Self { shard_id, clock }
    }

    pub fn shard_id(&self) -> u16 {
        self.shard_id
    }

    pub fn generate(&self) -> Snowflake {
        // A clock before the epoch is not an error here; it packs as timestamp zero.
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.generate_after(now_ms)
    }

    fn generate_after(&self, now_ms: u64) -> Snowflake {
        let timestamp = now_ms.saturating_sub(EPOCH_MS) & TIMESTAMP_MASK;
        let pair = self.clock.draw(timestamp);
        Snowflake::pack(pair >> SEQUENCE_BITS, self.shard_id, pair)
    }

    /// Derives an id for an arbitrary timestamp, for bounding queries. Still consumes a sequence value.
    ///
    /// Unlike [`generate`](Self::generate), the result is not guaranteed unique; it is never stored.
    pub fn generate_at(&self, timestamp_ms: u64) -> Snowflake {
        let pair = self.clock.draw(0);
        Snowflake::pack(timestamp_ms.saturating_sub(EPOCH_MS), self.shard_id, pair)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
