use clap::Parser;
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Largest accepted log2 exponent for any geometry parameter. Keeps every derived byte count
/// addressable and every shift amount well below 64.
pub const MAX_EXPONENT: u32 = 32;

/// Largest number of cache lines a simulated cache may hold. Every line is allocated up front, so
/// this bounds the model's memory footprint.
pub const MAX_LINES: u64 = 1 << 22;

/// Ways a requested cache geometry can fail validation. All of them are fatal and are reported
/// before a single access is simulated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("'{field}' must be a non-zero power of two, got {value}")]
    NotPowerOfTwo { field: &'static str, value: u64 },
    #[error(
        "capacity of {capacity} bytes cannot hold a single set of {associativity} x {block_size} byte blocks"
    )]
    CapacityTooSmall {
        capacity: u64,
        block_size: u64,
        associativity: u64,
    },
    #[error("'{field}' exponent {exponent} is too large (must be below {max})", max = MAX_EXPONENT)]
    ExponentTooLarge { field: &'static str, exponent: u32 },
    #[error("geometry needs {lines} cache lines, more than the {max} that can be simulated", max = MAX_LINES)]
    TooManyLines { lines: u64 },
}

/// Command line configuration for the simulator. Geometry is given as powers of two, matching
/// the way cache parameters are usually quoted (2^6 byte blocks, 2^1 ways, 2^10 bytes total).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// log2 of the block size in bytes
    #[arg(long, default_value_t = env_or_default_u32("SIM_BLOCK_BITS", 6))]
    pub block_bits: u32,

    /// log2 of the number of lines per set
    #[arg(long, default_value_t = env_or_default_u32("SIM_ASSOC_BITS", 1))]
    pub assoc_bits: u32,

    /// log2 of the total cache capacity in bytes
    #[arg(long, default_value_t = env_or_default_u32("SIM_CAPACITY_BITS", 10))]
    pub capacity_bits: u32,

    /// Show a progress spinner while each trace is replayed
    #[arg(long)]
    pub progress: bool,

    /// Print a combined report over every trace after the per-trace reports
    #[arg(long)]
    pub summary: bool,

    /// Trace files to replay, each against a cold cache
    #[arg(required = true)]
    pub traces: Vec<PathBuf>,
}

impl Config {
    /// Turn the exponents given on the command line into a validated cache geometry.
    pub fn geometry(&self) -> Result<CacheConfiguration, ConfigurationError> {
        CacheConfiguration::from_exponents(self.block_bits, self.assoc_bits, self.capacity_bits)
    }

    pub fn display(&self) {
        println!("simulation configuration values: ");
        println!("{:#?}", self);
    }
}

/// `CacheConfiguration` is the validated geometry of a simulated cache. Every derived quantity
/// (set count, bit widths of the address fields) is computed once here so the per-access path
/// only shifts and masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfiguration {
    block_size: u64,
    associativity: usize,
    capacity: u64,
    num_blocks: u64,
    num_sets: usize,
    offset_bits: u32,
    set_index_bits: u32,
}

impl CacheConfiguration {
    /// Build a configuration from raw byte counts.
    ///
    /// # Arguments
    ///
    /// * `block_size` - bytes per cache line
    /// * `associativity` - lines per set
    /// * `capacity` - total bytes held by the cache
    ///
    /// # Errors
    ///
    /// Fails if any argument is zero or not a power of two, if any of them is too large to be
    /// simulated, if the capacity is smaller than one full set, or if the cache would hold more
    /// than `MAX_LINES` lines.
    pub fn new(
        block_size: u64,
        associativity: u64,
        capacity: u64,
    ) -> Result<Self, ConfigurationError> {
        let block_bits = exponent_of("block_size", block_size)?;
        let assoc_bits = exponent_of("associativity", associativity)?;
        let capacity_bits = exponent_of("capacity", capacity)?;

        if block_bits + assoc_bits > capacity_bits {
            return Err(ConfigurationError::CapacityTooSmall {
                capacity,
                block_size,
                associativity,
            });
        }

        let num_blocks = capacity >> block_bits;
        if num_blocks > MAX_LINES {
            return Err(ConfigurationError::TooManyLines { lines: num_blocks });
        }
        let num_sets = num_blocks >> assoc_bits;

        Ok(Self {
            block_size,
            associativity: associativity as usize,
            capacity,
            num_blocks,
            num_sets: num_sets as usize,
            offset_bits: block_bits,
            set_index_bits: capacity_bits - block_bits - assoc_bits,
        })
    }

    /// Build a configuration from log2 exponents, e.g. `(6, 1, 10)` for 64 byte blocks, two
    /// ways and 1 KiB of capacity.
    pub fn from_exponents(
        block_bits: u32,
        assoc_bits: u32,
        capacity_bits: u32,
    ) -> Result<Self, ConfigurationError> {
        let block_size = pow2("block_bits", block_bits)?;
        let associativity = pow2("assoc_bits", assoc_bits)?;
        let capacity = pow2("capacity_bits", capacity_bits)?;
        Self::new(block_size, associativity, capacity)
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn associativity(&self) -> usize {
        self.associativity
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    pub fn num_sets(&self) -> usize {
        self.num_sets
    }

    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }

    pub fn set_index_bits(&self) -> u32 {
        self.set_index_bits
    }

    /// Number of low address bits consumed by the offset and set index together.
    pub fn tag_shift(&self) -> u32 {
        self.offset_bits + self.set_index_bits
    }
}

fn exponent_of(field: &'static str, value: u64) -> Result<u32, ConfigurationError> {
    if !value.is_power_of_two() {
        return Err(ConfigurationError::NotPowerOfTwo { field, value });
    }
    let exponent = value.trailing_zeros();
    if exponent >= MAX_EXPONENT {
        return Err(ConfigurationError::ExponentTooLarge { field, exponent });
    }
    Ok(exponent)
}

fn pow2(field: &'static str, exponent: u32) -> Result<u64, ConfigurationError> {
    if exponent >= MAX_EXPONENT {
        return Err(ConfigurationError::ExponentTooLarge { field, exponent });
    }
    Ok(1 << exponent)
}

fn env_or_default_u32(varname: &str, default: u32) -> u32 {
    match env::var(varname) {
        Ok(val) => match val.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(varname, value = %val, default, "ignoring non-integer environment value");
                default
            }
        },
        _ => default,
    }
}
