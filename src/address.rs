use crate::config::CacheConfiguration;

/// `DecodedAddress` holds the two address components the cache cares about: the tag that
/// identifies a memory block and the index of the set that block must live in. The block offset
/// is dropped since the simulation never looks inside a line.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct DecodedAddress {
    pub tag: u64,
    pub set_index: usize,
}

/// `AddressDecoder` splits raw addresses into tag and set index for one cache geometry. The shift
/// amounts and mask are captured once so decoding is a pair of shifts and an AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDecoder {
    offset_bits: u32,
    set_mask: u64,
    tag_shift: u32,
}

impl From<&CacheConfiguration> for AddressDecoder {
    fn from(config: &CacheConfiguration) -> Self {
        Self {
            offset_bits: config.offset_bits(),
            set_mask: config.num_sets() as u64 - 1,
            tag_shift: config.tag_shift(),
        }
    }
}

impl AddressDecoder {
    /// Split `address` into its tag and set index.
    ///
    /// # Examples
    ///
    /// ```
    /// use cache_sim::address::AddressDecoder;
    /// use cache_sim::config::CacheConfiguration;
    /// let config = CacheConfiguration::from_exponents(6, 1, 10).unwrap();
    /// let decoded = AddressDecoder::from(&config).decode(0x2c0);
    /// assert_eq!(decoded.set_index, 3);
    /// assert_eq!(decoded.tag, 1);
    /// ```
    pub fn decode(&self, address: u64) -> DecodedAddress {
        DecodedAddress {
            tag: address >> self.tag_shift,
            set_index: ((address >> self.offset_bits) & self.set_mask) as usize,
        }
    }
}

/// One-shot form of [`AddressDecoder::decode`] for callers that only hold a configuration.
pub fn decode(address: u64, config: &CacheConfiguration) -> DecodedAddress {
    AddressDecoder::from(config).decode(address)
}
