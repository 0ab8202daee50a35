use std::fmt;

/// Where a match is played.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Venue {
    /// The address used for location lookups.
    pub address: String,
    /// A secondary spelling of the address as published by the source.
    pub alternative_address: Option<String>,
}

impl Venue {
    pub fn new(address: impl Into<String>) -> Self {
        Venue {
            address: address.into(),
            alternative_address: None,
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alternative_address {
            Some(alt) => write!(f, "{} ({})", self.address, alt),
            None => f.write_str(&self.address),
        }
    }
}
