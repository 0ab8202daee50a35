/// Prefix of the hidden description line carrying the source match id.
pub const PREFIX_EVENT_ID: &str = "Event ID: ";

/// Prefix of the hidden description line carrying the source update timestamp.
pub const PREFIX_LAST_UPDATED: &str = "Last updated: ";

/// Number of matches in a valid triangle.
pub const TRIANGLE_SIZE: usize = 3;
