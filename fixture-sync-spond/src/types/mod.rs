//! Spond API payloads.
//!
//! Types read back from Spond keep every key they do not model in a
//! flattened `extra` map, so writing them back never drops remote state.

mod event;
mod group;
mod location;

pub use event::{
    AutoReminderType, Event, MatchInfo, MatchScore, MatchType, NewEvent, NewRecipients,
    NewRecipientsGroup,
};
pub use group::{Group, Member, SubGroup};
pub use location::{AutocompleteLocation, Location};
