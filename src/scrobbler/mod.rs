// Scrobbler module
// Delivery port and the Last.fm implementation behind it

pub mod lastfm;
pub mod lastfm_auth;
pub mod traits;

pub use lastfm::LastFmScrobbler;
pub use traits::{DeliveryError, ScrobbleService};
