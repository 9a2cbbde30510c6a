// Common traits for scrobbling services

use crate::player::TrackIdentity;
use crate::queue::ScrobbleRecord;
use snafu::prelude::*;

/// Why a delivery attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DeliveryError {
    /// Network trouble, rate limiting or a temporary service problem. Retrying later may work.
    #[snafu(display("transient failure: {message}"))]
    Transient { message: String },

    /// Credentials were rejected. Needs operator action.
    #[snafu(display("authentication failed: {message}"))]
    Auth { message: String },
}

/// A service that accepts now-playing updates and scrobbles
pub trait ScrobbleService {
    fn send_now_playing(&self, track: &TrackIdentity) -> Result<(), DeliveryError>;

    fn send_scrobble(&self, record: &ScrobbleRecord) -> Result<(), DeliveryError>;
}
