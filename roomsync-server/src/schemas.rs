use serde::Deserialize;
use validator::Validate;

use crate::errors::GatewayError;

/// Field bounds from §6.2's inbound event table, checked once per frame
/// before it reaches a runtime component. Kept as small `Validate` structs
/// in the same shape the HTTP side of this kind of server would use for a
/// `ValidatedJson` body, even though these are read off an already-parsed
/// `WireInbound` rather than extracted directly from a request.
#[derive(Debug, Deserialize, Validate)]
pub struct ChatMessageSchema<'a> {
    #[validate(length(min = 1, max = 2000))]
    pub content: &'a str,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoomCodeSchema<'a> {
    #[validate(length(min = 1, max = 32))]
    pub room_code: &'a str,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PlaybackStartSchema {
    #[validate(range(min = 1))]
    pub track_duration: u64,
}

pub fn validate<T: Validate>(schema: &T) -> Result<(), GatewayError> {
    schema.validate().map_err(|e| GatewayError::Validation(e.to_string()))
}
