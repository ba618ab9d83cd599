//! Message types spoken by `msgwire serve` and `msgwire ping`.

use msgwire_frame::json_message;
use serde::{Deserialize, Serialize};

/// Echo request. The server answers with a [`Pong`] carrying the same `seq`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub seq: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub seq: u32,
}

/// Free-form text the server logs.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
}

json_message!(Ping);
json_message!(Pong);
json_message!(Note);
