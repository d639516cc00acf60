//! Axpert-family inverter protocol: request framing, response
//! classification and the structured decoders for query responses.

pub mod decoder;
pub mod packet;
