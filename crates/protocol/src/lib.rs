//! Wire protocol shared between the commander and the agent binaries.
//!
//! All frames carry a top-level `message` field for discriminated
//! deserialization; see [`Message`]. [`Framer`] turns any async byte stream
//! into a sequence of those frames.

mod framer;
mod message;

pub use framer::{FrameReader, FrameWriter, Framer, FramerError};
pub use message::{ExitCode, Message, ScriptType};
