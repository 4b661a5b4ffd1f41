//! Network collaborators: bring-up probe, frame codec, pub/sub link
//!
//! The execution engine core never touches framing or sockets; it sees only
//! readiness (via the startup gate) and topic-tagged payloads (via
//! `BrokerEvent`).

pub mod broker;
pub mod codec;
pub mod station;

pub use broker::{BrokerClient, BrokerConfig, BrokerEvent, InboundMessage};
pub use codec::{Frame, FrameDecoder};
pub use station::{StationLink, TcpStationLink};
