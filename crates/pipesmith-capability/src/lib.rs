//! Capability invocation for Pipesmith.
//!
//! A *capability* is an external callable unit: a reasoning agent
//! (non-deterministic, streams free text mixed with trace events) or a
//! processing function (deterministic, structured input/output). This crate
//! normalizes both behind [`CapabilityClient`] and owns the two boundary
//! conversions the rest of the system depends on:
//!
//! - decoding the agent response stream into the closed [`AgentFrame`]
//!   union, tolerating corrupt frames;
//! - extracting the YAML artifact out of free-form agent text
//!   ([`extract_yaml`]).

mod client;
mod error;
mod extract;
mod stream;
mod types;

pub use client::{
    CapabilityClient, CapabilityConfig, HttpCapabilityClient, MockCapabilityClient,
    RecordedRequest, SharedCapabilityClient, with_retry,
};
pub use error::{CapabilityError, Result};
pub use extract::extract_yaml;
pub use stream::{AgentFrame, FrameStream, collect_invocation, decode_frame_stream};
pub use types::{AgentInput, CapabilityInvocation, TraceEvent};
