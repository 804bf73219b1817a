#![warn(missing_docs)]
//! Models and ports for transactive network scheduling.
//!
//! A node in a transactive network schedules power with its neighbors and
//! local assets by repeatedly clearing small markets over future delivery
//! intervals. This crate holds the data those markets operate on and the
//! traits through which the market engine talks to the rest of the world.

/// Core domain models for transactive scheduling.
///
/// The models in this module are primarily data structures with minimal business logic.
/// The curve algebra that operates on them lives in `tns-solver`, and the market
/// lifecycle that owns them lives in `tns-market`.
pub mod models;

/// Interface traits for the transactive market engine.
///
/// These traits are the "ports" through which a market reaches participants,
/// counterparts and audit storage, without depending on any concrete transport
/// or persistence layer.
pub mod ports;
