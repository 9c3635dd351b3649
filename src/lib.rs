//! Rate-paced concurrent request pipeline and rate-limited reverse proxy.
//!
//! The library backs the `pacekeeper` binary but is usable on its own:
//! [`pipeline::Pipeline`] fans requests out to a pool of workers behind a
//! single admission gate, [`pipeline::batch::send_batch`] runs a fixed batch
//! at a steady rate, [`client::PacedClient`] and [`client::PacedTask`] pace
//! individual calls, and [`proxy`] forwards inbound HTTP requests to one or
//! more upstreams without exceeding a configured rate.
pub mod args;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod proxy;
pub mod rate;
pub mod shutdown;
