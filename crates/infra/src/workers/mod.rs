//! Background workers that pump bus subscriptions into projections.

pub mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerHandle};
