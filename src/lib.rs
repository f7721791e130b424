//! Tollgate - Distributed Token-Bucket Admission Control
//!
//! This crate implements a distributed token-bucket rate limiter whose state
//! is shared consistently across service instances through any backing store
//! that offers atomic conditional writes. Callers map a request to a string
//! key, invoke `consume` on a [`store::BucketStore`], and translate the
//! returned [`bucket::Decision`] into a protocol-level response.

pub mod bucket;
pub mod config;
pub mod error;
pub mod store;
