//! leosync - reconcile declarative documents against a Leostream broker

pub mod config;
pub mod error;
pub mod leostream;
pub mod resource;
