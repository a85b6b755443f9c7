//! Qlik Sense monitoring bridge: ingests user and log events over UDP plus
//! audit events over HTTP, and fans them out to InfluxDB, parquet files, and
//! QVD staging files through buffered, batch-retrying writers.

pub mod audit;
pub mod buffer;
pub mod cli;
pub mod config;
pub mod destinations;
pub mod events;
pub mod queue;
pub mod udp;
pub mod web;
