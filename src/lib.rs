//! QCRI library.
//!
//! Reads automated test results (Robot Framework, Selenium IDE, UFT) into a
//! common record shape and imports them into HP Quality Center.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod parsers;
pub mod qc;
pub mod services;
