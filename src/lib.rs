//! Library crate for situation-room, exposing the session engine to the worker binary and
//! integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod services;
pub mod state;
