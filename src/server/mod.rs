//! HTTP service

pub mod api;
