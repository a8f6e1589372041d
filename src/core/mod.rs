//! Core translation engine module

pub mod beam_search;
pub mod config;
pub mod errors;
pub mod hub;
pub mod models;
pub mod onnx;
pub mod tokenizer;
pub mod translator;
