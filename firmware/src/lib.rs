#![no_std]

extern crate alloc;

pub mod canvas;
pub mod http;
pub mod net;
pub mod ota;
pub mod storage;
pub mod touch;
