#![allow(dead_code)]

pub mod raw_server;
pub mod slow_server;
pub mod socket_guard;
