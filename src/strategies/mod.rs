//! Trading Strategies Module

pub mod orb_retest;
