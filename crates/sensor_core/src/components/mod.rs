//! Concrete sensor components

mod gnss;
mod ig1_imu;
mod legacy_imu;

pub use gnss::{parse_sample as parse_gnss_sample, GnssComponent};
pub use ig1_imu::{parse_sample as parse_ig1_sample, Ig1ImuComponent, IG1_TICK_RATE};
pub use legacy_imu::{parse_sample as parse_legacy_sample, LegacyImuComponent};
