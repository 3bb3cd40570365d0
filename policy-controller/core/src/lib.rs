#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cidr;
mod decision;
pub mod image;
pub mod policy;
mod provider;
mod quantity;
mod violation;

pub use self::{
    decision::Decision,
    policy::{ConfigError, PolicySnapshot},
    provider::{PolicyProvider, PolicyUnavailable, StaticPolicy},
    quantity::{Quantity, QuantityParseError},
    violation::{CheckId, Severity, Violation},
};
pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};
