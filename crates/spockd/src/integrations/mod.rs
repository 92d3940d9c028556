#[cfg(feature = "host_ha")]
pub mod ha;
pub mod spock;
