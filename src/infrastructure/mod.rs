pub mod ble;
pub mod logging;
pub mod osc;
pub mod transport;
