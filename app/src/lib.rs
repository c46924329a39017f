pub mod alert;
pub mod config;
mod door_state;
pub mod http;
pub mod monitor;
pub mod relay;
pub mod sensor;
pub mod shutdown;

pub use door_state::DoorState;
