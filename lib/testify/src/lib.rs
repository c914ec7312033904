mod portpicker;
mod socket;
mod temp;
pub mod tls;
mod wait;

// re-export
pub use socket::next_addr;
pub use temp::temp_dir;
pub use wait::wait_for_tcp;
