// pinwire — pin model firmware generator and serial control client
//
// Library root. Generation flows model → comm_map → codegen (tied together
// by pipeline); the host side is transport → client, with profiles recording
// what each port was flashed with.

pub mod arduino_cli;
pub mod client;
pub mod codegen;
pub mod comm_map;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod protocol;
pub mod sim;
pub mod transport;
pub mod upload;
