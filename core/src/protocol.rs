pub mod io;
pub mod loopback;
pub mod onion;
