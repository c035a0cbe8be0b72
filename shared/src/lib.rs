//! Wire protocol shared between the relay server and its clients.

pub mod protocol;
