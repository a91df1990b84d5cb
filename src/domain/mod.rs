pub mod events;
pub mod lifecycle;
pub mod money;
pub mod order;
pub mod ports;
pub mod split;
pub mod transaction;
pub mod wallet;
