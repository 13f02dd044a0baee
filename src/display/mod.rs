pub mod clock;
pub mod terminal;

pub use clock::FrameClock;
