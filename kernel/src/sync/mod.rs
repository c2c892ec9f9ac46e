//! Blocking primitives built on the scheduler seam.

pub mod wait_queue;

pub use wait_queue::WaitQueue;
