mod controller;
mod scheduler;
mod state;


pub use controller::SessionController;
pub use state::{FrameInfo, SessionConfig, SessionSnapshot, SessionState, StartReceipt};
