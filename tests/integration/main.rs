//! Integration tests: session driver and store working together.

mod mock_store;
mod session_flow;
