//! Integration test target: full scan cycles over in-memory providers.

mod mock_provider;
mod scan_cycle;
mod restart;
