/// Common test utilities and mock infrastructure
///
/// This module provides shared functionality for integration tests including:
/// - A command runner that records and scripts external tools
/// - Mock drives backed by files in a temporary /dev
pub mod mock_commands;
pub mod mock_drive;
