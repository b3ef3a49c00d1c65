// Test modules for Marketwire
// Each module contains unit tests for the corresponding source file

mod protocol_tests;
mod support;
