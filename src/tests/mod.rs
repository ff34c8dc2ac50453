// Test modules for Matchsync
// Each module tests the public behavior of the corresponding source module;
// `support` holds the scripted REST fake and wire-type builders.

mod support;

mod api_tests;
mod model_tests;
