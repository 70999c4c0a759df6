// Gateway file to expose integration tests from the integration/ subdirectory
// This file allows Rust's test runner to discover tests in subdirectories

// Re-export the integration test modules
// Each test file in integration/ needs to be included here
#[path = "integration/pipeline_end_to_end.rs"]
mod pipeline_end_to_end;

#[path = "integration/queue_single_flight.rs"]
mod queue_single_flight;
