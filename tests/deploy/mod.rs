//! Step definitions and fixtures for the deployment scenarios.

mod bdd_steps;
mod scenarios;
mod test_helpers;
